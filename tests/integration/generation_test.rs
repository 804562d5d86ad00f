// Static generation against rendered HTML
//
// The bridge and the middleware share one cache, so a generated file
// and the live response for its URL are the same bytes.

use std::sync::Arc;

use http::{Method, Request};
use tempfile::TempDir;

use kagami::Outcome;

use super::test_support::{layer_with, write_image, CountingTransformer};

const PAGE: &str = r#"<!doctype html>
<html>
  <body>
    <img src="/_img/w:320/hero.jpg" srcset="/_img/w:320/hero.jpg 320w, /_img/w:768/hero.jpg 768w">
    <img src="/_img/logo.png?q=80">
    <a href="/about">about</a>
  </body>
</html>
"#;

#[tokio::test]
async fn test_discover_plan_run_produces_files() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "hero.jpg", b"jpeg-bytes");
    write_image(dir.path(), "logo.png", b"png-bytes");
    let layer = layer_with(dir.path(), Arc::new(CountingTransformer::new())).await;

    let bridge = layer.before_generate();
    for url in bridge.discover(PAGE) {
        let mapped = bridge.map_to_static(&url);
        assert!(mapped.starts_with("/_img/"));
    }
    assert_eq!(bridge.planned_count(), 3);

    let out = TempDir::new().unwrap();
    let report = bridge.run(out.path()).await;

    assert!(report.is_success());
    assert_eq!(report.written.len(), 3);
    for artifact in &report.written {
        assert!(out.path().join(&artifact.file_name).is_file());
    }
}

#[tokio::test]
async fn test_generated_file_matches_live_bytes() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "hero.jpg", b"jpeg-bytes");
    let layer = layer_with(dir.path(), Arc::new(CountingTransformer::new())).await;

    let url = "/_img/w:320/hero.jpg";
    let bridge = layer.before_generate();
    bridge.map_to_static(url);
    let out = TempDir::new().unwrap();
    let report = bridge.run(out.path()).await;
    let generated = std::fs::read(out.path().join(&report.written[0].file_name)).unwrap();

    let req = Request::builder()
        .method(Method::GET)
        .uri(url)
        .body(())
        .unwrap();
    let served = match layer.middleware().handle(&req).await {
        Outcome::Response(response) => response,
        Outcome::PassThrough => panic!("expected a response"),
    };

    assert_eq!(served.body().as_ref(), generated.as_slice());
}

#[tokio::test]
async fn test_generation_and_serving_share_the_cache() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "hero.jpg", b"jpeg-bytes");
    let transformer = Arc::new(CountingTransformer::new());
    let layer = layer_with(dir.path(), transformer.clone()).await;

    let bridge = layer.before_generate();
    bridge.map_to_static("/_img/w:320/hero.jpg");
    let out = TempDir::new().unwrap();
    bridge.run(out.path()).await;

    // The live request finds the entry generation computed
    let req = Request::builder()
        .method(Method::GET)
        .uri("/_img/w:320/hero.jpg")
        .body(())
        .unwrap();
    let response = match layer.middleware().handle(&req).await {
        Outcome::Response(response) => response,
        Outcome::PassThrough => panic!("expected a response"),
    };

    assert_eq!(response.headers()["x-cache-status"], "HIT");
    assert_eq!(transformer.calls(), 1);
}

#[tokio::test]
async fn test_failures_are_reported_per_url() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "hero.jpg", b"jpeg-bytes");
    let layer = layer_with(dir.path(), Arc::new(CountingTransformer::new())).await;

    let bridge = layer.before_generate();
    bridge.map_to_static("/_img/w:320/hero.jpg");
    bridge.map_to_static("/_img/w:320/gone.jpg");
    let out = TempDir::new().unwrap();
    let report = bridge.run(out.path()).await;

    assert!(!report.is_success());
    assert_eq!(report.written.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].url, "/_img/w:320/gone.jpg");

    let text = layer.metrics_text();
    assert!(text.contains("kagami_generation_written_total 1"));
    assert!(text.contains("kagami_generation_failed_total 1"));
}
