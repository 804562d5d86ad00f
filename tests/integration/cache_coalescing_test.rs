// Request coalescing through the full middleware path
//
// The transform cache must hold one computation per key no matter how
// many requests arrive while it runs, and must never serve a failure
// from the cache.

use std::sync::Arc;
use std::time::Duration;

use http::{Method, Request, StatusCode};
use tempfile::TempDir;

use kagami::Outcome;

use super::test_support::{layer_with, write_image, CountingTransformer, FlakyTransformer};

fn get(uri: &str) -> Request<()> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(())
        .unwrap()
}

fn status_of(outcome: Outcome) -> StatusCode {
    match outcome {
        Outcome::Response(response) => response.status(),
        Outcome::PassThrough => panic!("expected a response"),
    }
}

#[tokio::test]
async fn test_concurrent_identical_requests_transform_once() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "hero.jpg", b"jpeg-bytes");
    let transformer = Arc::new(CountingTransformer::with_delay(Duration::from_millis(50)));
    let layer = Arc::new(layer_with(dir.path(), transformer.clone()).await);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let layer = Arc::clone(&layer);
        handles.push(tokio::spawn(async move {
            status_of(layer.middleware().handle(&get("/_img/w:300/hero.jpg")).await)
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(transformer.calls(), 1);

    let stats = layer.cache_stats();
    assert_eq!(stats.hits + stats.misses, 8);
    // Exactly one request led the computation; every other miss waited
    // on it
    assert_eq!(stats.misses - stats.coalesced_waits, 1);
}

#[tokio::test]
async fn test_distinct_parameters_transform_separately() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "hero.jpg", b"jpeg-bytes");
    let transformer = Arc::new(CountingTransformer::new());
    let layer = layer_with(dir.path(), transformer.clone()).await;
    let middleware = layer.middleware();

    assert_eq!(
        status_of(middleware.handle(&get("/_img/w:300/hero.jpg")).await),
        StatusCode::OK
    );
    assert_eq!(
        status_of(middleware.handle(&get("/_img/w:768/hero.jpg")).await),
        StatusCode::OK
    );

    assert_eq!(transformer.calls(), 2);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "hero.jpg", b"jpeg-bytes");
    let transformer = Arc::new(CountingTransformer::new());
    let layer = layer_with(dir.path(), transformer.clone()).await;
    let middleware = layer.middleware();

    middleware.handle(&get("/_img/w:300/hero.jpg")).await;
    middleware.handle(&get("/_img/w:300/hero.jpg")).await;

    assert_eq!(transformer.calls(), 1);
    assert_eq!(layer.cache_stats().hits, 1);
}

#[tokio::test]
async fn test_failed_transform_is_retried_not_cached() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "hero.jpg", b"jpeg-bytes");
    let layer = layer_with(dir.path(), Arc::new(FlakyTransformer::failing(1))).await;
    let middleware = layer.middleware();

    assert_eq!(
        status_of(middleware.handle(&get("/_img/w:300/hero.jpg")).await),
        StatusCode::BAD_GATEWAY
    );
    // The failure was broadcast, not stored; the retry computes again
    assert_eq!(
        status_of(middleware.handle(&get("/_img/w:300/hero.jpg")).await),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_query_and_path_grammars_share_cache_entries() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "hero.jpg", b"jpeg-bytes");
    let transformer = Arc::new(CountingTransformer::new());
    let layer = layer_with(dir.path(), transformer.clone()).await;
    let middleware = layer.middleware();

    middleware.handle(&get("/_img/w:300,q:80/hero.jpg")).await;
    middleware.handle(&get("/_img/hero.jpg?w=300&q=80")).await;

    // Same normalized key, one computation
    assert_eq!(transformer.calls(), 1);
    assert_eq!(layer.cache_stats().hits, 1);
}
