// Layer lifecycle and negotiation flows over the public API

use std::collections::BTreeMap;
use std::sync::Arc;

use http::{header, Method, Request, StatusCode};
use tempfile::TempDir;

use kagami::config::{ProviderSettings, RawOptions};
use kagami::provider::PassthroughTransformer;
use kagami::{ImageLayer, Outcome};

use super::test_support::{layer_with, raw_options, write_image, CountingTransformer};

fn get(uri: &str) -> Request<()> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(())
        .unwrap()
}

fn response_of(outcome: Outcome) -> http::Response<bytes::Bytes> {
    match outcome {
        Outcome::Response(response) => response,
        Outcome::PassThrough => panic!("expected a response"),
    }
}

#[tokio::test]
async fn test_explicit_format_is_served_when_emittable() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "logo.png", b"png-bytes");
    let layer = layer_with(dir.path(), Arc::new(CountingTransformer::new())).await;

    let response = response_of(
        layer
            .middleware()
            .handle(&get("/_img/logo.png?f=webp"))
            .await,
    );

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/webp");
}

#[tokio::test]
async fn test_auto_format_follows_accept_header() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "logo.png", b"png-bytes");
    let layer = layer_with(dir.path(), Arc::new(CountingTransformer::new())).await;

    let req = Request::builder()
        .method(Method::GET)
        .uri("/_img/f:auto/logo.png")
        .header(header::ACCEPT, "image/avif,image/webp;q=0.8")
        .body(())
        .unwrap();
    let response = response_of(layer.middleware().handle(&req).await);

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/avif");
    assert_eq!(response.headers()[header::VARY], "Accept");
}

#[tokio::test]
async fn test_cdn_primary_provider_cannot_serve() {
    let raw = RawOptions {
        provider: Some("cloudinary".to_string()),
        providers: Some(BTreeMap::from([(
            "cloudinary".to_string(),
            ProviderSettings {
                base_url: Some("https://res.cloudinary.com/demo/image/upload".to_string()),
                ..Default::default()
            },
        )])),
        ..Default::default()
    };
    let layer = ImageLayer::initialize(
        &raw,
        &RawOptions::default(),
        Arc::new(PassthroughTransformer),
    )
    .await
    .unwrap();

    let runtime = layer.runtime_options();
    assert_eq!(runtime.provider, "cloudinary");
    assert!(!runtime.providers[0].can_transform);

    // URL-mapping providers have no serving path
    let response = response_of(layer.middleware().handle(&get("/_img/logo.png")).await);
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_published_yaml_flows_to_runtime_export() {
    let dir = TempDir::new().unwrap();
    let yaml = format!(
        r#"
provider: static
sizes: [320, 768]
presets:
  - name: thumbnail
    modifiers:
      w: 320
      q: 70
intersectOptions:
  rootMargin: 50px
static:
  dir: "{}"
"#,
        dir.path().display()
    );
    let raw: RawOptions = serde_yaml::from_str(&yaml).unwrap();

    let layer = ImageLayer::initialize(
        &raw,
        &RawOptions::default(),
        Arc::new(PassthroughTransformer),
    )
    .await
    .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&layer.runtime_options().to_json().unwrap()).unwrap();

    assert_eq!(json["provider"], "static");
    assert_eq!(json["sizes"], serde_json::json!([320, 768]));
    assert_eq!(json["presets"][0]["name"], "thumbnail");
    assert_eq!(json["presets"][0]["modifiers"]["w"], 320);
    assert_eq!(json["intersectOptions"]["rootMargin"], "50px");
}

#[tokio::test]
async fn test_host_defaults_yield_to_project_options() {
    let dir = TempDir::new().unwrap();
    let raw = raw_options(dir.path());
    let host = RawOptions {
        sizes: Some(vec![100, 200]),
        accept: Some(vec!["image/png".to_string()]),
        ..Default::default()
    };

    let layer = ImageLayer::initialize(&raw, &host, Arc::new(PassthroughTransformer))
        .await
        .unwrap();

    // Host values fill fields the project leaves unset
    assert_eq!(layer.options().sizes, vec![100, 200]);
    assert_eq!(layer.options().accept, vec!["image/png".to_string()]);
}

#[tokio::test]
async fn test_requests_by_provider_metric_counts_served_provider() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "logo.png", b"png-bytes");
    let layer = layer_with(dir.path(), Arc::new(PassthroughTransformer)).await;

    layer.middleware().handle(&get("/_img/logo.png")).await;
    layer.middleware().handle(&get("/_img/logo.png")).await;

    let text = layer.metrics_text();
    assert!(text.contains("kagami_requests_by_provider_total{provider=\"static\"} 2"));
}
