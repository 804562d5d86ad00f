// End-to-end tests over a live listener

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tempfile::TempDir;

use kagami::server::KagamiServer;
use kagami::ImageLayer;

use super::test_support::{layer_with, write_image, CountingTransformer};

type TestClient = Client<HttpConnector, Empty<Bytes>>;

fn client() -> TestClient {
    Client::builder(TokioExecutor::new()).build_http()
}

async fn start_server(dir: &TempDir) -> (SocketAddr, Arc<ImageLayer>) {
    let layer = Arc::new(layer_with(dir.path(), Arc::new(CountingTransformer::new())).await);
    let server = KagamiServer::bind("127.0.0.1:0", Arc::clone(&layer))
        .await
        .expect("bind failed");
    let addr = server.local_addr();
    tokio::spawn(server.run());
    (addr, layer)
}

fn uri(addr: SocketAddr, path_and_query: &str) -> Uri {
    format!("http://{}{}", addr, path_and_query).parse().unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let (addr, _layer) = start_server(&dir).await;

    let response = client().get(uri(addr, "/healthz")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "logo.png", b"png-bytes");
    let (addr, _layer) = start_server(&dir).await;

    client()
        .get(uri(addr, "/_img/logo.png"))
        .await
        .unwrap();
    let response = client().get(uri(addr, "/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; version=0.0.4"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("kagami_requests_total 1"));
}

#[tokio::test]
async fn test_serves_image_over_http() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "logo.png", b"png-bytes");
    let (addr, _layer) = start_server(&dir).await;

    let response = client()
        .get(uri(addr, "/_img/w:300/logo.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=31536000, immutable"
    );
    assert!(response.headers().contains_key(header::ETAG));
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), b"png-bytes");
}

#[tokio::test]
async fn test_conditional_request_over_http() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "logo.png", b"png-bytes");
    let (addr, _layer) = start_server(&dir).await;

    let first = client().get(uri(addr, "/_img/logo.png")).await.unwrap();
    let etag = first.headers()[header::ETAG].to_str().unwrap().to_string();

    let request = Request::builder()
        .method(Method::GET)
        .uri(uri(addr, "/_img/logo.png"))
        .header(header::IF_NONE_MATCH, &etag)
        .body(Empty::<Bytes>::new())
        .unwrap();
    let response = client().request(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_transform_error_maps_to_status_over_http() {
    let dir = TempDir::new().unwrap();
    let (addr, _layer) = start_server(&dir).await;

    let response = client()
        .get(uri(addr, "/_img/missing.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
}

#[tokio::test]
async fn test_unrouted_path_is_404() {
    let dir = TempDir::new().unwrap();
    let (addr, _layer) = start_server(&dir).await;

    let response = client().get(uri(addr, "/api/users")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "no route");
}

#[tokio::test]
async fn test_runtime_export_carries_bound_address() {
    let dir = TempDir::new().unwrap();
    let (addr, layer) = start_server(&dir).await;

    assert_eq!(
        layer.runtime_options().internal_url.as_deref(),
        Some(format!("http://{}", addr).as_str())
    );
}
