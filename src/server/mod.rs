//! Reference host server
//!
//! A small hyper host that mounts the serving middleware and exposes the
//! operational endpoints:
//!
//! - `/healthz` - liveness with uptime and version
//! - `/metrics` - Prometheus metrics export
//!
//! Everything else goes to the middleware; requests the middleware
//! passes through have no other route here and get a JSON 404. Embedding
//! hosts replace this module entirely and route pass-throughs to their
//! own handlers.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::layer::ImageLayer;
use crate::serve::Outcome;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[from] std::io::Error),
}

/// Response from a built-in endpoint handler. Generated separately from
/// the connection plumbing so the handlers stay testable.
#[derive(Debug, Clone)]
pub struct EndpointResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl EndpointResponse {
    pub fn json(status: u16, body: String) -> Self {
        Self {
            status,
            content_type: "application/json",
            body,
        }
    }

    /// Plain text response in the Prometheus exposition format
    pub fn prometheus(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/plain; version=0.0.4",
            body,
        }
    }
}

/// Liveness response with uptime and version
pub fn handle_health(start_time: Instant) -> EndpointResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    })
    .to_string();

    EndpointResponse::json(200, body)
}

pub fn handle_metrics(layer: &ImageLayer) -> EndpointResponse {
    EndpointResponse::prometheus(layer.metrics_text())
}

/// Bound listener plus the layer it serves
pub struct KagamiServer {
    layer: Arc<ImageLayer>,
    listener: TcpListener,
    local_addr: SocketAddr,
    start_time: Instant,
}

impl KagamiServer {
    /// Binds the listener and reports the bound address to the layer, so
    /// the runtime export carries the real port even when binding to
    /// port 0.
    pub async fn bind(addr: &str, layer: Arc<ImageLayer>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        layer.on_listener_bound(local_addr);

        Ok(Self {
            layer,
            listener,
            local_addr,
            start_time: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept loop. One spawned task per connection.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, "listening");

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let layer = Arc::clone(&self.layer);
            let start_time = self.start_time;

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service =
                    service_fn(move |req| route(Arc::clone(&layer), start_time, req));

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(peer = %peer, error = %err, "connection ended with error");
                }
            });
        }
    }
}

async fn route(
    layer: Arc<ImageLayer>,
    start_time: Instant,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/healthz") => into_response(handle_health(start_time)),
        (&Method::GET, "/metrics") => into_response(handle_metrics(&layer)),
        _ => match layer.middleware().handle(&req).await {
            Outcome::Response(response) => response.map(Full::new),
            Outcome::PassThrough => no_route_response(),
        },
    };

    Ok(response)
}

fn into_response(endpoint: EndpointResponse) -> Response<Full<Bytes>> {
    Response::builder()
        .status(endpoint.status)
        .header(header::CONTENT_TYPE, endpoint.content_type)
        .body(Full::new(Bytes::from(endpoint.body)))
        .unwrap_or_else(|_| {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}

fn no_route_response() -> Response<Full<Bytes>> {
    into_response(EndpointResponse::json(
        404,
        serde_json::json!({"error": "no route"}).to_string(),
    ))
}
