#![allow(dead_code)]

use axum::body::{Body, Bytes};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use http::{HeaderMap, Method, Request};
use pushrelay::config::StreamSettings;
use pushrelay::gateway::dispatcher::Dispatcher;
use pushrelay::routes;
use pushrelay::state::AppState;
use std::sync::Arc;
use std::time::Duration;

/// Test server that owns a fresh dispatcher.
/// Each instance is isolated, so tests can run in parallel.
pub struct TestServer {
    pub state: AppState,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_origins(Vec::new())
    }

    /// Server with a CORS allow-list.
    pub fn with_origins(origins: Vec<String>) -> Self {
        let settings = StreamSettings {
            poll_interval: Duration::from_millis(10),
            ..StreamSettings::default()
        };
        let dispatcher = Arc::new(Dispatcher::new(settings, 10));
        Self {
            state: AppState::new(dispatcher, origins),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.state.dispatcher
    }

    /// Returns an Axum Router wired to this server's state for `oneshot()` calls.
    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    /// Binds a TCP listener on port 0, spawns the server, and returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://127.0.0.1:{}", addr.port())
    }
}

// ---------------------------------------------------------------------------
// Request builder helpers
// ---------------------------------------------------------------------------

/// Build a request with a JSON body.
pub fn json_request(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Parse a response body into a `serde_json::Value`.
pub async fn parse_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// SSE client
// ---------------------------------------------------------------------------

/// Minimal reader for `data:` frames on a live event stream.
pub struct SseReader {
    chunks: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: String,
}

impl SseReader {
    pub async fn connect(base_url: &str, recipient_id: &str) -> (HeaderMap, Self) {
        let response = reqwest::get(format!("{base_url}/sse/{recipient_id}"))
            .await
            .unwrap();
        assert!(response.status().is_success());
        let headers = response.headers().clone();
        let reader = Self {
            chunks: response.bytes_stream().boxed(),
            buffer: String::new(),
        };
        (headers, reader)
    }

    /// Next JSON event, or `None` if nothing arrives within `wait`.
    pub async fn next_within(&mut self, wait: Duration) -> Option<serde_json::Value> {
        tokio::time::timeout(wait, self.next_event()).await.ok().flatten()
    }

    pub async fn next(&mut self) -> serde_json::Value {
        self.next_within(Duration::from_secs(5))
            .await
            .expect("no event within 5s")
    }

    async fn next_event(&mut self) -> Option<serde_json::Value> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                let data: Vec<&str> = block
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect();
                if data.is_empty() {
                    continue;
                }
                return Some(serde_json::from_str(&data.join("\n")).unwrap());
            }
            let chunk = self.chunks.next().await?.ok()?;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}

pub async fn test_app() -> axum::Router {
    TestServer::new().router()
}
