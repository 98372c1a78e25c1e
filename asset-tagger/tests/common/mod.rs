#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ASSET_PATH: &str = "/content/dam/brand/shoes/runner.jpg";
pub const TOKEN: &str = "test-token";

/// Canned reply for one request.
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    /// Send headers and the first half of the body, then never finish.
    pub stall_body: bool,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Vec::new(),
            stall_body: false,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            body: body.as_bytes().to_vec(),
            ..Self::status(status)
        }
    }

    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
            stall_body: false,
        }
    }

    pub fn image(content_type: &'static str, body: &[u8]) -> Self {
        Self {
            status: 200,
            content_type,
            body: body.to_vec(),
            stall_body: false,
        }
    }

    pub fn stalled(content_type: &'static str, body: &[u8]) -> Self {
        Self {
            stall_body: true,
            ..Self::image(content_type, body)
        }
    }
}

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: String,
}

/// Per-path reply queues. The last reply of a queue repeats; unknown paths get 404.
#[derive(Default)]
pub struct Script {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<Recorded>>,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(self: &Arc<Self>, path: &str, replies: Vec<Reply>) -> Arc<Self> {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), replies.into_iter().collect());
        self.clone()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    fn next_reply(&self, path: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Reply::status(404)),
            None => Reply::status(404),
        }
    }
}

async fn dispatch(State(script): State<Arc<Script>>, method: Method, uri: Uri, headers: HeaderMap, body: String) -> Response {
    let path = uri.path().to_string();
    script.requests.lock().unwrap().push(Recorded {
        method,
        path: path.clone(),
        headers,
        body,
    });

    let reply = script.next_reply(&path);
    let builder = Response::builder()
        .status(StatusCode::from_u16(reply.status).unwrap())
        .header("content-type", reply.content_type);

    if reply.stall_body {
        let half = Bytes::from(reply.body[..reply.body.len() / 2].to_vec());
        let stream = futures::stream::StreamExt::chain(
            futures::stream::iter(vec![Ok::<Bytes, std::io::Error>(half)]),
            futures::stream::pending(),
        );
        return builder
            .header("content-length", reply.body.len().to_string())
            .body(Body::from_stream(stream))
            .unwrap();
    }

    builder.body(Body::from(reply.body)).unwrap()
}

/// In-process HTTP server answering from a [`Script`].
pub struct StubServer {
    pub base_url: String,
    pub script: Arc<Script>,
    handle: tokio::task::JoinHandle<()>,
}

impl StubServer {
    pub async fn start(script: Arc<Script>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub server");
        let addr = listener.local_addr().expect("stub server address");
        let app = Router::new().fallback(dispatch).with_state(script.clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("stub server");
        });

        Self {
            base_url: format!("http://{}", addr),
            script,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn fast_delay() -> Duration {
    Duration::from_millis(5)
}
