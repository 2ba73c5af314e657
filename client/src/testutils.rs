//! In-process stand-ins for the policy service, used by tests across the workspace.
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Value,
}

pub struct MockResponse {
    status: StatusCode,
    content_type: &'static str,
    body: String,
}

impl MockResponse {
    pub fn json(status: StatusCode, body: Value) -> Self {
        MockResponse {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(StatusCode::OK, body)
    }

    pub fn text(status: StatusCode, body: &str) -> Self {
        MockResponse {
            status,
            content_type: "text/html",
            body: body.to_string(),
        }
    }
}

type MockHandler = Arc<dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync>;

#[derive(Clone)]
struct MockState {
    handler: MockHandler,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// HTTP server on an ephemeral local port that records every request and
/// answers with whatever the handler returns. Stops when dropped.
pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let addr = listener.local_addr().expect("local addr");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            handler: Arc::new(handler),
            requests: requests.clone(),
        };
        let app = Router::new().fallback(record_and_respond).with_state(state);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Mock server stopped: {e}");
            }
        });

        MockServer {
            addr,
            requests,
            handle,
        }
    }

    /// Answers `GET /gateways` with the given gateway URLs.
    pub async fn directory(gateway_urls: Vec<String>) -> Self {
        Self::start(move |_request| {
            let gateways: Vec<Value> = gateway_urls
                .iter()
                .map(|url| serde_json::json!({"gateway_url": url}))
                .collect();
            MockResponse::ok(serde_json::json!({ "result": gateways }))
        })
        .await
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn record_and_respond(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: axum::http::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };

    let request = RecordedRequest {
        method,
        path: uri.path().to_string(),
        authorization: header(AUTHORIZATION),
        content_type: header(CONTENT_TYPE),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    };

    let response = (state.handler)(&request);
    state.requests.lock().push(request);

    (
        response.status,
        [(CONTENT_TYPE, response.content_type)],
        response.body,
    )
        .into_response()
}
