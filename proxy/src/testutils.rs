use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use policy_client::testutils::MockServer;
use policy_client::{Client, ClientConfig};
use serde_json::Value;
use tower::ServiceExt;

/// A client that sends everything to `gateway`, bypassing discovery.
pub fn client_for(gateway: &MockServer) -> Client {
    let config = ClientConfig {
        gateways: Some(vec![gateway.url().parse().expect("gateway url")]),
        ..ClientConfig::new("http://discovery.invalid".parse().expect("url"), "token")
    };
    Client::new(&config).expect("client")
}

/// Sends one request through the router. Bodies that are not JSON come back
/// as a JSON string.
pub async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("infallible");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");

    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}
