//! HTTP routes that re-expose the policy service to browser facing
//! applications, plus the callbacks that shape those requests.
pub mod api;
pub mod callbacks;
pub mod errors;
mod extract;
pub mod metrics_defs;
pub mod rbac;
pub mod session;

#[cfg(test)]
mod testutils;

pub use api::ApiProxy;
pub use errors::ProxyError;
pub use rbac::RbacProxy;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT};
use shared::{gauge, histogram};
use std::time::Instant;

pub(crate) async fn track_metrics(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unknown".into());

    let start = Instant::now();
    gauge!(REQUESTS_INFLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(REQUESTS_INFLIGHT).decrement(1.0);

    histogram!(
        REQUEST_DURATION,
        "route" => route,
        "status" => response.status().as_u16().to_string()
    )
    .record(start.elapsed().as_secs_f64());

    response
}
