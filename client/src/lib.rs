//! Client for a remote policy decision service.
//!
//! Requests are sent to one of the service's gateways. The gateways are
//! discovered lazily, and a request that hits an unhealthy gateway (502, 503
//! or 504) is retried on the next one.
pub mod batch;
pub mod client;
pub mod config;
pub mod errors;
pub mod executor;
pub mod gateway;
pub mod metrics_defs;
pub mod rbac;
pub mod session;
pub mod strategy;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testutils;

pub use batch::Query;
pub use client::Client;
pub use config::ClientConfig;
pub use errors::{ClientError, ErrorResponse, HttpError};
pub use rbac::{Rbac, RbacError, User, UserBinding};
pub use session::Session;
