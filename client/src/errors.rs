use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Structured error body returned by the policy service.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// A request that reached the service and came back with a non-success status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpError {
    status: StatusCode,
    details: Option<ErrorResponse>,
}

impl HttpError {
    pub fn new(status: StatusCode, details: Option<ErrorResponse>) -> Self {
        HttpError { status, details }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn details(&self) -> Option<&ErrorResponse> {
        self.details.as_ref()
    }

    /// 502, 503 and 504 mean the gateway itself is unhealthy, so another
    /// gateway may still serve the request.
    pub fn is_bad_gateway(&self) -> bool {
        matches!(
            self.status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        )
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request failed with code {}", self.status.as_u16())?;

        if let Some(details) = &self.details {
            if !details.code.is_empty() {
                write!(f, " - code: {}", details.code)?;
            }
            if !details.message.is_empty() {
                write!(f, " - reason: {}", details.message)?;
            }
            if !details.errors.is_empty() {
                write!(f, " - details: {}", details.errors.join(" - "))?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HttpError {}

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Http(#[from] HttpError),

    #[error("no gateways")]
    NoGateways,

    #[error("cannot initialize a strategy with an empty gateway list")]
    EmptyGatewayList,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            ClientError::Http(e) => Some(e),
            _ => None,
        }
    }

    /// True if this is an HTTP error with exactly the given status.
    pub fn is_status(&self, status: StatusCode) -> bool {
        self.as_http().is_some_and(|e| e.status() == status)
    }
}
