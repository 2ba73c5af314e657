use crate::metrics_defs::ERROR_RESPONSES;
use crate::session::SessionError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use policy_client::{ClientError, RbacError};
use shared::counter;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Rbac(#[from] RbacError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("input callback failed: {0}")]
    Callback(BoxError),

    #[error("unsupported media type")]
    UnsupportedMediaType,

    #[error("could not read request body")]
    InvalidBody,

    #[error("{0}")]
    InvalidQuery(String),

    /// Raised by access guards, answered with the guard's status and message.
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl ProxyError {
    pub fn rejected(status: StatusCode, message: impl Into<String>) -> Self {
        ProxyError::Rejected {
            status,
            message: message.into(),
        }
    }
}

// Service errors with a structured body are passed on as they are. Anything
// else from the service is opaque to the browser.
fn forward(err: &ClientError) -> Response {
    match err.as_http() {
        Some(http) => match http.details() {
            Some(details) => (http.status(), Json(details.clone())).into_response(),
            None => internal_server_error(),
        },
        None => internal_server_error(),
    }
}

fn internal_server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let response = match &self {
            ProxyError::Client(e) | ProxyError::Rbac(RbacError::Client(e)) => forward(e),
            ProxyError::Rbac(RbacError::PermissionDenied) => {
                (StatusCode::FORBIDDEN, "forbidden").into_response()
            }
            ProxyError::Rbac(e @ RbacError::InvalidSegment(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
            ProxyError::Session(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            ProxyError::Callback(_) => internal_server_error(),
            ProxyError::UnsupportedMediaType => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.to_string()).into_response()
            }
            ProxyError::InvalidBody | ProxyError::InvalidQuery(_) => {
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            ProxyError::Rejected { status, message } => (*status, message.clone()).into_response(),
        };

        let status = response.status();
        counter!(ERROR_RESPONSES, "status" => status.as_u16().to_string()).increment(1);
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        response
    }
}
