use crate::errors::ProxyError;
use axum::body::to_bytes;
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

const APPLICATION_JSON: &str = "application/json";

// Bodies are small policy inputs and role lists.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Splits the request and decodes its body. The body must be declared as
/// `application/json`.
pub(crate) async fn json_body<T: DeserializeOwned>(request: Request) -> Result<(Parts, T), ProxyError> {
    let (parts, body) = request.into_parts();

    let is_json = parts.headers.get_all(CONTENT_TYPE).iter().any(|value| {
        value
            .to_str()
            .ok()
            .and_then(|v| v.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(APPLICATION_JSON))
    });
    if !is_json {
        return Err(ProxyError::UnsupportedMediaType);
    }

    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ProxyError::InvalidBody)?;
    let value = serde_json::from_slice(&bytes).map_err(|_| ProxyError::InvalidBody)?;

    Ok((parts, value))
}

/// The single value of query parameter `name`.
pub(crate) fn single_query_param(parts: &Parts, name: &str) -> Result<String, ProxyError> {
    let query = parts.uri.query().unwrap_or_default();
    let mut values = url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned());

    match (values.next(), values.next()) {
        (Some(value), None) => Ok(value),
        (None, _) => Err(ProxyError::InvalidQuery(format!(
            "missing query parameter: {name}"
        ))),
        (Some(_), Some(_)) => Err(ProxyError::InvalidQuery(format!(
            "query parameter {name} should have exactly one value"
        ))),
    }
}
