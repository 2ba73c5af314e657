//! One HTTP round trip against the policy service.
//!
//! The transport knows nothing about gateways or retries. It attaches the
//! bearer token, encodes the optional JSON body and turns non-success
//! statuses into [`HttpError`]s so the executor can classify them.
use crate::errors::{ClientError, ErrorResponse, HttpError, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const APPLICATION_JSON: &str = "application/json";

#[derive(Clone, Debug)]
pub struct Transport {
    client: reqwest::Client,
    token: String,
}

impl Transport {
    pub fn new(token: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Transport {
            client: builder.build()?,
            token: token.into(),
        })
    }

    /// Performs the request and returns the raw body of a 2xx response.
    pub async fn execute(&self, method: Method, url: Url, body: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .bearer_auth(&self.token);

        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, APPLICATION_JSON).body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            // Proxies in front of a gateway often answer 502/503 with an HTML
            // page, so an undecodable error body still yields an HttpError.
            let details = serde_json::from_slice::<ErrorResponse>(&bytes).ok();
            tracing::debug!(%method, %url, status = status.as_u16(), "Request failed");
            return Err(HttpError::new(status, details).into());
        }

        Ok(bytes.to_vec())
    }

    /// Performs the request and decodes the 2xx body as JSON.
    pub async fn execute_json<T>(&self, method: Method, url: Url, body: Option<Vec<u8>>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let bytes = self.execute(method, url, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

pub fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(body)?)
}

/// Joins `segment` onto `base`, tolerating slashes on either side.
pub fn join_url(base: &str, segment: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    );

    Url::parse(&joined).map_err(|e| ClientError::InvalidUrl(format!("{joined}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MockResponse, MockServer};
    use http::StatusCode;

    #[test]
    fn test_join_url() {
        let url = join_url("http://gateway.local:8181/", "/data/rbac/roles").unwrap();
        assert_eq!(url.as_str(), "http://gateway.local:8181/data/rbac/roles");

        let url = join_url("http://gateway.local", "data_batch").unwrap();
        assert_eq!(url.as_str(), "http://gateway.local/data_batch");

        assert!(matches!(
            join_url("not a url", "data"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_error_body_decoding() {
        let server = MockServer::start(|_request| {
            MockResponse::json(
                StatusCode::FORBIDDEN,
                serde_json::json!({"code": "forbidden", "message": "nope"}),
            )
        })
        .await;
        let transport = Transport::new("secret", None).unwrap();

        let err = transport
            .execute(Method::GET, join_url(&server.url(), "data/x").unwrap(), None)
            .await
            .unwrap_err();

        let http = err.as_http().expect("http error");
        assert_eq!(http.status(), StatusCode::FORBIDDEN);
        assert_eq!(http.details().unwrap().code, "forbidden");

        let recorded = server.requests();
        assert_eq!(recorded[0].authorization.as_deref(), Some("Bearer secret"));
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let server = MockServer::start(|_request| {
            MockResponse::text(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>")
        })
        .await;
        let transport = Transport::new("secret", None).unwrap();

        let err = transport
            .execute(Method::GET, join_url(&server.url(), "gateways").unwrap(), None)
            .await
            .unwrap_err();

        let http = err.as_http().expect("http error");
        assert!(http.is_bad_gateway());
        assert!(http.details().is_none());
    }

    #[tokio::test]
    async fn test_json_body_is_sent() {
        let server = MockServer::start(|request| {
            MockResponse::json(StatusCode::OK, serde_json::json!({"result": request.body.clone()}))
        })
        .await;
        let transport = Transport::new("secret", None).unwrap();

        let body = encode(&serde_json::json!({"input": {"a": 1}})).unwrap();
        let value: serde_json::Value = transport
            .execute_json(Method::POST, join_url(&server.url(), "data/p").unwrap(), Some(body))
            .await
            .unwrap();

        assert_eq!(value["result"]["input"]["a"], 1);
        let recorded = server.requests();
        assert_eq!(recorded[0].content_type.as_deref(), Some("application/json"));
        assert_eq!(recorded[0].method, Method::POST);
        assert_eq!(recorded[0].path, "/data/p");
    }
}
