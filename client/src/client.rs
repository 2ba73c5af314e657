//! Data plane operations of the policy service.
//!
//! Every operation is a closure over the gateway base URL handed to the
//! [`Executor`], so all of them share discovery and failover.
use crate::batch::{BATCH_LIMIT, BATCH_PATH, BatchRequest, BatchResponse, Query};
use crate::config::ClientConfig;
use crate::errors::Result;
use crate::executor::Executor;
use crate::gateway::{Gateway, GatewayDirectory, HttpGatewayDirectory, StaticGatewayDirectory};
use crate::metrics_defs::BATCH_CHUNKS;
use crate::strategy::StrategyType;
use crate::transport::{Transport, encode, join_url};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::counter;
use std::sync::Arc;

#[derive(Deserialize)]
struct ResultEnvelope {
    #[serde(default)]
    result: Value,
}

#[derive(Serialize)]
struct QueryRequest<'a, I: ?Sized> {
    input: &'a I,
}

fn data_path(path: &str) -> String {
    format!("data/{}", path.trim_start_matches('/'))
}

// A missing `result` is decoded as null into the target type.
fn decode_result<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let envelope: ResultEnvelope = serde_json::from_slice(bytes)?;
    Ok(serde_json::from_value(envelope.result)?)
}

struct Inner {
    transport: Transport,
    executor: Executor,
}

/// Cheap to clone; clones share the gateway cursor.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Builds a client that discovers gateways from `config.url`, or uses the
    /// configured static gateway list. Nothing is fetched until the first
    /// operation.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let transport = Transport::new(config.token.clone(), config.timeout())?;

        let directory: Arc<dyn GatewayDirectory> = match &config.gateways {
            Some(urls) => Arc::new(StaticGatewayDirectory::new(
                urls.iter()
                    .map(|url| Gateway::new(url.as_str().trim_end_matches('/')))
                    .collect(),
            )),
            None => Arc::new(HttpGatewayDirectory::new(
                transport.clone(),
                config.url.as_str(),
            )),
        };

        Ok(Self::with_directory(
            transport,
            directory,
            config.discovery_strategy,
            config.max_retries,
        ))
    }

    pub fn with_directory(
        transport: Transport,
        directory: Arc<dyn GatewayDirectory>,
        strategy_type: StrategyType,
        max_retries: u32,
    ) -> Self {
        Client {
            inner: Arc::new(Inner {
                transport,
                executor: Executor::new(directory, strategy_type, max_retries),
            }),
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    /// True once gateways have been discovered.
    pub fn is_ready(&self) -> bool {
        self.inner.executor.is_initialized()
    }

    pub async fn discover(&self) -> Result<()> {
        self.inner.executor.initialize().await
    }

    pub async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let bytes = self.send(Method::GET, &data_path(path), None).await?;
        decode_result(&bytes)
    }

    pub async fn put_data<B: Serialize + ?Sized>(&self, path: &str, data: &B) -> Result<()> {
        let body = encode(data)?;
        self.send(Method::PUT, &data_path(path), Some(body)).await?;
        Ok(())
    }

    pub async fn delete_data(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, &data_path(path), None).await?;
        Ok(())
    }

    pub async fn query<I, T>(&self, path: &str, input: &I) -> Result<T>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = encode(&QueryRequest { input })?;
        let bytes = self.send(Method::POST, &data_path(path), Some(body)).await?;
        decode_result(&bytes)
    }

    /// Evaluates the policy at `path`. Only a literal `true` result allows.
    pub async fn check<I: Serialize + ?Sized>(&self, path: &str, input: &I) -> Result<bool> {
        let result: Value = self.query(path, input).await?;
        Ok(result == Value::Bool(true))
    }

    /// Evaluates `queries` in chunks of [`BATCH_LIMIT`], each chunk being one
    /// request with its own failover. Results are written into `queries` in
    /// order. If a chunk fails, the chunks before it keep their results.
    pub async fn batch_query<I: Serialize + ?Sized>(
        &self,
        queries: &mut [Query],
        input: &I,
    ) -> Result<()> {
        for chunk in queries.chunks_mut(BATCH_LIMIT) {
            let body = encode(&BatchRequest::new(chunk, input))?;
            let bytes = self.send(Method::POST, BATCH_PATH, Some(body)).await?;

            let response: BatchResponse = serde_json::from_slice(&bytes)?;
            response.apply(chunk);
            counter!(BATCH_CHUNKS).increment(1);
        }

        Ok(())
    }

    async fn send(&self, method: Method, segment: &str, body: Option<Vec<u8>>) -> Result<Vec<u8>> {
        let transport = &self.inner.transport;

        self.inner
            .executor
            .execute(|gateway| {
                let method = method.clone();
                let body = body.clone();
                async move {
                    let url = join_url(&gateway, segment)?;
                    transport.execute(method, url, body).await
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ClientError;
    use crate::testutils::{MockResponse, MockServer};
    use http::StatusCode;
    use serde_json::json;

    fn config(gateways: &[&MockServer]) -> ClientConfig {
        ClientConfig {
            gateways: Some(gateways.iter().map(|g| g.url().parse().unwrap()).collect()),
            ..ClientConfig::new("http://unused.local".parse().unwrap(), "secret")
        }
    }

    #[tokio::test]
    async fn test_get_data() {
        let gateway = MockServer::start(|_request| {
            MockResponse::ok(json!({"result": {"roles": ["admin"]}}))
        })
        .await;
        let client = Client::new(&config(&[&gateway])).unwrap();

        let data: Value = client.get_data("rbac/user_bindings/acme").await.unwrap();
        assert_eq!(data, json!({"roles": ["admin"]}));

        let requests = gateway.requests();
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].path, "/data/rbac/user_bindings/acme");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer secret"));
        assert_eq!(requests[0].content_type, None);
    }

    #[tokio::test]
    async fn test_missing_result_is_null() {
        let gateway = MockServer::start(|_request| MockResponse::ok(json!({}))).await;
        let client = Client::new(&config(&[&gateway])).unwrap();

        let data: Option<Vec<String>> = client.get_data("missing").await.unwrap();
        assert_eq!(data, None);

        let data: Value = client.query("missing", &json!({})).await.unwrap();
        assert_eq!(data, Value::Null);
    }

    #[tokio::test]
    async fn test_put_and_delete_data() {
        let gateway = MockServer::start(|_request| MockResponse::ok(json!({}))).await;
        let client = Client::new(&config(&[&gateway])).unwrap();

        client
            .put_data("rbac/user_bindings/acme/alice", &vec!["viewer"])
            .await
            .unwrap();
        client
            .delete_data("rbac/user_bindings/acme/alice")
            .await
            .unwrap();

        let requests = gateway.requests();
        assert_eq!(requests[0].method, Method::PUT);
        assert_eq!(requests[0].path, "/data/rbac/user_bindings/acme/alice");
        assert_eq!(requests[0].content_type.as_deref(), Some("application/json"));
        assert_eq!(requests[0].body, json!(["viewer"]));
        assert_eq!(requests[1].method, Method::DELETE);
        assert_eq!(requests[1].path, "/data/rbac/user_bindings/acme/alice");
    }

    #[tokio::test]
    async fn test_query_sends_input() {
        let gateway = MockServer::start(|request| {
            MockResponse::ok(json!({"result": request.body["input"]["n"].as_i64().unwrap() * 2}))
        })
        .await;
        let client = Client::new(&config(&[&gateway])).unwrap();

        let doubled: i64 = client.query("/math/double", &json!({"n": 21})).await.unwrap();
        assert_eq!(doubled, 42);

        let requests = gateway.requests();
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].path, "/data/math/double");
        assert_eq!(requests[0].body, json!({"input": {"n": 21}}));
    }

    #[tokio::test]
    async fn test_check_requires_literal_true() {
        let gateway = MockServer::start(|request| {
            let result = match request.path.as_str() {
                "/data/allow" => json!(true),
                "/data/string" => json!("true"),
                "/data/number" => json!(1),
                _ => json!(false),
            };
            MockResponse::ok(json!({ "result": result }))
        })
        .await;
        let client = Client::new(&config(&[&gateway])).unwrap();

        assert!(client.check("allow", &Value::Null).await.unwrap());
        for path in ["string", "number", "deny"] {
            assert!(!client.check(path, &Value::Null).await.unwrap(), "{path}");
        }
    }

    #[tokio::test]
    async fn test_application_error_is_not_retried() {
        let gateway = MockServer::start(|_request| {
            MockResponse::json(
                StatusCode::NOT_FOUND,
                json!({"code": "resource_not_found", "message": "no such document"}),
            )
        })
        .await;
        let client = Client::new(&config(&[&gateway])).unwrap();

        let err = client.get_data::<Value>("nope").await.unwrap_err();
        assert!(err.is_status(StatusCode::NOT_FOUND));
        assert_eq!(
            err.to_string(),
            "request failed with code 404 - code: resource_not_found - reason: no such document"
        );
        assert_eq!(gateway.request_count(), 1);
    }

    #[tokio::test]
    async fn test_failover_between_gateways() {
        let unhealthy =
            MockServer::start(|_request| MockResponse::text(StatusCode::BAD_GATEWAY, "down")).await;
        let healthy = MockServer::start(|_request| MockResponse::ok(json!({"result": 7}))).await;
        let client = Client::new(&config(&[&unhealthy, &healthy])).unwrap();

        let value: i64 = client.get_data("x").await.unwrap();
        assert_eq!(value, 7);

        // The cursor stays on the healthy gateway
        let value: i64 = client.get_data("x").await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(unhealthy.request_count(), 1);
        assert_eq!(healthy.request_count(), 2);
    }

    #[tokio::test]
    async fn test_connection_error_is_not_failed_over() {
        // Nothing listens on a port whose listener was dropped
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let unreachable = format!("http://{}", closed.local_addr().unwrap());
        drop(closed);

        let healthy = MockServer::start(|_request| MockResponse::ok(json!({"result": 7}))).await;
        let config = ClientConfig {
            gateways: Some(vec![
                unreachable.parse().unwrap(),
                healthy.url().parse().unwrap(),
            ]),
            ..ClientConfig::new("http://unused.local".parse().unwrap(), "secret")
        };
        let client = Client::new(&config).unwrap();
        client.discover().await.unwrap();
        let before = client.executor().current_gateway().unwrap();

        let err = client.get_data::<i64>("x").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)), "{err:?}");
        assert_eq!(healthy.request_count(), 0);
        assert_eq!(client.executor().current_gateway(), Some(before));
    }

    #[tokio::test]
    async fn test_timeout_is_not_failed_over() {
        // Accepts connections and never answers
        let stalled = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stalled_url = format!("http://{}", stalled.local_addr().unwrap());
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = stalled.accept().await {
                open.push(socket);
            }
        });

        let healthy = MockServer::start(|_request| MockResponse::ok(json!({"result": 7}))).await;
        let config = ClientConfig {
            gateways: Some(vec![
                stalled_url.parse().unwrap(),
                healthy.url().parse().unwrap(),
            ]),
            timeout_secs: Some(1),
            ..ClientConfig::new("http://unused.local".parse().unwrap(), "secret")
        };
        let client = Client::new(&config).unwrap();

        let err = client.get_data::<i64>("x").await.unwrap_err();
        match &err {
            ClientError::Transport(e) => assert!(e.is_timeout(), "{e:?}"),
            other => panic!("expected a transport error, got {other:?}"),
        }
        assert_eq!(healthy.request_count(), 0);
        assert_eq!(
            client.executor().current_gateway().map(|g| g.url),
            Some(stalled_url)
        );
    }

    #[tokio::test]
    async fn test_discovery_and_readiness() {
        let gateway = MockServer::start(|_request| MockResponse::ok(json!({"result": 1}))).await;
        let directory = MockServer::directory(vec![gateway.url()]).await;
        let client = Client::new(&ClientConfig::new(directory.url().parse().unwrap(), "secret"))
            .unwrap();

        assert!(!client.is_ready());
        let _: i64 = client.get_data("x").await.unwrap();
        assert!(client.is_ready());

        let clone = client.clone();
        let _: i64 = clone.get_data("x").await.unwrap();
        assert_eq!(directory.request_count(), 1);
        assert_eq!(gateway.request_count(), 2);
    }

    #[tokio::test]
    async fn test_batch_query_chunks_in_order() {
        let gateway = MockServer::start(|request| {
            let results: Vec<Value> = request.body["items"]
                .as_array()
                .unwrap()
                .iter()
                .map(|item| json!({"result": item["path"]}))
                .collect();
            MockResponse::ok(json!({ "result": results }))
        })
        .await;
        let client = Client::new(&config(&[&gateway])).unwrap();

        let mut queries: Vec<Query> = (0..45)
            .map(|i| Query::new(format!("policy/{i}"), json!({"i": i})))
            .collect();
        client
            .batch_query(&mut queries, &json!({"tenant": "acme"}))
            .await
            .unwrap();

        for (i, query) in queries.iter().enumerate() {
            assert_eq!(query.result, json!(format!("policy/{i}")));
            assert!(query.error.is_none());
        }

        let requests = gateway.requests();
        let sizes: Vec<usize> = requests
            .iter()
            .map(|r| r.body["items"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        for request in &requests {
            assert_eq!(request.path, "/data_batch");
            assert_eq!(request.body["input"], json!({"tenant": "acme"}));
        }
        assert_eq!(requests[1].body["items"][0]["path"], "policy/20");
    }

    #[tokio::test]
    async fn test_batch_query_failure_keeps_earlier_chunks() {
        let gateway = MockServer::start(|request| {
            let items = request.body["items"].as_array().unwrap();
            if items[0]["path"] == "policy/20" {
                return MockResponse::json(
                    StatusCode::BAD_REQUEST,
                    json!({"code": "invalid_parameter", "message": "bad batch"}),
                );
            }
            let results: Vec<Value> = items.iter().map(|_| json!({"result": true})).collect();
            MockResponse::ok(json!({ "result": results }))
        })
        .await;
        let client = Client::new(&config(&[&gateway])).unwrap();

        let mut queries: Vec<Query> = (0..30)
            .map(|i| Query::new(format!("policy/{i}"), Value::Null))
            .collect();
        let err = client
            .batch_query(&mut queries, &Value::Null)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Http(_)));
        assert!(queries[..20].iter().all(|q| q.result == json!(true)));
        assert!(queries[20..].iter().all(|q| q.result == Value::Null));
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let gateway = MockServer::start(|_request| MockResponse::ok(json!({"result": []}))).await;
        let client = Client::new(&config(&[&gateway])).unwrap();

        client.batch_query(&mut [], &Value::Null).await.unwrap();
        assert_eq!(gateway.request_count(), 0);
    }
}
