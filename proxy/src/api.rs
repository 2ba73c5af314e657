//! Browser facing routes for data, query, check and batch query.
use crate::callbacks::OnModifyInput;
use crate::errors::ProxyError;
use crate::extract::json_body;
use crate::track_metrics;
use axum::extract::{Path, Request, State};
use axum::http::request::Parts;
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use policy_client::{Client, Query};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    input: Value,
}

#[derive(Deserialize)]
struct BatchQueryItem {
    path: String,
    #[serde(default)]
    input: Value,
}

#[derive(Deserialize)]
struct BatchQueryRequest {
    #[serde(default)]
    items: Vec<BatchQueryItem>,
    #[serde(default)]
    input: Value,
}

#[derive(Serialize)]
struct BatchQueryResult {
    #[serde(skip_serializing_if = "Value::is_null")]
    result: Value,
}

#[derive(Serialize)]
struct BatchQueryResponse {
    result: Vec<BatchQueryResult>,
}

#[derive(Clone)]
pub struct ApiProxy {
    client: Client,
    on_modify_input: Option<Arc<dyn OnModifyInput>>,
}

impl ApiProxy {
    pub fn new(client: Client) -> Self {
        ApiProxy {
            client,
            on_modify_input: None,
        }
    }

    pub fn with_input_callback(mut self, callback: Arc<dyn OnModifyInput>) -> Self {
        self.on_modify_input = Some(callback);
        self
    }

    pub fn router(self) -> Router {
        Router::new()
            .route(
                "/data/{*path}",
                get(get_data).put(put_data).delete(delete_data),
            )
            .route("/query/{*path}", post(query))
            .route("/check/{*path}", post(check))
            .route("/batch_query", post(batch_query))
            .route_layer(middleware::from_fn(track_metrics))
            .with_state(self)
    }

    fn modify_input(&self, parts: &Parts, path: &str, input: Value) -> Result<Value, ProxyError> {
        match &self.on_modify_input {
            Some(callback) => callback
                .modify(parts, path, input)
                .map_err(ProxyError::Callback),
            None => Ok(input),
        }
    }
}

async fn get_data(
    State(proxy): State<ApiProxy>,
    Path(path): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    let result: Value = proxy.client.get_data(&path).await?;
    Ok(Json(json!({ "result": result })))
}

async fn put_data(
    State(proxy): State<ApiProxy>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Json<Value>, ProxyError> {
    let (_parts, data): (_, Value) = json_body(request).await?;
    proxy.client.put_data(&path, &data).await?;
    Ok(Json(json!({})))
}

async fn delete_data(
    State(proxy): State<ApiProxy>,
    Path(path): Path<String>,
) -> Result<Json<Value>, ProxyError> {
    proxy.client.delete_data(&path).await?;
    Ok(Json(json!({})))
}

async fn query(
    State(proxy): State<ApiProxy>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Json<Value>, ProxyError> {
    let (parts, body): (_, QueryRequest) = json_body(request).await?;
    let input = proxy.modify_input(&parts, &path, body.input)?;

    let result: Value = proxy.client.query(&path, &input).await?;
    Ok(Json(json!({ "result": result })))
}

async fn check(
    State(proxy): State<ApiProxy>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Json<Value>, ProxyError> {
    let (parts, body): (_, QueryRequest) = json_body(request).await?;
    let input = proxy.modify_input(&parts, &path, body.input)?;

    let allowed = proxy.client.check(&path, &input).await?;
    Ok(Json(json!({ "result": allowed })))
}

async fn batch_query(
    State(proxy): State<ApiProxy>,
    request: Request,
) -> Result<Json<BatchQueryResponse>, ProxyError> {
    let (parts, body): (_, BatchQueryRequest) = json_body(request).await?;

    let input = proxy.modify_input(&parts, "", body.input)?;
    let mut queries = body
        .items
        .into_iter()
        .map(|item| {
            let input = proxy.modify_input(&parts, &item.path, item.input)?;
            Ok(Query::new(item.path, input))
        })
        .collect::<Result<Vec<_>, ProxyError>>()?;

    proxy.client.batch_query(&mut queries, &input).await?;

    Ok(Json(BatchQueryResponse {
        result: queries
            .into_iter()
            .map(|query| BatchQueryResult {
                result: query.result,
            })
            .collect(),
    }))
}
