//! Request and response shapes of the `data_batch` endpoint.
use crate::errors::ErrorResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of queries the service accepts in one batch request.
pub const BATCH_LIMIT: usize = 20;

pub(crate) const BATCH_PATH: &str = "data_batch";

/// One query of a batch. `result` and `error` are filled in place by
/// [`Client::batch_query`](crate::client::Client::batch_query).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub path: String,
    pub input: Value,
    pub result: Value,
    pub error: Option<ErrorResponse>,
}

impl Query {
    pub fn new(path: impl Into<String>, input: Value) -> Self {
        Query {
            path: path.into(),
            input,
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
struct BatchItem<'a> {
    path: &'a str,
    input: &'a Value,
}

#[derive(Serialize)]
pub(crate) struct BatchRequest<'a, I: ?Sized> {
    items: Vec<BatchItem<'a>>,
    input: &'a I,
}

impl<'a, I: Serialize + ?Sized> BatchRequest<'a, I> {
    pub(crate) fn new(chunk: &'a [Query], input: &'a I) -> Self {
        BatchRequest {
            items: chunk
                .iter()
                .map(|query| BatchItem {
                    path: &query.path,
                    input: &query.input,
                })
                .collect(),
            input,
        }
    }
}

#[derive(Deserialize)]
struct BatchResultItem {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<ErrorResponse>,
}

#[derive(Deserialize)]
pub(crate) struct BatchResponse {
    #[serde(default)]
    result: Vec<BatchResultItem>,
}

impl BatchResponse {
    /// Writes each response item into the query at the same index. Items past
    /// the end of the chunk are ignored.
    pub(crate) fn apply(self, chunk: &mut [Query]) {
        for (query, item) in chunk.iter_mut().zip(self.result) {
            query.result = item.result;
            query.error = item.error;
        }
    }
}
