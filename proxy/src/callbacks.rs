//! Hooks that let the embedding application shape policy inputs and guard
//! access to user bindings.
use crate::errors::{BoxError, ProxyError};
use crate::session::SessionSource;
use axum::http::StatusCode;
use axum::http::request::Parts;
use policy_client::User;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Rewrites the input of a query before it is sent to the service. For batch
/// queries it is called once with an empty path for the shared input, then
/// once per item.
pub trait OnModifyInput: Send + Sync {
    fn modify(&self, parts: &Parts, path: &str, input: Value) -> Result<Value, BoxError>;
}

impl<F> OnModifyInput for F
where
    F: Fn(&Parts, &str, Value) -> Result<Value, BoxError> + Send + Sync,
{
    fn modify(&self, parts: &Parts, path: &str, input: Value) -> Result<Value, BoxError> {
        self(parts, path, input)
    }
}

/// Adds the caller's `tenant` and `subject` to object inputs, unless the
/// input already carries either key. A null input becomes an empty object
/// first. Other inputs pass through untouched.
pub struct InjectSession {
    sessions: Arc<dyn SessionSource>,
}

impl InjectSession {
    pub fn new(sessions: Arc<dyn SessionSource>) -> Self {
        InjectSession { sessions }
    }
}

impl OnModifyInput for InjectSession {
    fn modify(&self, parts: &Parts, _path: &str, input: Value) -> Result<Value, BoxError> {
        let session = self.sessions.session(parts)?;

        let mut input = match input {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        if let Value::Object(values) = &mut input {
            if !values.contains_key("tenant") && !values.contains_key("subject") {
                values.insert("tenant".into(), Value::String(session.tenant));
                values.insert("subject".into(), Value::String(session.subject));
            }
        }

        Ok(input)
    }
}

/// One page of users to list bindings for.
#[derive(Debug, Default, PartialEq)]
pub struct UsersPage {
    pub users: Vec<User>,
    /// Returned to the browser as-is under `page`.
    pub page: Option<Value>,
}

/// Resolves the raw `page` query parameter into the users to list.
pub trait GetUsers: Send + Sync {
    fn users(&self, parts: &Parts, page: &str) -> Result<UsersPage, ProxyError>;
}

/// Runs before a single user's binding is read, written or deleted.
pub trait OnBeforeAccess: Send + Sync {
    fn before_access(&self, user: &User) -> Result<(), ProxyError>;
}

/// Pages over and guards a fixed user list.
pub struct ArrayUsers {
    users: Vec<User>,
    ids: HashSet<String>,
    page_size: usize,
}

impl ArrayUsers {
    pub fn new(users: Vec<User>, page_size: usize) -> Self {
        let ids = users.iter().map(|u| u.id.clone()).collect();
        ArrayUsers {
            users,
            ids,
            page_size,
        }
    }
}

impl GetUsers for ArrayUsers {
    fn users(&self, _parts: &Parts, page: &str) -> Result<UsersPage, ProxyError> {
        let index: i64 = serde_json::from_str(page)
            .map_err(|_| ProxyError::InvalidQuery(format!("invalid page: {page}")))?;
        let index = usize::try_from(index).unwrap_or(0);

        let start = index.saturating_mul(self.page_size).min(self.users.len());
        let end = start.saturating_add(self.page_size).min(self.users.len());
        let total = self.users.len().checked_div(self.page_size).unwrap_or(0);

        Ok(UsersPage {
            users: self.users[start..end].to_vec(),
            page: Some(serde_json::json!({ "index": index, "total": total })),
        })
    }
}

impl OnBeforeAccess for ArrayUsers {
    fn before_access(&self, user: &User) -> Result<(), ProxyError> {
        if self.ids.contains(&user.id) {
            Ok(())
        } else {
            Err(ProxyError::rejected(
                StatusCode::BAD_REQUEST,
                "user does not exist",
            ))
        }
    }
}
