//! Browser facing routes for managing role bindings.
use crate::callbacks::{ArrayUsers, GetUsers, OnBeforeAccess};
use crate::errors::ProxyError;
use crate::extract::{json_body, single_query_param};
use crate::session::SessionSource;
use crate::track_metrics;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::routing::get;
use axum::{Json, Router, middleware};
use policy_client::{Rbac, RbacError, Session, User, UserBinding};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Serialize)]
struct BindingsResponse {
    result: Vec<UserBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<Value>,
}

#[derive(Clone)]
pub struct RbacProxy {
    rbac: Rbac,
    sessions: Arc<dyn SessionSource>,
    get_users: Option<Arc<dyn GetUsers>>,
    on_before_access: Option<Arc<dyn OnBeforeAccess>>,
}

impl RbacProxy {
    pub fn new(rbac: Rbac, sessions: Arc<dyn SessionSource>) -> Self {
        RbacProxy {
            rbac,
            sessions,
            get_users: None,
            on_before_access: None,
        }
    }

    pub fn with_users(mut self, get_users: Arc<dyn GetUsers>) -> Self {
        self.get_users = Some(get_users);
        self
    }

    pub fn with_access_guard(mut self, guard: Arc<dyn OnBeforeAccess>) -> Self {
        self.on_before_access = Some(guard);
        self
    }

    /// Pages over and guards access with the same fixed user list.
    pub fn with_array_users(self, users: Vec<User>, page_size: usize) -> Self {
        let users = Arc::new(ArrayUsers::new(users, page_size));
        self.with_users(users.clone()).with_access_guard(users)
    }

    /// `/user_bindings` is only routed when a [`GetUsers`] callback is set.
    pub fn router(self) -> Router {
        let mut router = Router::new()
            .route("/roles", get(get_roles))
            .route("/user_bindings_all", get(list_user_bindings_all))
            .route(
                "/user_bindings/{id}",
                get(get_user_binding)
                    .put(put_user_binding)
                    .delete(delete_user_binding),
            );

        if self.get_users.is_some() {
            router = router.route("/user_bindings", get(list_user_bindings));
        }

        router
            .route_layer(middleware::from_fn(track_metrics))
            .with_state(self)
    }

    fn session(&self, parts: &Parts) -> Result<Session, ProxyError> {
        Ok(self.sessions.session(parts)?)
    }

    fn before_access(&self, user: &User) -> Result<(), ProxyError> {
        match &self.on_before_access {
            Some(guard) => guard.before_access(user),
            None => Ok(()),
        }
    }
}

async fn get_roles(
    State(proxy): State<RbacProxy>,
    request: Request,
) -> Result<Json<Value>, ProxyError> {
    let (parts, _) = request.into_parts();
    let session = proxy.session(&parts)?;

    let roles = proxy.rbac.get_roles(&session).await?;
    Ok(Json(json!({ "result": roles })))
}

async fn list_user_bindings_all(
    State(proxy): State<RbacProxy>,
    request: Request,
) -> Result<Json<BindingsResponse>, ProxyError> {
    let (parts, _) = request.into_parts();
    let session = proxy.session(&parts)?;

    let bindings = proxy.rbac.list_user_bindings_all(&session).await?;
    Ok(Json(BindingsResponse {
        result: bindings,
        page: None,
    }))
}

async fn list_user_bindings(
    State(proxy): State<RbacProxy>,
    request: Request,
) -> Result<Json<BindingsResponse>, ProxyError> {
    let (parts, _) = request.into_parts();
    let session = proxy.session(&parts)?;
    let page = single_query_param(&parts, "page")?;

    let users_page = match &proxy.get_users {
        Some(get_users) => get_users.users(&parts, &page)?,
        None => return Err(ProxyError::rejected(StatusCode::NOT_FOUND, "not found")),
    };

    let bindings = proxy
        .rbac
        .list_user_bindings(&session, &users_page.users)
        .await?;
    Ok(Json(BindingsResponse {
        result: bindings,
        page: users_page.page,
    }))
}

async fn get_user_binding(
    State(proxy): State<RbacProxy>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Json<Value>, ProxyError> {
    let (parts, _) = request.into_parts();
    let session = proxy.session(&parts)?;
    let user = User::new(id);
    proxy.before_access(&user)?;

    let roles = match proxy.rbac.get_user_binding(&session, &user).await {
        Ok(binding) => binding.roles,
        Err(RbacError::Client(e)) if e.is_status(StatusCode::NOT_FOUND) => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    Ok(Json(json!({ "result": roles })))
}

async fn put_user_binding(
    State(proxy): State<RbacProxy>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Json<Value>, ProxyError> {
    let (parts, roles): (_, Vec<String>) = json_body(request).await?;
    let session = proxy.session(&parts)?;
    let user = User::new(id);
    proxy.before_access(&user)?;

    proxy.rbac.put_user_binding(&session, &user, &roles).await?;
    Ok(Json(json!({})))
}

async fn delete_user_binding(
    State(proxy): State<RbacProxy>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Json<Value>, ProxyError> {
    let (parts, _) = request.into_parts();
    let session = proxy.session(&parts)?;
    let user = User::new(id);
    proxy.before_access(&user)?;

    proxy.rbac.delete_user_binding(&session, &user).await?;
    Ok(Json(json!({})))
}
