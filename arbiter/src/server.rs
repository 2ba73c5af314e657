use crate::config::Config;
use axum::Router;
use policy_client::{Client, ClientError, Rbac, User};
use proxy::callbacks::InjectSession;
use proxy::{ApiProxy, RbacProxy};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

/// Builds the browser facing router. RBAC routes are nested under `/rbac`.
pub fn app(config: &Config, client: &Client) -> Router {
    let sessions = config.session.source();

    let mut api = ApiProxy::new(client.clone());
    if config.inject_session {
        api = api.with_input_callback(Arc::new(InjectSession::new(sessions.clone())));
    }

    let mut router = api.router();
    if let Some(rbac) = &config.rbac {
        let users = rbac.users.iter().map(User::new).collect();
        let rbac_proxy = RbacProxy::new(Rbac::new(client.clone()), sessions)
            .with_array_users(users, rbac.page_size);
        router = router.nest("/rbac", rbac_proxy.router());
    }

    router
}

/// Serves the proxy routes and the admin endpoints until either listener fails.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let client = Client::new(&config.client)?;

    // Discover early so /ready turns green without waiting for traffic. A
    // failure here is retried by the first request.
    let discovery_client = client.clone();
    tokio::spawn(async move {
        if let Err(e) = discovery_client.discover().await {
            tracing::warn!(error = %e, "Initial gateway discovery failed");
        }
    });

    let app = app(&config, &client);
    let listener = TcpListener::bind(format!(
        "{}:{}",
        config.listener.host, config.listener.port
    ))
    .await?;
    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        "Proxy listening"
    );
    let proxy_task = async {
        axum::serve(listener, app).await?;
        Ok::<_, ServerError>(())
    };

    let admin_service = AdminService::<_, ServerError>::new(move || client.is_ready());
    tracing::info!(
        host = %config.admin_listener.host,
        port = config.admin_listener.port,
        "Admin listening"
    );
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(proxy_task, admin_task)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use policy_client::ClientConfig;
    use tower::ServiceExt;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).expect("config")
    }

    fn client() -> Client {
        Client::new(&ClientConfig::new(
            "http://discovery.invalid".parse().unwrap(),
            "token",
        ))
        .unwrap()
    }

    async fn status(app: Router, uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        to_bytes(response.into_body(), usize::MAX).await.unwrap();
        status
    }

    #[tokio::test]
    async fn test_rbac_routes_follow_config() {
        let without_rbac = config(r#"client: {url: "http://policy.local", token: x}"#);
        let router = app(&without_rbac, &client());
        assert_eq!(status(router, "/rbac/roles").await, StatusCode::NOT_FOUND);

        let with_rbac = config(
            r#"
            client: {url: "http://policy.local", token: x}
            rbac: {users: [alice]}
            "#,
        );
        let router = app(&with_rbac, &client());
        // No user cookie, rejected before the service is contacted
        assert_eq!(status(router, "/rbac/roles").await, StatusCode::BAD_REQUEST);
    }
}
