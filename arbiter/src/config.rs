use policy_client::ClientConfig;
use policy_client::config::ValidationError as ClientValidationError;
use proxy::session::{self, SessionSource};
use serde::Deserialize;
use std::fs::File;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Static session needs a tenant and a subject")]
    EmptyStaticSession,

    #[error("RBAC page size cannot be 0")]
    InvalidPageSize,

    #[error("client: {0}")]
    Client(#[from] ClientValidationError),
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    fn admin() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3001,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// Where the proxy routes take the caller's session from
#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum SessionConfig {
    /// `user=<tenant>/<subject>` cookie
    #[default]
    Cookie,
    /// Set on the request by a middleware in front of the proxy routes
    Extensions,
    /// The same session for every request
    Static { tenant: String, subject: String },
}

impl SessionConfig {
    pub fn source(&self) -> Arc<dyn SessionSource> {
        match self {
            SessionConfig::Cookie => session::from_cookie(),
            SessionConfig::Extensions => session::from_extensions(),
            SessionConfig::Static { tenant, subject } => {
                session::from_values(tenant.clone(), subject.clone())
            }
        }
    }
}

fn default_page_size() -> usize {
    20
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct RbacConfig {
    /// Users whose bindings may be listed and managed
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

fn default_admin_listener() -> Listener {
    Listener::admin()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_level")]
    pub level: String,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_level(),
            sentry_dsn: None,
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub client: ClientConfig,
    #[serde(default)]
    pub listener: Listener,
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    #[serde(default)]
    pub session: SessionConfig,
    /// Add the caller's tenant and subject to query inputs
    #[serde(default = "default_true")]
    pub inject_session: bool,
    /// RBAC routes are only served when this section is present
    pub rbac: Option<RbacConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.client.validate()?;
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if let SessionConfig::Static { tenant, subject } = &self.session {
            if tenant.trim().is_empty() || subject.trim().is_empty() {
                return Err(ValidationError::EmptyStaticSession);
            }
        }

        if self.rbac.as_ref().is_some_and(|rbac| rbac.page_size == 0) {
            return Err(ValidationError::InvalidPageSize);
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}
