use crate::strategy::StrategyType;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Token cannot be empty")]
    EmptyToken,

    #[error("Static gateway list cannot be empty")]
    EmptyGatewayList,

    #[error("Timeout cannot be 0")]
    InvalidTimeout,
}

/// Policy service client configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the policy service, used for gateway discovery
    ///
    /// Note: Uses the `url::Url` type so malformed URLs are rejected
    /// during config deserialization.
    pub url: Url,
    /// Bearer token sent with every request
    pub token: String,
    #[serde(default)]
    pub discovery_strategy: StrategyType,
    /// Attempts per request before giving up. 0 selects the default of 3.
    #[serde(default)]
    pub max_retries: u32,
    /// Per-request timeout. Unset means no timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Fixed gateway list that replaces discovery when set
    #[serde(default)]
    pub gateways: Option<Vec<Url>>,
}

impl ClientConfig {
    pub fn new(url: Url, token: impl Into<String>) -> Self {
        ClientConfig {
            url,
            token: token.into(),
            discovery_strategy: StrategyType::default(),
            max_retries: 0,
            timeout_secs: None,
            gateways: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.token.trim().is_empty() {
            return Err(ValidationError::EmptyToken);
        }

        if self.timeout_secs == Some(0) {
            return Err(ValidationError::InvalidTimeout);
        }

        if self.gateways.as_ref().is_some_and(Vec::is_empty) {
            return Err(ValidationError::EmptyGatewayList);
        }

        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
