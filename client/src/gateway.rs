//! Gateway descriptors and the directory they are discovered from.
use crate::errors::Result;
use crate::metrics_defs::GATEWAY_DISCOVERY_DURATION;
use crate::transport::{Transport, join_url};
use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use shared::histogram;
use std::time::Instant;

const GATEWAYS_PATH: &str = "gateways";

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Aws {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zone_id: String,
    #[serde(default)]
    pub zone: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Gateway {
    #[serde(rename = "gateway_url")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<Aws>,
}

impl Gateway {
    pub fn new(url: impl Into<String>) -> Self {
        Gateway {
            url: url.into(),
            aws: None,
        }
    }
}

#[derive(Deserialize)]
struct GatewaysResponse {
    #[serde(default)]
    result: Vec<Gateway>,
}

/// Source of the candidate gateways. Order matters: it becomes the failover order.
#[async_trait]
pub trait GatewayDirectory: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Gateway>>;
}

/// Reads the gateway list from the `/gateways` endpoint of the service.
/// Performs exactly one request per call.
pub struct HttpGatewayDirectory {
    transport: Transport,
    base_url: String,
}

impl HttpGatewayDirectory {
    pub fn new(transport: Transport, base_url: impl Into<String>) -> Self {
        HttpGatewayDirectory {
            transport,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl GatewayDirectory for HttpGatewayDirectory {
    async fn fetch(&self) -> Result<Vec<Gateway>> {
        let url = join_url(&self.base_url, GATEWAYS_PATH)?;
        let start = Instant::now();

        let response: GatewaysResponse = self
            .transport
            .execute_json(Method::GET, url, None)
            .await?;

        histogram!(GATEWAY_DISCOVERY_DURATION).record(start.elapsed().as_secs_f64());
        tracing::info!(
            base_url = %self.base_url,
            gateways = response.result.len(),
            "Discovered gateways"
        );

        Ok(response.result)
    }
}

/// A fixed gateway list, used when discovery is bypassed by configuration.
pub struct StaticGatewayDirectory {
    gateways: Vec<Gateway>,
}

impl StaticGatewayDirectory {
    pub fn new(gateways: Vec<Gateway>) -> Self {
        StaticGatewayDirectory { gateways }
    }
}

#[async_trait]
impl GatewayDirectory for StaticGatewayDirectory {
    async fn fetch(&self) -> Result<Vec<Gateway>> {
        Ok(self.gateways.clone())
    }
}
