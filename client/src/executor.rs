//! Gateway failover for outbound requests.
//!
//! The executor discovers the gateways lazily on first use, hands the current
//! gateway's base URL to each request attempt, and moves on to the next
//! gateway when an attempt fails with 502, 503 or 504. Any other failure is
//! returned to the caller untouched.
//!
//! Requests run fully in parallel. Only the check-and-advance of the cursor
//! is serialized, and it only advances if the cursor still points at the
//! gateway the failed attempt used. When several in-flight requests fail on
//! the same gateway, the cursor therefore moves exactly once.
use crate::errors::{ClientError, Result};
use crate::gateway::{Gateway, GatewayDirectory};
use crate::metrics_defs::{GATEWAY_FAILOVER, GATEWAY_RETRIES_EXHAUSTED};
use crate::strategy::{Strategy, StrategyType};
use parking_lot::Mutex;
use shared::counter;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub struct Executor {
    directory: Arc<dyn GatewayDirectory>,
    strategy_type: StrategyType,
    max_retries: u32,
    // Set at most once. A failed discovery leaves it empty so the next
    // request runs discovery again.
    strategy: OnceCell<Mutex<Box<dyn Strategy>>>,
}

impl Executor {
    /// A `max_retries` of zero falls back to [`DEFAULT_MAX_RETRIES`].
    pub fn new(
        directory: Arc<dyn GatewayDirectory>,
        strategy_type: StrategyType,
        max_retries: u32,
    ) -> Self {
        let max_retries = if max_retries == 0 {
            DEFAULT_MAX_RETRIES
        } else {
            max_retries
        };

        Executor {
            directory,
            strategy_type,
            max_retries,
            strategy: OnceCell::new(),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// True once the gateway list has been discovered.
    pub fn is_initialized(&self) -> bool {
        self.strategy.initialized()
    }

    pub fn current_gateway(&self) -> Option<Gateway> {
        self.strategy.get().map(|s| s.lock().current().clone())
    }

    /// Runs discovery now instead of on the first request. A no-op once
    /// discovery has succeeded.
    pub async fn initialize(&self) -> Result<()> {
        self.strategy().await.map(|_| ())
    }

    /// Runs `request` against the current gateway, failing over on bad gateway
    /// statuses for at most `max_retries` attempts. On exhaustion the error of
    /// the last attempt is returned.
    pub async fn execute<T, F, Fut>(&self, mut request: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let strategy = self.strategy().await?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let gateway = strategy.lock().current().clone();

            let err = match request(gateway.url.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let status = match &err {
                ClientError::Http(http) if http.is_bad_gateway() => http.status(),
                _ => return Err(err),
            };

            {
                let mut strategy = strategy.lock();
                if *strategy.current() == gateway {
                    strategy.advance();
                    counter!(GATEWAY_FAILOVER).increment(1);
                    tracing::warn!(
                        gateway = %gateway.url,
                        next = %strategy.current().url,
                        status = status.as_u16(),
                        attempt,
                        "Gateway unhealthy, failing over"
                    );
                }
            }

            if attempt >= self.max_retries {
                counter!(GATEWAY_RETRIES_EXHAUSTED).increment(1);
                tracing::error!(
                    attempts = attempt,
                    status = status.as_u16(),
                    "Giving up after bad gateway responses"
                );
                return Err(err);
            }
        }
    }

    async fn strategy(&self) -> Result<&Mutex<Box<dyn Strategy>>> {
        self.strategy
            .get_or_try_init(|| async {
                let gateways = self.directory.fetch().await?;
                if gateways.is_empty() {
                    tracing::warn!("Gateway directory returned no gateways");
                    return Err(ClientError::NoGateways);
                }

                Ok(Mutex::new(self.strategy_type.build(gateways)?))
            })
            .await
    }
}
