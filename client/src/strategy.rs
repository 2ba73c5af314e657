use crate::errors::{ClientError, Result};
use crate::gateway::Gateway;
use serde::Deserialize;
use std::fmt;

/// Gateway selection policies that can be picked in configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    #[default]
    RoundRobin,
}

impl StrategyType {
    pub fn build(self, gateways: Vec<Gateway>) -> Result<Box<dyn Strategy>> {
        match self {
            StrategyType::RoundRobin => Ok(Box::new(RoundRobin::new(gateways)?)),
        }
    }
}

/// Picks the gateway requests are sent to.
///
/// Implementations are not synchronized; the executor serializes
/// `advance` calls itself.
pub trait Strategy: fmt::Debug + Send + Sync {
    fn current(&self) -> &Gateway;

    fn advance(&mut self);
}

/// Cycles through the gateways in directory order with no memory of which
/// ones failed before.
#[derive(Debug)]
pub struct RoundRobin {
    gateways: Vec<Gateway>,
    cursor: usize,
}

impl RoundRobin {
    pub fn new(gateways: Vec<Gateway>) -> Result<Self> {
        if gateways.is_empty() {
            return Err(ClientError::EmptyGatewayList);
        }

        Ok(RoundRobin {
            gateways,
            cursor: 0,
        })
    }
}

impl Strategy for RoundRobin {
    fn current(&self) -> &Gateway {
        &self.gateways[self.cursor]
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.gateways.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateways(n: usize) -> Vec<Gateway> {
        (0..n)
            .map(|i| Gateway::new(format!("http://gw{i}.local")))
            .collect()
    }

    #[test]
    fn test_empty_list_is_rejected() {
        assert!(matches!(
            RoundRobin::new(vec![]),
            Err(ClientError::EmptyGatewayList)
        ));
        assert!(StrategyType::RoundRobin.build(vec![]).is_err());
    }

    #[test]
    fn test_starts_at_first_gateway() {
        let strategy = RoundRobin::new(gateways(3)).unwrap();
        assert_eq!(strategy.current().url, "http://gw0.local");
    }

    #[test]
    fn test_advance_wraps_around() {
        for n in 1..=5 {
            let mut strategy = RoundRobin::new(gateways(n)).unwrap();
            let start = strategy.current().clone();

            for i in 1..n {
                strategy.advance();
                assert_eq!(strategy.current().url, format!("http://gw{i}.local"));
            }

            // n advances bring the cursor back to where it started
            strategy.advance();
            assert_eq!(strategy.current(), &start);
        }
    }

    #[test]
    fn test_single_gateway_never_changes() {
        let mut strategy = RoundRobin::new(gateways(1)).unwrap();
        for _ in 0..10 {
            strategy.advance();
            assert_eq!(strategy.current().url, "http://gw0.local");
        }
    }

    #[test]
    fn test_strategy_type_from_config() {
        let parsed: StrategyType = serde_json::from_str(r#""round_robin""#).unwrap();
        assert_eq!(parsed, StrategyType::RoundRobin);
        assert!(serde_json::from_str::<StrategyType>(r#""sorted""#).is_err());
    }
}
