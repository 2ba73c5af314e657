//! Metrics definitions for the policy client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const GATEWAY_DISCOVERY_DURATION: MetricDef = MetricDef {
    name: "gateway.discovery.duration",
    metric_type: MetricType::Histogram,
    description: "Time to fetch the gateway list from the discovery endpoint in seconds",
};

pub const GATEWAY_FAILOVER: MetricDef = MetricDef {
    name: "gateway.failover",
    metric_type: MetricType::Counter,
    description: "Number of times the current gateway was abandoned after a 502/503/504",
};

pub const GATEWAY_RETRIES_EXHAUSTED: MetricDef = MetricDef {
    name: "gateway.retries_exhausted",
    metric_type: MetricType::Counter,
    description: "Number of requests that failed on every attempt with a bad gateway status",
};

pub const BATCH_CHUNKS: MetricDef = MetricDef {
    name: "batch.chunks",
    metric_type: MetricType::Counter,
    description: "Number of batch chunks submitted to the service",
};

pub const ALL_METRICS: &[MetricDef] = &[
    GATEWAY_DISCOVERY_DURATION,
    GATEWAY_FAILOVER,
    GATEWAY_RETRIES_EXHAUSTED,
    BATCH_CHUNKS,
];
