//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cost::PatternCostEstimator;
use crate::governor::Params;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Where admitted requests are forwarded.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Admission limits.
    pub limits: LimitsConfig,

    /// Request cost patterns, applied in order.
    pub costs: Vec<CostRule>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Register every cost rule with `estimator`, in file order.
    pub fn apply_costs(&self, estimator: &PatternCostEstimator) {
        for rule in &self.costs {
            estimator.set_cost(&rule.pattern, rule.cost);
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    /// Includes time spent queued by the governor.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Admission limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent request cost. 0 disables governing.
    pub max_concurrency: u64,

    /// Maximum admitted plus queued cost. Values up to `max_concurrency`
    /// disable queueing.
    pub max_burst: u64,

    /// Maximum time a request waits in the queue, in milliseconds.
    /// 0 uses the 10 second default.
    pub max_queue_duration_ms: u64,
}

impl LimitsConfig {
    /// Governor params for these limits. Estimator, handler and sinks are
    /// left at their defaults.
    pub fn to_params(&self) -> Params {
        Params {
            max_concurrency: self.max_concurrency,
            max_burst: self.max_burst,
            max_queue_duration: Duration::from_millis(self.max_queue_duration_ms),
            ..Default::default()
        }
    }
}

/// Cost of requests matching a pattern.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CostRule {
    /// `[host]path` pattern; a trailing `/` matches the whole subtree.
    pub pattern: String,

    /// Concurrency units held by matching requests. 0 exempts them.
    pub cost: u64,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
