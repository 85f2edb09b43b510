//! Metrics collection and exposition.
//!
//! # Metrics
//! - `governor_requests_overloaded_total` (counter): requests refused
//! - `governor_queue_length` (gauge): requests waiting for capacity
//! - `governor_queue_duration_seconds` (histogram): wait of admitted requests
//! - `proxy_requests_total` (counter): forwarded requests by method, status
//! - `proxy_request_duration_seconds` (histogram): latency distribution

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::governor::{Counter, Gauge, Observer, Params};

pub const OVERLOADED_TOTAL: &str = "governor_requests_overloaded_total";
pub const QUEUE_LENGTH: &str = "governor_queue_length";
pub const QUEUE_DURATION_SECONDS: &str = "governor_queue_duration_seconds";
pub const REQUESTS_TOTAL: &str = "proxy_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "proxy_request_duration_seconds";

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Metric handles fed by the governor.
pub struct GovernorSinks {
    pub overloaded: Arc<dyn Counter>,
    pub queue_length: Arc<dyn Gauge>,
    pub queue_duration: Arc<dyn Observer>,
}

impl GovernorSinks {
    /// Attach the sinks to governor params.
    pub fn apply(self, params: Params) -> Params {
        Params {
            request_overload_counter: Some(self.overloaded),
            queue_length_gauge: Some(self.queue_length),
            queue_duration_observer: Some(self.queue_duration),
            ..params
        }
    }
}

/// Handles for the governor metrics in the installed recorder.
pub fn governor_sinks() -> GovernorSinks {
    GovernorSinks {
        overloaded: Arc::new(counter!(OVERLOADED_TOTAL)),
        queue_length: Arc::new(gauge!(QUEUE_LENGTH)),
        queue_duration: Arc::new(histogram!(QUEUE_DURATION_SECONDS)),
    }
}

/// Record a forwarded request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!(REQUESTS_TOTAL, "method" => method.to_string(), "status" => status.clone()).increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "method" => method.to_string(), "status" => status)
        .record(start.elapsed().as_secs_f64());
}
