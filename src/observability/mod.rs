//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging with `tracing` fields, filterable per module
//! - Metric updates are cheap; without an installed recorder they are no-ops
//! - The governor sees metrics only through its sink traits

pub mod logging;
pub mod metrics;
