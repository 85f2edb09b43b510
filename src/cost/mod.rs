//! Request cost estimation.
//!
//! # Data Flow
//! ```text
//! Incoming request (host, path)
//!     → CostEstimator::estimate_cost
//!     → cost (u64) handed to the governor
//! ```
//!
//! # Design Decisions
//! - A cost is the number of concurrency units a request must hold
//! - Cost 0 marks a request as free: it is never limited
//! - Unknown requests cost 1
//! - Estimation is pure computation and never blocks

pub mod path;
pub mod pattern;

use std::collections::HashMap;

use axum::{body::Body, http::Request};

pub use pattern::PatternCostEstimator;

/// Determines the relative cost of a request.
pub trait CostEstimator: Send + Sync {
    /// The number of concurrency units required before the request is
    /// serviced. A request costing 0 is serviced even when others are queued.
    fn estimate_cost(&self, req: &Request<Body>) -> u64;
}

impl<F> CostEstimator for F
where
    F: Fn(&Request<Body>) -> u64 + Send + Sync,
{
    fn estimate_cost(&self, req: &Request<Body>) -> u64 {
        self(req)
    }
}

/// Gives every request the same cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantCost(pub u64);

impl Default for ConstantCost {
    fn default() -> Self {
        Self(1)
    }
}

impl CostEstimator for ConstantCost {
    fn estimate_cost(&self, _req: &Request<Body>) -> u64 {
        self.0
    }
}

/// Looks up the exact, percent-decoded request path. Unlisted paths cost 1.
///
/// No cleaning or host matching is done; use [`PatternCostEstimator`] for
/// subtrees and hosts.
#[derive(Debug, Clone, Default)]
pub struct PathCostEstimator(pub HashMap<String, u64>);

impl PathCostEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cost of an exact path.
    pub fn with_cost(mut self, path: impl Into<String>, cost: u64) -> Self {
        self.0.insert(path.into(), cost);
        self
    }
}

impl CostEstimator for PathCostEstimator {
    fn estimate_cost(&self, req: &Request<Body>) -> u64 {
        self.0.get(&*path::request_path(req)).copied().unwrap_or(1)
    }
}
