//! Pattern based cost estimation.
//!
//! # Responsibilities
//! - Register costs for exact paths and path subtrees, optionally per host
//! - Classify requests by longest matching pattern
//!
//! # Design Decisions
//! - Patterns follow the `[host]path` shape of HTTP mux patterns: a path
//!   ending in `/` matches the whole subtree, anything else matches exactly
//! - Host-qualified patterns take precedence over host-less ones
//! - Prefixes are kept sorted longest first, so the first hit is the longest
//! - Registration is rare, lookups are per request: a reader-writer lock
//!   lets lookups run in parallel

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use axum::{body::Body, http::Request};

use crate::cost::path::{clean_path, request_host, request_path, strip_port};
use crate::cost::CostEstimator;

/// Determines the cost of a request by matching it against registered
/// patterns. Requests matching nothing cost 1.
#[derive(Debug, Default)]
pub struct PatternCostEstimator {
    table: RwLock<CostTable>,
}

#[derive(Debug, Default)]
struct CostTable {
    /// Cost of every registered key, prefixes included.
    costs: HashMap<String, u64>,
    /// Subtree keys, longest first, no duplicates.
    prefixes: Vec<String>,
    /// Whether any key carries a host part.
    has_host: bool,
}

impl PatternCostEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cost of requests matching `pattern`, replacing any earlier
    /// cost for the same pattern.
    ///
    /// `pattern` is an optional host followed by a rooted path, for example
    /// `/api`, `/static/` or `api.example.com/upload/`. A pattern without a
    /// path covers every path on its host.
    pub fn set_cost(&self, pattern: &str, cost: u64) {
        let (host, path) = match pattern.find('/') {
            Some(n) => (&pattern[..n], &pattern[n..]),
            None => (pattern, "/"),
        };
        let host = strip_port(host).to_ascii_lowercase();

        let subtree = path.ends_with('/');
        let mut path = clean_path(path);
        if subtree && !path.ends_with('/') {
            path.push('/');
        }
        let key = format!("{host}{path}");

        tracing::debug!(pattern = %pattern, key = %key, cost, subtree, "Setting request cost");

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if !host.is_empty() {
            table.has_host = true;
        }
        if subtree {
            table.add_prefix(&key);
        }
        table.costs.insert(key, cost);
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CostTable {
    /// Insert a subtree key keeping the list sorted longest first.
    fn add_prefix(&mut self, prefix: &str) {
        if self.prefixes.iter().any(|p| p == prefix) {
            return;
        }
        let at = self.prefixes.partition_point(|p| p.len() >= prefix.len());
        self.prefixes.insert(at, prefix.to_string());
    }

    /// Exact match first, then the longest matching subtree.
    fn lookup(&self, key: &str) -> Option<u64> {
        if let Some(cost) = self.costs.get(key) {
            return Some(*cost);
        }
        self.prefixes
            .iter()
            .find(|prefix| key.starts_with(prefix.as_str()))
            .and_then(|prefix| self.costs.get(prefix).copied())
    }
}

impl CostEstimator for PatternCostEstimator {
    fn estimate_cost(&self, req: &Request<Body>) -> u64 {
        let path = clean_path(&request_path(req));
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);

        if table.has_host {
            if let Some(host) = request_host(req) {
                if let Some(cost) = table.lookup(&format!("{host}{path}")) {
                    return cost;
                }
            }
        }

        table.lookup(&path).unwrap_or(1)
    }
}
