//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that listen addresses parse as socket addresses
//! - Check that the upstream parses as an HTTP authority (`host[:port]`)
//! - Check that cost patterns are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Limit values are never rejected: the governor normalizes them
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::uri::Authority;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// A semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("cost rule {index} has an empty pattern")]
    EmptyPattern { index: usize },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener", &config.listener.bind_address);
    if Authority::from_str(&config.upstream.address).is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "upstream",
            value: config.upstream.address.clone(),
        });
    }
    if config.observability.metrics_enabled {
        check_address(&mut errors, "metrics", &config.observability.metrics_address);
    }

    for (index, rule) in config.costs.iter().enumerate() {
        if rule.pattern.trim().is_empty() {
            errors.push(ValidationError::EmptyPattern { index });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
