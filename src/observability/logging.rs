//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Pick the log level from `RUST_LOG`, falling back to the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. Calling this more than once
/// keeps the first subscriber.
pub fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(log_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn default_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(format!("http_governor={log_level},tower_http={log_level}"))
        .unwrap_or_else(|_| EnvFilter::new("http_governor=info,tower_http=info"))
}
