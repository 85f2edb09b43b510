//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated)
//!     → limits become governor Params, costs fill the estimator
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → cost rules re-applied to the shared estimator
//! ```
//!
//! # Design Decisions
//! - Only cost rules are live; everything else is fixed at startup
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{AppConfig, CostRule, LimitsConfig, ListenerConfig, ObservabilityConfig};
pub use validation::ValidationError;
