//! Admission control for HTTP servers.
//!
//! Requests are priced by a [`cost::CostEstimator`] and admitted by the
//! [`governor::Governor`] tower middleware, which caps the total cost in
//! flight and optionally queues excess requests for a bounded time.
//!
//! The `http-governor` binary wraps the middleware around a reverse proxy.

pub mod config;
pub mod cost;
pub mod governor;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::AppConfig;
pub use cost::{CostEstimator, PatternCostEstimator};
pub use governor::{Governor, GovernorLayer, Params};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
