//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → governor admits, queues or refuses the request
//!     → proxy handler forwards to the upstream
//!     → Send to client
//! ```

pub mod server;

pub use server::{HttpServer, ServerError};
