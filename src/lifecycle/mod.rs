//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Ctrl+C → Shutdown::trigger
//!     → server stops accepting and drains in-flight requests
//!     → config watcher task exits
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
