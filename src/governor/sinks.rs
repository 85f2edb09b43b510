//! Metric sinks consumed by the governor.
//!
//! The governor only needs three narrow capabilities, so any metrics backend
//! can be plugged in. Implementations are provided for the `metrics` crate
//! handles (see `observability::metrics::governor_sinks`) and for std atomics.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A monotonically increasing value.
pub trait Counter: Send + Sync {
    /// Increment the counter by 1.
    fn inc(&self);
}

/// The current length of the request queue.
pub trait Gauge: Send + Sync {
    /// Increment the gauge by 1.
    fn inc(&self);
    /// Decrement the gauge by 1.
    fn dec(&self);
}

/// Receives the time, in seconds, a request waited in the queue.
pub trait Observer: Send + Sync {
    fn observe(&self, seconds: f64);
}

impl Counter for metrics::Counter {
    fn inc(&self) {
        self.increment(1);
    }
}

impl Gauge for metrics::Gauge {
    fn inc(&self) {
        self.increment(1.0);
    }

    fn dec(&self) {
        self.decrement(1.0);
    }
}

impl Observer for metrics::Histogram {
    fn observe(&self, seconds: f64) {
        self.record(seconds);
    }
}

impl Counter for AtomicU64 {
    fn inc(&self) {
        self.fetch_add(1, Ordering::Relaxed);
    }
}

impl Gauge for AtomicI64 {
    fn inc(&self) {
        self.fetch_add(1, Ordering::Relaxed);
    }

    fn dec(&self) {
        self.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_sinks() {
        let counter = AtomicU64::new(0);
        Counter::inc(&counter);
        Counter::inc(&counter);
        assert_eq!(counter.load(Ordering::Relaxed), 2);

        let gauge = AtomicI64::new(0);
        Gauge::inc(&gauge);
        Gauge::inc(&gauge);
        Gauge::dec(&gauge);
        assert_eq!(gauge.load(Ordering::Relaxed), 1);
    }
}
