//! Weighted permit pool.
//!
//! # Responsibilities
//! - Track a fixed capacity and the weight currently handed out
//! - Non-blocking acquire of an arbitrary weight
//! - Blocking acquire that queues behind earlier waiters (FIFO)
//! - Release on drop of the returned permit
//!
//! # Design Decisions
//! - Backed by `tokio::sync::Semaphore`, which queues waiters in FIFO order and
//!   hands freed weight to the head waiter before anyone else can take it
//! - A weight larger than the capacity can never be granted: `try_acquire`
//!   fails and `acquire` stays pending until the caller gives up

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A counting resource that is acquired and released in weighted amounts.
#[derive(Debug, Clone)]
pub struct PermitPool {
    semaphore: Arc<Semaphore>,
    capacity: u64,
}

impl PermitPool {
    /// Create a pool holding `capacity` units of weight.
    ///
    /// Capacity is capped at `u32::MAX`, the largest weight one acquire can
    /// take, so any weight up to [`capacity`](Self::capacity) can be granted.
    pub fn new(capacity: u64) -> Self {
        let capacity = capacity
            .min(u64::from(u32::MAX))
            .min(Semaphore::MAX_PERMITS as u64);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
        }
    }

    /// Total weight this pool can hand out.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Weight that is currently free.
    pub fn available(&self) -> u64 {
        self.semaphore.available_permits() as u64
    }

    /// Try to take `weight` units without waiting.
    ///
    /// Fails if the weight is not free right now, including when a blocked
    /// waiter is already queued for it.
    pub fn try_acquire(&self, weight: u64) -> Option<Permit> {
        let n = self.permits_for(weight)?;
        self.semaphore
            .clone()
            .try_acquire_many_owned(n)
            .ok()
            .map(|permit| Permit { _permit: permit, weight })
    }

    /// Wait until `weight` units are free and take them.
    ///
    /// Dropping the returned future removes the waiter from the queue.
    pub async fn acquire(&self, weight: u64) -> Permit {
        let Some(n) = self.permits_for(weight) else {
            return std::future::pending().await;
        };
        match self.semaphore.clone().acquire_many_owned(n).await {
            Ok(permit) => Permit { _permit: permit, weight },
            // The semaphore is never closed.
            Err(_) => std::future::pending().await,
        }
    }

    fn permits_for(&self, weight: u64) -> Option<u32> {
        if weight > self.capacity {
            return None;
        }
        u32::try_from(weight).ok()
    }
}

/// Weight held from a [`PermitPool`].
///
/// The weight is returned to the pool when the permit is dropped, so it is
/// released exactly once even if the holder panics or is cancelled.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    weight: u64,
}

impl Permit {
    /// Weight held by this permit.
    pub fn weight(&self) -> u64 {
        self.weight
    }
}
