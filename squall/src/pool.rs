//! Fixed-credit pool bounding in-flight tasks.
//!
//! Mirrors the sizing of the original object pool: one credit fewer than
//! the ring capacity, so a full pipeline can never overrun a ring. A credit
//! is held from `try_acquire` until the coordinator consumes the matching
//! completion and calls `release`.

use std::sync::atomic::{AtomicUsize, Ordering};

pub struct TaskPool {
    available: AtomicUsize,
    capacity: usize,
}

impl TaskPool {
    /// Pool with `ring_capacity - 1` credits.
    pub fn for_ring(ring_capacity: usize) -> Self {
        Self::with_credits(ring_capacity.saturating_sub(1))
    }

    pub fn with_credits(credits: usize) -> Self {
        Self {
            available: AtomicUsize::new(credits),
            capacity: credits,
        }
    }

    /// Take one credit. `false` means exhausted; the caller treats this as
    /// backpressure and retries later.
    pub fn try_acquire(&self) -> bool {
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Return one credit.
    pub fn release(&self) {
        let prev = self.available.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev < self.capacity, "pool credit released twice");
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.available.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_and_release() {
        let pool = TaskPool::with_credits(2);
        assert!(pool.try_acquire());
        assert!(pool.try_acquire());
        assert!(!pool.try_acquire());
        pool.release();
        assert!(pool.try_acquire());
    }

    #[test]
    fn ring_sizing_is_capacity_minus_one() {
        let pool = TaskPool::for_ring(65536);
        assert_eq!(pool.capacity(), 65535);
    }
}
