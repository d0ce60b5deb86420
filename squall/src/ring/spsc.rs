//! Single-producer single-consumer value ring.
//!
//! The coordinator owns the producer handle of every worker's todo ring;
//! the worker owns the consumer handle. Neither handle is `Sync`, so the
//! one-thread-per-side contract is enforced by the type system instead of
//! a documented unsafe invariant.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;

#[repr(align(128))]
struct PaddedAtomicU64(AtomicU64);

/// Shared ring storage. Constructed through [`SpscRing::new`], which hands
/// out exactly one producer and one consumer handle.
pub struct SpscRing<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    /// Next sequence the producer will write.
    tail: PaddedAtomicU64,
    /// Next sequence the consumer will read.
    head: PaddedAtomicU64,
}

unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// Create a ring and split it into its two handles.
    pub fn new(capacity: usize) -> Result<(SpscProducer<T>, SpscConsumer<T>)> {
        super::check_capacity(capacity)?;
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let ring = Arc::new(Self {
            slots,
            mask: capacity - 1,
            tail: PaddedAtomicU64(AtomicU64::new(0)),
            head: PaddedAtomicU64(AtomicU64::new(0)),
        });
        Ok((
            SpscProducer { ring: ring.clone() },
            SpscConsumer { ring },
        ))
    }

    fn capacity(&self) -> usize {
        self.mask + 1
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        // Both handles are gone; drain whatever was never popped.
        let head = self.head.0.load(Ordering::Relaxed);
        let tail = self.tail.0.load(Ordering::Relaxed);
        for seq in head..tail {
            let idx = (seq as usize) & self.mask;
            unsafe { (*self.slots[idx].get()).assume_init_drop() };
        }
    }
}

/// Producer half. `Send` but not `Sync` or `Clone`.
pub struct SpscProducer<T> {
    ring: Arc<SpscRing<T>>,
}

unsafe impl<T: Send> Send for SpscProducer<T> {}

impl<T> SpscProducer<T> {
    /// Push a value. A full ring hands the value back; the caller retries
    /// later, it never blocks.
    pub fn try_push(&self, value: T) -> std::result::Result<(), T> {
        let ring = &*self.ring;
        let tail = ring.tail.0.load(Ordering::Relaxed);
        let head = ring.head.0.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= ring.capacity() as u64 {
            return Err(value);
        }
        let idx = (tail as usize) & ring.mask;
        unsafe { (*ring.slots[idx].get()).write(value) };
        ring.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Entries currently queued.
    pub fn len(&self) -> usize {
        let ring = &*self.ring;
        let tail = ring.tail.0.load(Ordering::Relaxed);
        let head = ring.head.0.load(Ordering::Acquire);
        tail.wrapping_sub(head) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer half. `Send` but not `Sync` or `Clone`.
pub struct SpscConsumer<T> {
    ring: Arc<SpscRing<T>>,
}

unsafe impl<T: Send> Send for SpscConsumer<T> {}

impl<T> SpscConsumer<T> {
    /// Pop the oldest value, or `None` immediately if the ring is empty.
    pub fn try_pop(&self) -> Option<T> {
        let ring = &*self.ring;
        let head = ring.head.0.load(Ordering::Relaxed);
        let tail = ring.tail.0.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let idx = (head as usize) & ring.mask;
        let value = unsafe { (*ring.slots[idx].get()).assume_init_read() };
        ring.head.0.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_fifo() {
        let (tx, rx) = SpscRing::new(8).unwrap();
        for i in 0..5u32 {
            tx.try_push(i).unwrap();
        }
        for i in 0..5u32 {
            assert_eq!(rx.try_pop(), Some(i));
        }
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn full_ring_returns_value() {
        let (tx, rx) = SpscRing::new(4).unwrap();
        for i in 0..4u32 {
            tx.try_push(i).unwrap();
        }
        assert_eq!(tx.try_push(99), Err(99));
        assert_eq!(rx.try_pop(), Some(0));
        tx.try_push(99).unwrap();
    }

    #[test]
    fn wraps_past_capacity() {
        let (tx, rx) = SpscRing::new(4).unwrap();
        for i in 0..64u32 {
            tx.try_push(i).unwrap();
            assert_eq!(rx.try_pop(), Some(i));
        }
    }

    #[test]
    fn cross_thread_transfer() {
        let (tx, rx) = SpscRing::new(1024).unwrap();
        let producer = std::thread::spawn(move || {
            for i in 0..10_000u64 {
                let mut v = i;
                loop {
                    match tx.try_push(v) {
                        Ok(()) => break,
                        Err(back) => v = back,
                    }
                }
            }
        });
        let mut expected = 0u64;
        while expected < 10_000 {
            if let Some(v) = rx.try_pop() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn drops_unconsumed_values() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        struct Tracked;
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }

        let (tx, rx) = SpscRing::new(8).unwrap();
        for _ in 0..3 {
            assert!(tx.try_push(Tracked).is_ok());
        }
        drop(tx);
        drop(rx);
        assert_eq!(DROPS.load(Ordering::Relaxed), 3);
    }
}
