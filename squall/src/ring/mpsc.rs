//! Multi-producer single-consumer value ring.
//!
//! The completion ring: every worker pushes finished tasks, the coordinator
//! alone pops them. Producers claim a slot with a CAS on the tail cursor and
//! publish it through a per-slot sequence stamp, so a pop never observes a
//! claimed-but-unwritten slot.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;

struct Slot<T> {
    /// Publication stamp. `seq` means writable for sequence `seq`;
    /// `seq + 1` means readable.
    stamp: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

pub struct MpscRing<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    tail: AtomicU64,
    head: AtomicU64,
}

unsafe impl<T: Send> Send for MpscRing<T> {}
unsafe impl<T: Send> Sync for MpscRing<T> {}

impl<T> MpscRing<T> {
    /// Create a ring and split it into a cloneable sender and the single
    /// receiver.
    pub fn new(capacity: usize) -> Result<(MpscSender<T>, MpscReceiver<T>)> {
        super::check_capacity(capacity)?;
        let slots = (0..capacity)
            .map(|i| Slot {
                stamp: AtomicU64::new(i as u64),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let ring = Arc::new(Self {
            slots,
            mask: capacity - 1,
            tail: AtomicU64::new(0),
            head: AtomicU64::new(0),
        });
        Ok((
            MpscSender { ring: ring.clone() },
            MpscReceiver { ring },
        ))
    }

    fn capacity(&self) -> usize {
        self.mask + 1
    }
}

impl<T> Drop for MpscRing<T> {
    fn drop(&mut self) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        for seq in head..tail {
            let idx = (seq as usize) & self.mask;
            // Only published slots hold a live value.
            if self.slots[idx].stamp.load(Ordering::Relaxed) == seq.wrapping_add(1) {
                unsafe { (*self.slots[idx].value.get()).assume_init_drop() };
            }
        }
    }
}

/// Producer handle; clone one per worker.
pub struct MpscSender<T> {
    ring: Arc<MpscRing<T>>,
}

impl<T> Clone for MpscSender<T> {
    fn clone(&self) -> Self {
        Self {
            ring: self.ring.clone(),
        }
    }
}

unsafe impl<T: Send> Send for MpscSender<T> {}

impl<T> MpscSender<T> {
    /// Push a value. A full ring hands the value back for retry.
    pub fn try_push(&self, value: T) -> std::result::Result<(), T> {
        let ring = &*self.ring;
        let mut tail = ring.tail.load(Ordering::Relaxed);
        loop {
            let slot = &ring.slots[(tail as usize) & ring.mask];
            let stamp = slot.stamp.load(Ordering::Acquire);
            if stamp == tail {
                match ring.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe { (*slot.value.get()).write(value) };
                        slot.stamp.store(tail.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(seen) => tail = seen,
                }
            } else if stamp.wrapping_sub(tail) as i64 > 0 {
                // Another producer claimed this sequence; reload.
                tail = ring.tail.load(Ordering::Relaxed);
            } else {
                return Err(value);
            }
        }
    }
}

/// The single consumer handle. `Send` but not `Sync` or `Clone`.
pub struct MpscReceiver<T> {
    ring: Arc<MpscRing<T>>,
}

unsafe impl<T: Send> Send for MpscReceiver<T> {}

impl<T> MpscReceiver<T> {
    /// Pop the oldest published value, or `None` immediately.
    pub fn try_pop(&self) -> Option<T> {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);
        let slot = &ring.slots[(head as usize) & ring.mask];
        if slot.stamp.load(Ordering::Acquire) != head.wrapping_add(1) {
            return None;
        }
        let value = unsafe { (*slot.value.get()).assume_init_read() };
        // Recycle the slot for the lap `capacity` sequences ahead.
        slot.stamp
            .store(head.wrapping_add(ring.capacity() as u64), Ordering::Release);
        ring.head.store(head.wrapping_add(1), Ordering::Relaxed);
        Some(value)
    }
}
