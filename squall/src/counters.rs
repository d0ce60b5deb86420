//! Process-wide throughput counters.
//!
//! Relaxed atomics bumped from the hot paths; the statistics reporter
//! diffs snapshots once per interval. Never read on the fast path.

use std::sync::atomic::{AtomicU64, Ordering};

static SENT_PKTS: AtomicU64 = AtomicU64::new(0);
static SENT_BYTES: AtomicU64 = AtomicU64::new(0);
static RECV_PKTS: AtomicU64 = AtomicU64::new(0);
static RECV_BYTES: AtomicU64 = AtomicU64::new(0);
static RETRANSMITS: AtomicU64 = AtomicU64::new(0);
static BACKPRESSURE: AtomicU64 = AtomicU64::new(0);

#[inline(always)]
pub fn record_send(bytes: u64) {
    SENT_PKTS.fetch_add(1, Ordering::Relaxed);
    SENT_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

#[inline(always)]
pub fn record_receive(bytes: u64) {
    RECV_PKTS.fetch_add(1, Ordering::Relaxed);
    RECV_BYTES.fetch_add(bytes, Ordering::Relaxed);
}

#[inline(always)]
pub fn record_retransmit() {
    RETRANSMITS.fetch_add(1, Ordering::Relaxed);
}

#[inline(always)]
pub fn record_backpressure() {
    BACKPRESSURE.fetch_add(1, Ordering::Relaxed);
}

/// Point-in-time view of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub sent_pkts: u64,
    pub sent_bytes: u64,
    pub recv_pkts: u64,
    pub recv_bytes: u64,
    pub retransmits: u64,
    pub backpressure: u64,
}

impl CounterSnapshot {
    pub fn take() -> Self {
        Self {
            sent_pkts: SENT_PKTS.load(Ordering::Relaxed),
            sent_bytes: SENT_BYTES.load(Ordering::Relaxed),
            recv_pkts: RECV_PKTS.load(Ordering::Relaxed),
            recv_bytes: RECV_BYTES.load(Ordering::Relaxed),
            retransmits: RETRANSMITS.load(Ordering::Relaxed),
            backpressure: BACKPRESSURE.load(Ordering::Relaxed),
        }
    }

    /// Counters accumulated since `earlier`.
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            sent_pkts: self.sent_pkts.wrapping_sub(earlier.sent_pkts),
            sent_bytes: self.sent_bytes.wrapping_sub(earlier.sent_bytes),
            recv_pkts: self.recv_pkts.wrapping_sub(earlier.recv_pkts),
            recv_bytes: self.recv_bytes.wrapping_sub(earlier.recv_bytes),
            retransmits: self.retransmits.wrapping_sub(earlier.retransmits),
            backpressure: self.backpressure.wrapping_sub(earlier.backpressure),
        }
    }
}
