//! Squall - lock-free plumbing for a busy-polling packet load generator.
//!
//! - [`ring`] - SPSC/MPSC rings that move values between pinned threads
//! - [`pool`] - fixed-credit pool bounding in-flight work units
//! - [`clock`] - monotonic cycle counter and unit conversions
//! - [`affinity`] - CPU core pinning for worker threads
//! - [`counters`] - process-wide throughput counters

pub mod affinity;
pub mod clock;
pub mod counters;
pub mod error;
pub mod pool;
pub mod ring;

pub use counters::{
    record_backpressure, record_receive, record_retransmit, record_send, CounterSnapshot,
};
pub use error::{Result, SquallError};
pub use pool::TaskPool;
pub use ring::{MpscReceiver, MpscRing, MpscSender, SpscConsumer, SpscProducer, SpscRing};
