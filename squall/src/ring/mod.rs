//! Lock-free rings for task distribution.
//!
//! - [`SpscRing`] - one producer, one consumer; the per-worker todo ring
//! - [`MpscRing`] - many producers, one consumer; the shared completion ring
//!
//! Both move values by ownership: a pushed task belongs to whoever pops it.
//! Capacities must be powers of two so slot lookup is a mask, not a modulo.

mod mpsc;
mod spsc;

pub use mpsc::{MpscReceiver, MpscRing, MpscSender};
pub use spsc::{SpscConsumer, SpscProducer, SpscRing};

use crate::error::{Result, SquallError};

pub(crate) fn check_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(SquallError::config("ring capacity must be a power of 2"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_must_be_power_of_two() {
        assert!(check_capacity(0).is_err());
        assert!(check_capacity(1000).is_err());
        assert!(check_capacity(1024).is_ok());
    }
}
