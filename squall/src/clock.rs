//! Monotonic cycle counter.
//!
//! Timestamps in the transport engine are raw TSC reads on x86_64; the
//! retransmission timeout and the RTT report convert through a calibrated
//! cycles-per-second value. Non-x86 targets fall back to `Instant`
//! nanoseconds, which keeps the same u64 arithmetic.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Read the monotonic cycle counter.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn now() -> u64 {
    // Safe: _rdtsc has no memory effects
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
pub fn now() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos() as u64
}

/// Counter frequency in cycles per second, calibrated once on first use.
pub fn cycles_per_sec() -> u64 {
    static HZ: OnceLock<u64> = OnceLock::new();
    *HZ.get_or_init(calibrate)
}

#[cfg(target_arch = "x86_64")]
fn calibrate() -> u64 {
    let t0 = Instant::now();
    let c0 = now();
    std::thread::sleep(Duration::from_millis(20));
    let c1 = now();
    let elapsed = t0.elapsed();
    let cycles = c1.wrapping_sub(c0) as u128;
    ((cycles * 1_000_000_000) / elapsed.as_nanos().max(1)) as u64
}

#[cfg(not(target_arch = "x86_64"))]
fn calibrate() -> u64 {
    1_000_000_000
}

/// Convert a millisecond duration into cycle-counter units.
#[inline]
pub fn ms_to_cycles(ms: u64) -> u64 {
    (cycles_per_sec() / 1000) * ms
}

/// Convert a cycle delta into microseconds.
#[inline]
pub fn cycles_to_us(cycles: u64) -> u64 {
    cycles / (cycles_per_sec() / 1_000_000).max(1)
}
