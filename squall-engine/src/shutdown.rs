//! Shared shutdown latch polled by worker hot loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-way latch: once requested it never clears. Hot loops poll it at a
/// fixed iteration interval rather than every packet, so the flag stays off
/// the fast path.
#[derive(Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Relaxed load; the latch is monotonic so stale reads only delay exit
    /// by one polling interval.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_is_sticky() {
        let s = Shutdown::new();
        assert!(!s.is_requested());
        s.request();
        assert!(s.is_requested());
        s.request();
        assert!(s.is_requested());
    }

    #[test]
    fn clones_share_state() {
        let s = Shutdown::new();
        let c = s.clone();
        c.request();
        assert!(s.is_requested());
    }
}
