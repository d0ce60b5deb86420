//! Fixed-size sliding send window.
//!
//! The slot array holds twice the window size so that a sequence number and
//! the one a full window ahead of it never share a slot. Slots are keyed by
//! `seq & mask`; a slot with `ts == 0` is free. Two cursors track progress:
//! `last_sent` is the newest sequence handed to the wire, `last_acked` the
//! newest sequence below which everything is acknowledged. Both start at
//! `u32::MAX` so the first packet carries sequence 0 and wrapping arithmetic
//! stays uniform across the 32-bit rollover.

use squall::{Result, SquallError};

/// One in-flight packet's bookkeeping. `ts == 0` marks the slot free.
#[derive(Debug, Clone, Copy, Default)]
pub struct Slot {
    pub ts: u64,
    pub seq: u32,
    pub offset: u64,
    pub len: u16,
}

pub struct SendWindow {
    slots: Box<[Slot]>,
    mask: u32,
    window: u32,
    last_sent: u32,
    last_acked: u32,
}

impl SendWindow {
    /// Window of `window` packets backed by `2 * window` slots.
    pub fn new(window: u32) -> Result<Self> {
        if window == 0 || !window.is_power_of_two() {
            return Err(SquallError::config("window size must be a power of 2"));
        }
        let cap = (window as usize) * 2;
        Ok(Self {
            slots: vec![Slot::default(); cap].into_boxed_slice(),
            mask: cap as u32 - 1,
            window,
            last_sent: u32::MAX,
            last_acked: u32::MAX,
        })
    }

    /// Clear all slots and rewind both cursors for a fresh task.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = Slot::default();
        }
        self.last_sent = u32::MAX;
        self.last_acked = u32::MAX;
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn last_sent(&self) -> u32 {
        self.last_sent
    }

    pub fn last_acked(&self) -> u32 {
        self.last_acked
    }

    /// Packets sent but not yet covered by the contiguous ack frontier.
    pub fn in_flight(&self) -> u32 {
        self.last_sent.wrapping_sub(self.last_acked)
    }

    pub fn is_full(&self) -> bool {
        self.in_flight() >= self.window
    }

    /// All sent packets acknowledged (also true before the first send).
    pub fn is_drained(&self) -> bool {
        self.last_sent == self.last_acked
    }

    fn index(&self, seq: u32) -> usize {
        (seq & self.mask) as usize
    }

    /// Next sequence to transmit; call [`record_send`](Self::record_send)
    /// once the frame is built.
    pub fn next_seq(&self) -> u32 {
        self.last_sent.wrapping_add(1)
    }

    /// Occupy the slot for a freshly transmitted packet and advance
    /// `last_sent`. `ts` must be nonzero.
    pub fn record_send(&mut self, seq: u32, offset: u64, len: u16, ts: u64) {
        debug_assert_eq!(seq, self.next_seq());
        debug_assert!(ts != 0);
        let idx = self.index(seq);
        debug_assert_eq!(self.slots[idx].ts, 0, "slot reused while unacked");
        self.slots[idx] = Slot {
            ts,
            seq,
            offset,
            len,
        };
        self.last_sent = seq;
    }

    /// Credit an acknowledgment. If `seq` indexes a slot holding exactly
    /// that sequence, the slot is freed and its payload length returned;
    /// otherwise the ack is stale or duplicate and credits nothing.
    pub fn on_ack(&mut self, seq: u32) -> u64 {
        let idx = self.index(seq);
        let slot = &mut self.slots[idx];
        if slot.ts != 0 && slot.seq == seq {
            slot.ts = 0;
            slot.len as u64
        } else {
            0
        }
    }

    /// Advance `last_acked` over every contiguously freed slot.
    pub fn advance_frontier(&mut self) {
        while self.last_acked != self.last_sent {
            let next = self.last_acked.wrapping_add(1);
            if self.slots[self.index(next)].ts != 0 {
                break;
            }
            self.last_acked = next;
        }
    }

    /// Copy of the slot currently keyed by `seq`, occupied or not.
    pub fn slot(&self, seq: u32) -> Slot {
        self.slots[self.index(seq)]
    }

    /// The oldest unacked slot if it has been waiting since before
    /// `now - rto_cycles`, plus up to `max - 1` of its successors in
    /// sequence order. Used for the retransmit sweep.
    pub fn stale_slots(&self, now: u64, rto_cycles: u64, max: usize, out: &mut Vec<Slot>) {
        out.clear();
        for i in 0..max as u32 {
            let seq = self.last_acked.wrapping_add(1).wrapping_add(i);
            if seq.wrapping_sub(self.last_acked) > self.in_flight() {
                break;
            }
            let slot = self.slots[self.index(seq)];
            if slot.ts == 0 || slot.seq != seq {
                break;
            }
            if now < slot.ts.saturating_add(rto_cycles) {
                break;
            }
            out.push(slot);
        }
    }

    /// Refresh a slot's timestamp after retransmitting it.
    pub fn touch(&mut self, seq: u32, ts: u64) {
        let idx = self.index(seq);
        if self.slots[idx].ts != 0 && self.slots[idx].seq == seq {
            self.slots[idx].ts = ts;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(window: u32) -> SendWindow {
        let mut w = SendWindow::new(window).unwrap();
        for i in 0..window {
            let seq = w.next_seq();
            assert_eq!(seq, i);
            w.record_send(seq, i as u64 * 100, 100, 10);
        }
        w
    }

    #[test]
    fn rejects_bad_sizes() {
        assert!(SendWindow::new(0).is_err());
        assert!(SendWindow::new(100).is_err());
        assert!(SendWindow::new(512).is_ok());
    }

    #[test]
    fn in_flight_never_exceeds_window() {
        let w = filled(8);
        assert_eq!(w.in_flight(), 8);
        assert!(w.is_full());
    }

    #[test]
    fn out_of_order_acks_credit_eagerly_but_frontier_waits() {
        let mut w = filled(8);
        // ack 2 and 3, leaving 0 and 1 outstanding
        assert_eq!(w.on_ack(2), 100);
        assert_eq!(w.on_ack(3), 100);
        w.advance_frontier();
        assert_eq!(w.last_acked(), u32::MAX);
        assert_eq!(w.in_flight(), 8);

        // filling the gap releases the whole run
        assert_eq!(w.on_ack(0), 100);
        assert_eq!(w.on_ack(1), 100);
        w.advance_frontier();
        assert_eq!(w.last_acked(), 3);
        assert_eq!(w.in_flight(), 4);
        assert!(!w.is_full());
    }

    #[test]
    fn duplicate_and_stale_acks_credit_nothing() {
        let mut w = filled(4);
        assert_eq!(w.on_ack(1), 100);
        assert_eq!(w.on_ack(1), 0);
        // never sent
        assert_eq!(w.on_ack(77), 0);
    }

    #[test]
    fn slot_not_shared_within_double_window() {
        let mut w = SendWindow::new(4).unwrap();
        // drive several full window cycles; each seq must land in a free slot
        for round in 0..8u32 {
            for _ in 0..4 {
                let seq = w.next_seq();
                w.record_send(seq, 0, 50, 10);
            }
            assert!(w.is_full());
            for i in 0..4 {
                assert_eq!(w.on_ack(round * 4 + i), 50);
            }
            w.advance_frontier();
            assert!(w.is_drained());
        }
    }

    #[test]
    fn stale_slots_respects_rto_and_order() {
        let mut w = filled(8);
        let mut out = Vec::new();

        // nothing stale yet at t=10+rto-1
        w.stale_slots(109, 100, 32, &mut out);
        assert!(out.is_empty());

        // everything stale at t=110
        w.stale_slots(110, 100, 3, &mut out);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].seq, 0);
        assert_eq!(out[2].seq, 2);

        // refreshing the head stops the sweep at it next time
        w.touch(0, 200);
        w.stale_slots(210, 100, 8, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn stale_sweep_stops_at_first_acked_hole() {
        let mut w = filled(8);
        w.on_ack(1);
        let mut out = Vec::new();
        w.stale_slots(1000, 100, 8, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].seq, 0);
    }

    #[test]
    fn reset_rewinds_cursors() {
        let mut w = filled(4);
        w.reset();
        assert_eq!(w.last_sent(), u32::MAX);
        assert_eq!(w.last_acked(), u32::MAX);
        assert!(w.is_drained());
        assert_eq!(w.next_seq(), 0);
        assert_eq!(w.on_ack(0), 0);
    }

    #[test]
    fn cursors_wrap_from_sentinel() {
        let mut w = SendWindow::new(4).unwrap();
        // both cursors start at u32::MAX; the first sends wrap through zero
        for _ in 0..2 {
            let seq = w.next_seq();
            w.record_send(seq, 0, 10, 5);
            assert_eq!(w.on_ack(seq), 10);
            w.advance_frontier();
        }
        assert_eq!(w.last_acked(), 1);
        assert!(w.is_drained());
    }
}
