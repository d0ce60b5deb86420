//! Packet substrate abstraction.
//!
//! The engine never touches a socket directly; it talks to a [`PacketIo`]
//! implementation that owns frame buffers and the clock. Production uses
//! [`crate::udp_io::UdpEncapIo`]; tests use an in-memory link with a
//! manually advanced clock.

/// Max frames handed to the substrate per send call.
pub const BURST_TX: usize = 32;
/// Max frames pulled from the substrate per receive call.
pub const BURST_RX: usize = 32;

/// Batch-oriented packet substrate.
///
/// Buffer ownership rule: frames move between the engine and the substrate
/// by value. A frame passed to [`send_burst`](PacketIo::send_burst) and
/// accepted belongs to the substrate again; a frame returned from
/// [`recv_burst`](PacketIo::recv_burst) belongs to the caller until freed.
pub trait PacketIo {
    /// Take a frame buffer from the pool. `None` means the pool is
    /// exhausted and the caller must back off.
    fn alloc(&mut self) -> Option<Vec<u8>>;

    /// Transmit a prefix of `frames`, removing accepted frames from the
    /// front of the vec. Returns how many were accepted; zero means the
    /// substrate is congested and the caller should retry.
    fn send_burst(&mut self, frames: &mut Vec<Vec<u8>>) -> usize;

    /// Pull up to `max` received frames into `out`. Returns the count.
    fn recv_burst(&mut self, max: usize, out: &mut Vec<Vec<u8>>) -> usize;

    /// Return frames to the pool without sending them.
    fn free_burst(&mut self, frames: &mut Vec<Vec<u8>>);

    /// Current time in clock cycles. Substrate-owned so tests can script it.
    fn now(&self) -> u64;
}

/// Drain a batch completely, spinning on transient congestion. The burst
/// loops rely on this: a partial send would desynchronize the window
/// bookkeeping from what actually hit the wire.
pub fn send_all<I: PacketIo + ?Sized>(io: &mut I, frames: &mut Vec<Vec<u8>>) {
    while !frames.is_empty() {
        if io.send_burst(frames) == 0 {
            std::hint::spin_loop();
        }
    }
}
