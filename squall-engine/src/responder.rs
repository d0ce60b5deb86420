//! Stateless server-side reflector.
//!
//! For every windowed-transport frame received, build an acknowledgment in
//! a fresh buffer with the addressing swapped and echo it back. No flow
//! state is kept; open-loop (UDP-like) traffic is counted and dropped.

use squall_wire as wire;
use tracing::debug;

use crate::engine::SHUTDOWN_POLL_INTERVAL;
use crate::io::{send_all, PacketIo, BURST_RX};
use crate::shutdown::Shutdown;

/// Busy-poll until shutdown, reflecting every reflectable frame.
pub fn run_responder<I: PacketIo>(io: &mut I, shutdown: &Shutdown) {
    let mut rx_frames: Vec<Vec<u8>> = Vec::with_capacity(BURST_RX);
    let mut tx_frames: Vec<Vec<u8>> = Vec::with_capacity(BURST_RX);
    let mut iterations = 0u32;
    let mut reflected = 0u64;

    loop {
        let nb_rx = io.recv_burst(BURST_RX, &mut rx_frames);
        if nb_rx > 0 {
            for frame in &rx_frames {
                squall::record_receive(frame.len() as u64);
                let Some(mut out) = io.alloc() else {
                    squall::record_backpressure();
                    break;
                };
                if wire::reflect_ack(frame, &mut out) {
                    squall::record_send(out.len() as u64);
                    reflected += 1;
                    tx_frames.push(out);
                } else {
                    let mut one = vec![out];
                    io.free_burst(&mut one);
                }
            }
            io.free_burst(&mut rx_frames);
            send_all(io, &mut tx_frames);
        }

        iterations += 1;
        if iterations >= SHUTDOWN_POLL_INTERVAL {
            iterations = 0;
            if shutdown.is_requested() {
                debug!(reflected, "responder stopping");
                return;
            }
        }
    }
}
