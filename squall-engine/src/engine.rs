//! Windowed reliable sender and open-loop blast sender.
//!
//! Both run a busy-polling burst loop over a [`PacketIo`] substrate. The
//! reliable path tracks every in-flight packet in a [`SendWindow`] and
//! retransmits on RTO; the blast path just streams frames as fast as the
//! substrate accepts them.

use squall::clock;
use squall_wire::{self as wire, TransportHeader};
use tracing::{debug, trace};

use crate::endpoint::Endpoint;
use crate::io::{send_all, PacketIo, BURST_RX, BURST_TX};
use crate::pipeline::Task;
use crate::shutdown::Shutdown;
use crate::window::SendWindow;

/// How many loop iterations between shutdown-latch polls.
pub const SHUTDOWN_POLL_INTERVAL: u32 = 4096;

/// Default retransmission timeout for windowed transfer, in milliseconds.
pub const DEFAULT_RTO_MS: u64 = 2;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub window: u32,
    pub rto_cycles: u64,
    pub tx_burst: usize,
    pub rx_burst: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: 512,
            rto_cycles: clock::ms_to_cycles(DEFAULT_RTO_MS),
            tx_burst: BURST_TX,
            rx_burst: BURST_RX,
        }
    }
}

/// Byte/packet progress of one task transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub sent_bytes: u64,
    pub acked_bytes: u64,
    pub sent_pkts: u64,
    pub retransmits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Every payload byte acknowledged.
    Completed,
    /// Shutdown requested before the transfer finished.
    Interrupted,
}

/// Windowed sender, reused across tasks on one worker thread.
pub struct ReliableSender {
    cfg: EngineConfig,
    window: SendWindow,
    rx_frames: Vec<Vec<u8>>,
    tx_frames: Vec<Vec<u8>>,
    stale: Vec<crate::window::Slot>,
}

impl ReliableSender {
    pub fn new(cfg: EngineConfig) -> squall::Result<Self> {
        let window = SendWindow::new(cfg.window)?;
        Ok(Self {
            cfg,
            window,
            rx_frames: Vec::with_capacity(BURST_RX),
            tx_frames: Vec::with_capacity(BURST_TX),
            stale: Vec::with_capacity(BURST_TX),
        })
    }

    /// Window state, for inspection between [`poll`](Self::poll) calls.
    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    /// Transfer one task to completion, polling the shutdown latch every
    /// [`SHUTDOWN_POLL_INTERVAL`] iterations.
    pub fn run<I: PacketIo>(
        &mut self,
        io: &mut I,
        ep: &Endpoint,
        task: &Task,
        shutdown: &Shutdown,
    ) -> (TaskOutcome, Progress) {
        self.window.reset();
        let mut progress = Progress::default();
        let total = task.len() as u64;
        let mut iterations = 0u32;

        while progress.acked_bytes < total {
            self.poll(io, ep, task, &mut progress);
            iterations += 1;
            if iterations >= SHUTDOWN_POLL_INTERVAL {
                iterations = 0;
                if shutdown.is_requested() {
                    debug!(
                        task = task.id,
                        acked = progress.acked_bytes,
                        "transfer interrupted by shutdown"
                    );
                    return (TaskOutcome::Interrupted, progress);
                }
            }
        }
        trace!(task = task.id, pkts = progress.sent_pkts, "task complete");
        (TaskOutcome::Completed, progress)
    }

    /// One engine iteration: harvest acks, advance the frontier, retransmit
    /// stale slots when the window is stalled, then fill with new data and
    /// flush the batch.
    pub fn poll<I: PacketIo>(
        &mut self,
        io: &mut I,
        ep: &Endpoint,
        task: &Task,
        progress: &mut Progress,
    ) {
        let nb_rx = io.recv_burst(self.cfg.rx_burst, &mut self.rx_frames);
        for frame in &self.rx_frames {
            squall::record_receive(frame.len() as u64);
            let Some(parsed) = wire::parse(frame) else {
                continue;
            };
            if let TransportHeader::Tcp(tcp) = parsed.transport {
                if tcp.is_ack() {
                    progress.acked_bytes += self.window.on_ack(tcp.sequence());
                }
            }
        }
        if nb_rx > 0 {
            io.free_burst(&mut self.rx_frames);
            self.window.advance_frontier();
        }

        let all_sent = progress.sent_bytes >= task.len() as u64;
        if self.window.is_full() || (all_sent && !self.window.is_drained()) {
            self.retransmit_stale(io, ep, task, progress);
        }

        if !all_sent {
            self.fill_window(io, ep, task, progress);
        }
    }

    fn retransmit_stale<I: PacketIo>(
        &mut self,
        io: &mut I,
        ep: &Endpoint,
        task: &Task,
        progress: &mut Progress,
    ) {
        let now = io.now();
        self.window
            .stale_slots(now, self.cfg.rto_cycles, self.cfg.tx_burst, &mut self.stale);
        if self.stale.is_empty() {
            return;
        }
        for slot in &self.stale {
            let Some(mut buf) = io.alloc() else {
                squall::record_backpressure();
                break;
            };
            let start = slot.offset as usize;
            let payload = &task.payload[start..start + slot.len as usize];
            wire::encode_data(&ep.addr, ep.proto, slot.seq, payload, &mut buf);
            squall::record_send(buf.len() as u64);
            squall::record_retransmit();
            progress.retransmits += 1;
            self.window.touch(slot.seq, now);
            self.tx_frames.push(buf);
        }
        if !self.tx_frames.is_empty() {
            debug!(count = self.tx_frames.len(), head = self.stale[0].seq, "retransmit sweep");
            send_all(io, &mut self.tx_frames);
        }
    }

    fn fill_window<I: PacketIo>(
        &mut self,
        io: &mut I,
        ep: &Endpoint,
        task: &Task,
        progress: &mut Progress,
    ) {
        let total = task.len() as u64;
        let max_payload = ep.payload_len();
        let mut budget = self.cfg.tx_burst;

        while budget > 0 && !self.window.is_full() && progress.sent_bytes < total {
            let Some(mut buf) = io.alloc() else {
                squall::record_backpressure();
                break;
            };
            let start = progress.sent_bytes as usize;
            let len = max_payload.min(task.len() - start);
            let seq = self.window.next_seq();
            wire::encode_data(&ep.addr, ep.proto, seq, &task.payload[start..start + len], &mut buf);
            self.window.record_send(seq, progress.sent_bytes, len as u16, io.now());
            progress.sent_bytes += len as u64;
            progress.sent_pkts += 1;
            squall::record_send(buf.len() as u64);
            self.tx_frames.push(buf);
            budget -= 1;
        }
        if !self.tx_frames.is_empty() {
            send_all(io, &mut self.tx_frames);
        }
    }
}

/// Open-loop transmission: stream the task's payload in bursts with no
/// window, no acknowledgments and no retransmission. Delivery is best
/// effort; only send-side counters advance.
pub fn run_blast<I: PacketIo>(io: &mut I, ep: &Endpoint, task: &Task) -> Progress {
    let mut progress = Progress::default();
    let total = task.len() as u64;
    let max_payload = ep.payload_len();
    let mut seq = 0u32;
    let mut batch: Vec<Vec<u8>> = Vec::with_capacity(BURST_TX);

    while progress.sent_bytes < total {
        while batch.len() < BURST_TX && progress.sent_bytes < total {
            let Some(mut buf) = io.alloc() else {
                squall::record_backpressure();
                break;
            };
            let start = progress.sent_bytes as usize;
            let len = max_payload.min(task.len() - start);
            wire::encode_data(&ep.addr, ep.proto, seq, &task.payload[start..start + len], &mut buf);
            seq = seq.wrapping_add(1);
            progress.sent_bytes += len as u64;
            progress.sent_pkts += 1;
            squall::record_send(buf.len() as u64);
            batch.push(buf);
        }
        if batch.is_empty() {
            std::hint::spin_loop();
        } else {
            send_all(io, &mut batch);
        }
    }
    progress
}
