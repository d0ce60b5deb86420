//! In-memory two-endpoint link implementing [`PacketIo`].
//!
//! The clock is owned by the link and advances a fixed tick on every
//! `recv_burst`, so retransmission timeouts fire after a scriptable number
//! of polls. Each endpoint can drop outgoing frames through a
//! [`LossGenerator`], cap how many frames a single `send_burst` accepts,
//! and optionally auto-reflect frames addressed to it the way the real
//! responder would.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use squall_engine::PacketIo;
use squall_wire as wire;

use crate::loss::{DropDecision, LossGenerator};

const DEFAULT_POOL_FRAMES: usize = 4096;
const DEFAULT_FRAME_CAPACITY: usize = 2048;

struct Side {
    /// Frames delivered to this side, oldest first.
    inbox: VecDeque<Vec<u8>>,
    /// Reflect incoming frames back to the sender instead of queueing them.
    reflect: bool,
    reflect_loss: LossGenerator,
}

impl Side {
    fn new() -> Self {
        Self {
            inbox: VecDeque::new(),
            reflect: false,
            reflect_loss: LossGenerator::none(),
        }
    }
}

struct Shared {
    sides: [Side; 2],
}

/// Handle on the link as a whole: the scripted clock.
#[derive(Clone)]
pub struct SimLink {
    clock: Arc<AtomicU64>,
    shared: Arc<Mutex<Shared>>,
}

impl SimLink {
    /// Build a connected endpoint pair. Frames sent by one side arrive at
    /// the other in order, instantly.
    pub fn pair() -> (SimEndpoint, SimEndpoint) {
        let net = SimLink {
            clock: Arc::new(AtomicU64::new(1)),
            shared: Arc::new(Mutex::new(Shared {
                sides: [Side::new(), Side::new()],
            })),
        };
        let a = SimEndpoint::new(net.clone(), 0);
        let b = SimEndpoint::new(net, 1);
        (a, b)
    }

    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Relaxed)
    }

    pub fn advance(&self, cycles: u64) {
        self.clock.fetch_add(cycles, Ordering::Relaxed);
    }
}

pub struct SimEndpoint {
    net: SimLink,
    side: usize,
    pool: Vec<Vec<u8>>,
    send_loss: LossGenerator,
    /// Max frames accepted per `send_burst` call; `usize::MAX` = unlimited.
    accept_limit: usize,
    /// Clock cycles added per `recv_burst` call.
    tick: u64,
    dropped: u64,
}

impl SimEndpoint {
    fn new(net: SimLink, side: usize) -> Self {
        Self {
            net,
            side,
            pool: (0..DEFAULT_POOL_FRAMES)
                .map(|_| Vec::with_capacity(DEFAULT_FRAME_CAPACITY))
                .collect(),
            send_loss: LossGenerator::none(),
            accept_limit: usize::MAX,
            tick: 1,
            dropped: 0,
        }
    }

    pub fn net(&self) -> &SimLink {
        &self.net
    }

    /// Drop pattern applied to frames this endpoint transmits.
    pub fn set_send_loss(&mut self, loss: LossGenerator) {
        self.send_loss = loss;
    }

    /// Cap how many frames a single `send_burst` accepts.
    pub fn set_accept_limit(&mut self, limit: usize) {
        self.accept_limit = limit.max(1);
    }

    /// Clock cycles the link advances on each `recv_burst`.
    pub fn set_tick(&mut self, cycles: u64) {
        self.tick = cycles;
    }

    /// Shrink the frame pool to `frames` buffers.
    pub fn set_pool_frames(&mut self, frames: usize) {
        self.pool.truncate(frames);
    }

    /// Make this endpoint behave like the stateless responder: every frame
    /// addressed to it is reflected back as an acknowledgment (subject to
    /// `loss`) instead of landing in the inbox.
    pub fn enable_reflect(&mut self, loss: LossGenerator) {
        let mut shared = self.net.shared.lock().unwrap();
        shared.sides[self.side].reflect = true;
        shared.sides[self.side].reflect_loss = loss;
    }

    /// Frames this endpoint's send loss pattern has swallowed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Frames waiting in this endpoint's inbox.
    pub fn pending(&self) -> usize {
        self.net.shared.lock().unwrap().sides[self.side].inbox.len()
    }

    /// Inject a raw frame into this endpoint's inbox, bypassing loss.
    pub fn inject(&self, frame: Vec<u8>) {
        let mut shared = self.net.shared.lock().unwrap();
        shared.sides[self.side].inbox.push_back(frame);
    }
}

impl PacketIo for SimEndpoint {
    fn alloc(&mut self) -> Option<Vec<u8>> {
        let mut buf = self.pool.pop()?;
        buf.clear();
        Some(buf)
    }

    fn send_burst(&mut self, frames: &mut Vec<Vec<u8>>) -> usize {
        let accepted = frames.len().min(self.accept_limit);
        let dest = self.side ^ 1;
        let mut shared = self.net.shared.lock().unwrap();
        for frame in frames.drain(..accepted) {
            if self.send_loss.should_drop() == DropDecision::Drop {
                self.dropped += 1;
                self.pool.push(frame);
                continue;
            }
            let side = &mut shared.sides[dest];
            if side.reflect {
                let mut ack = Vec::with_capacity(64);
                if wire::reflect_ack(&frame, &mut ack)
                    && side.reflect_loss.should_drop() == DropDecision::Pass
                {
                    shared.sides[self.side].inbox.push_back(ack);
                }
                self.pool.push(frame);
            } else {
                side.inbox.push_back(frame);
                self.pool.push(self.fresh_backing());
            }
        }
        accepted
    }

    fn recv_burst(&mut self, max: usize, out: &mut Vec<Vec<u8>>) -> usize {
        self.net.advance(self.tick);
        let mut shared = self.net.shared.lock().unwrap();
        let inbox = &mut shared.sides[self.side].inbox;
        let n = max.min(inbox.len());
        for _ in 0..n {
            if let Some(frame) = inbox.pop_front() {
                out.push(frame);
            }
        }
        n
    }

    fn free_burst(&mut self, frames: &mut Vec<Vec<u8>>) {
        for mut frame in frames.drain(..) {
            frame.clear();
            self.pool.push(frame);
        }
    }

    fn now(&self) -> u64 {
        self.net.now()
    }
}

impl SimEndpoint {
    fn fresh_backing(&self) -> Vec<u8> {
        Vec::with_capacity(DEFAULT_FRAME_CAPACITY)
    }
}
