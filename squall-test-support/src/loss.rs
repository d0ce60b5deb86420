//! Packet loss injection for transport recovery testing.
//!
//! Decisions are keyed by frame ordinal (the running count of frames
//! presented), not by wire sequence, so a retransmitted packet gets a
//! fresh decision.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropDecision {
    Drop,
    Pass,
}

#[derive(Debug, Clone)]
pub enum LossPattern {
    /// Pass everything.
    None,
    /// Drop everything.
    All,
    /// Drop every Nth frame.
    Periodic { every_n: u64 },
    /// Drop frames randomly with the given probability (0.0-1.0).
    Random { probability: f64 },
    /// Drop a contiguous run of frame ordinals.
    Burst { start: u64, length: u64 },
    /// Drop specific frame ordinals (zero-based).
    Specific { ordinals: HashSet<u64> },
}

/// Generates drop decisions for frames flowing through a simulated link.
/// Seeded RNG keeps random patterns reproducible across runs.
pub struct LossGenerator {
    pattern: LossPattern,
    presented: u64,
    dropped: u64,
    rng: StdRng,
}

impl LossGenerator {
    pub fn new(pattern: LossPattern) -> Self {
        Self {
            pattern,
            presented: 0,
            dropped: 0,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    pub fn none() -> Self {
        Self::new(LossPattern::None)
    }

    pub fn all() -> Self {
        Self::new(LossPattern::All)
    }

    pub fn periodic(every_n: u64) -> Self {
        Self::new(LossPattern::Periodic { every_n })
    }

    pub fn random(probability: f64) -> Self {
        Self::new(LossPattern::Random {
            probability: probability.clamp(0.0, 1.0),
        })
    }

    pub fn burst(start: u64, length: u64) -> Self {
        Self::new(LossPattern::Burst { start, length })
    }

    pub fn specific(ordinals: impl IntoIterator<Item = u64>) -> Self {
        Self::new(LossPattern::Specific {
            ordinals: ordinals.into_iter().collect(),
        })
    }

    /// Decide the fate of the next presented frame.
    pub fn should_drop(&mut self) -> DropDecision {
        let ordinal = self.presented;
        self.presented += 1;
        let decision = match &self.pattern {
            LossPattern::None => DropDecision::Pass,
            LossPattern::All => DropDecision::Drop,
            LossPattern::Periodic { every_n } => {
                if *every_n > 0 && (ordinal + 1) % every_n == 0 {
                    DropDecision::Drop
                } else {
                    DropDecision::Pass
                }
            }
            LossPattern::Random { probability } => {
                if self.rng.gen::<f64>() < *probability {
                    DropDecision::Drop
                } else {
                    DropDecision::Pass
                }
            }
            LossPattern::Burst { start, length } => {
                if ordinal >= *start && ordinal < start + length {
                    DropDecision::Drop
                } else {
                    DropDecision::Pass
                }
            }
            LossPattern::Specific { ordinals } => {
                if ordinals.contains(&ordinal) {
                    DropDecision::Drop
                } else {
                    DropDecision::Pass
                }
            }
        };
        if decision == DropDecision::Drop {
            self.dropped += 1;
        }
        decision
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
