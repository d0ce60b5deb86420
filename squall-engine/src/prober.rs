//! Stop-and-wait RTT prober.
//!
//! One probe in flight at a time: send a header-only frame carrying a loop
//! sequence, busy-poll for the reflected copy, record the cycle delta. A
//! probe that times out is retried a bounded number of times; exhausting
//! the retries aborts the run with whatever was collected.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use squall::clock;
use squall_wire as wire;
use thiserror::Error;
use tracing::{info, warn};

use crate::endpoint::Endpoint;
use crate::io::PacketIo;

/// Probe timeout, in milliseconds.
pub const PROBE_RTO_MS: u64 = 200;
/// Attempts per probe before declaring the peer unreachable.
pub const PROBE_MAX_RETRY: u32 = 3;
/// Report cut points, in percent.
pub const PERCENTILES: [f64; 8] = [25.0, 50.0, 75.0, 90.0, 99.0, 99.9, 99.99, 99.999];

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub num_probes: u32,
    pub rto_cycles: u64,
    pub max_retry: u32,
    pub rx_burst: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            num_probes: 10_000,
            rto_cycles: clock::ms_to_cycles(PROBE_RTO_MS),
            max_retry: PROBE_MAX_RETRY,
            rx_burst: 8,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    /// A probe failed every retry. The report holds the samples gathered
    /// before the failure so a partial run can still be summarized.
    #[error("peer unreachable after {retries} retries ({} samples collected)", .report.len())]
    Unreachable { retries: u32, report: RttReport },
    /// Probing runs on worker 0 only; other workers decline.
    #[error("worker {0} is not the designated probe worker")]
    NotDesignated(u32),
}

/// Collected samples, sorted ascending, in clock cycles.
#[derive(Debug)]
pub struct RttReport {
    samples: Vec<u64>,
}

impl RttReport {
    fn new(mut samples: Vec<u64>) -> Self {
        samples.sort_unstable();
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn min_us(&self) -> u64 {
        self.samples.first().map_or(0, |&c| clock::cycles_to_us(c))
    }

    pub fn max_us(&self) -> u64 {
        self.samples.last().map_or(0, |&c| clock::cycles_to_us(c))
    }

    /// Percentile cut values in microseconds, paired with [`PERCENTILES`].
    pub fn percentiles_us(&self) -> [(f64, u64); 8] {
        let cuts = percentile_cuts(&self.samples);
        let mut out = [(0.0, 0); 8];
        for (i, (&p, &c)) in PERCENTILES.iter().zip(cuts.iter()).enumerate() {
            out[i] = (p, clock::cycles_to_us(c));
        }
        out
    }

    /// Write every sample in rank order, one per line.
    pub fn write_samples(&self, path: &Path) -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for (i, &cycles) in self.samples.iter().enumerate() {
            writeln!(out, "loop={:06}    rtt={} us", i + 1, clock::cycles_to_us(cycles))?;
        }
        out.flush()
    }

    /// Emit the percentile table and extrema through the log layer.
    pub fn log_summary(&self) {
        for (p, us) in self.percentiles_us() {
            info!(percentile = p, rtt_us = us, "rtt percentile");
        }
        info!(min_us = self.min_us(), max_us = self.max_us(), samples = self.len(), "rtt summary");
    }
}

/// Cut values for [`PERCENTILES`] over an ascending-sorted sample set.
/// Index for percentile `p` is `floor(p / 100 * n)`; empty input yields
/// all zeros.
pub fn percentile_cuts(sorted: &[u64]) -> [u64; 8] {
    let mut cuts = [0u64; 8];
    if sorted.is_empty() {
        return cuts;
    }
    let n = sorted.len();
    for (i, &p) in PERCENTILES.iter().enumerate() {
        let idx = ((p / 100.0) * n as f64) as usize;
        cuts[i] = sorted[idx.min(n - 1)];
    }
    cuts
}

/// Run the full probe loop. Only worker 0 probes; any other endpoint id
/// gets [`ProbeError::NotDesignated`] so concurrent workers do not race on
/// the single probe flow.
pub fn run_probe<I: PacketIo>(
    io: &mut I,
    ep: &Endpoint,
    cfg: &ProbeConfig,
) -> Result<RttReport, ProbeError> {
    if ep.id != 0 {
        warn!(worker = ep.id, "latency mode is single-worker; declining");
        return Err(ProbeError::NotDesignated(ep.id));
    }

    let mut samples = Vec::with_capacity(cfg.num_probes as usize);
    let mut rx_frames: Vec<Vec<u8>> = Vec::with_capacity(cfg.rx_burst);

    'probes: for seq in 0..cfg.num_probes {
        for _attempt in 0..cfg.max_retry {
            let Some(mut buf) = io.alloc() else {
                squall::record_backpressure();
                continue;
            };
            wire::encode_probe(&ep.addr, seq, &mut buf);
            squall::record_send(buf.len() as u64);
            let mut batch = vec![buf];
            crate::io::send_all(io, &mut batch);
            let sent_at = io.now();

            loop {
                io.recv_burst(cfg.rx_burst, &mut rx_frames);
                let mut matched = None;
                for frame in &rx_frames {
                    squall::record_receive(frame.len() as u64);
                    let echoed = wire::parse(frame)
                        .and_then(|p| p.transport.sequence())
                        .is_some_and(|s| s == seq);
                    if echoed {
                        matched = Some(io.now().saturating_sub(sent_at));
                    }
                }
                io.free_burst(&mut rx_frames);
                if let Some(rtt) = matched {
                    samples.push(rtt);
                    continue 'probes;
                }
                if io.now().saturating_sub(sent_at) > cfg.rto_cycles {
                    break;
                }
            }
        }
        return Err(ProbeError::Unreachable {
            retries: cfg.max_retry,
            report: RttReport::new(samples),
        });
    }
    Ok(RttReport::new(samples))
}
