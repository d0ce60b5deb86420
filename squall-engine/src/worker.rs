//! Worker thread body.
//!
//! A bandwidth worker pops tasks off its todo ring, pushes each through the
//! transport (windowed or open-loop by protocol), then hands the finished
//! task to the completion ring. A latency worker runs the probe loop once
//! and exits.

use std::path::{Path, PathBuf};

use squall_wire::WireProto;
use tracing::{debug, error, info, warn};

use crate::endpoint::{Endpoint, Mode};
use crate::engine::{run_blast, EngineConfig, ReliableSender, TaskOutcome};
use crate::io::PacketIo;
use crate::pipeline::WorkerQueues;
use crate::prober::{run_probe, ProbeConfig, ProbeError, RttReport};
use crate::shutdown::Shutdown;

/// Iterations between shutdown polls while the todo ring is idle.
const IDLE_POLL_INTERVAL: u32 = 16384;

#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    pub engine: EngineConfig,
    pub probe: ProbeConfig,
    /// Where the latency worker writes its per-probe samples, if anywhere.
    pub rtt_path: Option<PathBuf>,
}

/// Run one worker to completion. Returns when shutdown is requested or,
/// in latency mode, when the probe run ends.
pub fn run_worker<I: PacketIo>(
    io: &mut I,
    ep: &Endpoint,
    queues: WorkerQueues,
    cfg: &WorkerConfig,
    shutdown: &Shutdown,
) {
    if ep.mode == Mode::Latency {
        run_latency(io, ep, cfg);
        return;
    }

    let mut sender = match ReliableSender::new(cfg.engine.clone()) {
        Ok(s) => s,
        Err(e) => {
            error!(worker = ep.id, error = %e, "worker setup failed");
            return;
        }
    };

    debug!(worker = ep.id, "bandwidth worker running");
    let mut idle = 0u32;
    loop {
        if let Some(task) = queues.todo.try_pop() {
            idle = 0;
            match ep.proto {
                WireProto::Tcp => {
                    let (outcome, _) = sender.run(io, ep, &task, shutdown);
                    queues.complete(task);
                    if outcome == TaskOutcome::Interrupted {
                        return;
                    }
                }
                WireProto::Udp => {
                    run_blast(io, ep, &task);
                    queues.complete(task);
                }
            }
            continue;
        }
        idle += 1;
        if idle >= IDLE_POLL_INTERVAL {
            idle = 0;
            if shutdown.is_requested() {
                debug!(worker = ep.id, "worker stopping");
                return;
            }
        }
        std::hint::spin_loop();
    }
}

fn run_latency<I: PacketIo>(io: &mut I, ep: &Endpoint, cfg: &WorkerConfig) {
    match run_probe(io, ep, &cfg.probe) {
        Ok(report) => {
            report.log_summary();
            persist_samples(&report, cfg.rtt_path.as_deref());
        }
        Err(ProbeError::NotDesignated(id)) => {
            warn!(worker = id, "skipping latency run");
        }
        // a dead peer still gets a report over whatever came back
        Err(ProbeError::Unreachable { retries, report }) => {
            error!(retries, samples = report.len(), "peer unreachable; partial results follow");
            report.log_summary();
            persist_samples(&report, cfg.rtt_path.as_deref());
        }
    }
}

fn persist_samples(report: &RttReport, path: Option<&Path>) {
    let Some(path) = path else { return };
    match report.write_samples(path) {
        Ok(()) => info!(path = %path.display(), "rtt samples written"),
        Err(e) => error!(error = %e, "failed to write rtt samples"),
    }
}
