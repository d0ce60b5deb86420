//! Load-generating (client) mode.
//!
//! The coordinator thread slices the requested transfer into tasks and
//! feeds them through the pipeline; pinned worker threads drive the
//! transport. Completed task buffers are recycled so steady state does not
//! allocate.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use squall::affinity;
use squall_engine::udp_io::UdpEncapIo;
use squall_engine::stats::{ResourceSampler, ThroughputReporter};
use squall_engine::worker::WorkerConfig;
use squall_engine::{
    run_worker, Endpoint, EngineConfig, Mode, Pipeline, PipelineError, ProbeConfig, Shutdown, Task,
};
use squall_wire::WireProto;
use tracing::{info, warn};

pub struct ClientOptions {
    pub server: String,
    pub port: u16,
    pub udp: bool,
    pub rtt: bool,
    pub threads: usize,
    pub window: u32,
    pub pkt_size: u16,
    pub data_size: u64,
    pub bufsize: usize,
    pub num_ping: u32,
    pub rtt_path: Option<PathBuf>,
    pub interval: u64,
    pub time: Option<u64>,
    pub cores: Option<String>,
    pub port_base: Option<u16>,
    pub resource_log: Option<PathBuf>,
    pub shutdown: Shutdown,
}

type BoxError = Box<dyn std::error::Error>;

pub fn run(opts: ClientOptions) -> Result<(), BoxError> {
    if opts.threads == 0 {
        return Err("at least one worker thread is required".into());
    }
    if !opts.window.is_power_of_two() {
        return Err("window must be a power of two".into());
    }
    if opts.bufsize == 0 {
        return Err("bufsize must be nonzero".into());
    }
    let proto = if opts.udp { WireProto::Udp } else { WireProto::Tcp };
    if squall_wire::payload_capacity(opts.pkt_size, proto) == 0 {
        return Err(format!("pkt_size {} leaves no room for payload", opts.pkt_size).into());
    }
    if let Some(base) = opts.port_base {
        let in_range = u16::try_from(opts.threads - 1)
            .ok()
            .and_then(|span| base.checked_add(span))
            .is_some();
        if !in_range {
            return Err("port_base plus thread count exceeds the port range".into());
        }
    }
    let peer = resolve(&opts.server, opts.port)?;
    if opts.rtt {
        run_latency(&opts, peer)
    } else {
        run_bandwidth(&opts, peer)
    }
}

fn resolve(server: &str, port: u16) -> Result<SocketAddr, BoxError> {
    (server, port)
        .to_socket_addrs()?
        .find(|a| a.is_ipv4())
        .ok_or_else(|| format!("no IPv4 address for {server}").into())
}

fn connect(peer: SocketAddr, pkt_size: u16, local_port: u16) -> std::io::Result<UdpEncapIo> {
    let local = SocketAddr::from(([0, 0, 0, 0], local_port));
    UdpEncapIo::connect(local, peer, pkt_size as usize)
}

fn worker_config(opts: &ClientOptions) -> WorkerConfig {
    WorkerConfig {
        engine: EngineConfig {
            window: opts.window,
            ..EngineConfig::default()
        },
        probe: ProbeConfig {
            num_probes: opts.num_ping,
            ..ProbeConfig::default()
        },
        rtt_path: opts.rtt_path.clone(),
    }
}

fn run_latency(opts: &ClientOptions, peer: SocketAddr) -> Result<(), BoxError> {
    info!(probes = opts.num_ping, %peer, "latency run starting");
    let mut io = connect(peer, opts.pkt_size, opts.port_base.unwrap_or(0))?;
    let ep = Endpoint {
        id: 0,
        pkt_size: opts.pkt_size,
        mode: Mode::Latency,
        ..Endpoint::default()
    };
    let (_pipeline, mut queues) = Pipeline::new(1, 16)?;
    let cfg = worker_config(opts);
    run_worker(&mut io, &ep, queues.remove(0), &cfg, &opts.shutdown);
    Ok(())
}

fn run_bandwidth(opts: &ClientOptions, peer: SocketAddr) -> Result<(), BoxError> {
    let cores = match &opts.cores {
        Some(list) => Some(affinity::parse_cpulist(list)?).filter(|c| !c.is_empty()),
        None => None,
    };
    let proto = if opts.udp { WireProto::Udp } else { WireProto::Tcp };
    let cfg = worker_config(opts);

    let (pipeline, queues) = Pipeline::new(opts.threads, 65536)?;
    let mut handles = Vec::with_capacity(opts.threads);
    for (i, q) in queues.into_iter().enumerate() {
        let core = cores.as_ref().map(|c| c[i % c.len()]);
        let shutdown = opts.shutdown.clone();
        let cfg = cfg.clone();
        let ep = Endpoint {
            id: i as u32,
            proto,
            pkt_size: opts.pkt_size,
            mode: Mode::Bandwidth,
            ..Endpoint::default()
        };
        let pkt_size = opts.pkt_size;
        // distinct source ports keep flows apart on the reflector side
        let local_port = opts.port_base.map_or(0, |base| base + i as u16);
        handles.push(std::thread::spawn(move || {
            if let Some(core) = core {
                if let Err(e) = affinity::pin_to_core(core) {
                    warn!(worker = ep.id, core, error = %e, "core pinning failed");
                }
            }
            match connect(peer, pkt_size, local_port) {
                Ok(mut io) => run_worker(&mut io, &ep, q, &cfg, &shutdown),
                Err(e) => warn!(worker = ep.id, error = %e, "socket setup failed"),
            }
        }));
    }

    coordinate(opts, &pipeline);

    opts.shutdown.request();
    for h in handles {
        let _ = h.join();
    }
    Ok(())
}

/// Feed tasks until the byte budget or deadline is met, recycling
/// completed buffers and reporting at the configured interval.
fn coordinate(opts: &ClientOptions, pipeline: &Pipeline) {
    let deadline = opts.time.map(|t| Instant::now() + Duration::from_secs(t));
    // --time or -n 0 means run until interrupted
    let open_ended = deadline.is_some() || opts.data_size == 0;
    let total_tasks = if open_ended {
        u64::MAX
    } else {
        opts.data_size.div_ceil(opts.bufsize as u64)
    };
    info!(
        tasks = if open_ended { 0 } else { total_tasks },
        bufsize = opts.bufsize,
        workers = pipeline.workers(),
        "bandwidth run starting"
    );

    let mut reporter = ThroughputReporter::new();
    let mut sampler = opts
        .resource_log
        .as_deref()
        .and_then(|p| match ResourceSampler::create(p) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "resource log unavailable");
                None
            }
        });
    let interval = Duration::from_secs(opts.interval.max(1));
    let mut next_report = Instant::now() + interval;

    let mut issued = 0u64;
    let mut completed = 0u64;
    let mut pending: Option<Task> = None;
    let mut recycled: Vec<Vec<u8>> = Vec::new();

    while completed < total_tasks {
        if opts.shutdown.is_requested() {
            break;
        }
        if let Some(d) = deadline {
            if Instant::now() >= d {
                break;
            }
        }

        // keep a few tasks per worker in flight; deeper queues only cost
        // memory
        let outstanding = issued - completed;
        if issued < total_tasks && outstanding < (pipeline.workers() as u64) * 8 {
            // the final task of a fixed-size run carries the remainder
            let len = if !open_ended && issued == total_tasks - 1 {
                (opts.data_size - (total_tasks - 1) * opts.bufsize as u64) as usize
            } else {
                opts.bufsize
            };
            let task = pending.take().unwrap_or_else(|| {
                let mut payload = recycled.pop().unwrap_or_default();
                payload.resize(len, 0xa5);
                Task::new(issued, payload)
            });
            match pipeline.enqueue(task) {
                Ok(()) => issued += 1,
                Err(PipelineError::Exhausted(task)) => pending = Some(task),
            }
        }

        while let Some(task) = pipeline.dequeue_completion() {
            completed += 1;
            recycled.push(task.payload);
        }

        if Instant::now() >= next_report {
            reporter.report();
            if let Some(s) = sampler.as_mut() {
                if let Err(e) = s.sample() {
                    warn!(error = %e, "resource sample failed");
                }
            }
            next_report += interval;
        }
    }

    // final interval
    reporter.report();
    if let Some(s) = sampler.as_ref() {
        let sum = s.summary();
        info!(
            cpu_min = format_args!("{:.2}", sum.min_pct),
            cpu_avg = format_args!("{:.2}", sum.avg_pct),
            cpu_max = format_args!("{:.2}", sum.max_pct),
            peak_rss_kb = sum.peak_rss_kb,
            "resource summary"
        );
    }
    info!(issued, completed, "bandwidth run finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ClientOptions {
        ClientOptions {
            server: "127.0.0.1".into(),
            port: 5201,
            udp: false,
            rtt: false,
            threads: 1,
            window: 512,
            pkt_size: 1500,
            data_size: 1024,
            bufsize: 1024,
            num_ping: 1,
            rtt_path: None,
            interval: 1,
            time: None,
            cores: None,
            port_base: None,
            resource_log: None,
            shutdown: Shutdown::new(),
        }
    }

    #[test]
    fn undersized_frames_are_rejected() {
        // 54 bytes is exactly the header stack, zero payload capacity
        let opts = ClientOptions {
            pkt_size: 54,
            ..options()
        };
        assert!(run(opts).is_err());
    }

    #[test]
    fn port_base_must_leave_room_for_every_worker() {
        let opts = ClientOptions {
            port_base: Some(65530),
            threads: 16,
            ..options()
        };
        assert!(run(opts).is_err());
    }
}
