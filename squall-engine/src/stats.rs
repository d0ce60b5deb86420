//! Periodic runtime statistics.
//!
//! [`ThroughputReporter`] turns counter deltas into packet and bit rates.
//! [`ResourceSampler`] reads process CPU and memory figures out of /proc
//! and appends one row per interval to a log file.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use squall::CounterSnapshot;
use tracing::info;

/// Preamble, frame gap and FCS bytes per frame on the physical link.
pub const LINK_OVERHEAD_BYTES: u64 = 20;

/// Accumulates counter snapshots and logs rates for the interval between
/// consecutive calls.
pub struct ThroughputReporter {
    prev: CounterSnapshot,
    prev_at: Instant,
}

impl Default for ThroughputReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputReporter {
    pub fn new() -> Self {
        Self {
            prev: CounterSnapshot::take(),
            prev_at: Instant::now(),
        }
    }

    /// Log the interval's TX/RX rates and return the interval length in
    /// seconds.
    pub fn report(&mut self) -> f64 {
        let now_snap = CounterSnapshot::take();
        let now = Instant::now();
        let secs = now.duration_since(self.prev_at).as_secs_f64().max(1e-9);
        let delta = now_snap.since(&self.prev);

        let tx_gbps = wire_gbps(delta.sent_bytes, delta.sent_pkts, secs);
        let rx_gbps = wire_gbps(delta.recv_bytes, delta.recv_pkts, secs);
        info!(
            tx_pkts = delta.sent_pkts,
            tx_mpps = format_args!("{:.3}", delta.sent_pkts as f64 / secs / 1e6),
            tx_gbps = format_args!("{:.3}", tx_gbps),
            rx_pkts = delta.recv_pkts,
            rx_gbps = format_args!("{:.3}", rx_gbps),
            retransmits = delta.retransmits,
            "throughput"
        );

        self.prev = now_snap;
        self.prev_at = now;
        secs
    }
}

/// Gigabits per second on the wire, counting per-frame link overhead.
pub fn wire_gbps(bytes: u64, pkts: u64, secs: f64) -> f64 {
    let wire_bytes = bytes + pkts * LINK_OVERHEAD_BYTES;
    (wire_bytes * 8) as f64 / secs / 1e9
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceUsage {
    pub user_pct: f64,
    pub sys_pct: f64,
    pub total_pct: f64,
    pub rss_kb: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct CpuTimes {
    /// Process user + child-less system jiffies.
    utime: u64,
    stime: u64,
    /// Machine-wide jiffies across all CPUs.
    machine: u64,
}

/// Min, mean and max CPU share across a run, with the peak resident set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceSummary {
    pub min_pct: f64,
    pub avg_pct: f64,
    pub max_pct: f64,
    pub peak_rss_kb: u64,
}

/// Samples process CPU share and resident set size, appending one row per
/// sample to a log file.
pub struct ResourceSampler {
    log: File,
    prev: Option<CpuTimes>,
    rows: u64,
    min_pct: f64,
    max_pct: f64,
    sum_pct: f64,
    measured: u64,
    peak_rss_kb: u64,
}

impl ResourceSampler {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let mut log = File::create(path)?;
        writeln!(log, "{:>8} {:>8} {:>8} {:>8} {:>12}", "row", "user%", "sys%", "cpu%", "rss_kb")?;
        Ok(Self {
            log,
            prev: None,
            rows: 0,
            min_pct: f64::MAX,
            max_pct: 0.0,
            sum_pct: 0.0,
            measured: 0,
            peak_rss_kb: 0,
        })
    }

    /// Take one sample. The first call establishes the baseline and
    /// reports zero CPU share.
    pub fn sample(&mut self) -> std::io::Result<ResourceUsage> {
        let cur = read_cpu_times()?;
        let rss_kb = read_rss_kb()?;
        let usage = match self.prev {
            Some(prev) if cur.machine > prev.machine => {
                let machine = (cur.machine - prev.machine) as f64;
                let user = (cur.utime.saturating_sub(prev.utime)) as f64;
                let sys = (cur.stime.saturating_sub(prev.stime)) as f64;
                let usage = ResourceUsage {
                    user_pct: user / machine * 100.0,
                    sys_pct: sys / machine * 100.0,
                    total_pct: (user + sys) / machine * 100.0,
                    rss_kb,
                };
                // the baseline row carries no CPU figure, so it stays out
                // of the aggregates
                self.min_pct = self.min_pct.min(usage.total_pct);
                self.max_pct = self.max_pct.max(usage.total_pct);
                self.sum_pct += usage.total_pct;
                self.measured += 1;
                usage
            }
            _ => ResourceUsage {
                rss_kb,
                ..ResourceUsage::default()
            },
        };
        self.peak_rss_kb = self.peak_rss_kb.max(rss_kb);
        self.prev = Some(cur);
        self.rows += 1;
        writeln!(
            self.log,
            "{:>8} {:>8.2} {:>8.2} {:>8.2} {:>12}",
            self.rows, usage.user_pct, usage.sys_pct, usage.total_pct, usage.rss_kb
        )?;
        Ok(usage)
    }

    /// Aggregate of every CPU-bearing sample taken so far.
    pub fn summary(&self) -> ResourceSummary {
        if self.measured == 0 {
            return ResourceSummary {
                peak_rss_kb: self.peak_rss_kb,
                ..ResourceSummary::default()
            };
        }
        ResourceSummary {
            min_pct: self.min_pct,
            avg_pct: self.sum_pct / self.measured as f64,
            max_pct: self.max_pct,
            peak_rss_kb: self.peak_rss_kb,
        }
    }
}

#[cfg(target_os = "linux")]
fn read_cpu_times() -> std::io::Result<CpuTimes> {
    let stat = std::fs::read_to_string("/proc/self/stat")?;
    let machine = std::fs::read_to_string("/proc/stat")?;
    parse_cpu_times(&stat, &machine)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed /proc stat"))
}

#[cfg(target_os = "linux")]
fn read_rss_kb() -> std::io::Result<u64> {
    let status = std::fs::read_to_string("/proc/self/status")?;
    Ok(parse_rss_kb(&status).unwrap_or(0))
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_times() -> std::io::Result<CpuTimes> {
    Ok(CpuTimes::default())
}

#[cfg(not(target_os = "linux"))]
fn read_rss_kb() -> std::io::Result<u64> {
    Ok(0)
}

/// Parse utime/stime out of /proc/self/stat and the all-CPU jiffy total
/// out of /proc/stat. The comm field may contain spaces, so fields are
/// counted from after the closing paren.
fn parse_cpu_times(self_stat: &str, machine_stat: &str) -> Option<CpuTimes> {
    let rest = &self_stat[self_stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // utime and stime are stat fields 14 and 15; `rest` starts at field 3
    let utime = fields.get(11)?.parse().ok()?;
    let stime = fields.get(12)?.parse().ok()?;

    let cpu_line = machine_stat.lines().next()?;
    let machine = cpu_line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse::<u64>().unwrap_or(0))
        .sum();

    Some(CpuTimes {
        utime,
        stime,
        machine,
    })
}

fn parse_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|l| l.starts_with("VmRSS:"))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}
