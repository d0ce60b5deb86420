//! squall-perf: generate load against a reflector and report throughput or
//! round-trip latency.

mod client;
mod server;

use std::path::PathBuf;
use std::sync::OnceLock;

use clap::{Parser, Subcommand};
use squall_engine::Shutdown;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "squall-perf")]
#[command(about = "Kernel-socket latency and throughput load generator", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the stateless reflector
    Server {
        /// Address to bind
        #[arg(short, long, default_value = "0.0.0.0")]
        bind: String,

        /// Port to listen on
        #[arg(short, long, default_value = "5201")]
        port: u16,

        /// Pin the reflector thread to this core
        #[arg(long)]
        core: Option<usize>,
    },

    /// Generate load against a reflector
    Client {
        /// Reflector address
        server: String,

        /// Reflector port
        #[arg(short, long, default_value = "5201")]
        port: u16,

        /// Open-loop UDP-style blast instead of windowed transfer
        #[arg(short, long)]
        udp: bool,

        /// Measure round-trip latency instead of throughput
        #[arg(long)]
        rtt: bool,

        /// Number of worker threads
        #[arg(short = 'P', long, default_value = "1")]
        threads: usize,

        /// Send window in packets (power of two)
        #[arg(short, long, default_value = "512")]
        window: u32,

        /// Frame size on the wire, headers included
        #[arg(long, default_value = "1500")]
        pkt_size: u16,

        /// Total bytes to transfer (ignored with --time)
        #[arg(short = 'n', long, default_value = "1073741824")]
        data_size: u64,

        /// Bytes per task handed to a worker
        #[arg(short = 'l', long, default_value = "1048576")]
        bufsize: usize,

        /// Probes to send in --rtt mode
        #[arg(long, default_value = "10000")]
        num_ping: u32,

        /// Write per-probe samples here in --rtt mode
        #[arg(long)]
        rtt_path: Option<PathBuf>,

        /// Seconds between periodic reports
        #[arg(short, long, default_value = "1")]
        interval: u64,

        /// Run for this many seconds, recycling tasks, instead of a fixed
        /// byte count
        #[arg(short, long)]
        time: Option<u64>,

        /// Cores to pin worker threads to, e.g. "0-3,8"
        #[arg(long)]
        cores: Option<String>,

        /// Bind worker sockets to base + worker id instead of ephemeral
        /// ports
        #[arg(long)]
        port_base: Option<u16>,

        /// Append CPU and memory samples to this file
        #[arg(long)]
        resource_log: Option<PathBuf>,
    },
}

static SHUTDOWN: OnceLock<Shutdown> = OnceLock::new();

extern "C" fn on_signal(_sig: libc::c_int) {
    if let Some(s) = SHUTDOWN.get() {
        s.request();
    }
}

fn install_signal_handlers(shutdown: &Shutdown) {
    let _ = SHUTDOWN.set(shutdown.clone());
    // Safety: handler only touches an atomic latch
    unsafe {
        libc::signal(libc::SIGINT, on_signal as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as *const () as libc::sighandler_t);
    }
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let shutdown = Shutdown::new();
    install_signal_handlers(&shutdown);

    let result = match cli.command {
        Commands::Server { bind, port, core } => server::run(&bind, port, core, &shutdown),
        Commands::Client {
            server,
            port,
            udp,
            rtt,
            threads,
            window,
            pkt_size,
            data_size,
            bufsize,
            num_ping,
            rtt_path,
            interval,
            time,
            cores,
            port_base,
            resource_log,
        } => client::run(client::ClientOptions {
            server,
            port,
            udp,
            rtt,
            threads,
            window,
            pkt_size,
            data_size,
            bufsize,
            num_ping,
            rtt_path,
            interval,
            time,
            cores,
            port_base,
            resource_log,
            shutdown,
        }),
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            std::process::ExitCode::FAILURE
        }
    }
}
