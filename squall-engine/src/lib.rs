//! # squall-engine
//!
//! Transport engine for the squall load generator.
//!
//! The engine is organized around a substrate-agnostic [`PacketIo`] trait:
//! everything above it (window management, task pipeline, prober, responder)
//! is pure logic driven by explicit timestamps, so the same code runs over a
//! real UDP socket or an in-memory link in tests.
//!
//! ## Components
//!
//! - [`Pipeline`]: lock-free task distribution to worker threads
//! - [`ReliableSender`]: sliding-window transfer with RTO retransmission
//! - [`run_blast`]: open-loop maximum-rate transmission
//! - [`run_probe`]: stop-and-wait RTT measurement with percentile reporting
//! - [`run_responder`]: stateless server-side frame reflection

pub mod endpoint;
pub mod engine;
pub mod io;
pub mod pipeline;
pub mod prober;
pub mod responder;
pub mod shutdown;
pub mod stats;
pub mod udp_io;
pub mod window;
pub mod worker;

pub use endpoint::{Endpoint, Mode};
pub use engine::{run_blast, EngineConfig, Progress, ReliableSender, TaskOutcome};
pub use io::{send_all, PacketIo, BURST_RX, BURST_TX};
pub use pipeline::{Pipeline, PipelineError, Task, WorkerQueues};
pub use prober::{percentile_cuts, run_probe, ProbeConfig, ProbeError, RttReport, PERCENTILES};
pub use responder::run_responder;
pub use shutdown::Shutdown;
pub use window::SendWindow;
pub use worker::{run_worker, WorkerConfig};
