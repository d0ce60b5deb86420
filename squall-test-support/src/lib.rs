//! Test support for the squall engine.
//!
//! - [`loss`]: scripted packet drop decisions for recovery testing
//! - [`sim`]: an in-memory [`squall_engine::PacketIo`] pair with a
//!   manually scripted clock, loss injection and optional auto-reflection

pub mod loss;
pub mod sim;

pub use loss::{DropDecision, LossGenerator, LossPattern};
pub use sim::{SimEndpoint, SimLink};
