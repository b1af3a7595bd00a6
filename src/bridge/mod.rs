//! Bridging-process supervisor
//!
//! Keeps the feed process that copies the capture device into the loopback sink
//! running, and restarts it when it dies.

mod command;
mod supervisor;


pub use command::BridgeCommand;
pub use supervisor::{BridgeSupervisor, BridgeTimings};
