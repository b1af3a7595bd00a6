//! Device health monitor
//!
//! Polls the capture device at a fixed interval and runs the repair ladder while it
//! is absent or unresponsive.

mod config;
mod core;
pub mod probe;


pub use config::MonitorConfig;
pub use core::{DeviceMonitor, TickOutcome};
pub use probe::{HealthProbe, ManualProbe, ProbeOutcome, V4l2Probe};
