//! Supervision error taxonomy.
//!
//! Hardware step failures are never fatal on their own; the repair ladder logs them and
//! moves on. Only `RecoveryThresholdExceeded` and `PreflightFailed` end the orchestrator.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("device node {path} is absent")]
    DeviceAbsent { path: PathBuf },

    #[error("device node {path} is unresponsive: {reason}")]
    DeviceUnresponsive { path: PathBuf, reason: String },

    #[error("soft reset failed: {0}")]
    ResetFailed(String),

    #[error("driver rebind failed: {0}")]
    RebindFailed(String),

    #[error("hub power cycle unavailable: {0}")]
    HubCycleUnavailable(String),

    #[error("bridging process could not be started: {0}")]
    BridgeNeverStarted(String),

    #[error("bridging process (pid {pid}) died{}", exit_suffix(.code))]
    BridgingProcessDied { pid: u32, code: Option<i32> },

    #[error("consumer crashed with exit code {code}")]
    ConsumerCrashed { code: i32 },

    #[error("consumer crashed {crashes} times, exceeding the threshold of {threshold}")]
    RecoveryThresholdExceeded { crashes: u32, threshold: u32 },

    #[error("service '{service}' could not be controlled: {reason}")]
    ServiceControlFailed { service: String, reason: String },

    #[error("preflight check failed: {0}")]
    PreflightFailed(String),
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => String::new(),
    }
}

impl SupervisorError {
    /// Process exit code for errors that terminate the orchestrator.
    pub fn exit_code(&self) -> u8 {
        match self {
            SupervisorError::PreflightFailed(_) => 2,
            _ => 1,
        }
    }
}
