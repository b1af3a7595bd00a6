//! Device health probes.

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::SupervisorError;
use crate::hardware::v4l2::query_capabilities;
use crate::models::HealthState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub state: HealthState,
    pub detail: Option<String>,
}

impl ProbeOutcome {
    pub fn healthy() -> Self {
        Self {
            state: HealthState::Healthy,
            detail: None,
        }
    }

    pub fn absent() -> Self {
        Self {
            state: HealthState::Absent,
            detail: None,
        }
    }

    pub fn unresponsive(detail: impl Into<String>) -> Self {
        Self {
            state: HealthState::Unresponsive,
            detail: Some(detail.into()),
        }
    }

    /// The matching error, or `None` when healthy.
    pub fn to_error(&self, node: &Path) -> Option<SupervisorError> {
        match self.state {
            HealthState::Healthy => None,
            HealthState::Absent => Some(SupervisorError::DeviceAbsent {
                path: node.to_path_buf(),
            }),
            HealthState::Unresponsive => Some(SupervisorError::DeviceUnresponsive {
                path: node.to_path_buf(),
                reason: self.detail.clone().unwrap_or_default(),
            }),
        }
    }
}

pub trait HealthProbe: Send + Sync {
    fn probe(&self, node: &Path) -> ProbeOutcome;
}

/// Node must exist, be a character device, and answer `VIDIOC_QUERYCAP` with a
/// video capture capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Probe;

impl HealthProbe for V4l2Probe {
    fn probe(&self, node: &Path) -> ProbeOutcome {
        let metadata = match fs::metadata(node) {
            Ok(m) => m,
            Err(_) => return ProbeOutcome::absent(),
        };

        if !metadata.file_type().is_char_device() {
            return ProbeOutcome::unresponsive("not a character device");
        }

        match query_capabilities(node) {
            Ok(info) if info.can_capture => ProbeOutcome::healthy(),
            Ok(info) => ProbeOutcome::unresponsive(format!(
                "{} ({}) has no video capture capability",
                info.card, info.driver
            )),
            Err(reason) => ProbeOutcome::unresponsive(reason),
        }
    }
}

/// Probe whose answer is set by hand, for tests and dry runs.
#[derive(Debug)]
pub struct ManualProbe {
    state: Mutex<HealthState>,
    probes: AtomicUsize,
}

impl ManualProbe {
    pub fn new(state: HealthState) -> Self {
        Self {
            state: Mutex::new(state),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, state: HealthState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Number of probes answered so far.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl HealthProbe for ManualProbe {
    fn probe(&self, _node: &Path) -> ProbeOutcome {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let state = self
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(HealthState::Unresponsive);
        match state {
            HealthState::Healthy => ProbeOutcome::healthy(),
            HealthState::Absent => ProbeOutcome::absent(),
            HealthState::Unresponsive => ProbeOutcome::unresponsive("simulated"),
        }
    }
}
