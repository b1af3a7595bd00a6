use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one probe cycle.
///
/// `Absent` and `Unresponsive` are kept apart because the device node missing
/// and the node present but refusing a capability query call for different repairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthState {
    Healthy,
    Absent,
    Unresponsive,
}

impl HealthState {
    pub fn is_healthy(self) -> bool {
        matches!(self, HealthState::Healthy)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Healthy => "healthy",
            HealthState::Absent => "absent",
            HealthState::Unresponsive => "unresponsive",
        };
        f.write_str(s)
    }
}

/// Consecutive remediation attempts for one resource.
///
/// Reset to zero the moment the resource is seen healthy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryCounter {
    attempts: u32,
}

impl RecoveryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record one more attempt and return the new count.
    pub fn increment(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Whether the count has gone past `bound`.
    pub fn exceeds(&self, bound: u32) -> bool {
        self.attempts > bound
    }

    /// Feed one probe result into the counter.
    pub fn observe(&mut self, state: HealthState) -> u32 {
        if state.is_healthy() {
            self.reset();
            0
        } else {
            self.increment()
        }
    }
}
