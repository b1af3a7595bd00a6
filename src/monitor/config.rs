//! Configuration for the device monitor

use std::time::Duration;

use crate::models::constants::{ESCALATION_COOLDOWN, PROBE_INTERVAL, REPAIR_SETTLE_INTERVAL};
use crate::repair::RepairPolicy;

/// Configuration for the device monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub probe_interval: Duration,
    /// Wait after a repair attempt before probing again
    pub settle_interval: Duration,
    pub escalation_cooldown: Duration,
    pub policy: RepairPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: PROBE_INTERVAL,
            settle_interval: REPAIR_SETTLE_INTERVAL,
            escalation_cooldown: ESCALATION_COOLDOWN,
            policy: RepairPolicy::default(),
        }
    }
}
