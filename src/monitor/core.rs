//! Core DeviceMonitor implementation

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::config::MonitorConfig;
use super::probe::HealthProbe;
use crate::diagnosis::{print_escalation_guidance, EscalationContext};
use crate::hardware::UsbLocation;
use crate::models::{DeviceTarget, HealthState, RecoveryCounter};
use crate::repair::{PlanContext, RepairLadder, RepairPlan, RepairReport};
use crate::utils::sleep_unless_stopped;

/// What one probe cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Healthy,
    Repaired { attempt: u32, report: RepairReport },
    Escalated { attempts: u32 },
}

/// Probes one device and drives the repair ladder when it is unhealthy.
pub struct DeviceMonitor {
    config: MonitorConfig,
    target: DeviceTarget,
    probe: Arc<dyn HealthProbe>,
    ladder: RepairLadder,
    counter: RecoveryCounter,
    last_state: Option<HealthState>,
    last_location: Option<UsbLocation>,
}

impl DeviceMonitor {
    pub fn new(
        config: MonitorConfig,
        target: DeviceTarget,
        probe: Arc<dyn HealthProbe>,
        ladder: RepairLadder,
    ) -> Self {
        Self {
            config,
            target,
            probe,
            ladder,
            counter: RecoveryCounter::new(),
            last_state: None,
            last_location: None,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.counter.attempts()
    }

    pub fn last_state(&self) -> Option<HealthState> {
        self.last_state
    }

    pub fn target(&self) -> &DeviceTarget {
        &self.target
    }

    /// Probe until `shutdown` is raised.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!(
            device = %self.target,
            interval_secs = self.config.probe_interval.as_secs(),
            "device monitor started"
        );
        if self.target.identity().is_none() {
            warn!("no USB id known, repairs limited to restarting dependents");
        }

        loop {
            let wait = match self.tick(shutdown) {
                TickOutcome::Repaired { .. } => self.config.settle_interval,
                TickOutcome::Healthy | TickOutcome::Escalated { .. } => {
                    self.config.probe_interval
                }
            };
            if sleep_unless_stopped(shutdown, wait) {
                break;
            }
        }

        info!("device monitor stopped");
    }

    /// One probe cycle.
    pub fn tick(&mut self, shutdown: &AtomicBool) -> TickOutcome {
        if let Some(node) = self.target.refresh_node() {
            info!(node = %node.display(), "device alias now resolves to a new node");
        }

        let outcome = self.probe.probe(self.target.node());
        self.note_transition(outcome.state, outcome.detail.as_deref());

        let attempt = self.counter.observe(outcome.state);
        if outcome.state.is_healthy() {
            self.remember_location();
            return TickOutcome::Healthy;
        }

        if self.counter.exceeds(self.config.policy.max_attempts) {
            return self.escalate(shutdown);
        }

        self.repair(attempt)
    }

    fn note_transition(&mut self, state: HealthState, detail: Option<&str>) {
        let previous = self.last_state.replace(state);
        if previous == Some(state) {
            return;
        }

        match (previous, state) {
            (None, HealthState::Healthy) => info!(device = %self.target, "device healthy"),
            (Some(_), HealthState::Healthy) => {
                crate::ok!(device = %self.target, "device recovered")
            }
            (_, state) => warn!(
                device = %self.target,
                detail = detail.unwrap_or(""),
                "device {state}"
            ),
        }
    }

    fn remember_location(&mut self) {
        let Some(identity) = self.target.identity() else {
            return;
        };
        if let Some(location) = self.ladder.hardware().locate(identity) {
            if self.last_location.as_ref() != Some(&location) {
                debug!(location = %location, "device location");
                self.last_location = Some(location);
            }
        }
    }

    fn repair(&mut self, attempt: u32) -> TickOutcome {
        crate::recovery!(
            attempt,
            max = self.config.policy.max_attempts,
            "repairing {}",
            self.target
        );

        for stopped in self.ladder.dependents().stop_all() {
            if let Some(e) = stopped.error {
                warn!(dependent = %stopped.name, "could not stop before repair: {e}");
            }
        }

        let identity = self.target.identity();
        if let Some(location) = identity.and_then(|id| self.ladder.hardware().locate(id)) {
            self.last_location = Some(location);
        }

        let plan = RepairPlan::build(
            &PlanContext {
                identity,
                hub_port: self.last_location.as_ref().and_then(|l| l.hub_port()),
                can_power_cycle: self.ladder.hardware().can_power_cycle(),
                attempt: Some(attempt),
            },
            &self.config.policy,
        );

        let probe = &self.probe;
        let target = &mut self.target;
        let report = self.ladder.run(&plan, &mut || {
            target.refresh_node();
            probe.probe(target.node()).state.is_healthy()
        });

        if report.healthy_after {
            self.counter.reset();
            self.note_transition(HealthState::Healthy, None);
        }

        TickOutcome::Repaired { attempt, report }
    }

    fn escalate(&mut self, shutdown: &AtomicBool) -> TickOutcome {
        let attempts = self.counter.attempts();
        error!(
            device = %self.target,
            attempts,
            "automatic repair exhausted, manual intervention needed"
        );

        let hub_port = self.last_location.as_ref().and_then(|l| l.hub_port());
        print_escalation_guidance(&EscalationContext {
            node: self.target.node(),
            identity: self.target.identity(),
            hub_port: hub_port.as_ref(),
            attempts,
            max_attempts: self.config.policy.max_attempts,
        });

        sleep_unless_stopped(shutdown, self.config.escalation_cooldown);
        self.counter.reset();
        TickOutcome::Escalated { attempts }
    }
}
