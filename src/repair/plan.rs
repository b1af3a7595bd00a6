//! Which remediation steps a repair attempt runs, and in what order.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hardware::HubPort;
use crate::models::constants::{HUB_CYCLE_AFTER, MAX_REPAIR_ATTEMPTS};
use crate::models::DeviceIdentity;

/// Bounds shared by the monitor's escalation and the ladder's hub-cycle gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairPolicy {
    /// Consecutive attempts before the monitor hands over to a human.
    pub max_attempts: u32,
    /// Attempts that must fail before the hub power cycle is tried.
    pub hub_cycle_after: u32,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_REPAIR_ATTEMPTS,
            hub_cycle_after: HUB_CYCLE_AFTER,
        }
    }
}

impl RepairPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("repair.max_attempts must be at least 1".to_string());
        }
        if self.hub_cycle_after >= self.max_attempts {
            return Err(format!(
                "repair.hub_cycle_after ({}) must be smaller than repair.max_attempts ({})",
                self.hub_cycle_after, self.max_attempts
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairStep {
    SoftReset(DeviceIdentity),
    Rebind(DeviceIdentity),
    HubCycle(HubPort),
    RestartDependents,
}

impl RepairStep {
    pub fn name(&self) -> &'static str {
        match self {
            RepairStep::SoftReset(_) => "soft-reset",
            RepairStep::Rebind(_) => "rebind",
            RepairStep::HubCycle(_) => "hub-cycle",
            RepairStep::RestartDependents => "restart-dependents",
        }
    }

    /// Whether the step acts on the device itself.
    pub fn is_hardware(&self) -> bool {
        !matches!(self, RepairStep::RestartDependents)
    }
}

impl fmt::Display for RepairStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairStep::SoftReset(id) => write!(f, "soft reset of {id}"),
            RepairStep::Rebind(id) => write!(f, "driver rebind of {id}"),
            RepairStep::HubCycle(port) => write!(f, "power cycle of hub port {port}"),
            RepairStep::RestartDependents => f.write_str("restart of dependent services"),
        }
    }
}

/// A step left out of the plan, with the reason it was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedStep {
    pub name: &'static str,
    pub reason: String,
}

/// Inputs the plan is built from.
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub identity: Option<DeviceIdentity>,
    /// Hub port the device was last seen on, if any.
    pub hub_port: Option<HubPort>,
    pub can_power_cycle: bool,
    /// Attempt number within the current failure run; `None` for a standalone repair.
    pub attempt: Option<u32>,
}

/// Ordered steps for one repair attempt. Dependent restart is always last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairPlan {
    steps: Vec<RepairStep>,
    excluded: Vec<ExcludedStep>,
}

impl RepairPlan {
    pub fn build(ctx: &PlanContext, policy: &RepairPolicy) -> Self {
        let mut steps = Vec::new();
        let mut excluded = Vec::new();

        match ctx.identity {
            Some(identity) => {
                steps.push(RepairStep::SoftReset(identity));
                steps.push(RepairStep::Rebind(identity));

                let gate_open = ctx
                    .attempt
                    .map(|attempt| attempt > policy.hub_cycle_after)
                    .unwrap_or(true);

                match (&ctx.hub_port, ctx.can_power_cycle, gate_open) {
                    (_, _, false) => excluded.push(ExcludedStep {
                        name: "hub-cycle",
                        reason: format!(
                            "held back until more than {} failed attempts",
                            policy.hub_cycle_after
                        ),
                    }),
                    (None, _, true) => excluded.push(ExcludedStep {
                        name: "hub-cycle",
                        reason: "hub port unknown".to_string(),
                    }),
                    (Some(_), false, true) => excluded.push(ExcludedStep {
                        name: "hub-cycle",
                        reason: "no hub power-control tool installed".to_string(),
                    }),
                    (Some(port), true, true) => steps.push(RepairStep::HubCycle(port.clone())),
                }
            }
            None => {
                for name in ["soft-reset", "rebind", "hub-cycle"] {
                    excluded.push(ExcludedStep {
                        name,
                        reason: "hardware identity unknown".to_string(),
                    });
                }
            }
        }

        steps.push(RepairStep::RestartDependents);
        Self { steps, excluded }
    }

    pub fn steps(&self) -> &[RepairStep] {
        &self.steps
    }

    pub fn excluded(&self) -> &[ExcludedStep] {
        &self.excluded
    }
}
