//! Executes a [`RepairPlan`] step by step.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use super::plan::{RepairPlan, RepairStep};
use crate::hardware::HardwareController;
use crate::models::constants::STEP_SETTLE_INTERVAL;
use crate::services::Dependents;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "kebab-case")]
pub enum StepOutcome {
    Ok,
    Failed(String),
    Skipped(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Ok => f.write_str("ok"),
            StepOutcome::Failed(reason) => write!(f, "failed ({reason})"),
            StepOutcome::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub steps: Vec<StepRecord>,
    pub healthy_after: bool,
}

impl RepairReport {
    pub fn outcome_of(&self, step: &str) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.outcome)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|r| r.step.as_str()).collect()
    }
}

/// Walks the remediation ladder once. It never loops: repeated attempts are the
/// monitor's business.
pub struct RepairLadder {
    hardware: Arc<dyn HardwareController>,
    dependents: Dependents,
    settle: Duration,
}

impl RepairLadder {
    pub fn new(hardware: Arc<dyn HardwareController>, dependents: Dependents) -> Self {
        Self {
            hardware,
            dependents,
            settle: STEP_SETTLE_INTERVAL,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn hardware(&self) -> &Arc<dyn HardwareController> {
        &self.hardware
    }

    pub fn dependents(&self) -> &Dependents {
        &self.dependents
    }

    /// Run `plan`, calling `verify` after each successful hardware step.
    ///
    /// Once `verify` reports the device healthy the remaining hardware steps are
    /// skipped. Dependent restart runs regardless.
    pub fn run(&self, plan: &RepairPlan, verify: &mut dyn FnMut() -> bool) -> RepairReport {
        let mut records = Vec::new();
        let mut healthy = false;

        for excluded in plan.excluded() {
            records.push(StepRecord {
                step: excluded.name.to_string(),
                outcome: StepOutcome::Skipped(excluded.reason.clone()),
            });
        }

        for step in plan.steps() {
            if step.is_hardware() && healthy {
                records.push(StepRecord {
                    step: step.name().to_string(),
                    outcome: StepOutcome::Skipped("device already healthy".to_string()),
                });
                continue;
            }

            crate::recovery!(step = step.name(), "attempting {step}");
            let outcome = match self.execute(step) {
                Ok(()) => {
                    if step.is_hardware() {
                        thread::sleep(self.settle);
                        healthy = verify();
                        if healthy {
                            crate::ok!(step = step.name(), "device healthy after {step}");
                        } else {
                            info!(step = step.name(), "device still unhealthy after {step}");
                        }
                    }
                    StepOutcome::Ok
                }
                Err(reason) => {
                    warn!(step = step.name(), "{step} failed: {reason}");
                    StepOutcome::Failed(reason)
                }
            };

            records.push(StepRecord {
                step: step.name().to_string(),
                outcome,
            });
        }

        let healthy_after = healthy || verify();
        RepairReport {
            steps: records,
            healthy_after,
        }
    }

    fn execute(&self, step: &RepairStep) -> Result<(), String> {
        match step {
            RepairStep::SoftReset(identity) => self
                .hardware
                .soft_reset(*identity)
                .map_err(|e| e.to_string()),
            RepairStep::Rebind(identity) => {
                self.hardware.rebind(*identity).map_err(|e| e.to_string())
            }
            RepairStep::HubCycle(port) => {
                self.hardware.power_cycle(port).map_err(|e| e.to_string())
            }
            RepairStep::RestartDependents => {
                let failures: Vec<String> = self
                    .dependents
                    .restart_all()
                    .into_iter()
                    .filter_map(|o| o.error.map(|e| format!("{}: {e}", o.name)))
                    .collect();
                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(failures.join("; "))
                }
            }
        }
    }
}
