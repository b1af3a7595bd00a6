//! Escalating repair controller
//!
//! soft reset → driver rebind → hub power cycle → dependent restart. Each step is
//! best-effort; a failing step is logged and the ladder moves on.

mod ladder;
mod plan;

pub use ladder::{RepairLadder, RepairReport, StepOutcome, StepRecord};
pub use plan::{ExcludedStep, PlanContext, RepairPlan, RepairPolicy, RepairStep};
