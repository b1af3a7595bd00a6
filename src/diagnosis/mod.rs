//! Human-facing guidance for failures the supervisor cannot fix on its own.

pub mod guidance;

pub use guidance::{print_escalation_guidance, print_threshold_guidance, EscalationContext};
