//! Integration tests for capguard sessions
//!
//! These drive the orchestrator end to end with scripted consumers, fake hardware
//! and a real (shell script) bridge process.

pub mod crash_resume;
pub mod helpers;
pub mod repair_flow;
pub mod session_lifecycle;
