//! Consumer crash monitor and resume controller
//!
//! The consumer (OBS or similar) runs in the foreground. Crashes are counted against
//! a threshold; when the consumer's log shows a stream was live, the relaunch asks it
//! to start streaming again.

mod core;
mod launcher;
mod resume;
mod tracker;


pub use core::{CompanionCheck, ConsumerConfig, ConsumerSupervisor};
pub use launcher::{Launcher, ProcessLauncher, ScriptedLauncher};
pub use resume::{newest_log, tail_contains, ResumeConfig, ResumeController};
pub use tracker::{CrashTracker, Verdict};
