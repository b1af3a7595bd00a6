//! Consumer crash monitor

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::launcher::Launcher;
use super::resume::ResumeController;
use super::tracker::{CrashTracker, Verdict};
use crate::diagnosis::print_threshold_guidance;
use crate::error::SupervisorError;
use crate::models::constants::{CONSUMER_RECOVERY_DELAY, MAX_CONSUMER_CRASHES};
use crate::models::CrashEpisode;
use crate::registry::Registry;
use crate::utils::{shell_line, sleep_unless_stopped};

/// Exit code used when the consumer could not be launched at all.
const LAUNCH_FAILURE_CODE: i32 = 127;

/// Makes sure the device monitor is still around before a relaunch.
pub trait CompanionCheck: Send + Sync {
    /// Restart the companion if it is dead. Returns `true` if it had to be restarted.
    fn ensure_alive(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Arguments passed on every launch
    pub args: Vec<String>,
    pub max_crashes: u32,
    pub recovery_delay: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            max_crashes: MAX_CONSUMER_CRASHES,
            recovery_delay: CONSUMER_RECOVERY_DELAY,
        }
    }
}

/// Runs the consumer in the foreground and relaunches it after crashes.
pub struct ConsumerSupervisor {
    config: ConsumerConfig,
    launcher: Arc<dyn Launcher>,
    resume: ResumeController,
    registry: Registry,
    companion: Option<Arc<dyn CompanionCheck>>,
}

impl ConsumerSupervisor {
    pub fn new(
        config: ConsumerConfig,
        launcher: Arc<dyn Launcher>,
        resume: ResumeController,
        registry: Registry,
    ) -> Self {
        Self {
            config,
            launcher,
            resume,
            registry,
            companion: None,
        }
    }

    pub fn with_companion(mut self, companion: Arc<dyn CompanionCheck>) -> Self {
        self.companion = Some(companion);
        self
    }

    /// Launch, wait, and relaunch until a clean exit, a shutdown, or too many crashes.
    ///
    /// Returns the final episode; `RecoveryThresholdExceeded` once the crash count
    /// passes the threshold.
    pub fn run(&self, shutdown: &AtomicBool) -> Result<CrashEpisode, SupervisorError> {
        let mut tracker = CrashTracker::new(self.config.max_crashes);
        let mut args = self.config.args.clone();

        loop {
            info!(
                command = %shell_line(self.launcher.program(), &args),
                "launching consumer"
            );
            let exit_code = match self.launcher.run(&args) {
                Ok(code) => code,
                Err(e) => {
                    error!("{e:#}");
                    LAUNCH_FAILURE_CODE
                }
            };

            let was_streaming = self.resume.stream_was_active();
            if let Err(e) = self.registry.set_streaming(was_streaming) {
                warn!("could not persist streaming flag: {e:#}");
            }

            let verdict = tracker.record(exit_code);
            let episode = CrashEpisode {
                exit_code,
                was_streaming,
                crash_count: tracker.crashes(),
            };

            if shutdown.load(Ordering::SeqCst) {
                info!(exit_code, "consumer exited during shutdown");
                return Ok(episode);
            }

            match verdict {
                Verdict::Clean => {
                    crate::ok!("consumer exited cleanly");
                    return Ok(episode);
                }
                Verdict::Fatal => {
                    error!(
                        crashes = tracker.crashes(),
                        threshold = tracker.threshold(),
                        "consumer crash threshold exceeded, giving up"
                    );
                    print_threshold_guidance(
                        &self.launcher.program().display().to_string(),
                        tracker.crashes(),
                        tracker.threshold(),
                        exit_code,
                    );
                    return Err(SupervisorError::RecoveryThresholdExceeded {
                        crashes: tracker.crashes(),
                        threshold: tracker.threshold(),
                    });
                }
                Verdict::Relaunch => {
                    warn!(
                        streaming = was_streaming,
                        "{}",
                        SupervisorError::ConsumerCrashed { code: exit_code }
                    );
                    crate::recovery!(
                        crash = tracker.crashes(),
                        threshold = tracker.threshold(),
                        "relaunching consumer in {}s",
                        self.config.recovery_delay.as_secs()
                    );
                }
            }

            if sleep_unless_stopped(shutdown, self.config.recovery_delay) {
                return Ok(episode);
            }

            if let Some(companion) = &self.companion {
                if companion.ensure_alive() {
                    crate::recovery!("device monitor was down, restarted it");
                }
            }

            args = self.resume.next_args(&self.config.args, was_streaming);
            if args.len() > self.config.args.len() {
                info!("stream was live before the crash, resuming it");
            }
        }
    }
}
