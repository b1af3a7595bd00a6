use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use wait_timeout::ChildExt;

use super::command::BridgeCommand;
use crate::error::SupervisorError;
use crate::models::constants::{
    BRIDGE_POLL_INTERVAL, BRIDGE_RESTART_BACKOFF, BRIDGE_STARTUP_GRACE, STOP_TIMEOUT,
};
use crate::models::exit_code_of;
use crate::process::{find_matching_processes, terminate_child, terminate_pid, Termination};
use crate::registry::{ProcessKind, Registry};
use crate::services::Dependent;
use crate::utils::sleep_unless_stopped;

/// Timing knobs for the bridge supervisor.
#[derive(Debug, Clone, Copy)]
pub struct BridgeTimings {
    pub startup_grace: Duration,
    pub poll_interval: Duration,
    pub restart_backoff: Duration,
    pub stop_timeout: Duration,
}

impl Default for BridgeTimings {
    fn default() -> Self {
        Self {
            startup_grace: BRIDGE_STARTUP_GRACE,
            poll_interval: BRIDGE_POLL_INTERVAL,
            restart_backoff: BRIDGE_RESTART_BACKOFF,
            stop_timeout: STOP_TIMEOUT,
        }
    }
}

struct Inner {
    command: BridgeCommand,
    registry: Registry,
    log_path: PathBuf,
    timings: BridgeTimings,
    child: Mutex<Option<Child>>,
    paused: AtomicBool,
    closed: AtomicBool,
}

/// Keeps exactly one bridging process running.
///
/// Cheap to clone; clones share the same child. The repair path stops it through
/// [`Dependent`] and the ladder's final step restarts it.
#[derive(Clone)]
pub struct BridgeSupervisor {
    inner: Arc<Inner>,
}

impl BridgeSupervisor {
    pub fn new(command: BridgeCommand, registry: Registry, timings: BridgeTimings) -> Self {
        let log_path = registry.dir().join("bridge.log");
        Self {
            inner: Arc::new(Inner {
                command,
                registry,
                log_path,
                timings,
                child: Mutex::new(None),
                paused: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn command(&self) -> &BridgeCommand {
        &self.inner.command
    }

    pub fn log_path(&self) -> &Path {
        &self.inner.log_path
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Pid of the managed process if it is still running.
    pub fn pid(&self) -> Option<u32> {
        let mut guard = self.lock_child();
        let child = guard.as_mut()?;
        match child.try_wait() {
            Ok(None) => Some(child.id()),
            _ => None,
        }
    }

    fn lock_child(&self) -> MutexGuard<'_, Option<Child>> {
        self.inner
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open_log(&self) -> Result<File, SupervisorError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.log_path)
            .map_err(|e| {
                SupervisorError::BridgeNeverStarted(format!(
                    "cannot open {}: {e}",
                    self.inner.log_path.display()
                ))
            })
    }

    /// Spawn the bridging process unless one is already running.
    ///
    /// Waits the startup grace period and fails if the process exits within it.
    /// Refused once the supervisor has been [closed](Self::close).
    pub fn start(&self) -> Result<u32, SupervisorError> {
        let mut guard = self.lock_child();

        if self.is_closed() {
            return Err(SupervisorError::BridgeNeverStarted(
                "supervisor is shut down".to_string(),
            ));
        }

        if let Some(child) = guard.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                return Ok(child.id());
            }
            *guard = None;
        }

        self.sweep_orphans();

        let log = self.open_log()?;
        let log_err = log
            .try_clone()
            .map_err(|e| SupervisorError::BridgeNeverStarted(e.to_string()))?;

        debug!(command = %self.inner.command.display_line(), "spawning bridge");
        let mut child = self
            .inner
            .command
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .map_err(|e| {
                SupervisorError::BridgeNeverStarted(format!(
                    "{}: {e}",
                    self.inner.command.program().display()
                ))
            })?;

        let pid = child.id();
        if let Err(e) = self.inner.registry.record(ProcessKind::Bridge, pid) {
            warn!("could not record bridge pid: {e:#}");
        }

        match child.wait_timeout(self.inner.timings.startup_grace) {
            Ok(Some(status)) => {
                self.inner.registry.clear(ProcessKind::Bridge);
                Err(SupervisorError::BridgingProcessDied {
                    pid,
                    code: Some(exit_code_of(&status)),
                })
            }
            Ok(None) => {
                info!(pid, log = %self.inner.log_path.display(), "bridge started");
                *guard = Some(child);
                Ok(pid)
            }
            Err(e) => {
                warn!(pid, "could not wait on bridge: {e}");
                *guard = Some(child);
                Ok(pid)
            }
        }
    }

    /// Keep the bridge alive until `shutdown` is raised. Does nothing while paused.
    pub fn supervise(&self, shutdown: &AtomicBool) {
        let timings = self.inner.timings;
        info!(
            interval_secs = timings.poll_interval.as_secs(),
            "bridge supervisor started"
        );

        loop {
            if self.is_closed() {
                break;
            }
            if !self.is_paused() && !self.check_alive() {
                if sleep_unless_stopped(shutdown, timings.restart_backoff) {
                    break;
                }
                // stop() may have run during the backoff
                if !self.is_paused() {
                    crate::recovery!("restarting bridge");
                    if let Err(e) = self.start() {
                        warn!("{e}");
                    }
                }
            }

            if sleep_unless_stopped(shutdown, timings.poll_interval) {
                break;
            }
        }

        info!("bridge supervisor stopped");
    }

    /// Start, supervise until `shutdown` is raised, then stop.
    ///
    /// A failed first start is only logged; supervision retries it after the
    /// usual backoff, so a device that shows up late still gets a bridge.
    pub fn run(&self, shutdown: &AtomicBool) {
        if let Err(e) = self.start() {
            error!("{e}; the supervisor will keep retrying");
        }
        self.supervise(shutdown);
        self.stop();
    }

    /// Reap the child if it exited. Returns whether a live bridge exists.
    fn check_alive(&self) -> bool {
        let mut guard = self.lock_child();
        let Some(child) = guard.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                let err = SupervisorError::BridgingProcessDied {
                    pid: child.id(),
                    code: Some(exit_code_of(&status)),
                };
                warn!("{err}");
                *guard = None;
                self.inner.registry.clear(ProcessKind::Bridge);
                false
            }
            Err(e) => {
                warn!("could not poll bridge: {e}");
                true
            }
        }
    }

    /// Stop the bridge and hold supervision until [`resume`](Self::resume).
    ///
    /// SIGTERM, then SIGKILL after the stop timeout. Orphans with the same
    /// invocation signature are swept and the liveness record is removed.
    pub fn stop(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);

        let child = self.lock_child().take();
        if let Some(mut child) = child {
            let pid = child.id();
            match terminate_child(&mut child, self.inner.timings.stop_timeout) {
                Termination::NotRunning => debug!(pid, "bridge already exited"),
                Termination::Graceful => info!(pid, "bridge stopped"),
                Termination::Forced => warn!(pid, "bridge ignored SIGTERM, killed"),
            }
        }

        self.sweep_orphans();
        self.inner.registry.clear(ProcessKind::Bridge);
    }

    /// Alias for [`stop`](Self::stop), used by the repair path.
    pub fn pause(&self) {
        self.stop();
    }

    /// Allow supervision to respawn the bridge again. No effect once closed.
    pub fn resume(&self) {
        if !self.is_closed() {
            self.inner.paused.store(false, Ordering::SeqCst);
        }
    }

    /// Stop the bridge for good.
    ///
    /// A `start` already inside its grace period finishes first and its child is
    /// then stopped. Every later `start`, `resume` or `restart` is refused, so a
    /// repair still running elsewhere cannot bring the bridge back.
    pub fn close(&self) {
        {
            let _guard = self.lock_child();
            self.inner.closed.store(true, Ordering::SeqCst);
        }
        self.stop();
    }

    pub fn restart(&self) -> Result<u32, SupervisorError> {
        self.stop();
        self.resume();
        self.start()
    }

    /// Only called while no child is held, so every match is foreign.
    fn sweep_orphans(&self) {
        for pid in find_matching_processes(&self.inner.command.signature()) {
            warn!(pid, "terminating orphaned bridging process");
            terminate_pid(pid, self.inner.timings.stop_timeout);
        }
    }
}

impl Dependent for BridgeSupervisor {
    fn name(&self) -> String {
        "bridge".to_string()
    }

    fn stop(&self) -> Result<(), SupervisorError> {
        self.pause();
        Ok(())
    }

    fn restart(&self) -> Result<(), SupervisorError> {
        BridgeSupervisor::restart(self).map(|_| ())
    }
}
