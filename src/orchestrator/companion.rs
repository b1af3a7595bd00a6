use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::warn;

use crate::consumer::CompanionCheck;
use crate::models::constants::SHUTDOWN_POLL_SLICE;
use crate::monitor::DeviceMonitor;
use crate::registry::{ProcessKind, Registry};

type MonitorFactory = Box<dyn Fn() -> DeviceMonitor + Send + Sync>;

/// The device monitor running as a thread of the orchestrator.
///
/// Its liveness record holds the orchestrator's own pid.
pub struct MonitorCompanion {
    factory: MonitorFactory,
    shutdown: Arc<AtomicBool>,
    registry: Registry,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorCompanion {
    pub fn new(
        factory: impl Fn() -> DeviceMonitor + Send + Sync + 'static,
        shutdown: Arc<AtomicBool>,
        registry: Registry,
    ) -> Self {
        Self {
            factory: Box::new(factory),
            shutdown,
            registry,
            handle: Mutex::new(None),
        }
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the monitor thread. Does nothing once shutdown has been raised.
    pub fn spawn(&self) -> Result<()> {
        let mut slot = self.lock_handle();
        self.spawn_into(&mut slot).map(|_| ())
    }

    /// Holding the handle lock keeps this ordered against [`join`](Self::join).
    fn spawn_into(&self, slot: &mut Option<JoinHandle<()>>) -> Result<bool> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(false);
        }

        let mut monitor = (self.factory)();
        let shutdown = self.shutdown.clone();
        let handle = thread::Builder::new()
            .name("device-monitor".to_string())
            .spawn(move || monitor.run(&shutdown))
            .context("Failed to spawn device monitor thread")?;

        *slot = Some(handle);
        self.registry
            .record(ProcessKind::Monitor, std::process::id())
            .context("Failed to record monitor")?;
        Ok(true)
    }

    pub fn is_alive(&self) -> bool {
        self.lock_handle()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait up to `timeout` for the thread to finish after shutdown was raised.
    ///
    /// A repair in progress is not interrupted; past the timeout the thread is
    /// left to die with the process.
    pub fn join(&self, timeout: Duration) {
        let Some(handle) = self.lock_handle().take() else {
            return;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(SHUTDOWN_POLL_SLICE);
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                warn!("device monitor thread panicked");
            }
        } else {
            warn!("device monitor still busy, not waiting for it");
        }
        self.registry.clear(ProcessKind::Monitor);
    }
}

impl CompanionCheck for MonitorCompanion {
    fn ensure_alive(&self) -> bool {
        let mut slot = self.lock_handle();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }

        warn!("device monitor is not running");
        if let Some(handle) = slot.take() {
            let _ = handle.join();
        }
        match self.spawn_into(&mut slot) {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!("{e:#}");
                false
            }
        }
    }
}
