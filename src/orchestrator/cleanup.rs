use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use tracing::{info, warn};

use super::companion::MonitorCompanion;
use crate::bridge::BridgeSupervisor;
use crate::process::{terminate_pid, Termination};
use crate::registry::{ProcessKind, Registry};

/// Tears the whole session down. Safe to call from the signal handler and from
/// the main thread; only the first call does anything.
pub struct Cleanup {
    once: Once,
    shutdown: Arc<AtomicBool>,
    registry: Registry,
    bridge: Option<BridgeSupervisor>,
    monitor: Option<Arc<MonitorCompanion>>,
    stop_timeout: Duration,
}

impl Cleanup {
    pub fn new(shutdown: Arc<AtomicBool>, registry: Registry, stop_timeout: Duration) -> Self {
        Self {
            once: Once::new(),
            shutdown,
            registry,
            bridge: None,
            monitor: None,
            stop_timeout,
        }
    }

    pub fn with_bridge(mut self, bridge: BridgeSupervisor) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<MonitorCompanion>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Stop bridge, monitor and consumer, then remove every record. Never fails.
    ///
    /// The bridge is closed before the monitor is joined; an in-flight repair
    /// must not be able to restart it.
    pub fn run(&self) {
        self.once.call_once(|| {
            info!("shutting down");
            self.shutdown.store(true, Ordering::SeqCst);

            if let Some(bridge) = &self.bridge {
                bridge.close();
            }

            if let Some(monitor) = &self.monitor {
                monitor.join(self.stop_timeout);
            }

            if let Some(pid) = self.registry.live_pid(ProcessKind::Consumer) {
                match terminate_pid(pid, self.stop_timeout) {
                    Termination::NotRunning => {}
                    Termination::Graceful => info!(pid, "consumer stopped"),
                    Termination::Forced => warn!(pid, "consumer killed"),
                }
            }

            self.registry.clear_all();
            crate::ok!("shutdown complete");
        });
    }
}
