//! Orchestrated mode
//!
//! One process runs all loops: the bridge supervisor and the device monitor as
//! threads, the consumer in the foreground. They share the shutdown flag, the
//! registry and the bridge handle.

mod cleanup;
mod companion;
mod lock;
mod preflight;

pub use cleanup::Cleanup;
pub use companion::MonitorCompanion;
pub use lock::InstanceLock;
pub use preflight::{run_preflight, PreflightOptions};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::bridge::BridgeSupervisor;
use crate::config::Settings;
use crate::consumer::{ConsumerSupervisor, Launcher, ProcessLauncher, ResumeController};
use crate::hardware::{HardwareController, LinuxHardware};
use crate::models::CrashEpisode;
use crate::monitor::{DeviceMonitor, HealthProbe, V4l2Probe};
use crate::registry::{ProcessKind, Registry};
use crate::repair::RepairLadder;
use crate::services::{Dependents, ServiceControl, ServiceUnit, Systemctl};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub preflight: PreflightOptions,
    /// Install the SIGINT/SIGTERM handler (once per process)
    pub handle_signals: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            preflight: PreflightOptions::default(),
            handle_signals: true,
        }
    }
}

/// Everything the loops talk to, injectable for tests.
pub struct Orchestrator {
    settings: Settings,
    hardware: Arc<dyn HardwareController>,
    probe: Arc<dyn HealthProbe>,
    services: Arc<dyn ServiceControl>,
    launcher: Option<Arc<dyn Launcher>>,
}

impl Orchestrator {
    pub fn system(settings: Settings) -> Self {
        let user = settings.config.services.user;
        Self {
            settings,
            hardware: Arc::new(LinuxHardware::system()),
            probe: Arc::new(V4l2Probe),
            services: Arc::new(Systemctl::new(user)),
            launcher: None,
        }
    }

    pub fn with_hardware(mut self, hardware: Arc<dyn HardwareController>) -> Self {
        self.hardware = hardware;
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_services(mut self, services: Arc<dyn ServiceControl>) -> Self {
        self.services = services;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Run until the consumer exits cleanly, crashes too often, or a signal arrives.
    pub fn run(&self, options: RunOptions) -> Result<CrashEpisode> {
        let settings = &self.settings;
        let _lock = InstanceLock::acquire(&settings.lock_path())?;
        run_preflight(
            settings,
            options.preflight,
            self.probe.as_ref(),
            self.hardware.as_ref(),
        )?;

        let registry = Registry::open(settings.state_dir())?;
        clear_previous_session(&registry);

        let shutdown = Arc::new(AtomicBool::new(false));
        let stop_timeout = settings.bridge_timings().stop_timeout;
        let target = settings.device_target();

        let bridge = (options.preflight.loopback && settings.config.bridge.enabled).then(|| {
            BridgeSupervisor::new(
                settings.bridge_command(target.node()),
                registry.clone(),
                settings.bridge_timings(),
            )
        });

        let mut dependents = Dependents::new();
        if let Some(bridge) = &bridge {
            dependents.push(Arc::new(bridge.clone()));
        }
        for unit in &settings.config.services.units {
            dependents.push(Arc::new(ServiceUnit::new(unit.clone(), self.services.clone())));
        }

        let monitor = settings.config.monitor.enabled.then(|| {
            let config = settings.monitor_config();
            let target = target.clone();
            let probe = self.probe.clone();
            let hardware = self.hardware.clone();
            let dependents = dependents.clone();
            Arc::new(MonitorCompanion::new(
                move || {
                    DeviceMonitor::new(
                        config.clone(),
                        target.clone(),
                        probe.clone(),
                        RepairLadder::new(hardware.clone(), dependents.clone()),
                    )
                },
                shutdown.clone(),
                registry.clone(),
            ))
        });

        let mut cleanup = Cleanup::new(shutdown.clone(), registry.clone(), stop_timeout);
        if let Some(bridge) = &bridge {
            cleanup = cleanup.with_bridge(bridge.clone());
        }
        if let Some(monitor) = &monitor {
            cleanup = cleanup.with_monitor(monitor.clone());
        }
        let cleanup = Arc::new(cleanup);

        if options.handle_signals {
            let cleanup = cleanup.clone();
            ctrlc::set_handler(move || {
                cleanup.run();
                std::process::exit(130);
            })
            .context("Failed to set signal handler")?;
        }

        let bridge_thread = match &bridge {
            Some(bridge) => {
                if let Err(e) = bridge.start() {
                    error!("{e}; the supervisor will keep retrying");
                }
                let bridge = bridge.clone();
                let shutdown = shutdown.clone();
                Some(
                    thread::Builder::new()
                        .name("bridge-supervisor".to_string())
                        .spawn(move || bridge.supervise(&shutdown))
                        .context("Failed to spawn bridge supervisor thread")?,
                )
            }
            None => {
                info!("running without the loopback bridge");
                None
            }
        };

        if let Some(monitor) = &monitor {
            monitor.spawn()?;
        }

        let launcher = self.launcher.clone().unwrap_or_else(|| {
            Arc::new(ProcessLauncher::new(
                settings.config.consumer.program.clone(),
                registry.clone(),
            ))
        });
        let mut consumer = ConsumerSupervisor::new(
            settings.consumer_config(),
            launcher,
            ResumeController::new(settings.resume_config()),
            registry.clone(),
        );
        if let Some(monitor) = &monitor {
            consumer = consumer.with_companion(monitor.clone());
        }

        let result = consumer.run(&shutdown);

        cleanup.run();
        if let Some(handle) = bridge_thread {
            if handle.join().is_err() {
                warn!("bridge supervisor thread panicked");
            }
        }

        Ok(result?)
    }
}

/// Records left behind by a session that died without cleanup.
///
/// Pids may have been reused since, so nothing is killed here; a leftover bridge is
/// found by its invocation signature when the new one starts.
fn clear_previous_session(registry: &Registry) {
    for kind in ProcessKind::ALL {
        if let Some(pid) = registry.live_pid(kind) {
            warn!(pid, "stale {kind} record points at a live process, leaving it alone");
        }
    }
    registry.clear_all();
}
