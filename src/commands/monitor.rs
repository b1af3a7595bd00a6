//! `capguard monitor`: the device monitor on its own, e.g. as a service unit.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;

use super::{init_session_logging, load_settings, shutdown_on_signal};
use crate::config::CliOverrides;
use crate::hardware::LinuxHardware;
use crate::models::DeviceIdentity;
use crate::monitor::{DeviceMonitor, V4l2Probe};
use crate::registry::{ProcessKind, Registry};
use crate::repair::RepairLadder;
use crate::services::{Dependents, ServiceUnit, Systemctl};

pub fn execute(
    base_dir: Option<PathBuf>,
    device: Option<PathBuf>,
    usb_id: Option<DeviceIdentity>,
) -> Result<()> {
    let settings = load_settings(
        base_dir,
        &CliOverrides {
            device,
            usb_id,
            ..CliOverrides::default()
        },
    )?;
    settings.validate()?;
    init_session_logging(&settings)?;

    let registry = Registry::open(settings.state_dir())?;
    if let Some(pid) = registry.live_pid(ProcessKind::Monitor) {
        bail!("a device monitor is already running (pid {pid})");
    }
    registry.record(ProcessKind::Monitor, std::process::id())?;

    let services = Arc::new(Systemctl::new(settings.config.services.user));
    let mut dependents = Dependents::new();
    for unit in &settings.config.services.units {
        dependents.push(Arc::new(ServiceUnit::new(unit.clone(), services.clone())));
    }

    let ladder = RepairLadder::new(Arc::new(LinuxHardware::system()), dependents);
    let mut monitor = DeviceMonitor::new(
        settings.monitor_config(),
        settings.device_target(),
        Arc::new(V4l2Probe),
        ladder,
    );

    let shutdown = shutdown_on_signal()?;
    monitor.run(&shutdown);

    registry.clear(ProcessKind::Monitor);
    Ok(())
}
