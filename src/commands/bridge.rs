//! `capguard bridge`: the bridging supervisor on its own, e.g. as a service unit.

use anyhow::{bail, Result};
use std::path::PathBuf;

use super::{init_session_logging, load_settings, shutdown_on_signal};
use crate::bridge::BridgeSupervisor;
use crate::config::CliOverrides;
use crate::registry::{ProcessKind, Registry};

pub fn execute(base_dir: Option<PathBuf>, device: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(
        base_dir,
        &CliOverrides {
            device,
            ..CliOverrides::default()
        },
    )?;
    settings.validate()?;
    init_session_logging(&settings)?;

    let registry = Registry::open(settings.state_dir())?;
    if let Some(pid) = registry.live_pid(ProcessKind::Bridge) {
        bail!("a bridge is already running (pid {pid})");
    }
    let target = settings.device_target();
    let bridge = BridgeSupervisor::new(
        settings.bridge_command(target.node()),
        registry,
        settings.bridge_timings(),
    );

    let shutdown = shutdown_on_signal()?;
    bridge.run(&shutdown);
    Ok(())
}
