use std::fs::{self, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::usb::{HubPort, UsbLocation, UsbTopology};
use super::HardwareController;
use crate::error::SupervisorError;
use crate::models::constants::{HUB_OFF_PAUSE, REBIND_PAUSE, TOOL_TIMEOUT};
use crate::models::DeviceIdentity;
use crate::process::run_bounded;

// USBDEVFS_RESET from linux/usbdevice_fs.h
nix::ioctl_none!(usbdevfs_reset, b'U', 20);

/// Real hardware access through usbdevfs, sysfs and `uhubctl`.
#[derive(Debug, Clone)]
pub struct LinuxHardware {
    topology: UsbTopology,
    dev_root: PathBuf,
    hub_tool: Option<PathBuf>,
    rebind_pause: Duration,
    hub_off_pause: Duration,
}

impl LinuxHardware {
    pub fn new(topology: UsbTopology, dev_root: PathBuf, hub_tool: Option<PathBuf>) -> Self {
        Self {
            topology,
            dev_root,
            hub_tool,
            rebind_pause: REBIND_PAUSE,
            hub_off_pause: HUB_OFF_PAUSE,
        }
    }

    /// Standard locations, with `uhubctl` looked up on PATH.
    pub fn system() -> Self {
        Self::new(
            UsbTopology::new("/sys"),
            PathBuf::from("/dev/bus/usb"),
            which::which("uhubctl").ok(),
        )
    }

    pub fn with_pauses(mut self, rebind_pause: Duration, hub_off_pause: Duration) -> Self {
        self.rebind_pause = rebind_pause;
        self.hub_off_pause = hub_off_pause;
        self
    }

    fn located(
        &self,
        identity: DeviceIdentity,
        err: fn(String) -> SupervisorError,
    ) -> Result<UsbLocation, SupervisorError> {
        self.topology
            .find(identity)
            .ok_or_else(|| err(format!("device {identity} is not enumerated on the bus")))
    }

    fn run_hub_tool(
        &self,
        tool: &Path,
        port: &HubPort,
        action: &str,
    ) -> Result<(), SupervisorError> {
        let port_number = port.port.to_string();
        let output = run_bounded(
            Command::new(tool).args([
                "-l",
                port.hub.as_str(),
                "-p",
                port_number.as_str(),
                "-a",
                action,
            ]),
            TOOL_TIMEOUT,
        )
        .map_err(|e| SupervisorError::HubCycleUnavailable(format!("{e:#}")))?;

        if output.success() {
            debug!(port = %port, action, "hub port switched");
            Ok(())
        } else {
            Err(SupervisorError::HubCycleUnavailable(format!(
                "{} {action} on {port}: {}",
                tool.display(),
                output.failure_reason()
            )))
        }
    }
}

fn write_sysfs(path: &Path, value: &str) -> Result<(), String> {
    fs::write(path, value).map_err(|e| format!("write to {} failed: {e}", path.display()))
}

impl HardwareController for LinuxHardware {
    fn locate(&self, identity: DeviceIdentity) -> Option<UsbLocation> {
        self.topology.find(identity)
    }

    fn soft_reset(&self, identity: DeviceIdentity) -> Result<(), SupervisorError> {
        let location = self.located(identity, SupervisorError::ResetFailed)?;
        let node = location.dev_node(&self.dev_root);

        let file = OpenOptions::new()
            .write(true)
            .open(&node)
            .map_err(|e| SupervisorError::ResetFailed(format!("open {}: {e}", node.display())))?;

        // SAFETY: USBDEVFS_RESET takes no argument and the fd outlives the call.
        unsafe { usbdevfs_reset(file.as_raw_fd()) }.map_err(|e| {
            SupervisorError::ResetFailed(format!("USBDEVFS_RESET on {}: {e}", node.display()))
        })?;

        debug!(node = %node.display(), "usb reset issued");
        Ok(())
    }

    fn rebind(&self, identity: DeviceIdentity) -> Result<(), SupervisorError> {
        let location = self.located(identity, SupervisorError::RebindFailed)?;
        let driver_dir = self.topology.driver_dir();

        // An already-unbound device rejects unbind; bind is what matters.
        if let Err(e) = write_sysfs(&driver_dir.join("unbind"), &location.bus_id) {
            warn!(bus_id = %location.bus_id, error = %e, "unbind failed, trying bind anyway");
        }

        thread::sleep(self.rebind_pause);

        write_sysfs(&driver_dir.join("bind"), &location.bus_id)
            .map_err(SupervisorError::RebindFailed)
    }

    fn power_cycle(&self, port: &HubPort) -> Result<(), SupervisorError> {
        let Some(tool) = self.hub_tool.as_deref() else {
            return Err(SupervisorError::HubCycleUnavailable(
                "uhubctl is not installed".to_string(),
            ));
        };

        self.run_hub_tool(tool, port, "off")?;
        thread::sleep(self.hub_off_pause);
        self.run_hub_tool(tool, port, "on")
    }

    fn can_power_cycle(&self) -> bool {
        self.hub_tool.is_some()
    }
}
