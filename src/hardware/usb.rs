//! USB topology lookups through sysfs.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::DeviceIdentity;

/// Where a device currently sits on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsbLocation {
    /// Kernel bus identifier, e.g. `1-2.3`
    pub bus_id: String,
    pub busnum: u32,
    pub devnum: u32,
}

impl UsbLocation {
    /// Device-filesystem node used for the reset ioctl, e.g. `/dev/bus/usb/001/007`.
    pub fn dev_node(&self, dev_root: &Path) -> PathBuf {
        dev_root
            .join(format!("{:03}", self.busnum))
            .join(format!("{:03}", self.devnum))
    }

    /// Hub and port the device is plugged into.
    ///
    /// `1-2.3` hangs off hub `1-2` port 3; `1-4` is port 4 of the root hub of bus 1.
    pub fn hub_port(&self) -> Option<HubPort> {
        let (hub, port) = match self.bus_id.rsplit_once('.') {
            Some((hub, port)) => (hub.to_string(), port),
            None => {
                let (bus, port) = self.bus_id.split_once('-')?;
                (bus.to_string(), port)
            }
        };
        let port = port.parse().ok()?;
        Some(HubPort { hub, port })
    }
}

impl fmt::Display for UsbLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (bus {:03} device {:03})",
            self.bus_id, self.busnum, self.devnum
        )
    }
}

/// A hub location plus port number, as understood by the power-control tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HubPort {
    pub hub: String,
    pub port: u32,
}

impl fmt::Display for HubPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hub, self.port)
    }
}

impl FromStr for HubPort {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some((hub, port)) = s.rsplit_once(':') else {
            bail!("Invalid hub port '{s}': expected HUB:PORT (e.g. 1-2:3)");
        };
        if hub.is_empty() {
            bail!("Invalid hub port '{s}': hub location is empty");
        }
        let port = port
            .parse()
            .with_context(|| format!("Invalid port number in '{s}'"))?;
        Ok(Self {
            hub: hub.to_string(),
            port,
        })
    }
}

impl TryFrom<String> for HubPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<HubPort> for String {
    fn from(value: HubPort) -> Self {
        value.to_string()
    }
}

/// Read-only view of `/sys/bus/usb`.
#[derive(Debug, Clone)]
pub struct UsbTopology {
    sysfs_root: PathBuf,
}

impl UsbTopology {
    pub fn new(sysfs_root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: sysfs_root.into(),
        }
    }

    pub fn devices_dir(&self) -> PathBuf {
        self.sysfs_root.join("bus/usb/devices")
    }

    /// Directory holding the generic USB driver's `bind`/`unbind` files.
    pub fn driver_dir(&self) -> PathBuf {
        self.sysfs_root.join("bus/usb/drivers/usb")
    }

    /// Find the first device matching `identity`.
    pub fn find(&self, identity: DeviceIdentity) -> Option<UsbLocation> {
        let entries = fs::read_dir(self.devices_dir()).ok()?;

        let mut names: Vec<String> = entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            // Interface entries look like 1-2:1.0
            .filter(|name| !name.contains(':'))
            .collect();
        names.sort();

        for name in names {
            let dir = self.devices_dir().join(&name);
            let (Some(vendor), Some(product)) = (
                read_attr(&dir, "idVendor"),
                read_attr(&dir, "idProduct"),
            ) else {
                continue;
            };
            if !identity.matches_sysfs(&vendor, &product) {
                continue;
            }

            let busnum = read_attr(&dir, "busnum").and_then(|s| s.parse().ok());
            let devnum = read_attr(&dir, "devnum").and_then(|s| s.parse().ok());
            if let (Some(busnum), Some(devnum)) = (busnum, devnum) {
                return Some(UsbLocation {
                    bus_id: name,
                    busnum,
                    devnum,
                });
            }
        }

        None
    }
}

fn read_attr(dir: &Path, attr: &str) -> Option<String> {
    fs::read_to_string(dir.join(attr))
        .ok()
        .map(|s| s.trim().to_string())
}
