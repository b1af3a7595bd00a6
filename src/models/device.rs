use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// USB vendor/product pair, written `VVVV:PPPP` in hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

fn usb_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([0-9a-fA-F]{4}):([0-9a-fA-F]{4})$").expect("usb id pattern is valid")
    })
}

impl DeviceIdentity {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Whether sysfs `idVendor`/`idProduct` contents describe this identity.
    pub fn matches_sysfs(&self, id_vendor: &str, id_product: &str) -> bool {
        u16::from_str_radix(id_vendor.trim(), 16).ok() == Some(self.vendor_id)
            && u16::from_str_radix(id_product.trim(), 16).ok() == Some(self.product_id)
    }
}

impl FromStr for DeviceIdentity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some(caps) = usb_id_pattern().captures(s.trim()) else {
            bail!("Invalid USB id '{s}': expected VVVV:PPPP in hex (e.g. 0fd9:0066)");
        };
        let vendor_id = u16::from_str_radix(&caps[1], 16)
            .with_context(|| format!("Invalid vendor id in '{s}'"))?;
        let product_id = u16::from_str_radix(&caps[2], 16)
            .with_context(|| format!("Invalid product id in '{s}'"))?;
        Ok(Self::new(vendor_id, product_id))
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeviceIdentity> for String {
    fn from(value: DeviceIdentity) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// The device under supervision.
///
/// The identity never changes during a session. The node path may: when an alias
/// (e.g. a `/dev/v4l/by-id/...` symlink) is configured it is re-resolved on every
/// probe, because the device can re-enumerate on a different `/dev/videoN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    node: PathBuf,
    alias: Option<PathBuf>,
    identity: Option<DeviceIdentity>,
}

impl DeviceTarget {
    pub fn new(node: PathBuf, alias: Option<PathBuf>, identity: Option<DeviceIdentity>) -> Self {
        let mut target = Self {
            node,
            alias,
            identity,
        };
        target.refresh_node();
        target
    }

    pub fn node(&self) -> &Path {
        &self.node
    }

    pub fn alias(&self) -> Option<&Path> {
        self.alias.as_deref()
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.identity
    }

    /// Re-resolve the alias. Returns the new node when it moved.
    pub fn refresh_node(&mut self) -> Option<PathBuf> {
        let alias = self.alias.as_ref()?;
        let resolved = alias.canonicalize().ok()?;
        if resolved == self.node {
            return None;
        }
        self.node = resolved.clone();
        Some(resolved)
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.node.display())?;
        if let Some(identity) = self.identity {
            write!(f, " ({identity})")?;
        }
        Ok(())
    }
}
