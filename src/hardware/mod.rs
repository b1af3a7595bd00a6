//! Hardware remediation primitives
//!
//! Everything that touches the USB device itself sits behind [`HardwareController`]
//! so the repair ladder can be driven against [`fake::RecordingHardware`] in tests.

pub mod fake;
pub mod linux;
pub mod usb;
pub mod v4l2;

pub use linux::LinuxHardware;
pub use usb::{HubPort, UsbLocation, UsbTopology};

use crate::error::SupervisorError;
use crate::models::DeviceIdentity;

pub trait HardwareController: Send + Sync {
    /// Resolve the device's current bus location, if it is enumerated.
    fn locate(&self, identity: DeviceIdentity) -> Option<UsbLocation>;

    /// Bus-level reset of the device, without touching its driver binding.
    fn soft_reset(&self, identity: DeviceIdentity) -> Result<(), SupervisorError>;

    /// Unbind and rebind the device's driver.
    fn rebind(&self, identity: DeviceIdentity) -> Result<(), SupervisorError>;

    /// Power the hub port off and back on.
    fn power_cycle(&self, port: &HubPort) -> Result<(), SupervisorError>;

    /// Whether a power-control tool is available at all.
    fn can_power_cycle(&self) -> bool;
}
