//! Recording hardware controller for tests and dry runs.

use std::sync::Mutex;

use super::usb::{HubPort, UsbLocation};
use super::HardwareController;
use crate::error::SupervisorError;
use crate::models::DeviceIdentity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareCall {
    SoftReset(DeviceIdentity),
    Rebind(DeviceIdentity),
    PowerCycle(HubPort),
}

/// Records every call and answers with pre-configured outcomes.
#[derive(Debug, Default)]
pub struct RecordingHardware {
    calls: Mutex<Vec<HardwareCall>>,
    location: Option<UsbLocation>,
    fail_reset: bool,
    fail_rebind: bool,
    hub_available: bool,
}

impl RecordingHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, location: UsbLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn failing_reset(mut self) -> Self {
        self.fail_reset = true;
        self
    }

    pub fn failing_rebind(mut self) -> Self {
        self.fail_rebind = true;
        self
    }

    pub fn with_hub(mut self) -> Self {
        self.hub_available = true;
        self
    }

    pub fn calls(&self) -> Vec<HardwareCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn push(&self, call: HardwareCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl HardwareController for RecordingHardware {
    fn locate(&self, _identity: DeviceIdentity) -> Option<UsbLocation> {
        self.location.clone()
    }

    fn soft_reset(&self, identity: DeviceIdentity) -> Result<(), SupervisorError> {
        self.push(HardwareCall::SoftReset(identity));
        if self.fail_reset {
            return Err(SupervisorError::ResetFailed("simulated".to_string()));
        }
        Ok(())
    }

    fn rebind(&self, identity: DeviceIdentity) -> Result<(), SupervisorError> {
        self.push(HardwareCall::Rebind(identity));
        if self.fail_rebind {
            return Err(SupervisorError::RebindFailed("simulated".to_string()));
        }
        Ok(())
    }

    fn power_cycle(&self, port: &HubPort) -> Result<(), SupervisorError> {
        self.push(HardwareCall::PowerCycle(port.clone()));
        if !self.hub_available {
            return Err(SupervisorError::HubCycleUnavailable("simulated".to_string()));
        }
        Ok(())
    }

    fn can_power_cycle(&self) -> bool {
        self.hub_available
    }
}
