//! In-memory service manager that records requests.

use std::collections::HashSet;
use std::sync::Mutex;

use super::ServiceControl;
use crate::error::SupervisorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Start(String),
    Stop(String),
    Restart(String),
}

#[derive(Debug, Default)]
pub struct RecordingServices {
    calls: Mutex<Vec<ServiceCall>>,
    active: Mutex<HashSet<String>>,
    failing: HashSet<String>,
}

impl RecordingServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every request for `name` fail.
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn handle(&self, call: ServiceCall, name: &str, active: bool) -> Result<(), SupervisorError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.failing.contains(name) {
            return Err(SupervisorError::ServiceControlFailed {
                service: name.to_string(),
                reason: "simulated".to_string(),
            });
        }
        if let Ok(mut set) = self.active.lock() {
            if active {
                set.insert(name.to_string());
            } else {
                set.remove(name);
            }
        }
        Ok(())
    }
}

impl ServiceControl for RecordingServices {
    fn start(&self, name: &str) -> Result<(), SupervisorError> {
        self.handle(ServiceCall::Start(name.to_string()), name, true)
    }

    fn stop(&self, name: &str) -> Result<(), SupervisorError> {
        self.handle(ServiceCall::Stop(name.to_string()), name, false)
    }

    fn restart(&self, name: &str) -> Result<(), SupervisorError> {
        self.handle(ServiceCall::Restart(name.to_string()), name, true)
    }

    fn is_active(&self, name: &str) -> Result<bool, SupervisorError> {
        Ok(self
            .active
            .lock()
            .map(|set| set.contains(name))
            .unwrap_or(false))
    }
}
