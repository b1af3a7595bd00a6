//! Control of long-running services that depend on the capture device.

pub mod fake;
pub mod systemd;

pub use systemd::Systemctl;

use std::sync::Arc;

use crate::error::SupervisorError;

/// start / stop / restart / is-active against named services.
///
/// Implementations must treat redundant requests (stopping a stopped service,
/// restarting a running one) as success.
pub trait ServiceControl: Send + Sync {
    fn start(&self, name: &str) -> Result<(), SupervisorError>;
    fn stop(&self, name: &str) -> Result<(), SupervisorError>;
    fn restart(&self, name: &str) -> Result<(), SupervisorError>;
    fn is_active(&self, name: &str) -> Result<bool, SupervisorError>;
}

/// Something holding the device open that must let go before a repair and be
/// brought back after it: a service unit or the in-process bridging supervisor.
pub trait Dependent: Send + Sync {
    fn name(&self) -> String;
    fn stop(&self) -> Result<(), SupervisorError>;
    fn restart(&self) -> Result<(), SupervisorError>;
}

/// A named unit driven through a [`ServiceControl`].
pub struct ServiceUnit {
    name: String,
    control: Arc<dyn ServiceControl>,
}

impl ServiceUnit {
    pub fn new(name: impl Into<String>, control: Arc<dyn ServiceControl>) -> Self {
        Self {
            name: name.into(),
            control,
        }
    }
}

impl Dependent for ServiceUnit {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn stop(&self) -> Result<(), SupervisorError> {
        self.control.stop(&self.name)
    }

    fn restart(&self) -> Result<(), SupervisorError> {
        self.control.restart(&self.name)
    }
}

/// Outcome of one dependent operation, kept for the repair report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependentOutcome {
    pub name: String,
    pub error: Option<String>,
}

/// Ordered set of dependents. Operations are best-effort: every member is tried.
#[derive(Clone, Default)]
pub struct Dependents {
    members: Vec<Arc<dyn Dependent>>,
}

impl Dependents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, dependent: Arc<dyn Dependent>) {
        self.members.push(dependent);
    }

    pub fn with(mut self, dependent: Arc<dyn Dependent>) -> Self {
        self.push(dependent);
        self
    }

    pub fn stop_all(&self) -> Vec<DependentOutcome> {
        self.members
            .iter()
            .map(|d| DependentOutcome {
                name: d.name(),
                error: d.stop().err().map(|e| e.to_string()),
            })
            .collect()
    }

    pub fn restart_all(&self) -> Vec<DependentOutcome> {
        self.members
            .iter()
            .map(|d| DependentOutcome {
                name: d.name(),
                error: d.restart().err().map(|e| e.to_string()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{RecordingServices, ServiceCall};
    use super::*;

    #[test]
    fn test_dependents_try_every_member() {
        let services = Arc::new(RecordingServices::new().failing("feed.service"));
        let dependents = Dependents::new()
            .with(Arc::new(ServiceUnit::new("feed.service", services.clone())))
            .with(Arc::new(ServiceUnit::new("monitor.service", services.clone())));

        let outcomes = dependents.restart_all();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].error.is_some());
        assert!(outcomes[1].error.is_none());

        assert_eq!(
            services.calls(),
            vec![
                ServiceCall::Restart("feed.service".to_string()),
                ServiceCall::Restart("monitor.service".to_string()),
            ]
        );
    }
}
