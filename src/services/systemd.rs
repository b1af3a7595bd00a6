use std::process::Command;
use std::time::Duration;

use tracing::debug;

use super::ServiceControl;
use crate::error::SupervisorError;
use crate::models::constants::TOOL_TIMEOUT;
use crate::process::{run_bounded, ToolOutput};

/// `systemctl` front end, system or `--user` scope.
#[derive(Debug, Clone)]
pub struct Systemctl {
    user: bool,
    timeout: Duration,
}

impl Systemctl {
    pub fn new(user: bool) -> Self {
        Self {
            user,
            timeout: TOOL_TIMEOUT,
        }
    }

    pub fn is_installed() -> bool {
        which::which("systemctl").is_ok()
    }

    fn run(&self, verb: &str, name: &str) -> Result<ToolOutput, SupervisorError> {
        let mut cmd = Command::new("systemctl");
        if self.user {
            cmd.arg("--user");
        }
        cmd.args([verb, name]);

        debug!(verb, unit = name, user = self.user, "systemctl");
        run_bounded(&mut cmd, self.timeout).map_err(|e| SupervisorError::ServiceControlFailed {
            service: name.to_string(),
            reason: format!("{e:#}"),
        })
    }

    fn expect_success(&self, verb: &str, name: &str) -> Result<(), SupervisorError> {
        let output = self.run(verb, name)?;
        if output.success() {
            Ok(())
        } else {
            Err(SupervisorError::ServiceControlFailed {
                service: name.to_string(),
                reason: format!("systemctl {verb}: {}", output.failure_reason()),
            })
        }
    }
}

impl ServiceControl for Systemctl {
    fn start(&self, name: &str) -> Result<(), SupervisorError> {
        self.expect_success("start", name)
    }

    fn stop(&self, name: &str) -> Result<(), SupervisorError> {
        self.expect_success("stop", name)
    }

    fn restart(&self, name: &str) -> Result<(), SupervisorError> {
        self.expect_success("restart", name)
    }

    fn is_active(&self, name: &str) -> Result<bool, SupervisorError> {
        // is-active exits non-zero for inactive units; only a timeout is an error
        let output = self.run("is-active", name)?;
        if output.timed_out {
            return Err(SupervisorError::ServiceControlFailed {
                service: name.to_string(),
                reason: "systemctl is-active timed out".to_string(),
            });
        }
        Ok(output.success())
    }
}
