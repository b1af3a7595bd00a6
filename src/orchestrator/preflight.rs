//! Checks run before any supervision loop starts.

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use tracing::{info, warn};

use crate::config::Settings;
use crate::error::SupervisorError;
use crate::hardware::HardwareController;
use crate::models::HealthState;
use crate::monitor::HealthProbe;
use crate::services::Systemctl;

#[derive(Debug, Clone, Copy)]
pub struct PreflightOptions {
    pub check_device: bool,
    /// Run the loopback bridge (and require its sink)
    pub loopback: bool,
}

impl Default for PreflightOptions {
    fn default() -> Self {
        Self {
            check_device: true,
            loopback: true,
        }
    }
}

/// Collect every blocking problem; fail with all of them at once.
pub fn run_preflight(
    settings: &Settings,
    options: PreflightOptions,
    probe: &dyn HealthProbe,
    hardware: &dyn HardwareController,
) -> Result<(), SupervisorError> {
    let mut problems = Vec::new();
    let config = &settings.config;

    if let Err(e) = settings.validate() {
        problems.push(format!("{e:#}"));
    }

    if let Err(e) = fs::create_dir_all(settings.state_dir()) {
        problems.push(format!(
            "cannot create state directory {}: {e}",
            settings.state_dir().display()
        ));
    }

    if which::which(&config.consumer.program).is_err() {
        problems.push(format!(
            "consumer '{}' not found on PATH",
            config.consumer.program.display()
        ));
    }

    if options.loopback && config.bridge.enabled {
        let program = settings.bridge_program();
        if which::which(&program).is_err() {
            problems.push(format!(
                "bridge program {} is missing or not executable",
                program.display()
            ));
        }
        if !is_char_device(&config.bridge.output) {
            problems.push(format!(
                "loopback sink {} is not available (is v4l2loopback loaded?)",
                config.bridge.output.display()
            ));
        }
    }

    let target = settings.device_target();
    if options.check_device {
        let outcome = probe.probe(target.node());
        match outcome.state {
            HealthState::Healthy => info!(device = %target, "capture device ready"),
            HealthState::Absent => problems.push(format!(
                "capture device {} is absent",
                target.node().display()
            )),
            HealthState::Unresponsive => warn!(
                device = %target,
                detail = outcome.detail.as_deref().unwrap_or(""),
                "capture device unresponsive, the monitor will try to repair it"
            ),
        }
    }

    if let Some(identity) = target.identity() {
        if hardware.locate(identity).is_none() {
            warn!(usb_id = %identity, "device not enumerated on the USB bus");
        }
        if !hardware.can_power_cycle() {
            warn!("uhubctl not found, hub power cycling disabled");
        }
    }

    if !config.services.units.is_empty() && !Systemctl::is_installed() {
        problems.push("systemctl not found but dependent units are configured".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(SupervisorError::PreflightFailed(problems.join("; ")))
    }
}

fn is_char_device(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.file_type().is_char_device())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;
    use crate::hardware::fake::RecordingHardware;
    use crate::monitor::ManualProbe;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn settings(base: &Path) -> Settings {
        let mut config = FileConfig::default();
        config.consumer.program = PathBuf::from("sh");
        config.bridge.output = PathBuf::from("/dev/null");
        config.bridge.program = Some(PathBuf::from("/bin/sh"));
        Settings::with_config(base.to_path_buf(), config)
    }

    #[test]
    fn test_passes_with_healthy_device() {
        let temp = TempDir::new().unwrap();
        let result = run_preflight(
            &settings(temp.path()),
            PreflightOptions::default(),
            &ManualProbe::new(HealthState::Healthy),
            &RecordingHardware::new(),
        );
        assert!(result.is_ok(), "{result:?}");
        assert!(temp.path().join("state").is_dir());
    }

    #[test]
    fn test_absent_device_fails_unless_skipped() {
        let temp = TempDir::new().unwrap();
        let settings = settings(temp.path());
        let probe = ManualProbe::new(HealthState::Absent);

        let err = run_preflight(
            &settings,
            PreflightOptions::default(),
            &probe,
            &RecordingHardware::new(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("absent"));

        let skipped = PreflightOptions {
            check_device: false,
            loopback: true,
        };
        assert!(run_preflight(&settings, skipped, &probe, &RecordingHardware::new()).is_ok());
    }

    #[test]
    fn test_reports_every_problem() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings(temp.path());
        settings.config.consumer.program = PathBuf::from("capguard-no-such-consumer");
        settings.config.bridge.program = Some(temp.path().join("missing-feed.sh"));
        settings.config.bridge.output = temp.path().join("video10");

        let err = run_preflight(
            &settings,
            PreflightOptions::default(),
            &ManualProbe::new(HealthState::Healthy),
            &RecordingHardware::new(),
        )
        .unwrap_err()
        .to_string();

        assert!(err.contains("capguard-no-such-consumer"));
        assert!(err.contains("missing-feed.sh"));
        assert!(err.contains("v4l2loopback"));
    }

    #[test]
    fn test_no_loopback_skips_bridge_checks() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings(temp.path());
        settings.config.bridge.program = Some(temp.path().join("missing-feed.sh"));
        settings.config.bridge.output = temp.path().join("video10");

        let options = PreflightOptions {
            check_device: true,
            loopback: false,
        };
        assert!(run_preflight(
            &settings,
            options,
            &ManualProbe::new(HealthState::Healthy),
            &RecordingHardware::new()
        )
        .is_ok());
    }
}
