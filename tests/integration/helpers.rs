//! Shared fixtures for session integration tests

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use capguard::config::{FileConfig, Settings};
use capguard::consumer::Launcher;
use capguard::hardware::fake::RecordingHardware;
use capguard::models::HealthState;
use capguard::monitor::ManualProbe;
use capguard::orchestrator::{Orchestrator, PreflightOptions, RunOptions};
use capguard::services::fake::RecordingServices;

pub const LOOPING_FEED: &str = "while true; do sleep 0.1; done";

/// Settings rooted in `temp` with every delay shrunk and the bridge off.
pub fn quick_settings(temp: &TempDir) -> Settings {
    let mut config = FileConfig::default();
    config.device.usb_id = Some("0fd9:0066".parse().expect("valid usb id"));
    config.consumer.program = PathBuf::from("sh");
    config.consumer.recovery_delay_secs = 0;
    config.consumer.log_dir = Some(consumer_log_dir(temp));
    config.monitor.probe_interval_secs = 1;
    config.monitor.settle_secs = 0;
    config.bridge.enabled = false;
    config.bridge.startup_grace_secs = 0;
    config.bridge.poll_interval_secs = 1;
    config.bridge.restart_backoff_secs = 0;
    config.bridge.stop_timeout_secs = 1;
    Settings::with_config(temp.path().to_path_buf(), config)
}

/// Same as [`quick_settings`] with a looping bridge script feeding `/dev/null`.
pub fn settings_with_bridge(temp: &TempDir) -> Settings {
    let mut settings = quick_settings(temp);
    let program = write_feed_script(temp.path(), LOOPING_FEED);
    settings.config.bridge.enabled = true;
    settings.config.bridge.program = Some(program);
    settings.config.bridge.output = PathBuf::from("/dev/null");
    settings
}

pub fn consumer_log_dir(temp: &TempDir) -> PathBuf {
    temp.path().join("obs-logs")
}

pub fn write_feed_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("feed.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write feed script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("Failed to make feed script executable");
    path
}

pub fn run_options(loopback: bool) -> RunOptions {
    RunOptions {
        preflight: PreflightOptions {
            check_device: true,
            loopback,
        },
        handle_signals: false,
    }
}

/// Orchestrator with a healthy fake device and the given consumer.
pub fn orchestrator(settings: Settings, launcher: Arc<dyn Launcher>) -> Orchestrator {
    Orchestrator::system(settings)
        .with_hardware(Arc::new(RecordingHardware::new()))
        .with_probe(Arc::new(ManualProbe::new(HealthState::Healthy)))
        .with_services(Arc::new(RecordingServices::new()))
        .with_launcher(launcher)
}
