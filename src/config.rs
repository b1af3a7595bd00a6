//! Configuration
//!
//! Optional `<base>/capguard.toml`; every field has a default and CLI flags win.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::{BridgeCommand, BridgeTimings};
use crate::consumer::{ConsumerConfig, ResumeConfig};
use crate::models::constants::{
    LOG_TAIL_LINES, MAX_CONSUMER_CRASHES, RESUME_DIRECTIVE, STREAM_START_MARKER,
};
use crate::models::{DeviceIdentity, DeviceTarget};
use crate::monitor::MonitorConfig;
use crate::repair::RepairPolicy;

pub const CONFIG_FILE: &str = "capguard.toml";
pub const BASE_DIR_ENV: &str = "CAPGUARD_HOME";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    pub node: PathBuf,
    /// Stable symlink (e.g. under /dev/v4l/by-id) re-resolved on every probe
    pub alias: Option<PathBuf>,
    pub usb_id: Option<DeviceIdentity>,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            node: PathBuf::from("/dev/video0"),
            alias: None,
            usb_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    pub enabled: bool,
    /// Defaults to `<base>/feed.sh`
    pub program: Option<PathBuf>,
    /// Loopback sink the bridge writes into
    pub output: PathBuf,
    pub resolution: String,
    pub framerate: u32,
    pub input_format: String,
    pub startup_grace_secs: u64,
    pub poll_interval_secs: u64,
    pub restart_backoff_secs: u64,
    pub stop_timeout_secs: u64,
}

impl Default for BridgeSection {
    fn default() -> Self {
        let timings = BridgeTimings::default();
        Self {
            enabled: true,
            program: None,
            output: PathBuf::from("/dev/video10"),
            resolution: "1920x1080".to_string(),
            framerate: 60,
            input_format: "yuyv422".to_string(),
            startup_grace_secs: timings.startup_grace.as_secs(),
            poll_interval_secs: timings.poll_interval.as_secs(),
            restart_backoff_secs: timings.restart_backoff.as_secs(),
            stop_timeout_secs: timings.stop_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSection {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Defaults to `~/.config/obs-studio/logs`
    pub log_dir: Option<PathBuf>,
    pub log_pattern: String,
    pub stream_marker: String,
    pub resume_directive: String,
    pub tail_lines: usize,
    pub auto_resume: bool,
    pub max_crashes: u32,
    pub recovery_delay_secs: u64,
}

impl Default for ConsumerSection {
    fn default() -> Self {
        Self {
            program: PathBuf::from("obs"),
            args: Vec::new(),
            log_dir: None,
            log_pattern: "*.txt".to_string(),
            stream_marker: STREAM_START_MARKER.to_string(),
            resume_directive: RESUME_DIRECTIVE.to_string(),
            tail_lines: LOG_TAIL_LINES,
            auto_resume: true,
            max_crashes: MAX_CONSUMER_CRASHES,
            recovery_delay_secs: ConsumerConfig::default().recovery_delay.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub enabled: bool,
    pub probe_interval_secs: u64,
    pub settle_secs: u64,
    pub escalation_cooldown_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            enabled: true,
            probe_interval_secs: defaults.probe_interval.as_secs(),
            settle_secs: defaults.settle_interval.as_secs(),
            escalation_cooldown_secs: defaults.escalation_cooldown.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesSection {
    /// Use `systemctl --user`
    pub user: bool,
    /// Units stopped before and restarted after a repair
    pub units: Vec<String>,
}

impl Default for ServicesSection {
    fn default() -> Self {
        Self {
            user: true,
            units: Vec::new(),
        }
    }
}

/// Contents of `capguard.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub device: DeviceSection,
    pub bridge: BridgeSection,
    pub consumer: ConsumerSection,
    pub monitor: MonitorSection,
    pub repair: RepairPolicy,
    pub services: ServicesSection,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// Flags from the command line that override the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub device: Option<PathBuf>,
    pub usb_id: Option<DeviceIdentity>,
    pub consumer_args: Vec<String>,
    pub no_auto_resume: bool,
}

/// Resolved configuration plus the directory layout under the base dir.
#[derive(Debug, Clone)]
pub struct Settings {
    base_dir: PathBuf,
    pub config: FileConfig,
}

impl Settings {
    /// `--base-dir`, else `$CAPGUARD_HOME`, else `~/.capguard`.
    pub fn resolve_base_dir(cli: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(dir) = cli {
            return Ok(dir);
        }
        if let Some(dir) = std::env::var_os(BASE_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        dirs::home_dir()
            .map(|home| home.join(".capguard"))
            .context("Cannot determine home directory; pass --base-dir")
    }

    pub fn load(base_dir: PathBuf) -> Result<Self> {
        let config = FileConfig::load(&base_dir.join(CONFIG_FILE))?;
        Ok(Self { base_dir, config })
    }

    pub fn with_config(base_dir: PathBuf, config: FileConfig) -> Self {
        Self { base_dir, config }
    }

    pub fn apply(&mut self, overrides: &CliOverrides) {
        if let Some(device) = &overrides.device {
            self.config.device.node = device.clone();
        }
        if let Some(usb_id) = overrides.usb_id {
            self.config.device.usb_id = Some(usb_id);
        }
        if !overrides.consumer_args.is_empty() {
            self.config.consumer.args = overrides.consumer_args.clone();
        }
        if overrides.no_auto_resume {
            self.config.consumer.auto_resume = false;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Err(e) = self.config.repair.validate() {
            bail!("{e}");
        }
        let nonzero = [
            ("monitor.probe_interval_secs", self.config.monitor.probe_interval_secs),
            ("bridge.poll_interval_secs", self.config.bridge.poll_interval_secs),
            ("bridge.stop_timeout_secs", self.config.bridge.stop_timeout_secs),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if self.config.bridge.framerate == 0 {
            bail!("bridge.framerate must be greater than zero");
        }
        if self.config.consumer.resume_directive.trim().is_empty() {
            bail!("consumer.resume_directive must not be empty");
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join("state")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir().join("capguard.lock")
    }

    pub fn device_target(&self) -> DeviceTarget {
        let device = &self.config.device;
        DeviceTarget::new(device.node.clone(), device.alias.clone(), device.usb_id)
    }

    pub fn bridge_program(&self) -> PathBuf {
        self.config
            .bridge
            .program
            .clone()
            .unwrap_or_else(|| self.base_dir.join("feed.sh"))
    }

    pub fn bridge_command(&self, input: &Path) -> BridgeCommand {
        let bridge = &self.config.bridge;
        BridgeCommand {
            program: self.bridge_program(),
            input: input.to_path_buf(),
            output: bridge.output.clone(),
            resolution: bridge.resolution.clone(),
            framerate: bridge.framerate,
            input_format: bridge.input_format.clone(),
        }
    }

    pub fn bridge_timings(&self) -> BridgeTimings {
        let bridge = &self.config.bridge;
        BridgeTimings {
            startup_grace: Duration::from_secs(bridge.startup_grace_secs),
            poll_interval: Duration::from_secs(bridge.poll_interval_secs),
            restart_backoff: Duration::from_secs(bridge.restart_backoff_secs),
            stop_timeout: Duration::from_secs(bridge.stop_timeout_secs),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        let monitor = &self.config.monitor;
        MonitorConfig {
            probe_interval: Duration::from_secs(monitor.probe_interval_secs),
            settle_interval: Duration::from_secs(monitor.settle_secs),
            escalation_cooldown: Duration::from_secs(monitor.escalation_cooldown_secs),
            policy: self.config.repair,
        }
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        let consumer = &self.config.consumer;
        ConsumerConfig {
            args: consumer.args.clone(),
            max_crashes: consumer.max_crashes,
            recovery_delay: Duration::from_secs(consumer.recovery_delay_secs),
        }
    }

    pub fn resume_config(&self) -> ResumeConfig {
        let consumer = &self.config.consumer;
        let defaults = ResumeConfig::default();
        ResumeConfig {
            log_dir: consumer.log_dir.clone().unwrap_or(defaults.log_dir),
            log_pattern: consumer.log_pattern.clone(),
            marker: consumer.stream_marker.clone(),
            directive: consumer.resume_directive.clone(),
            tail_lines: consumer.tail_lines,
            auto_resume: consumer.auto_resume,
        }
    }
}
