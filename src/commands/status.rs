//! `capguard status`: what is running and how the device looks right now.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use super::load_settings;
use crate::config::{CliOverrides, Settings};
use crate::hardware::{HardwareController, LinuxHardware, UsbLocation};
use crate::models::{DeviceIdentity, HealthState};
use crate::monitor::{HealthProbe, V4l2Probe};
use crate::orchestrator::InstanceLock;
use crate::registry::{RecordStatus, Registry};

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub node: PathBuf,
    pub usb_id: Option<DeviceIdentity>,
    pub state: HealthState,
    pub detail: Option<String>,
    pub location: Option<UsbLocation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub base_dir: PathBuf,
    /// Pid of the orchestrator holding the instance lock
    pub orchestrator: Option<u32>,
    pub processes: Vec<RecordStatus>,
    pub streaming: bool,
    pub device: DeviceStatus,
}

pub fn execute(base_dir: Option<PathBuf>, json: bool) -> Result<()> {
    let settings = load_settings(base_dir, &CliOverrides::default())?;
    let report = collect(&settings, &V4l2Probe, &LinuxHardware::system())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

pub fn collect(
    settings: &Settings,
    probe: &dyn HealthProbe,
    hardware: &dyn HardwareController,
) -> Result<StatusReport> {
    let registry = Registry::open(settings.state_dir())?;
    let target = settings.device_target();
    let outcome = probe.probe(target.node());

    Ok(StatusReport {
        base_dir: settings.base_dir().to_path_buf(),
        orchestrator: InstanceLock::holder(&settings.lock_path()),
        processes: registry.snapshot(),
        streaming: registry.was_streaming(),
        device: DeviceStatus {
            node: target.node().to_path_buf(),
            usb_id: target.identity(),
            state: outcome.state,
            detail: outcome.detail,
            location: target.identity().and_then(|id| hardware.locate(id)),
        },
    })
}

fn print_report(report: &StatusReport) {
    println!("{}", "capguard status".bold().blue());
    println!("{}", "=".repeat(40));
    println!("  Base dir: {}", report.base_dir.display());
    match report.orchestrator {
        Some(pid) => println!("  Session:  {} (pid {pid})", "running".green()),
        None => println!("  Session:  {}", "not running".dimmed()),
    }

    println!("\n{}", "Processes".bold());
    for record in &report.processes {
        match (record.pid, record.alive) {
            (Some(pid), true) => {
                println!("  {} {:<9} pid {pid}", "✓".green().bold(), record.kind)
            }
            (Some(pid), false) => println!(
                "  {} {:<9} pid {pid} {}",
                "✗".red().bold(),
                record.kind,
                "(stale record)".dimmed()
            ),
            (None, _) => println!(
                "  {} {:<9} {}",
                "─".dimmed(),
                record.kind,
                "not running".dimmed()
            ),
        }
    }
    if report.streaming {
        println!("  Last consumer session was streaming");
    }

    let device = &report.device;
    println!("\n{}", "Device".bold());
    let state = match device.state {
        HealthState::Healthy => device.state.to_string().green(),
        HealthState::Absent => device.state.to_string().red(),
        HealthState::Unresponsive => device.state.to_string().yellow(),
    };
    println!("  Node:     {} {state}", device.node.display());
    if let Some(detail) = &device.detail {
        println!("            {}", detail.dimmed());
    }
    if let Some(usb_id) = device.usb_id {
        match &device.location {
            Some(location) => println!("  USB:      {usb_id} at {location}"),
            None => println!("  USB:      {usb_id} {}", "(not enumerated)".dimmed()),
        }
    }
    println!();
}
