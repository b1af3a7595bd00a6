//! `capguard repair`: walk the full remediation ladder once, by hand.

use anyhow::{anyhow, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use super::{init_session_logging, load_settings};
use crate::config::CliOverrides;
use crate::hardware::{HubPort, LinuxHardware, UsbLocation};
use crate::models::{DeviceIdentity, DeviceTarget};
use crate::monitor::{HealthProbe, V4l2Probe};
use crate::repair::{PlanContext, RepairLadder, RepairPlan, RepairPolicy, RepairReport, StepOutcome};
use crate::services::{Dependents, ServiceUnit, Systemctl};

#[derive(Debug, Clone, Default)]
pub struct RepairArgs {
    pub base_dir: Option<PathBuf>,
    pub device: Option<PathBuf>,
    pub usb_id: Option<DeviceIdentity>,
    /// Hub port to cycle when the device is not enumerated and cannot be located
    pub hub_port: Option<HubPort>,
    pub json: bool,
}

pub fn execute(args: RepairArgs) -> Result<()> {
    let settings = load_settings(
        args.base_dir,
        &CliOverrides {
            device: args.device,
            usb_id: args.usb_id,
            ..CliOverrides::default()
        },
    )?;
    settings.validate()?;
    init_session_logging(&settings)?;

    let services = Arc::new(Systemctl::new(settings.config.services.user));
    let mut dependents = Dependents::new();
    for unit in &settings.config.services.units {
        dependents.push(Arc::new(ServiceUnit::new(unit.clone(), services.clone())));
    }

    let ladder = RepairLadder::new(Arc::new(LinuxHardware::system()), dependents)
        .with_settle(settings.monitor_config().settle_interval);
    let mut target = settings.device_target();
    let probe = V4l2Probe;

    if !args.json {
        println!("{} Repairing {target}", "→".cyan().bold());
    }
    let report = repair_device(
        &mut target,
        &settings.config.repair,
        &ladder,
        &probe,
        args.hub_port,
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.healthy_after {
        return Ok(());
    }
    let outcome = probe.probe(target.node());
    Err(outcome
        .to_error(target.node())
        .map(anyhow::Error::from)
        .unwrap_or_else(|| anyhow!("device {target} did not recover")))
}

/// Build a standalone plan (hub cycle allowed immediately) and run it.
pub fn repair_device(
    target: &mut DeviceTarget,
    policy: &RepairPolicy,
    ladder: &RepairLadder,
    probe: &dyn HealthProbe,
    hub_port: Option<HubPort>,
) -> RepairReport {
    let hardware = ladder.hardware();
    let identity = target.identity();
    let hub_port = hub_port.or_else(|| {
        identity
            .and_then(|id| hardware.locate(id))
            .as_ref()
            .and_then(UsbLocation::hub_port)
    });

    let ctx = PlanContext {
        identity,
        hub_port,
        can_power_cycle: hardware.can_power_cycle(),
        attempt: None,
    };
    let plan = RepairPlan::build(&ctx, policy);

    ladder.run(&plan, &mut || {
        target.refresh_node();
        probe.probe(target.node()).state.is_healthy()
    })
}

fn print_report(report: &RepairReport) {
    for record in &report.steps {
        match &record.outcome {
            StepOutcome::Ok => println!("  {} {}", "✓".green().bold(), record.step),
            StepOutcome::Failed(reason) => {
                println!("  {} {} {}", "✗".red().bold(), record.step, reason.dimmed())
            }
            StepOutcome::Skipped(reason) => {
                println!("  {} {} {}", "─".dimmed(), record.step, reason.dimmed())
            }
        }
    }
    if report.healthy_after {
        println!("{} Device healthy", "✓".green().bold());
    } else {
        println!("{} Device still unhealthy", "✗".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::fake::{HardwareCall, RecordingHardware};
    use crate::models::HealthState;
    use crate::monitor::ManualProbe;
    use crate::services::fake::{RecordingServices, ServiceCall};
    use std::time::Duration;

    fn capture_card() -> DeviceIdentity {
        "0fd9:0066".parse().unwrap()
    }

    fn target() -> DeviceTarget {
        DeviceTarget::new(PathBuf::from("/dev/video0"), None, Some(capture_card()))
    }

    fn location() -> UsbLocation {
        UsbLocation {
            bus_id: "1-2.3".to_string(),
            busnum: 1,
            devnum: 7,
        }
    }

    #[test]
    fn test_standalone_repair_cycles_located_hub_port() {
        let hardware = Arc::new(RecordingHardware::new().with_location(location()).with_hub());
        let services = Arc::new(RecordingServices::new());
        let dependents = Dependents::new().with(Arc::new(ServiceUnit::new(
            "obs-feed.service".to_string(),
            services.clone(),
        )));
        let ladder = RepairLadder::new(hardware.clone(), dependents).with_settle(Duration::ZERO);
        let probe = ManualProbe::new(HealthState::Absent);

        let report = repair_device(
            &mut target(),
            &RepairPolicy::default(),
            &ladder,
            &probe,
            None,
        );

        assert!(!report.healthy_after);
        assert_eq!(
            hardware.calls(),
            vec![
                HardwareCall::SoftReset(capture_card()),
                HardwareCall::Rebind(capture_card()),
                HardwareCall::PowerCycle("1-2:3".parse().unwrap()),
            ]
        );
        assert_eq!(
            services.calls(),
            vec![ServiceCall::Restart("obs-feed.service".to_string())]
        );
    }

    #[test]
    fn test_explicit_hub_port_wins_over_lookup() {
        let hardware = Arc::new(RecordingHardware::new().with_hub());
        let ladder = RepairLadder::new(hardware.clone(), Dependents::new())
            .with_settle(Duration::ZERO);
        let probe = ManualProbe::new(HealthState::Absent);

        repair_device(
            &mut target(),
            &RepairPolicy::default(),
            &ladder,
            &probe,
            Some("3-1:4".parse().unwrap()),
        );

        assert!(hardware
            .calls()
            .contains(&HardwareCall::PowerCycle("3-1:4".parse().unwrap())));
    }

    #[test]
    fn test_repair_stops_escalating_once_healthy() {
        let hardware = Arc::new(RecordingHardware::new().with_location(location()).with_hub());
        let ladder = RepairLadder::new(hardware.clone(), Dependents::new())
            .with_settle(Duration::ZERO);
        let probe = ManualProbe::new(HealthState::Healthy);

        let report = repair_device(
            &mut target(),
            &RepairPolicy::default(),
            &ladder,
            &probe,
            None,
        );

        assert!(report.healthy_after);
        assert_eq!(hardware.calls(), vec![HardwareCall::SoftReset(capture_card())]);
        assert!(matches!(
            report.outcome_of("hub-cycle"),
            Some(StepOutcome::Skipped(_))
        ));
    }
}
