//! Device repair with a live bridge as the dependent

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

use capguard::bridge::{BridgeCommand, BridgeSupervisor, BridgeTimings};
use capguard::hardware::fake::{HardwareCall, RecordingHardware};
use capguard::hardware::UsbLocation;
use capguard::models::{DeviceIdentity, DeviceTarget, HealthState};
use capguard::monitor::{
    DeviceMonitor, HealthProbe, ManualProbe, MonitorConfig, ProbeOutcome, TickOutcome,
};
use capguard::process::is_process_alive;
use capguard::registry::{ProcessKind, Registry};
use capguard::repair::{RepairLadder, RepairPolicy, StepOutcome};
use capguard::services::Dependents;

use super::helpers::{write_feed_script, LOOPING_FEED};

fn capture_card() -> DeviceIdentity {
    "0fd9:0066".parse().unwrap()
}

fn located_hardware() -> Arc<RecordingHardware> {
    Arc::new(
        RecordingHardware::new()
            .with_location(UsbLocation {
                bus_id: "1-2.3".to_string(),
                busnum: 1,
                devnum: 7,
            })
            .with_hub(),
    )
}

fn quick_monitor_config() -> MonitorConfig {
    MonitorConfig {
        probe_interval: Duration::ZERO,
        settle_interval: Duration::ZERO,
        escalation_cooldown: Duration::ZERO,
        policy: RepairPolicy::default(),
    }
}

fn started_bridge(temp: &TempDir) -> (BridgeSupervisor, Registry) {
    let program = write_feed_script(temp.path(), LOOPING_FEED);
    let registry = Registry::open(temp.path().join("state")).unwrap();
    let bridge = BridgeSupervisor::new(
        BridgeCommand {
            program,
            input: PathBuf::from("/dev/capguard-test-in"),
            output: PathBuf::from("/dev/capguard-test-out"),
            resolution: "1280x720".to_string(),
            framerate: 30,
            input_format: "mjpeg".to_string(),
        },
        registry.clone(),
        BridgeTimings {
            startup_grace: Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
            restart_backoff: Duration::from_millis(50),
            stop_timeout: Duration::from_millis(500),
        },
    );
    bridge.start().expect("bridge starts");
    (bridge, registry)
}

/// Healthy once the driver has been rebound.
struct HealthyAfterRebind {
    hardware: Arc<RecordingHardware>,
}

impl HealthProbe for HealthyAfterRebind {
    fn probe(&self, _node: &Path) -> ProbeOutcome {
        let rebound = self
            .hardware
            .calls()
            .iter()
            .any(|call| matches!(call, HardwareCall::Rebind(_)));
        if rebound {
            ProbeOutcome::healthy()
        } else {
            ProbeOutcome::unresponsive("VIDIOC_QUERYCAP timed out")
        }
    }
}

#[test]
#[serial]
fn test_failed_repair_still_hands_back_a_fresh_bridge() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let (bridge, registry) = started_bridge(&temp);
    let first_pid = bridge.pid().expect("bridge running");

    let hardware = located_hardware();
    let ladder = RepairLadder::new(
        hardware.clone(),
        Dependents::new().with(Arc::new(bridge.clone())),
    )
    .with_settle(Duration::ZERO);
    let mut monitor = DeviceMonitor::new(
        quick_monitor_config(),
        DeviceTarget::new(PathBuf::from("/dev/video-test"), None, Some(capture_card())),
        Arc::new(ManualProbe::new(HealthState::Absent)),
        ladder,
    );

    let outcome = monitor.tick(&AtomicBool::new(false));

    let TickOutcome::Repaired { attempt, report } = outcome else {
        panic!("expected a repair, got {outcome:?}");
    };
    assert_eq!(attempt, 1);
    assert!(!report.healthy_after);
    // First attempt never power-cycles the hub
    assert_eq!(
        hardware.calls(),
        vec![
            HardwareCall::SoftReset(capture_card()),
            HardwareCall::Rebind(capture_card()),
        ]
    );
    assert_eq!(report.outcome_of("restart-dependents"), Some(&StepOutcome::Ok));

    let second_pid = bridge.pid().expect("bridge restarted");
    assert_ne!(first_pid, second_pid);
    assert!(!is_process_alive(first_pid));
    assert!(!bridge.is_paused());
    assert_eq!(registry.read(ProcessKind::Bridge), Some(second_pid));

    bridge.stop();
}

#[test]
#[serial]
fn test_rebind_recovery_resets_attempts() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let (bridge, _registry) = started_bridge(&temp);

    let hardware = located_hardware();
    let ladder = RepairLadder::new(
        hardware.clone(),
        Dependents::new().with(Arc::new(bridge.clone())),
    )
    .with_settle(Duration::ZERO);
    let mut monitor = DeviceMonitor::new(
        quick_monitor_config(),
        DeviceTarget::new(PathBuf::from("/dev/video-test"), None, Some(capture_card())),
        Arc::new(HealthyAfterRebind {
            hardware: hardware.clone(),
        }),
        ladder,
    );
    let stop = AtomicBool::new(false);

    let TickOutcome::Repaired { report, .. } = monitor.tick(&stop) else {
        panic!("expected a repair");
    };

    assert!(report.healthy_after);
    assert_eq!(report.outcome_of("soft-reset"), Some(&StepOutcome::Ok));
    assert_eq!(report.outcome_of("rebind"), Some(&StepOutcome::Ok));
    assert!(matches!(
        report.outcome_of("hub-cycle"),
        Some(StepOutcome::Skipped(_))
    ));
    assert_eq!(monitor.attempts(), 0);
    assert_eq!(monitor.tick(&stop), TickOutcome::Healthy);
    assert!(bridge.pid().is_some());

    bridge.stop();
}
