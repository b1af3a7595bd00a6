//! Startup, shutdown and cleanup of a whole session

use std::sync::{Arc, Mutex};

use serial_test::serial;
use tempfile::TempDir;

use capguard::consumer::ScriptedLauncher;
use capguard::error::SupervisorError;
use capguard::orchestrator::InstanceLock;
use capguard::process::is_process_alive;
use capguard::registry::{ProcessKind, Registry};

use super::helpers::{orchestrator, quick_settings, run_options, settings_with_bridge};

#[test]
fn test_clean_exit_leaves_no_records_and_releases_lock() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let settings = quick_settings(&temp);
    let lock_path = settings.lock_path();
    let state_dir = settings.state_dir();

    let seen_lock = Arc::new(Mutex::new(None));
    let launcher = {
        let seen_lock = seen_lock.clone();
        let lock_path = lock_path.clone();
        Arc::new(ScriptedLauncher::new([0]).with_hook(move |_| {
            *seen_lock.lock().unwrap() = InstanceLock::holder(&lock_path);
        }))
    };

    let episode = orchestrator(settings, launcher.clone())
        .run(run_options(false))
        .expect("session should end cleanly");

    assert!(episode.is_clean());
    assert_eq!(launcher.launches().len(), 1);
    assert_eq!(*seen_lock.lock().unwrap(), Some(std::process::id()));

    let registry = Registry::open(&state_dir).unwrap();
    assert!(!registry.has_records());
    assert_eq!(InstanceLock::holder(&lock_path), None);
}

#[test]
fn test_missing_consumer_fails_preflight_without_launching() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let mut settings = quick_settings(&temp);
    settings.config.consumer.program = "capguard-test-no-such-consumer".into();
    let launcher = Arc::new(ScriptedLauncher::new([0]));

    let err = orchestrator(settings, launcher.clone())
        .run(run_options(false))
        .expect_err("preflight should refuse");

    let err = err
        .downcast_ref::<SupervisorError>()
        .expect("typed supervisor error");
    assert!(matches!(err, SupervisorError::PreflightFailed(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(launcher.launches().is_empty());
}

#[test]
fn test_second_session_on_same_base_dir_is_refused() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let settings = quick_settings(&temp);
    let _held = InstanceLock::acquire(&settings.lock_path()).unwrap();
    let launcher = Arc::new(ScriptedLauncher::new([0]));

    let err = orchestrator(settings, launcher.clone())
        .run(run_options(false))
        .expect_err("lock is held");

    assert!(err.to_string().contains("another capguard instance"));
    assert!(launcher.launches().is_empty());
}

#[test]
#[serial]
fn test_bridge_runs_during_session_and_is_stopped_after() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let settings = settings_with_bridge(&temp);
    let registry = Registry::open(settings.state_dir()).unwrap();

    let bridge_pid = Arc::new(Mutex::new(None));
    let launcher = {
        let registry = registry.clone();
        let bridge_pid = bridge_pid.clone();
        Arc::new(ScriptedLauncher::new([0]).with_hook(move |_| {
            *bridge_pid.lock().unwrap() = registry.live_pid(ProcessKind::Bridge);
        }))
    };

    let episode = orchestrator(settings, launcher)
        .run(run_options(true))
        .expect("session should end cleanly");

    assert!(episode.is_clean());
    let pid = bridge_pid
        .lock()
        .unwrap()
        .expect("bridge was running while the consumer ran");
    assert!(!is_process_alive(pid));
    assert!(!registry.has_records());
}

#[test]
#[serial]
fn test_no_loopback_skips_bridge() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let settings = settings_with_bridge(&temp);
    let registry = Registry::open(settings.state_dir()).unwrap();

    let bridge_seen = Arc::new(Mutex::new(None));
    let launcher = {
        let registry = registry.clone();
        let bridge_seen = bridge_seen.clone();
        Arc::new(ScriptedLauncher::new([0]).with_hook(move |_| {
            *bridge_seen.lock().unwrap() = Some(registry.read(ProcessKind::Bridge));
        }))
    };

    orchestrator(settings, launcher)
        .run(run_options(false))
        .expect("session should end cleanly");

    assert_eq!(*bridge_seen.lock().unwrap(), Some(None));
}
