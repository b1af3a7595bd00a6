//! Consumer crash recovery through the orchestrator

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use capguard::consumer::ScriptedLauncher;
use capguard::error::SupervisorError;
use capguard::models::constants::{RESUME_DIRECTIVE, STREAM_START_MARKER};
use capguard::registry::Registry;

use super::helpers::{consumer_log_dir, orchestrator, quick_settings, run_options};

#[test]
fn test_crash_while_streaming_relaunches_with_resume_directive() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let mut settings = quick_settings(&temp);
    settings.config.consumer.args = vec!["--profile".to_string(), "Live".to_string()];
    let log_dir = consumer_log_dir(&temp);
    fs::create_dir_all(&log_dir).unwrap();

    // First session goes live and then segfaults; the second one exits normally
    let launcher = {
        let log_dir = log_dir.clone();
        Arc::new(ScriptedLauncher::new([139, 0]).with_hook(move |index| {
            if index == 0 {
                fs::write(
                    log_dir.join("2026-10-17 10-00-00.txt"),
                    format!("10:00:01 loading profile\n10:00:05 {STREAM_START_MARKER}\n"),
                )
                .unwrap();
            }
        }))
    };

    let episode = orchestrator(settings, launcher.clone())
        .run(run_options(false))
        .expect("second launch exits cleanly");

    assert!(episode.is_clean());
    let launches = launcher.launches();
    assert_eq!(launches.len(), 2);
    assert_eq!(launches[0], vec!["--profile", "Live"]);
    assert_eq!(launches[1], vec!["--profile", "Live", RESUME_DIRECTIVE]);
}

#[test]
fn test_crash_without_stream_relaunches_plainly() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let settings = quick_settings(&temp);
    let launcher = Arc::new(ScriptedLauncher::new([1, 0]));

    orchestrator(settings, launcher.clone())
        .run(run_options(false))
        .expect("second launch exits cleanly");

    let launches = launcher.launches();
    assert_eq!(launches.len(), 2);
    assert!(launches.iter().all(|args| args.is_empty()));
}

#[test]
fn test_repeated_crashes_end_the_session() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let mut settings = quick_settings(&temp);
    settings.config.consumer.max_crashes = 2;
    let state_dir = settings.state_dir();
    let launcher = Arc::new(ScriptedLauncher::new([139, 139, 139, 0]));

    let err = orchestrator(settings, launcher.clone())
        .run(run_options(false))
        .expect_err("threshold exceeded");

    match err.downcast_ref::<SupervisorError>() {
        Some(SupervisorError::RecoveryThresholdExceeded { crashes, threshold }) => {
            assert_eq!((*crashes, *threshold), (3, 2));
        }
        other => panic!("expected threshold error, got {other:?}"),
    }
    assert_eq!(launcher.launches().len(), 3);
    assert!(!Registry::open(state_dir).unwrap().has_records());
}
