//! `capguard stop`: end a running session from another terminal.

use anyhow::Result;
use colored::Colorize;
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::load_settings;
use crate::config::{CliOverrides, Settings};
use crate::orchestrator::InstanceLock;
use crate::process::{find_matching_processes, terminate_pid, Termination};
use crate::registry::{ProcessKind, Registry};

/// One process `stop` had to deal with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stopped {
    pub what: String,
    pub pid: u32,
    pub termination: Termination,
}

pub fn execute(base_dir: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(base_dir, &CliOverrides::default())?;
    let stopped = stop_all(&settings)?;

    if stopped.is_empty() {
        println!("{} Nothing is running", "─".dimmed());
        return Ok(());
    }
    for entry in &stopped {
        let how = match entry.termination {
            Termination::Graceful => "stopped".to_string(),
            Termination::Forced => "killed after timeout".yellow().to_string(),
            Termination::NotRunning => "already gone".dimmed().to_string(),
        };
        println!(
            "{} {} (pid {}) {how}",
            "✓".green().bold(),
            entry.what,
            entry.pid
        );
    }
    Ok(())
}

/// Signal the orchestrator first so it can run its own cleanup, then take down
/// whatever it left behind and clear the records.
pub fn stop_all(settings: &Settings) -> Result<Vec<Stopped>> {
    let registry = Registry::open(settings.state_dir())?;
    let timeout = settings.bridge_timings().stop_timeout;
    let own = std::process::id();
    let mut seen = BTreeSet::from([own]);
    let mut stopped = Vec::new();

    if let Some(pid) = InstanceLock::holder(&settings.lock_path()) {
        if seen.insert(pid) {
            println!("{} Stopping capguard session...", "→".cyan().bold());
            // Its cleanup stops the bridge and the consumer one after the other
            let termination = terminate_pid(pid, timeout * 3);
            stopped.push(Stopped {
                what: "session".to_string(),
                pid,
                termination,
            });
        }
    }

    for kind in [ProcessKind::Consumer, ProcessKind::Bridge, ProcessKind::Monitor] {
        let Some(pid) = registry.live_pid(kind) else {
            continue;
        };
        if seen.insert(pid) {
            stopped.push(Stopped {
                what: kind.to_string(),
                pid,
                termination: terminate_pid(pid, timeout),
            });
        }
    }

    let target = settings.device_target();
    let signature = settings.bridge_command(target.node()).signature();
    for pid in find_matching_processes(&signature) {
        if seen.insert(pid) {
            stopped.push(Stopped {
                what: "orphaned bridge".to_string(),
                pid,
                termination: terminate_pid(pid, timeout),
            });
        }
    }

    registry.clear_all();
    Ok(stopped)
}
