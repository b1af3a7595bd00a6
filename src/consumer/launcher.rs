use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::models::exit_code_of;
use crate::registry::{ProcessKind, Registry};

/// Runs the consumer in the foreground.
pub trait Launcher: Send + Sync {
    /// Launch with `args` and block until the consumer exits; returns its exit code.
    fn run(&self, args: &[String]) -> Result<i32>;

    fn program(&self) -> &Path;
}

/// Launches the real consumer as a child process sharing our terminal.
pub struct ProcessLauncher {
    program: PathBuf,
    registry: Registry,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, registry: Registry) -> Self {
        Self {
            program: program.into(),
            registry,
        }
    }
}

impl Launcher for ProcessLauncher {
    fn run(&self, args: &[String]) -> Result<i32> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Failed to launch {}", self.program.display()))?;

        let pid = child.id();
        if let Err(e) = self.registry.record(ProcessKind::Consumer, pid) {
            warn!("could not record consumer pid: {e:#}");
        }
        info!(pid, "consumer running");

        let status = child.wait();
        self.registry.clear(ProcessKind::Consumer);

        let status = status.context("Failed to wait for consumer")?;
        let code = exit_code_of(&status);
        debug!(pid, code, "consumer exited");
        Ok(code)
    }

    fn program(&self) -> &Path {
        &self.program
    }
}

/// Launcher that replays a fixed list of exit codes and records every launch.
///
/// Optionally runs a hook before each exit, e.g. to write a consumer log.
pub struct ScriptedLauncher {
    program: PathBuf,
    codes: Mutex<VecDeque<i32>>,
    launches: Mutex<Vec<Vec<String>>>,
    before_exit: Option<Box<dyn Fn(usize) + Send + Sync>>,
}

impl ScriptedLauncher {
    pub fn new(codes: impl IntoIterator<Item = i32>) -> Self {
        Self {
            program: PathBuf::from("consumer"),
            codes: Mutex::new(codes.into_iter().collect()),
            launches: Mutex::new(Vec::new()),
            before_exit: None,
        }
    }

    /// Run `hook(launch_index)` while the simulated consumer is "running".
    pub fn with_hook(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.before_exit = Some(Box::new(hook));
        self
    }

    pub fn launches(&self) -> Vec<Vec<String>> {
        self.launches.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl Launcher for ScriptedLauncher {
    fn run(&self, args: &[String]) -> Result<i32> {
        let index = {
            let mut launches = self
                .launches
                .lock()
                .map_err(|_| anyhow::anyhow!("launch log poisoned"))?;
            launches.push(args.to_vec());
            launches.len() - 1
        };

        if let Some(hook) = &self.before_exit {
            hook(index);
        }

        let code = self
            .codes
            .lock()
            .map_err(|_| anyhow::anyhow!("exit code script poisoned"))?
            .pop_front()
            .unwrap_or(0);
        Ok(code)
    }

    fn program(&self) -> &Path {
        &self.program
    }
}
