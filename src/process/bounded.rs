//! Bounded execution of external tools (systemctl, uhubctl, ...)

use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

/// Timeout for collecting output from child process pipes
const OUTPUT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Tool output is short status text; anything past this is dropped.
const MAX_OUTPUT_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    /// Short human-readable reason for a failed invocation.
    pub fn failure_reason(&self) -> String {
        if self.timed_out {
            return "timed out".to_string();
        }
        let stderr = self.stderr.trim();
        match (self.status.and_then(|s| s.code()), stderr.is_empty()) {
            (Some(code), true) => format!("exit code {code}"),
            (Some(code), false) => format!("exit code {code}: {stderr}"),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => stderr.to_string(),
        }
    }
}

/// Run `cmd` to completion, killing it after `timeout`.
///
/// Pipes are drained on reader threads while waiting so a chatty tool can never
/// block on a full pipe buffer.
pub fn run_bounded(cmd: &mut Command, timeout: Duration) -> Result<ToolOutput> {
    let program = format!("{:?}", cmd.get_program());
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn {program}"))?;

    let (stdout_tx, stdout_rx) = mpsc::channel();
    let (stderr_tx, stderr_rx) = mpsc::channel();

    match child.stdout.take() {
        Some(stdout) => {
            thread::spawn(move || {
                let _ = stdout_tx.send(read_capped(stdout));
            });
        }
        None => {
            let _ = stdout_tx.send(String::new());
        }
    }
    match child.stderr.take() {
        Some(stderr) => {
            thread::spawn(move || {
                let _ = stderr_tx.send(read_capped(stderr));
            });
        }
        None => {
            let _ = stderr_tx.send(String::new());
        }
    }

    let status = child
        .wait_timeout(timeout)
        .with_context(|| format!("Failed to wait for {program}"))?;

    let timed_out = status.is_none();
    if timed_out {
        let _ = child.kill();
        let _ = child.wait();
    }

    let stdout = stdout_rx
        .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
        .unwrap_or_default();
    let stderr = stderr_rx
        .recv_timeout(OUTPUT_COLLECTION_TIMEOUT)
        .unwrap_or_default();

    Ok(ToolOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

fn read_capped<R: Read>(mut stream: R) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = MAX_OUTPUT_SIZE.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_bounded_success() {
        let out = run_bounded(
            Command::new("sh").args(["-c", "echo hello"]),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn test_run_bounded_failure_reason() {
        let out = run_bounded(
            Command::new("sh").args(["-c", "echo broken >&2; exit 4"]),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(!out.success());
        assert_eq!(out.failure_reason(), "exit code 4: broken");
    }

    #[test]
    fn test_run_bounded_timeout() {
        let out = run_bounded(
            Command::new("sleep").arg("30"),
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
        assert_eq!(out.failure_reason(), "timed out");
    }

    #[test]
    fn test_run_bounded_missing_program() {
        let result = run_bounded(
            &mut Command::new("/nonexistent/capguard-tool"),
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }
}
