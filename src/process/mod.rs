//! Process utilities for capguard
//!
//! Liveness checks, graceful termination and orphan discovery shared by every loop.

mod bounded;

pub use bounded::{run_bounded, ToolOutput};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::path::Path;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Check if a process with the given PID is alive
///
/// Uses the null signal to probe for existence. `EPERM` means the process exists
/// but belongs to someone else, which still counts as alive.
pub fn is_process_alive(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else {
        return false;
    };

    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => false,
    }
}

fn to_pid(pid: u32) -> Option<Pid> {
    // PID 0 would signal our whole process group
    match i32::try_from(pid) {
        Ok(v) if v > 0 => Some(Pid::from_raw(v)),
        _ => None,
    }
}

/// How a termination request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process was already gone
    NotRunning,
    /// The process exited after SIGTERM
    Graceful,
    /// The process had to be killed with SIGKILL
    Forced,
}

/// Send SIGTERM, wait up to `timeout`, then SIGKILL.
///
/// For processes we did not spawn (and therefore cannot reap) liveness is polled.
pub fn terminate_pid(pid: u32, timeout: Duration) -> Termination {
    let Some(target) = to_pid(pid) else {
        return Termination::NotRunning;
    };

    if !is_process_alive(pid) {
        return Termination::NotRunning;
    }

    if kill(target, Signal::SIGTERM).is_err() {
        return Termination::NotRunning;
    }

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            return Termination::Graceful;
        }
        thread::sleep(Duration::from_millis(100));
    }

    let _ = kill(target, Signal::SIGKILL);
    Termination::Forced
}

/// Terminate a child we own: SIGTERM, bounded wait, SIGKILL, reap.
pub fn terminate_child(child: &mut Child, timeout: Duration) -> Termination {
    if let Ok(Some(_)) = child.try_wait() {
        return Termination::NotRunning;
    }

    if let Some(pid) = to_pid(child.id()) {
        let _ = kill(pid, Signal::SIGTERM);
    }

    match child.wait_timeout(timeout) {
        Ok(Some(_)) => Termination::Graceful,
        _ => {
            // Ignore errors - the process may have exited in between
            let _ = child.kill();
            let _ = child.wait();
            Termination::Forced
        }
    }
}

/// Find processes whose command line contains every element of `signature`
/// as a separate argument. Our own process is never returned.
#[cfg(target_os = "linux")]
pub fn find_matching_processes(signature: &[String]) -> Vec<u32> {
    find_matching_processes_in(Path::new("/proc"), signature)
}

#[cfg(not(target_os = "linux"))]
pub fn find_matching_processes(_signature: &[String]) -> Vec<u32> {
    Vec::new()
}

/// Scan a procfs-shaped directory. Split out so tests can feed a fake tree.
pub fn find_matching_processes_in(proc_dir: &Path, signature: &[String]) -> Vec<u32> {
    if signature.is_empty() {
        return Vec::new();
    }

    let own_pid = std::process::id();
    let Ok(entries) = fs::read_dir(proc_dir) else {
        return Vec::new();
    };

    let mut pids = Vec::new();
    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else {
            continue;
        };
        if pid == own_pid {
            continue;
        }

        // cmdline uses null bytes as separators
        let Ok(raw) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let args: Vec<String> = raw
            .split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect();

        if signature.iter().all(|needle| args.iter().any(|arg| arg == needle)) {
            pids.push(pid);
        }
    }

    pids.sort_unstable();
    pids
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_nonexistent_process_is_not_alive() {
        assert!(!is_process_alive(999999999));
    }

    #[test]
    fn test_pid_zero_is_never_alive() {
        assert!(!is_process_alive(0));
        assert_eq!(terminate_pid(0, Duration::from_millis(10)), Termination::NotRunning);
    }

    #[test]
    fn test_u32_max_overflow_returns_false() {
        assert!(!is_process_alive(u32::MAX));
    }

    #[test]
    fn test_terminate_child_graceful() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let result = terminate_child(&mut child, Duration::from_secs(5));
        assert_eq!(result, Termination::Graceful);
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn test_terminate_child_forced_when_sigterm_ignored() {
        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; sleep 30"])
            .spawn()
            .unwrap();
        // Give the shell time to install the trap
        thread::sleep(Duration::from_millis(200));
        let result = terminate_child(&mut child, Duration::from_millis(300));
        assert_eq!(result, Termination::Forced);
    }

    #[test]
    fn test_terminate_child_already_exited() {
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().unwrap();
        assert_eq!(
            terminate_child(&mut child, Duration::from_millis(10)),
            Termination::NotRunning
        );
    }

    #[test]
    fn test_find_matching_processes_in_fake_proc() {
        let temp = TempDir::new().unwrap();
        let proc_dir = temp.path();

        let write = |pid: &str, args: &[&str]| {
            let dir = proc_dir.join(pid);
            fs::create_dir_all(&dir).unwrap();
            let mut raw = Vec::new();
            for arg in args {
                raw.extend_from_slice(arg.as_bytes());
                raw.push(0);
            }
            fs::write(dir.join("cmdline"), raw).unwrap();
        };

        write("100", &["/opt/feed.sh", "/dev/video0", "/dev/video10", "1920x1080"]);
        write("200", &["/opt/feed.sh", "/dev/video1", "/dev/video10"]);
        write("300", &["bash"]);
        fs::create_dir_all(proc_dir.join("self")).unwrap();

        let signature = vec![
            "/opt/feed.sh".to_string(),
            "/dev/video0".to_string(),
            "/dev/video10".to_string(),
        ];
        assert_eq!(find_matching_processes_in(proc_dir, &signature), vec![100]);
        assert!(find_matching_processes_in(proc_dir, &[]).is_empty());
    }
}
