use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::models::constants::SHUTDOWN_POLL_SLICE;

/// Sleep for `duration` in short slices, returning early once `stop` is raised.
///
/// Returns `true` if the sleep was cut short.
pub fn sleep_unless_stopped(stop: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(SHUTDOWN_POLL_SLICE.min(deadline - now));
    }
}

/// Shell-quoted command line, for logs.
pub fn shell_line(program: &Path, args: &[String]) -> String {
    std::iter::once(program.display().to_string())
        .chain(args.iter().cloned())
        .map(|arg| shell_escape::escape(arg.into()).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate string to max characters (UTF-8 safe)
pub fn truncate(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else {
        format!(
            "{}...",
            s.chars()
                .take(max_len.saturating_sub(3))
                .collect::<String>()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_returns_immediately_when_stopped() {
        let stop = AtomicBool::new(true);
        let start = Instant::now();
        assert!(sleep_unless_stopped(&stop, Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_runs_to_completion() {
        let stop = AtomicBool::new(false);
        assert!(!sleep_unless_stopped(&stop, Duration::from_millis(10)));
    }

    #[test]
    fn test_shell_line_quotes_only_when_needed() {
        let line = shell_line(
            Path::new("/usr/bin/obs"),
            &["--profile".to_string(), "My Stream".to_string()],
        );
        assert_eq!(line, "/usr/bin/obs --profile 'My Stream'");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 5), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("日本語テキスト", 5), "日本...");
    }
}
