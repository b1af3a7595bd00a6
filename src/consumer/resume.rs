//! Stream-state detection from the consumer's own log, and the resume directive.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::constants::{LOG_TAIL_LINES, RESUME_DIRECTIVE, STREAM_START_MARKER};

#[derive(Debug, Clone)]
pub struct ResumeConfig {
    pub log_dir: PathBuf,
    /// File name pattern of consumer logs inside `log_dir`
    pub log_pattern: String,
    pub marker: String,
    pub directive: String,
    pub tail_lines: usize,
    pub auto_resume: bool,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            log_dir: dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from(".config"))
                .join("obs-studio/logs"),
            log_pattern: "*.txt".to_string(),
            marker: STREAM_START_MARKER.to_string(),
            directive: RESUME_DIRECTIVE.to_string(),
            tail_lines: LOG_TAIL_LINES,
            auto_resume: true,
        }
    }
}

/// Most recently modified file in `dir` matching `pattern`.
pub fn newest_log(dir: &Path, pattern: &str) -> Option<PathBuf> {
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.display().to_string()),
        pattern
    );

    glob::glob(&full)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}

/// Whether `marker` occurs in the last `lines` lines of `path`.
pub fn tail_contains(path: &Path, marker: &str, lines: usize) -> Result<bool> {
    let file =
        File::open(path).with_context(|| format!("Failed to open log: {}", path.display()))?;

    let mut window: VecDeque<String> = VecDeque::with_capacity(lines.min(4096));
    for line in BufReader::new(file).split(b'\n') {
        let line = line.with_context(|| format!("Failed to read log: {}", path.display()))?;
        if window.len() == lines {
            window.pop_front();
        }
        if lines > 0 {
            window.push_back(String::from_utf8_lossy(&line).into_owned());
        }
    }

    Ok(window.iter().any(|line| line.contains(marker)))
}

/// Decides whether the next launch should resume streaming.
#[derive(Debug, Clone)]
pub struct ResumeController {
    config: ResumeConfig,
}

impl ResumeController {
    pub fn new(config: ResumeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResumeConfig {
        &self.config
    }

    /// Whether the newest consumer log shows a stream that was running when it ended.
    pub fn stream_was_active(&self) -> bool {
        let Some(log) = newest_log(&self.config.log_dir, &self.config.log_pattern) else {
            debug!(dir = %self.config.log_dir.display(), "no consumer log found");
            return false;
        };

        match tail_contains(&log, &self.config.marker, self.config.tail_lines) {
            Ok(found) => {
                debug!(log = %log.display(), streaming = found, "inspected consumer log");
                found
            }
            Err(e) => {
                debug!("{e:#}");
                false
            }
        }
    }

    /// Arguments for the next launch: `base` plus the directive, at most once.
    pub fn next_args(&self, base: &[String], was_streaming: bool) -> Vec<String> {
        let mut args = base.to_vec();
        let wanted = self.config.auto_resume && was_streaming;
        if wanted && !args.iter().any(|a| a == &self.config.directive) {
            args.push(self.config.directive.clone());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::FileTimes;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn config(dir: &Path) -> ResumeConfig {
        ResumeConfig {
            log_dir: dir.to_path_buf(),
            ..ResumeConfig::default()
        }
    }

    fn write_log(dir: &Path, name: &str, body: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_times(FileTimes::new().set_modified(when))
            .unwrap();
        path
    }

    #[test]
    fn test_newest_log_by_mtime() {
        let temp = TempDir::new().unwrap();
        write_log(temp.path(), "2024-01-02 10-00-00.txt", "", 10);
        let newest = write_log(temp.path(), "2024-01-01 09-00-00.txt", "", 1);
        write_log(temp.path(), "notes.md", "", 0);

        assert_eq!(newest_log(temp.path(), "*.txt"), Some(newest));
    }

    #[test]
    fn test_newest_log_missing_dir() {
        assert_eq!(newest_log(Path::new("/nonexistent/capguard"), "*.txt"), None);
    }

    #[test]
    fn test_tail_window_limits_search() {
        let temp = TempDir::new().unwrap();
        let mut body = format!("{STREAM_START_MARKER}\n");
        for i in 0..10 {
            body.push_str(&format!("line {i}\n"));
        }
        let log = write_log(temp.path(), "a.txt", &body, 0);

        assert!(tail_contains(&log, STREAM_START_MARKER, 11).unwrap());
        assert!(!tail_contains(&log, STREAM_START_MARKER, 10).unwrap());
        assert!(!tail_contains(&log, STREAM_START_MARKER, 0).unwrap());
    }

    #[test]
    fn test_tail_tolerates_invalid_utf8() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("b.txt");
        let mut bytes = vec![0xff, 0xfe, b'\n'];
        bytes.extend_from_slice(STREAM_START_MARKER.as_bytes());
        fs::write(&path, bytes).unwrap();
        assert!(tail_contains(&path, STREAM_START_MARKER, 400).unwrap());
    }

    #[test]
    fn test_stream_detection_uses_newest_log_only() {
        let temp = TempDir::new().unwrap();
        write_log(temp.path(), "old.txt", STREAM_START_MARKER, 60);
        write_log(temp.path(), "new.txt", "idle\n", 0);

        let controller = ResumeController::new(config(temp.path()));
        assert!(!controller.stream_was_active());

        write_log(
            temp.path(),
            "newer.txt",
            &format!("startup\n{STREAM_START_MARKER}\n"),
            0,
        );
        let controller = ResumeController::new(config(temp.path()));
        assert!(controller.stream_was_active());
    }

    #[test]
    fn test_directive_appended_at_most_once() {
        let temp = TempDir::new().unwrap();
        let controller = ResumeController::new(config(temp.path()));
        let base = vec!["--profile".to_string(), "live".to_string()];

        let args = controller.next_args(&base, true);
        assert_eq!(args, vec!["--profile", "live", RESUME_DIRECTIVE]);

        let again = controller.next_args(&args, true);
        assert_eq!(again.iter().filter(|a| *a == RESUME_DIRECTIVE).count(), 1);

        assert_eq!(controller.next_args(&base, false), base);
    }

    #[test]
    fn test_auto_resume_off_never_appends() {
        let temp = TempDir::new().unwrap();
        let controller = ResumeController::new(ResumeConfig {
            auto_resume: false,
            ..config(temp.path())
        });
        assert!(controller.next_args(&[], true).is_empty());
    }
}
