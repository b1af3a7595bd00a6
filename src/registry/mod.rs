//! Process registry
//!
//! Liveness records for the managed processes plus the streaming-state flag, kept as
//! small files under `<base>/state/`. Writers overwrite whole files (write to a temp
//! name, then rename) and the content is always re-derivable from reality, so no
//! locking is needed: a race costs at most a redundant restart.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::process::is_process_alive;

/// Processes that get a liveness record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessKind {
    Bridge,
    Monitor,
    Consumer,
}

impl ProcessKind {
    pub const ALL: [ProcessKind; 3] = [
        ProcessKind::Bridge,
        ProcessKind::Monitor,
        ProcessKind::Consumer,
    ];

    fn file_name(self) -> &'static str {
        match self {
            ProcessKind::Bridge => "bridge.pid",
            ProcessKind::Monitor => "monitor.pid",
            ProcessKind::Consumer => "consumer.pid",
        }
    }
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessKind::Bridge => "bridge",
            ProcessKind::Monitor => "monitor",
            ProcessKind::Consumer => "consumer",
        };
        f.pad(s)
    }
}

const STREAMING_FLAG: &str = "streaming";

/// Snapshot of one liveness record, for `capguard status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordStatus {
    pub kind: ProcessKind,
    pub pid: Option<u32>,
    pub alive: bool,
}

#[derive(Debug, Clone)]
pub struct Registry {
    dir: PathBuf,
}

impl Registry {
    /// Open (and create) the state directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, kind: ProcessKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Record the pid of a freshly spawned process, replacing any previous record.
    pub fn record(&self, kind: ProcessKind, pid: u32) -> Result<()> {
        self.overwrite(kind.file_name(), &pid.to_string())
    }

    /// Read a record without checking liveness.
    pub fn read(&self, kind: ProcessKind) -> Option<u32> {
        fs::read_to_string(self.record_path(kind))
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// The recorded pid if that process is still alive. A stale record is removed.
    pub fn live_pid(&self, kind: ProcessKind) -> Option<u32> {
        let pid = self.read(kind)?;
        if is_process_alive(pid) {
            Some(pid)
        } else {
            self.clear(kind);
            None
        }
    }

    pub fn clear(&self, kind: ProcessKind) {
        let _ = fs::remove_file(self.record_path(kind));
    }

    pub fn set_streaming(&self, streaming: bool) -> Result<()> {
        self.overwrite(STREAMING_FLAG, if streaming { "1" } else { "0" })
    }

    pub fn was_streaming(&self) -> bool {
        fs::read_to_string(self.dir.join(STREAMING_FLAG))
            .map(|s| s.trim() == "1")
            .unwrap_or(false)
    }

    /// Remove every record and the streaming flag.
    pub fn clear_all(&self) {
        for kind in ProcessKind::ALL {
            self.clear(kind);
        }
        let _ = fs::remove_file(self.dir.join(STREAMING_FLAG));
    }

    /// Whether any liveness record file is still on disk.
    pub fn has_records(&self) -> bool {
        ProcessKind::ALL
            .iter()
            .any(|kind| self.record_path(*kind).exists())
    }

    pub fn snapshot(&self) -> Vec<RecordStatus> {
        ProcessKind::ALL
            .iter()
            .map(|kind| {
                let pid = self.read(*kind);
                RecordStatus {
                    kind: *kind,
                    pid,
                    alive: pid.is_some_and(is_process_alive),
                }
            })
            .collect()
    }

    fn overwrite(&self, name: &str, content: &str) -> Result<()> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))
    }
}
