use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SupervisorError;

/// Exclusive advisory lock on the state directory, held for the orchestrator's life.
///
/// Released when dropped (or when the process dies).
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> Result<Self, SupervisorError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SupervisorError::PreflightFailed(format!(
                    "cannot create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                SupervisorError::PreflightFailed(format!("cannot open {}: {e}", path.display()))
            })?;

        if FileExt::try_lock_exclusive(&file).is_err() {
            let holder = fs::read_to_string(path).unwrap_or_default();
            let holder = holder.trim();
            return Err(SupervisorError::PreflightFailed(if holder.is_empty() {
                "another capguard instance is using this base directory".to_string()
            } else {
                format!("another capguard instance (pid {holder}) is using this base directory")
            }));
        }

        // Holder pid is informational only; the lock itself is what counts
        let _ = file.set_len(0);
        let _ = write!(file, "{}", std::process::id());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pid of the orchestrator currently holding the lock at `path`, if any.
    pub fn holder(path: &Path) -> Option<u32> {
        let file = File::open(path).ok()?;
        if FileExt::try_lock_shared(&file).is_ok() {
            let _ = FileExt::unlock(&file);
            return None;
        }
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
