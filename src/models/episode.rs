use serde::{Deserialize, Serialize};
use std::process::ExitStatus;

/// Exit code of a process, with death-by-signal folded into `128 + signal`
/// the way a shell reports it (SIGSEGV becomes 139).
pub fn exit_code_of(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

/// One termination of the consumer application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashEpisode {
    /// Exit code the consumer terminated with
    pub exit_code: i32,
    /// Whether a stream was active right before the exit
    pub was_streaming: bool,
    /// Crash count of the session including this episode
    pub crash_count: u32,
}

impl CrashEpisode {
    pub fn is_clean(&self) -> bool {
        self.exit_code == 0
    }
}
