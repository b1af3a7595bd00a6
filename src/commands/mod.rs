pub mod bridge;
pub mod monitor;
pub mod repair;
pub mod run;
pub mod status;
pub mod stop;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{CliOverrides, Settings};
use crate::logging::{self, LogSession};

/// Resolve the base directory, load `capguard.toml` and apply CLI overrides.
pub fn load_settings(base_dir: Option<PathBuf>, overrides: &CliOverrides) -> Result<Settings> {
    let base_dir = Settings::resolve_base_dir(base_dir)?;
    let mut settings = Settings::load(base_dir)?;
    settings.apply(overrides);
    Ok(settings)
}

/// Logging for long-running commands: stderr plus a session file.
pub fn init_session_logging(settings: &Settings) -> Result<LogSession> {
    let session = logging::init(Some(&settings.logs_dir()))?;
    if let Some(path) = &session.path {
        tracing::info!(session = %session.id, log = %path.display(), "session started");
    }
    Ok(session)
}

/// Shutdown flag raised by SIGINT/SIGTERM, for the standalone loops.
pub fn shutdown_on_signal() -> Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .map_err(|e| anyhow::anyhow!("Failed to set signal handler: {e}"))?;
    Ok(shutdown)
}
