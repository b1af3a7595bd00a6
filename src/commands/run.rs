//! `capguard run`: the full orchestrated session.

use anyhow::Result;
use std::path::PathBuf;

use super::{init_session_logging, load_settings};
use crate::config::CliOverrides;
use crate::models::{CrashEpisode, DeviceIdentity};
use crate::orchestrator::{Orchestrator, PreflightOptions, RunOptions};

#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub device: Option<PathBuf>,
    pub usb_id: Option<DeviceIdentity>,
    pub base_dir: Option<PathBuf>,
    pub consumer_args: Vec<String>,
    pub no_loopback: bool,
    pub no_device_check: bool,
    pub no_auto_resume: bool,
}

pub fn execute(args: RunArgs) -> Result<CrashEpisode> {
    let settings = load_settings(
        args.base_dir,
        &CliOverrides {
            device: args.device,
            usb_id: args.usb_id,
            consumer_args: args.consumer_args,
            no_auto_resume: args.no_auto_resume,
        },
    )?;
    init_session_logging(&settings)?;

    let options = RunOptions {
        preflight: PreflightOptions {
            check_device: !args.no_device_check,
            loopback: !args.no_loopback,
        },
        handle_signals: true,
    };
    Orchestrator::system(settings).run(options)
}
