use anyhow::Result;
use capguard::commands::{bridge, monitor, repair, run, status, stop};
use capguard::error::SupervisorError;
use capguard::hardware::HubPort;
use capguard::models::DeviceIdentity;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "capguard")]
#[command(about = "Keeps a USB capture device, its loopback feed and the streaming app alive", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole session: bridge, device monitor and consumer
    Run {
        /// Capture device node (default: /dev/video0)
        #[arg(short, long)]
        device: Option<PathBuf>,

        /// USB identity of the capture device, VVVV:PPPP in hex
        #[arg(short, long)]
        usb_id: Option<DeviceIdentity>,

        /// Base directory for config, state and logs (default: ~/.capguard)
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Run without the loopback bridge
        #[arg(long)]
        no_loopback: bool,

        /// Skip the device probe during preflight
        #[arg(long)]
        no_device_check: bool,

        /// Never append the resume directive after a crash
        #[arg(long)]
        no_auto_resume: bool,

        /// Arguments passed through to the consumer (after `--`)
        #[arg(last = true)]
        consumer_args: Vec<String>,
    },

    /// Run only the device monitor (for a service unit)
    Monitor {
        #[arg(short, long)]
        device: Option<PathBuf>,

        #[arg(short, long)]
        usb_id: Option<DeviceIdentity>,

        #[arg(long)]
        base_dir: Option<PathBuf>,
    },

    /// Run only the bridge supervisor (for a service unit)
    Bridge {
        #[arg(short, long)]
        device: Option<PathBuf>,

        #[arg(long)]
        base_dir: Option<PathBuf>,
    },

    /// Walk the full repair ladder once
    Repair {
        #[arg(short, long)]
        device: Option<PathBuf>,

        #[arg(short, long)]
        usb_id: Option<DeviceIdentity>,

        /// Hub port to power-cycle, HUB:PORT (e.g. 1-2:3), when the device cannot be located
        #[arg(long)]
        hub_port: Option<HubPort>,

        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Print the step report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show running processes and device health
    Status {
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stop a running session
    Stop {
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "✗".red().bold());
            let code = e
                .downcast_ref::<SupervisorError>()
                .map(SupervisorError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            device,
            usb_id,
            base_dir,
            no_loopback,
            no_device_check,
            no_auto_resume,
            consumer_args,
        } => {
            run::execute(run::RunArgs {
                device,
                usb_id,
                base_dir,
                consumer_args,
                no_loopback,
                no_device_check,
                no_auto_resume,
            })?;
            Ok(())
        }
        Commands::Monitor {
            device,
            usb_id,
            base_dir,
        } => monitor::execute(base_dir, device, usb_id),
        Commands::Bridge { device, base_dir } => bridge::execute(base_dir, device),
        Commands::Repair {
            device,
            usb_id,
            hub_port,
            base_dir,
            json,
        } => repair::execute(repair::RepairArgs {
            base_dir,
            device,
            usb_id,
            hub_port,
            json,
        }),
        Commands::Status { base_dir, json } => status::execute(base_dir, json),
        Commands::Stop { base_dir } => stop::execute(base_dir),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "capguard", &mut io::stdout());
            Ok(())
        }
    }
}
