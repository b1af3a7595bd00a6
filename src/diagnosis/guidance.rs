use std::path::Path;

use crate::hardware::HubPort;
use crate::models::DeviceIdentity;
use crate::utils::truncate;

/// What the repair monitor knew when it gave up on the device.
pub struct EscalationContext<'a> {
    pub node: &'a Path,
    pub identity: Option<DeviceIdentity>,
    pub hub_port: Option<&'a HubPort>,
    pub attempts: u32,
    pub max_attempts: u32,
}

/// Print manual recovery steps after automatic device repair ran out of attempts.
pub fn print_escalation_guidance(ctx: &EscalationContext<'_>) {
    let identity = ctx
        .identity
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    eprintln!();
    eprintln!("┌──────────────────────────────────────────────────────────────┐");
    eprintln!(
        "│  DEVICE NEEDS ATTENTION: {:<36} │",
        truncate(&ctx.node.display().to_string(), 36)
    );
    eprintln!("│                                                              │");
    eprintln!(
        "│  USB id: {:<12}  Attempts: {}/{:<23} │",
        truncate(&identity, 12),
        ctx.attempts,
        ctx.max_attempts
    );
    eprintln!("│  Automatic repair gave up; probing resumes after cool-down   │");
    eprintln!("└──────────────────────────────────────────────────────────────┘");
    eprintln!();
    eprintln!("Try by hand:");
    if let Some(id) = ctx.identity {
        eprintln!("  capguard repair --usb-id {id}      Run the full repair ladder once");
    }
    if let Some(port) = ctx.hub_port {
        eprintln!(
            "  sudo uhubctl -l {} -p {} -a cycle     Power cycle the hub port",
            port.hub, port.port
        );
    }
    eprintln!("  sudo modprobe -r uvcvideo && sudo modprobe uvcvideo   Reload the capture driver");
    eprintln!("  Unplug the device, wait a few seconds, plug it into another port");
    eprintln!("  dmesg | tail -n 50     Look for USB disconnect or xHCI errors");
    eprintln!();
}

/// Print the summary shown when the consumer keeps crashing.
pub fn print_threshold_guidance(consumer: &str, crashes: u32, threshold: u32, last_code: i32) {
    eprintln!();
    eprintln!("┌──────────────────────────────────────────────────────────────┐");
    eprintln!(
        "│  CONSUMER KEEPS CRASHING: {:<35} │",
        truncate(consumer, 35)
    );
    eprintln!("│                                                              │");
    eprintln!(
        "│  Crashes: {}/{:<10}  Last exit code: {:<17} │",
        crashes, threshold, last_code
    );
    eprintln!("└──────────────────────────────────────────────────────────────┘");
    eprintln!();
    eprintln!("Check:");
    eprintln!("  capguard status         Is the device healthy and the bridge running?");
    eprintln!("  The newest consumer log for the last lines before each crash");
    if last_code > 128 {
        eprintln!(
            "  Exit code {last_code} means signal {}; often a driver or GPU fault",
            last_code - 128
        );
    }
    eprintln!("  capguard repair          Reset the capture device before relaunching");
    eprintln!();
}
