//! Default intervals and thresholds.
//!
//! All supervision intervals are fixed; nothing here backs off exponentially.

use std::time::Duration;

/// Interval between device health probes.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(3);

/// Pause after a repair ladder before the next probe.
pub const REPAIR_SETTLE_INTERVAL: Duration = Duration::from_secs(4);

/// Cool-down after the monitor hands the device over to a human.
pub const ESCALATION_COOLDOWN: Duration = Duration::from_secs(60);

/// Maximum consecutive repair attempts before escalating to a human.
/// Shared by the monitor's escalation and the ladder's hub-cycle gate.
pub const MAX_REPAIR_ATTEMPTS: u32 = 5;

/// The hub power cycle joins the ladder only after this many attempts.
pub const HUB_CYCLE_AFTER: u32 = 3;

/// Interval between bridging-process liveness polls.
pub const BRIDGE_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Window in which an early exit of the bridging process counts as a failed start.
pub const BRIDGE_STARTUP_GRACE: Duration = Duration::from_secs(2);

/// Pause before respawning a dead bridging process.
pub const BRIDGE_RESTART_BACKOFF: Duration = Duration::from_secs(2);

/// Time allowed between SIGTERM and SIGKILL.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive consumer crashes tolerated before giving up.
pub const MAX_CONSUMER_CRASHES: u32 = 3;

/// Delay between a consumer crash and its relaunch.
pub const CONSUMER_RECOVERY_DELAY: Duration = Duration::from_secs(5);

/// Pause between unbind and bind during a driver rebind.
pub const REBIND_PAUSE: Duration = Duration::from_secs(1);

/// Pause between powering a hub port off and on.
pub const HUB_OFF_PAUSE: Duration = Duration::from_secs(3);

/// Upper bound for any single external tool invocation (systemctl, uhubctl).
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(20);

/// Granularity at which sleeping loops re-check their shutdown flag.
pub const SHUTDOWN_POLL_SLICE: Duration = Duration::from_millis(200);

/// Log line that marks the start of an output stream in the consumer's log.
pub const STREAM_START_MARKER: &str = "==== Streaming Start ====";

/// Argument that makes the consumer start streaming immediately.
pub const RESUME_DIRECTIVE: &str = "--startstreaming";

/// Number of trailing log lines inspected for the stream marker.
pub const LOG_TAIL_LINES: usize = 400;

/// Pause after a successful hardware repair step before re-probing the device.
pub const STEP_SETTLE_INTERVAL: Duration = Duration::from_secs(2);
