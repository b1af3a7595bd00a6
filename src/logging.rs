//! Session logging
//!
//! Every line is `[YYYY-mm-dd HH:MM:SS] [TAG] message key=value ...`. The tag comes
//! from the event level, or from an explicit `tag` field for the two tags tracing
//! has no level for: use [`ok!`](crate::ok) and [`recovery!`](crate::recovery).
//! Lines go to stderr and to `<base>/logs/session-<timestamp>.log`.

use std::fmt;
use std::fs::{self, File};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Environment variable holding the log filter, e.g. `CAPGUARD_LOG=debug`.
pub const LOG_ENV: &str = "CAPGUARD_LOG";

/// Log a success (`[OK]`) line at info level.
#[macro_export]
macro_rules! ok {
    ($($arg:tt)+) => {
        ::tracing::info!(tag = "ok", $($arg)+)
    };
}

/// Log a remediation attempt (`[RECOVERY]`) at warn level.
#[macro_export]
macro_rules! recovery {
    ($($arg:tt)+) => {
        ::tracing::warn!(tag = "recovery", $($arg)+)
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Ok,
    Warn,
    Error,
    Recovery,
}

impl Severity {
    pub fn of(level: &Level, tag: Option<&str>) -> Self {
        match tag {
            Some("ok") => return Severity::Ok,
            Some("recovery") => return Severity::Recovery,
            _ => {}
        }
        match *level {
            Level::ERROR => Severity::Error,
            Level::WARN => Severity::Warn,
            Level::INFO => Severity::Info,
            _ => Severity::Debug,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Ok => "OK",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Recovery => "RECOVERY",
        }
    }

    fn colored(self) -> String {
        let label = self.label();
        match self {
            Severity::Debug => label.dimmed().to_string(),
            Severity::Info => label.cyan().to_string(),
            Severity::Ok => label.green().bold().to_string(),
            Severity::Warn => label.yellow().bold().to_string(),
            Severity::Error => label.red().bold().to_string(),
            Severity::Recovery => label.magenta().bold().to_string(),
        }
    }
}

/// Event fields split into message, tag and the rest.
#[derive(Debug, Default)]
struct FieldCollector {
    message: String,
    tag: Option<String>,
    extra: Vec<(&'static str, String)>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            "tag" => self.tag = Some(value),
            name => self.extra.push((name, value)),
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

/// Event formatter producing severity-tagged lines.
#[derive(Debug, Clone, Copy)]
pub struct SeverityFormat {
    color: bool,
}

impl SeverityFormat {
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl<S, N> FormatEvent<S, N> for SeverityFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let severity = Severity::of(event.metadata().level(), fields.tag.as_deref());
        let tag = if self.color {
            severity.colored()
        } else {
            severity.label().to_string()
        };

        write!(
            writer,
            "[{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            tag,
            fields.message
        )?;
        for (key, value) in &fields.extra {
            write!(writer, " {key}={value}")?;
        }
        writeln!(writer)
    }
}

/// Identity of the current logging session.
#[derive(Debug, Clone)]
pub struct LogSession {
    pub id: Uuid,
    /// Session log file, when a log directory was given
    pub path: Option<PathBuf>,
}

/// Install the global subscriber.
///
/// With `log_dir` set, a session file is created there in addition to stderr.
pub fn init(log_dir: Option<&Path>) -> Result<LogSession> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .event_format(SeverityFormat::new(std::io::stderr().is_terminal()));

    let (file_layer, path) = match log_dir {
        Some(dir) => {
            let (file, path) = open_session_file(dir)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .event_format(SeverityFormat::new(false));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    let session = LogSession {
        id: Uuid::new_v4(),
        path,
    };
    tracing::debug!(session = %session.id, "logging initialised");
    Ok(session)
}

fn open_session_file(dir: &Path) -> Result<(File, PathBuf)> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    let path = dir.join(format!(
        "session-{}.log",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));
    let file = File::options()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open session log: {}", path.display()))?;
    Ok((file, path))
}
