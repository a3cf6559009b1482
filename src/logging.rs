//! Diagnostic log setup and the dispatch audit trail.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

use crate::authz::EntityUid;
use crate::dispatch::DispatchOutcome;

const MAX_COMMAND_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum LogInitError {
    #[error("cannot open log file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Logger(#[from] log::SetLoggerError),
}

/// Install the process logger: stderr always, plus `file` when given.
///
/// Only this crate's records are emitted; HTTP and TLS internals stay quiet.
pub fn init(level: LevelFilter, file: Option<&Path>) -> Result<(), LogInitError> {
    let config = ConfigBuilder::new()
        .add_filter_allow_str(env!("CARGO_PKG_NAME"))
        .set_time_format_rfc3339()
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )];
    if let Some(path) = file {
        let file = File::create(path).map_err(|source| LogInitError::File {
            path: path.display().to_string(),
            source,
        })?;
        loggers.push(WriteLogger::new(level, config, file));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

/// Append-only record of every dispatch outcome.
///
/// One tab-separated line per outcome:
/// `timestamp  outcome  principal  action  resource  command  reason`.
/// Writes are best-effort: a failing sink is reported through `log` and
/// otherwise ignored.
pub struct AuditLog {
    sink: Option<Mutex<Box<dyn Write + Send>>>,
}

impl AuditLog {
    /// An audit log that records nothing.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Append to `path`, creating it and its parent directories if needed.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::to_writer(file))
    }

    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Some(Mutex::new(Box::new(writer))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn record(&self, principal: &EntityUid, resource: &EntityUid, outcome: &DispatchOutcome) {
        let Some(sink) = &self.sink else {
            return;
        };
        let line = format_line(
            &chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            principal,
            resource,
            outcome,
        );
        let Ok(mut sink) = sink.lock() else {
            log::warn!("audit log unavailable after an earlier panic");
            return;
        };
        if let Err(e) = sink.write_all(line.as_bytes()).and_then(|()| sink.flush()) {
            log::warn!("failed to write audit log: {e}");
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Keep a field on one line and free of the column separator.
fn one_line(text: &str) -> String {
    text.replace(['\n', '\r'], "; ").replace('\t', " ")
}

fn format_line(
    timestamp: &str,
    principal: &EntityUid,
    resource: &EntityUid,
    outcome: &DispatchOutcome,
) -> String {
    let command: String = outcome.command().chars().take(MAX_COMMAND_CHARS).collect();
    format!(
        "{timestamp}\t{kind}\t{principal}\t{action}\t{resource}\t{command}\t{reason}\n",
        kind = outcome.kind(),
        action = outcome.action().map(|a| a.as_str()).unwrap_or("-"),
        command = one_line(&command),
        reason = one_line(outcome.reason().unwrap_or_default()),
    )
}
