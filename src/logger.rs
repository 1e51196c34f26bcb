//! Structured log records and the sink they are handed to.
//!
//! The pipeline never formats output itself. It builds a [`LogRecord`], the
//! [`Logger`] fills in defaults and process identity, and a [`LogSink`] decides
//! where the resulting [`LogEntry`] goes. The default [`TracingSink`] turns each
//! entry into one `tracing` event carrying the JSON-encoded record.

use crate::code::{Level, MessageCode};
use crate::validate::{Checks, Validate, ValidationError};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Monitoring fields of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Monitor {
    /// `true` for the single record summarising an inbound request.
    #[serde(rename = "final")]
    pub is_final: bool,
    pub level: Level,
    pub code: u32,
    /// Milliseconds.
    pub process_duration: u64,
    /// Milliseconds.
    pub process_delay: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attr {
    pub monitor: Monitor,
    pub inp: Map<String, Value>,
    pub oup: Map<String, Value>,
}

/// What the pipeline knows about one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogRecord {
    pub text: String,
    pub label: String,
    pub trace: String,
    pub remark: String,
    pub traceback: String,
    pub attr: Attr,
}

/// A record stamped with process identity, as delivered to a [`LogSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: Level,
    pub env: String,
    pub application: String,
    #[serde(flatten)]
    pub record: LogRecord,
}

/// Destination for log entries.
pub trait LogSink: Send + Sync {
    fn emit(&self, entry: &LogEntry);
}

/// Emits every entry as a `tracing` event.
///
/// `fatal` maps onto tracing's `ERROR`; no entry ever aborts the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, entry: &LogEntry) {
        let encoded = match serde_json::to_string(entry) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode log record");
                return;
            }
        };
        let text = entry.record.text.as_str();
        let trace = entry.record.trace.as_str();
        match entry.level {
            Level::Debug => tracing::debug!(trace, record = %encoded, "{}", text),
            Level::Info => tracing::info!(trace, record = %encoded, "{}", text),
            Level::Warn => tracing::warn!(trace, record = %encoded, "{}", text),
            Level::Error | Level::Fatal => tracing::error!(trace, record = %encoded, "{}", text),
        }
    }
}

/// Fills record defaults and forwards entries to a sink.
#[derive(Clone)]
pub struct Logger {
    env: String,
    application: String,
    label: String,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    pub fn new(
        env: impl Into<String>,
        application: impl Into<String>,
        label: impl Into<String>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            env: env.into(),
            application: application.into(),
            label: label.into(),
            sink,
        }
    }

    /// Emits `record` at `level`.
    ///
    /// A zero code becomes the success code and an empty label becomes the
    /// logger's own label.
    pub fn emit(&self, level: Level, mut record: LogRecord) {
        if record.attr.monitor.code == 0 {
            record.attr.monitor.code = MessageCode::Success.as_u32();
        }
        if record.label.is_empty() {
            record.label = self.label.clone();
        }
        self.sink.emit(&LogEntry {
            level,
            env: self.env.clone(),
            application: self.application.clone(),
            record,
        });
    }

    pub fn debug(&self, record: LogRecord) {
        self.emit(Level::Debug, record);
    }

    pub fn info(&self, record: LogRecord) {
        self.emit(Level::Info, record);
    }

    pub fn warn(&self, record: LogRecord) {
        self.emit(Level::Warn, record);
    }

    pub fn error(&self, record: LogRecord) {
        self.emit(Level::Error, record);
    }

    pub fn fatal(&self, record: LogRecord) {
        self.emit(Level::Fatal, record);
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("env", &self.env)
            .field("application", &self.application)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Output format for [`init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoder {
    #[default]
    Json,
    Console,
}

/// Logging options, typically read from the application's configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    pub application: String,
    pub env: String,
    pub label: String,
    pub encoder: Encoder,
}

impl Validate for LogOptions {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Checks::new()
            .required("application", &self.application)
            .required("env", &self.env)
            .required("label", &self.label)
            .finish()
    }
}

/// Installs a global `tracing` subscriber writing to stdout.
///
/// The filter comes from `RUST_LOG`, defaulting to `info`.
///
/// # Errors
///
/// Returns an error if the options are invalid or a global subscriber is
/// already installed.
pub fn init(options: &LogOptions) -> Result<()> {
    options.validate().map_err(|e| Error::Validation(e.message()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match options.encoder {
        Encoder::Json => builder.json().try_init(),
        Encoder::Console => builder.try_init(),
    };
    installed.map_err(|e| Error::Configuration(format!("Failed to install subscriber: {}", e)))
}
