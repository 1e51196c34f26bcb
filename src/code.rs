//! The fixed error-code taxonomy shared by the executor and the middleware.
//!
//! Every outcome the pipeline reports, successful or not, is described by an
//! [`ErrorCode`] drawn from an [`ErrorTable`]. The table is built once and never
//! mutated; lookups of unknown codes fall back to [`MessageCode::Success`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Severity attached to an [`ErrorCode`] and to emitted log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys of the error table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageCode {
    Success = 10000,
    Check = 10001,
    LimitError = 10002,
    Timeout = 10003,
    SupWarn = 10004,
    StatusError = 10005,
    EdError = 10006,
    RpError = 10007,
    PvError = 10008,
    DvError = 10009,
    RWarn = 10010,
    RpWarn = 10011,
    CallTimeout = 20001,
    CallError = 20002,
    Interrupt = 30001,
}

impl MessageCode {
    pub const ALL: [MessageCode; 15] = [
        MessageCode::Success,
        MessageCode::Check,
        MessageCode::LimitError,
        MessageCode::Timeout,
        MessageCode::SupWarn,
        MessageCode::StatusError,
        MessageCode::EdError,
        MessageCode::RpError,
        MessageCode::PvError,
        MessageCode::DvError,
        MessageCode::RWarn,
        MessageCode::RpWarn,
        MessageCode::CallTimeout,
        MessageCode::CallError,
        MessageCode::Interrupt,
    ];

    /// Returns the numeric value used on the wire.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    fn defaults(self) -> (Level, &'static str) {
        match self {
            MessageCode::Success => (Level::Info, "success"),
            MessageCode::Check => (Level::Info, "please check"),
            MessageCode::LimitError => (Level::Info, "limit exceeded"),
            MessageCode::Timeout => (Level::Info, "timeout"),
            MessageCode::SupWarn => (Level::Warn, "supplementary data"),
            MessageCode::StatusError => (Level::Error, "non-standard status code"),
            MessageCode::EdError => (Level::Error, "encode or decode error"),
            MessageCode::RpError => (Level::Error, "runtime parameter error"),
            MessageCode::PvError => (Level::Error, "parameter validation failed"),
            MessageCode::DvError => (Level::Error, "data result validation failed"),
            MessageCode::RWarn => (Level::Warn, "runtime exception"),
            MessageCode::RpWarn => (Level::Warn, "runtime error"),
            MessageCode::CallTimeout => (Level::Error, "call timeout"),
            MessageCode::CallError => (Level::Error, "call error"),
            MessageCode::Interrupt => (Level::Fatal, "component interrupted"),
        }
    }
}

/// A single taxonomy entry.
///
/// All fields default so that partially formed JSON (for instance a response
/// body produced by some other service) still decodes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorCode {
    pub code: u32,
    pub level: Level,
    pub label: String,
}

impl ErrorCode {
    /// Returns `true` for the success entry.
    pub fn is_success(&self) -> bool {
        self.code == MessageCode::Success.as_u32()
    }
}

/// Immutable lookup table from [`MessageCode`] to [`ErrorCode`].
///
/// # Examples
///
/// ```
/// use calltrace::code::{ErrorTable, MessageCode};
///
/// let table = ErrorTable::standard();
/// let erc = table.get(MessageCode::Check, "resource not found");
/// assert_eq!(erc.code, 10001);
/// assert_eq!(erc.label, "resource not found");
///
/// // Unknown codes resolve to the success entry.
/// assert_eq!(table.lookup(4242).code, 10000);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorTable {
    entries: HashMap<u32, ErrorCode>,
}

impl ErrorTable {
    /// Builds the standard table.
    pub fn standard() -> Self {
        let entries = MessageCode::ALL
            .iter()
            .map(|&code| {
                let (level, label) = code.defaults();
                (
                    code.as_u32(),
                    ErrorCode {
                        code: code.as_u32(),
                        level,
                        label: label.to_string(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Returns the entry for `code`, overriding its label when `label` has
    /// more than one character.
    pub fn get(&self, code: MessageCode, label: &str) -> ErrorCode {
        let mut value = self.lookup(code.as_u32());
        if label.chars().count() > 1 {
            value.label = label.to_string();
        }
        value
    }

    /// Looks up a raw numeric code. Unknown codes yield the success entry.
    pub fn lookup(&self, code: u32) -> ErrorCode {
        match self.entries.get(&code) {
            Some(entry) => entry.clone(),
            None => self.success(),
        }
    }

    /// The default entry.
    pub fn success(&self) -> ErrorCode {
        let (level, label) = MessageCode::Success.defaults();
        self.entries
            .get(&MessageCode::Success.as_u32())
            .cloned()
            .unwrap_or_else(|| ErrorCode {
                code: MessageCode::Success.as_u32(),
                level,
                label: label.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ErrorTable {
    fn default() -> Self {
        Self::standard()
    }
}
