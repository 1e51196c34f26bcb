//! Error types for the instrumentation pipeline.
//!
//! Every failed outbound call still produces a [`ResultEnvelope`]; the error
//! variants that come out of the executor carry it so callers keep the status
//! code, body and classification.

use crate::code::ErrorCode;
use crate::envelope::ResultEnvelope;

/// The main error type.
///
/// The message of [`Error::Transport`] and [`Error::Status`] is the label of the
/// error code they were classified as.
///
/// # Examples
///
/// ```no_run
/// use calltrace::{Error, Executor, Instrumentation, RequestSpec, TraceContext};
///
/// # async fn example() -> Result<(), Error> {
/// let executor = Executor::new(Instrumentation::builder().build()?);
/// let ctx = TraceContext::new("0123456789abcdef", "example");
///
/// match executor.get(&ctx, RequestSpec::new("https://example.com/missing")).await {
///     Ok(envelope) => println!("Success: {}", envelope.text),
///     Err(Error::Status { envelope, .. }) => {
///         eprintln!("{} -> {}", envelope.status_code, envelope.error_code.label);
///     }
///     Err(Error::Transport { envelope, source }) => {
///         eprintln!("{}: {}", envelope.error_code.label, source);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Input failed validation. Holds the formatted field message.
    #[error("{0}")]
    Validation(String),

    /// No response arrived (DNS, connect, TLS, timeout).
    #[error("{}", .envelope.error_code.label)]
    Transport {
        /// Envelope with `status_code` 0 and the failure classification.
        envelope: Box<ResultEnvelope>,
        #[source]
        source: reqwest::Error,
    },

    /// A response arrived with a status other than 200 or 201.
    #[error("{}", .envelope.error_code.label)]
    Status {
        /// The complete envelope, body included.
        envelope: Box<ResultEnvelope>,
    },

    /// The executor or server could not be configured as requested.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Binding or serving failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the envelope produced by the failed call, if any.
    pub fn envelope(&self) -> Option<&ResultEnvelope> {
        match self {
            Error::Transport { envelope, .. } | Error::Status { envelope } => Some(envelope),
            _ => None,
        }
    }

    /// Returns the classification of a failed call.
    pub fn error_code(&self) -> Option<&ErrorCode> {
        self.envelope().map(|envelope| &envelope.error_code)
    }

    /// Returns the HTTP status of a [`Error::Status`] failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { envelope } => Some(envelope.status_code),
            _ => None,
        }
    }

    /// Returns `true` if the call failed because the timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport { source, .. } if source.is_timeout())
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
