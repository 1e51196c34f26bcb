//! Process-wide instrumentation state.
//!
//! [`Instrumentation`] is built once at startup and cloned into the executor
//! and the server. It owns the error table and the logger; neither changes
//! after [`InstrumentationBuilder::build`] returns.

use crate::code::ErrorTable;
use crate::logger::{LogOptions, LogSink, Logger, TracingSink};
use crate::validate::Validate;
use crate::{Error, Result};
use std::sync::Arc;

/// Shared, immutable instrumentation state.
///
/// # Examples
///
/// ```
/// use calltrace::Instrumentation;
///
/// # fn main() -> Result<(), calltrace::Error> {
/// let instrumentation = Instrumentation::builder()
///     .application("billing")
///     .env("prod")
///     .label("request")
///     .build()?;
/// assert_eq!(instrumentation.logger().application(), "billing");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Instrumentation {
    inner: Arc<InstrumentationInner>,
}

#[derive(Debug)]
struct InstrumentationInner {
    codes: ErrorTable,
    logger: Logger,
}

impl Instrumentation {
    /// Returns a builder with the `app`/`dev`/`default` identity.
    pub fn builder() -> InstrumentationBuilder {
        InstrumentationBuilder::new()
    }

    /// The error table used to classify every outcome.
    pub fn codes(&self) -> &ErrorTable {
        &self.inner.codes
    }

    /// The logger every record is emitted through.
    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }
}

/// Builder for [`Instrumentation`].
///
/// Application, env and label default to `"app"`, `"dev"` and `"default"`
/// and must not be empty.
pub struct InstrumentationBuilder {
    options: LogOptions,
    sink: Option<Arc<dyn LogSink>>,
    codes: Option<ErrorTable>,
}

impl InstrumentationBuilder {
    /// Same as [`Instrumentation::builder`].
    pub fn new() -> Self {
        Self {
            options: LogOptions {
                application: "app".to_string(),
                env: "dev".to_string(),
                label: "default".to_string(),
                ..Default::default()
            },
            sink: None,
            codes: None,
        }
    }

    /// Takes application, env and label from `options`.
    pub fn options(mut self, options: LogOptions) -> Self {
        self.options = options;
        self
    }

    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.options.application = application.into();
        self
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.options.env = env.into();
        self
    }

    /// Label used for records that do not carry one.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.options.label = label.into();
        self
    }

    /// Sets where log entries go. Defaults to [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replaces the standard error table.
    pub fn codes(mut self, codes: ErrorTable) -> Self {
        self.codes = Some(codes);
        self
    }

    /// # Errors
    ///
    /// Returns [`Error::Validation`] if application, env or label is empty.
    pub fn build(self) -> Result<Instrumentation> {
        self.options.validate().map_err(|e| Error::Validation(e.message()))?;

        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let logger = Logger::new(
            self.options.env,
            self.options.application,
            self.options.label,
            sink,
        );

        Ok(Instrumentation {
            inner: Arc::new(InstrumentationInner {
                codes: self.codes.unwrap_or_default(),
                logger,
            }),
        })
    }
}

impl Default for InstrumentationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
