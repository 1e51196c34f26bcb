//! Outbound request executor.
//!
//! The [`Executor`] makes exactly one attempt per call, classifies the outcome
//! with the shared error table and returns a [`ResultEnvelope`]. Transport
//! failures are also written to the structured log as non-final records.

use crate::code::{ErrorCode, ErrorTable, MessageCode};
use crate::envelope::{ResponseSnapshot, ResultEnvelope};
use crate::instrument::Instrumentation;
use crate::logger::{millis, Attr, LogRecord, Monitor};
use crate::request::{Method, RequestSpec};
use crate::trace::{TraceContext, TRACE_HEADER};
use crate::validate::Validate;
use crate::{Error, Result};
use http::header::{CONTENT_TYPE, HOST, REFERER, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Timeout applied when a [`RequestSpec`] leaves it at zero.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// `User-Agent` sent when browser headers are enabled.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.159 Safari/537.36";

const REQUEST_FAILED: &str = "request failed";
const RESOURCE_NOT_FOUND: &str = "resource not found";

/// Executes instrumented outbound HTTP requests.
///
/// Each call builds its own `reqwest` client from the [`RequestSpec`], so
/// timeout, proxy and TLS settings never leak between calls.
///
/// # Examples
///
/// ```no_run
/// use calltrace::{Executor, Instrumentation, RequestSpec, TraceContext};
///
/// # async fn example() -> Result<(), calltrace::Error> {
/// let executor = Executor::new(Instrumentation::builder().build()?);
/// let ctx = TraceContext::new("0123456789abcdef", "orders");
///
/// let envelope = executor
///     .post(&ctx, RequestSpec::new("https://api.example.com/orders").with_payload("{}"))
///     .await?;
/// println!("{} {}", envelope.status_code, envelope.text);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

#[derive(Debug)]
struct ExecutorInner {
    instrumentation: Instrumentation,
    default_timeout: Duration,
    default_headers: HeaderMap,
}

impl Executor {
    /// Creates an executor with the default timeout and no extra headers.
    pub fn new(instrumentation: Instrumentation) -> Self {
        ExecutorBuilder::new(instrumentation).build()
    }

    /// Returns a builder for configuring the default timeout and headers.
    pub fn builder(instrumentation: Instrumentation) -> ExecutorBuilder {
        ExecutorBuilder::new(instrumentation)
    }

    /// Executes `spec` as a GET request.
    pub async fn get(&self, ctx: &TraceContext, spec: RequestSpec) -> Result<ResultEnvelope> {
        self.execute(ctx, spec.with_method(Method::Get)).await
    }

    /// Executes `spec` as a POST request with a JSON content type.
    pub async fn post(&self, ctx: &TraceContext, spec: RequestSpec) -> Result<ResultEnvelope> {
        self.execute(ctx, spec.with_method(Method::Post)).await
    }

    /// Executes a single request described by `spec`.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `ctx` has no trace id or `spec.link` is
    ///   missing or malformed; nothing is sent.
    /// - [`Error::Transport`] if no response arrived. The failure is logged.
    /// - [`Error::Status`] for any status other than 200 or 201.
    /// - [`Error::Configuration`] for an unusable proxy, header or client.
    pub async fn execute(&self, ctx: &TraceContext, spec: RequestSpec) -> Result<ResultEnvelope> {
        ctx.validate().map_err(|e| Error::Validation(e.message()))?;
        spec.validate().map_err(|e| Error::Validation(e.message()))?;
        let url = Url::parse(&spec.link).map_err(|e| Error::Validation(e.to_string()))?;

        let timeout = match spec.timeout {
            0 => self.inner.default_timeout,
            seconds => Duration::from_secs(seconds),
        };
        let client = self.build_client(ctx, &spec, &url, timeout)?;

        tracing::debug!(
            method = %spec.method,
            url = %url,
            trace = %ctx.trace_id,
            timeout_secs = timeout.as_secs(),
            "Executing HTTP request"
        );

        let start = Instant::now();
        let outcome = dispatch(&client, &spec, url).await;
        let latency = start.elapsed();

        match outcome {
            Ok((status, headers, text)) => self.classify(status, &headers, text, latency),
            Err(source) => Err(self.transport_failure(ctx, source, latency)),
        }
    }

    fn build_client(
        &self,
        ctx: &TraceContext,
        spec: &RequestSpec,
        url: &Url,
        timeout: Duration,
    ) -> Result<reqwest::Client> {
        let mut headers = self.inner.default_headers.clone();
        headers.insert(
            HeaderName::from_static("x-request-id"),
            header_value(&ctx.trace_id, TRACE_HEADER)?,
        );

        if spec.enable_header {
            let host = header_value(&host_with_port(url), "Host")?;
            headers.insert(HOST, host.clone());
            headers.insert(REFERER, host);
            headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        }

        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers);

        if spec.enable_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(proxy) = spec.effective_proxy() {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::Configuration(format!("Invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        builder.build().map_err(|e| {
            Error::Configuration(format!("Failed to build HTTP client: {}", e))
        })
    }

    fn classify(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        text: String,
        latency: Duration,
    ) -> Result<ResultEnvelope> {
        let error_code = classify_status(self.inner.instrumentation.codes(), status.as_u16());

        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            code = error_code.code,
            "Received HTTP response"
        );

        let envelope = ResultEnvelope {
            text,
            status_code: status.as_u16(),
            response: Some(ResponseSnapshot::from_headers(headers, millis(latency))),
            error_code,
        };

        if status.as_u16() <= 201 {
            Ok(envelope)
        } else {
            Err(Error::Status {
                envelope: Box::new(envelope),
            })
        }
    }

    fn transport_failure(
        &self,
        ctx: &TraceContext,
        source: reqwest::Error,
        latency: Duration,
    ) -> Error {
        let codes = self.inner.instrumentation.codes();
        let error_code = if source.is_timeout() {
            codes.get(MessageCode::Timeout, "")
        } else {
            codes.get(MessageCode::DvError, REQUEST_FAILED)
        };

        tracing::warn!(
            error = %source,
            trace = %ctx.trace_id,
            latency_ms = latency.as_millis(),
            "Request failed"
        );

        let record = LogRecord {
            text: error_code.label.clone(),
            label: ctx.label.clone(),
            trace: ctx.trace_id.clone(),
            traceback: source.to_string(),
            attr: Attr {
                monitor: Monitor {
                    is_final: false,
                    level: error_code.level,
                    code: error_code.code,
                    process_duration: millis(latency),
                    process_delay: 0,
                },
                ..Default::default()
            },
            ..Default::default()
        };
        self.inner
            .instrumentation
            .logger()
            .emit(error_code.level, record);

        Error::Transport {
            envelope: Box::new(ResultEnvelope {
                error_code,
                ..Default::default()
            }),
            source,
        }
    }
}

/// Maps a response status onto the error table.
///
/// Anything up to 201 is success; 200 and 201 are never classified further.
pub(crate) fn classify_status(codes: &ErrorTable, status: u16) -> ErrorCode {
    match status {
        0..=201 => codes.success(),
        429 => codes.get(MessageCode::LimitError, ""),
        404 => codes.get(MessageCode::Check, RESOURCE_NOT_FOUND),
        _ => codes.get(MessageCode::StatusError, ""),
    }
}

async fn dispatch(
    client: &reqwest::Client,
    spec: &RequestSpec,
    url: Url,
) -> std::result::Result<(StatusCode, HeaderMap, String), reqwest::Error> {
    let mut request = match spec.method {
        Method::Post => client.post(url).header(CONTENT_TYPE, "application/json"),
        Method::Get => client.get(url),
    };
    if !spec.payload.is_empty() {
        request = request.body(spec.payload.clone());
    }

    let response = request.send().await?;
    let status = response.status();
    let headers = response.headers().clone();
    let text = response.text().await?;
    Ok((status, headers, text))
}

fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn header_value(value: &str, name: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Configuration(format!("Invalid {} header value: {}", name, e)))
}

/// Builder for [`Executor`].
pub struct ExecutorBuilder {
    instrumentation: Instrumentation,
    default_timeout: Duration,
    default_headers: HeaderMap,
}

impl ExecutorBuilder {
    /// Starts from a 10 second default timeout and no extra headers.
    pub fn new(instrumentation: Instrumentation) -> Self {
        Self {
            instrumentation,
            default_timeout: DEFAULT_TIMEOUT,
            default_headers: HeaderMap::new(),
        }
    }

    /// Sets the timeout used when a spec does not specify one.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Adds a header sent with every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Consumes the builder. Building never fails; headers were checked as
    /// they were added.
    pub fn build(self) -> Executor {
        Executor {
            inner: Arc::new(ExecutorInner {
                instrumentation: self.instrumentation,
                default_timeout: self.default_timeout,
                default_headers: self.default_headers,
            }),
        }
    }
}
