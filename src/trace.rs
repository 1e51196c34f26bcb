//! Request-scoped trace context.
//!
//! Every inbound request carries a caller-supplied correlation id in the
//! `X-REQUEST-ID` header. The middleware turns it into a [`TraceContext`],
//! stores it in the request extensions and in task-local storage, and the
//! executor forwards it on every outbound call.
//!
//! Tokio task-local values are not inherited by spawned tasks. Use
//! [`TraceContext::scope`] when moving work onto another task.

use crate::validate::{Checks, Validate, ValidationError};
use std::future::Future;
use tokio::task_local;

/// Header carrying the trace id, inbound and outbound.
pub const TRACE_HEADER: &str = "X-REQUEST-ID";

/// Minimum accepted length of an inbound trace id.
pub const MIN_TRACE_LEN: usize = 16;

task_local! {
    static CURRENT: TraceContext;
}

/// Correlation data threaded through one request.
///
/// # Examples
///
/// ```
/// use calltrace::TraceContext;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let ctx = TraceContext::new("0123456789abcdef", "orders");
/// let seen = TraceContext::scope(ctx.clone(), async { TraceContext::current() }).await;
/// assert_eq!(seen, Some(ctx));
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub label: String,
}

impl TraceContext {
    pub fn new(trace_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            label: label.into(),
        }
    }

    /// Returns the context in scope for the current task, if any.
    pub fn current() -> Option<Self> {
        CURRENT.try_with(|ctx| ctx.clone()).ok()
    }

    /// Runs `fut` with `ctx` as the current context.
    pub async fn scope<Fut>(ctx: TraceContext, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        CURRENT.scope(ctx, fut).await
    }
}

/// Outbound calls need a trace id to forward. Length is only enforced on
/// inbound headers.
impl Validate for TraceContext {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .required(TRACE_HEADER, &self.trace_id)
            .finish()
    }
}

/// The inbound trace header as received, before it is trusted.
#[derive(Debug, Clone, Default)]
pub(crate) struct TraceHeader {
    pub(crate) request_id: String,
}

impl Validate for TraceHeader {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .required(TRACE_HEADER, &self.request_id)
            .min_len(TRACE_HEADER, &self.request_id, MIN_TRACE_LEN)
            .finish()
    }
}
