//! Inbound request instrumentation.
//!
//! [`instrument`] is an axum middleware. It admits a request only when it
//! carries a valid `X-REQUEST-ID`, runs the handler with a [`TraceContext`] in
//! scope, and tees the response body so the bytes reach the client unchanged
//! while a copy is decoded for the log. Exactly one final [`LogRecord`] is
//! emitted per request, including requests that are turned away.
//!
//! ```no_run
//! use axum::{middleware::from_fn_with_state, routing::get, Router};
//! use calltrace::middleware::{instrument, InstrumentState};
//! use calltrace::server::RouteLabels;
//! use calltrace::Instrumentation;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), calltrace::Error> {
//! let mut labels = RouteLabels::default();
//! labels.insert("/ping", "ping");
//!
//! let state = InstrumentState::new(Instrumentation::builder().build()?, Arc::new(labels));
//! let app: Router = Router::new()
//!     .route("/ping", get(|| async { "pong" }))
//!     .layer(from_fn_with_state(state, instrument));
//! # Ok(())
//! # }
//! ```

use crate::code::MessageCode;
use crate::envelope::ResultEnvelope;
use crate::instrument::Instrumentation;
use crate::logger::{millis, Attr, LogRecord, Monitor};
use crate::server::RouteLabels;
use crate::trace::{TraceContext, TraceHeader, TRACE_HEADER};
use crate::validate::Validate;
use axum::body::Body;
use axum::extract::{MatchedPath, Request, State};
use axum::http::header::{HOST, USER_AGENT};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::{Bytes, BytesMut};
use http_body::{Body as HttpBody, Frame, SizeHint};
use serde_json::{Map, Value};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};

/// A request parameter a handler wants recorded under `attr.inp.param`.
///
/// Return it as a response extension:
///
/// ```
/// use axum::Extension;
/// use calltrace::middleware::RequestParam;
/// use serde_json::json;
///
/// async fn handler() -> (Extension<RequestParam>, &'static str) {
///     (Extension(RequestParam(json!({"id": 7}))), "ok")
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParam(pub Value);

/// State shared by every invocation of [`instrument`].
#[derive(Clone, Debug)]
pub struct InstrumentState {
    instrumentation: Instrumentation,
    labels: Arc<RouteLabels>,
}

impl InstrumentState {
    pub fn new(instrumentation: Instrumentation, labels: Arc<RouteLabels>) -> Self {
        Self {
            instrumentation,
            labels,
        }
    }
}

/// Instruments one inbound request.
pub async fn instrument(
    State(state): State<InstrumentState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let label = state.labels.get(&path).to_string();
    let mut inputs = request_inputs(&request, &path);

    let header = TraceHeader {
        request_id: request
            .headers()
            .get(TRACE_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };
    if let Err(e) = header.validate() {
        inputs.insert("param".to_string(), Value::Null);
        return reject(&state.instrumentation, header, label, inputs, e.message());
    }

    let ctx = TraceContext::new(header.request_id, label);
    request.extensions_mut().insert(ctx.clone());

    let start = Instant::now();
    let response = TraceContext::scope(ctx.clone(), next.run(request)).await;
    let duration = start.elapsed();

    let (parts, body) = response.into_parts();
    let param = parts
        .extensions
        .get::<RequestParam>()
        .map(|param| param.0.clone())
        .unwrap_or(Value::Null);
    inputs.insert("param".to_string(), param);

    let summary = Summary {
        instrumentation: state.instrumentation,
        ctx,
        duration,
        inputs,
        status: parts.status,
    };
    let body = TeeBody::new(body, move |captured| summary.emit(&captured));
    Response::from_parts(parts, Body::new(body))
}

/// Answers a request whose trace header failed validation.
///
/// The status is always 200; the failure is reported inside the envelope.
fn reject(
    instrumentation: &Instrumentation,
    header: TraceHeader,
    label: String,
    inputs: Map<String, Value>,
    message: String,
) -> Response {
    let error_code = instrumentation.codes().get(MessageCode::PvError, "");
    tracing::debug!(reason = %message, "Rejected request without a valid trace id");

    let record = LogRecord {
        text: message.clone(),
        label,
        trace: header.request_id,
        attr: Attr {
            monitor: Monitor {
                is_final: true,
                level: error_code.level,
                code: error_code.code,
                ..Default::default()
            },
            inp: inputs,
            oup: status_output(StatusCode::OK),
        },
        ..Default::default()
    };
    instrumentation.logger().emit(error_code.level, record);

    let envelope = ResultEnvelope {
        text: message,
        status_code: StatusCode::OK.as_u16(),
        response: None,
        error_code,
    };
    (StatusCode::OK, Json(envelope)).into_response()
}

fn request_inputs(request: &Request, path: &str) -> Map<String, Value> {
    let headers = request.headers();
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default();
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let mut inputs = Map::new();
    inputs.insert("host".to_string(), Value::from(host));
    inputs.insert("path".to_string(), Value::from(path));
    inputs.insert("user-agent".to_string(), Value::from(user_agent));
    inputs.insert("method".to_string(), Value::from(request.method().as_str()));
    inputs
}

fn status_output(status: StatusCode) -> Map<String, Value> {
    let mut outputs = Map::new();
    outputs.insert("status_code".to_string(), Value::from(status.as_u16()));
    outputs
}

/// Everything the final record needs besides the response bytes.
struct Summary {
    instrumentation: Instrumentation,
    ctx: TraceContext,
    duration: Duration,
    inputs: Map<String, Value>,
    status: StatusCode,
}

impl Summary {
    fn emit(self, captured: &[u8]) {
        let envelope = ResultEnvelope::decode_lossy(captured);
        let error_code = envelope.error_code;

        let record = LogRecord {
            text: error_code.label,
            label: self.ctx.label,
            trace: self.ctx.trace_id,
            attr: Attr {
                monitor: Monitor {
                    is_final: true,
                    level: error_code.level,
                    code: error_code.code,
                    process_duration: millis(self.duration),
                    process_delay: 0,
                },
                inp: self.inputs,
                oup: status_output(self.status),
            },
            ..Default::default()
        };
        self.instrumentation.logger().emit(error_code.level, record);
    }
}

/// Response body that forwards every frame untouched and keeps a copy of the
/// data bytes.
///
/// `on_complete` runs once with the captured bytes, when the inner body ends,
/// fails, or the body is dropped early.
pub(crate) struct TeeBody<F>
where
    F: FnOnce(Bytes),
{
    inner: Body,
    captured: BytesMut,
    on_complete: Option<F>,
}

impl<F> TeeBody<F>
where
    F: FnOnce(Bytes),
{
    pub(crate) fn new(inner: Body, on_complete: F) -> Self {
        Self {
            inner,
            captured: BytesMut::new(),
            on_complete: Some(on_complete),
        }
    }

    fn complete(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(std::mem::take(&mut self.captured).freeze());
        }
    }
}

impl<F> HttpBody for TeeBody<F>
where
    F: FnOnce(Bytes) + Unpin,
{
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        match &polled {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.captured.extend_from_slice(data);
                }
            }
            Some(Err(_)) | None => this.complete(),
        }
        Poll::Ready(polled)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<F> Drop for TeeBody<F>
where
    F: FnOnce(Bytes),
{
    fn drop(&mut self) {
        self.complete();
    }
}
