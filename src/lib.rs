//! # calltrace - instrumented HTTP calls and request logging
//!
//! calltrace correlates every inbound request and every outbound call it makes
//! through a caller-supplied trace id, classifies outcomes with one fixed
//! error-code table, and writes a structured log record for each of them.
//!
//! - [`Executor`] issues a single outbound request from a [`RequestSpec`] and
//!   returns a [`ResultEnvelope`]. 200 and 201 are success; 404, 429 and any
//!   other status become classified [`Error::Status`] failures; transport
//!   failures are logged and returned as [`Error::Transport`]. There are no
//!   retries.
//! - [`middleware::instrument`] rejects requests without a valid
//!   `X-REQUEST-ID`, tees the handler's response body without changing it, and
//!   emits exactly one final log record per request.
//! - [`server::Server`] registers labelled routes and installs the middleware.
//!
//! ## Quick Start
//!
//! ```no_run
//! use axum::Extension;
//! use calltrace::server::{RouteMethod, RouteSpec, Server, ServerOptions};
//! use calltrace::{Executor, Instrumentation, RequestSpec, ResultEnvelope, TraceContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), calltrace::Error> {
//!     let instrumentation = Instrumentation::builder()
//!         .application("gateway")
//!         .env("prod")
//!         .label("request")
//!         .build()?;
//!     let executor = Executor::new(instrumentation.clone());
//!
//!     let handler = move |Extension(ctx): Extension<TraceContext>| {
//!         let executor = executor.clone();
//!         async move {
//!             let spec = RequestSpec::new("https://example.com").with_timeout(5);
//!             let envelope = match executor.get(&ctx, spec).await {
//!                 Ok(envelope) => envelope,
//!                 Err(e) => e.envelope().cloned().unwrap_or_default(),
//!             };
//!             axum::Json::<ResultEnvelope>(envelope)
//!         }
//!     };
//!
//!     let options = ServerOptions {
//!         port: 8080,
//!         ..Default::default()
//!     };
//!     Server::builder(options, instrumentation)?
//!         .route(RouteSpec::new(RouteMethod::Get, "/proxy", "proxy"), handler)?
//!         .build()
//!         .serve()
//!         .await
//! }
//! ```

mod client;
pub mod code;
mod envelope;
mod error;
mod instrument;
pub mod logger;
pub mod middleware;
mod request;
pub mod server;
pub mod trace;
pub mod validate;

pub use client::{Executor, ExecutorBuilder, BROWSER_USER_AGENT, DEFAULT_TIMEOUT};
pub use code::{ErrorCode, ErrorTable, Level, MessageCode};
pub use envelope::{ResponseSnapshot, ResultEnvelope};
pub use error::{Error, Result};
pub use instrument::{Instrumentation, InstrumentationBuilder};
pub use logger::{LogEntry, LogRecord, LogSink, Logger, TracingSink};
pub use request::{Method, RequestSpec};
pub use trace::TraceContext;
