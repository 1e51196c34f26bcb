//! A small instrumented gateway.
//!
//! Serves `GET /proxy?link=...`, forwards the caller's `X-REQUEST-ID` to the
//! upstream link and answers with the upstream's result envelope. Every
//! request produces one JSON log line on stdout.
//!
//! Run with: `cargo run --example gateway`, then
//! `curl -H 'X-REQUEST-ID: 0123456789abcdef' 'localhost:8080/proxy?link=https://example.com'`

use axum::extract::Query;
use axum::{Extension, Json};
use calltrace::logger::{self, Encoder, LogOptions};
use calltrace::middleware::RequestParam;
use calltrace::server::{RouteMethod, RouteSpec, Server, ServerOptions};
use calltrace::{Error, Executor, Instrumentation, RequestSpec, ResultEnvelope, TraceContext};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    link: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let log_options = LogOptions {
        application: "gateway".to_string(),
        env: "dev".to_string(),
        label: "request".to_string(),
        encoder: Encoder::Json,
    };
    logger::init(&log_options)?;

    let instrumentation = Instrumentation::builder().options(log_options).build()?;
    let executor = Executor::new(instrumentation.clone());

    let proxy = move |Extension(ctx): Extension<TraceContext>, Query(query): Query<ProxyQuery>| {
        let executor = executor.clone();
        async move {
            let param = RequestParam(json!({ "link": query.link }));
            let spec = RequestSpec::new(query.link).with_timeout(5);
            let envelope: ResultEnvelope = match executor.get(&ctx, spec).await {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(error = %e, "Upstream call failed");
                    e.envelope().cloned().unwrap_or_default()
                }
            };
            (Extension(param), Json(envelope))
        }
    };

    let options = ServerOptions {
        port: 8080,
        ..Default::default()
    };
    Server::builder(options, instrumentation)?
        .route(RouteSpec::new(RouteMethod::Get, "/proxy", "proxy"), proxy)?
        .route(RouteSpec::new(RouteMethod::Get, "/ping", "ping"), || async { "pong" })?
        .build()
        .serve()
        .await
}
