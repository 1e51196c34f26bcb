//! HTTP server hosting instrumented routes.
//!
//! Routes are registered on a [`ServerBuilder`] together with a label. The
//! path→label registry is frozen when [`ServerBuilder::build`] consumes the
//! builder, so it can never change once traffic is served.

use crate::instrument::Instrumentation;
use crate::middleware::{instrument, InstrumentState};
use crate::validate::{Checks, Validate, ValidationError};
use crate::{Error, Result};
use axum::handler::Handler;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put, MethodRouter};
use axum::Router;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;

/// Server options, typically read from the application's configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Interface to bind; empty binds all interfaces.
    pub host: String,
    /// Required, 3000..=10000.
    pub port: u16,
    pub disable_cors: bool,
    /// Disables turning handler panics into 500 responses.
    pub disable_recover: bool,
}

impl ServerOptions {
    /// The `host:port` string to bind.
    pub fn address(&self) -> String {
        let host = if self.host.is_empty() {
            "0.0.0.0"
        } else {
            self.host.as_str()
        };
        format!("{}:{}", host, self.port)
    }
}

impl Validate for ServerOptions {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let port = i64::from(self.port);
        Checks::new()
            .required_number("port", port)
            .min("port", port, 3000)
            .max("port", port, 10000)
            .finish()
    }
}

/// Method a route answers to. Unknown names deserialize to GET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl RouteMethod {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "POST" => RouteMethod::Post,
            "PUT" => RouteMethod::Put,
            "DELETE" => RouteMethod::Delete,
            _ => RouteMethod::Get,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteMethod::Get => "GET",
            RouteMethod::Post => "POST",
            RouteMethod::Put => "PUT",
            RouteMethod::Delete => "DELETE",
        }
    }

    fn router<H, T>(self, handler: H) -> MethodRouter
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        match self {
            RouteMethod::Get => get(handler),
            RouteMethod::Post => post(handler),
            RouteMethod::Put => put(handler),
            RouteMethod::Delete => delete(handler),
        }
    }
}

impl<'de> Deserialize<'de> for RouteMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(RouteMethod::from_name(&name))
    }
}

/// A route to register.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSpec {
    pub method: RouteMethod,
    pub path: String,
    /// Label written on every record produced by this route.
    pub label: String,
}

impl RouteSpec {
    pub fn new(method: RouteMethod, path: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            label: label.into(),
        }
    }
}

impl Validate for RouteSpec {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        Checks::new()
            .required("path", &self.path)
            .starts_with("path", &self.path, "/")
            .no_segment_prefix("path", &self.path, ':')
            .no_segment_prefix("path", &self.path, '*')
            .finish()
    }
}

/// Route path → label registry.
#[derive(Debug, Clone, Default)]
pub struct RouteLabels {
    by_path: HashMap<String, String>,
}

impl RouteLabels {
    pub fn insert(&mut self, path: impl Into<String>, label: impl Into<String>) {
        self.by_path.insert(path.into(), label.into());
    }

    /// The label for `path`, or `""` when the path was never registered.
    pub fn get(&self, path: &str) -> &str {
        self.by_path.get(path).map(String::as_str).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

/// An instrumented axum application.
///
/// # Examples
///
/// ```no_run
/// use calltrace::server::{RouteMethod, RouteSpec, Server, ServerOptions};
/// use calltrace::Instrumentation;
///
/// # async fn example() -> Result<(), calltrace::Error> {
/// let options = ServerOptions {
///     port: 8080,
///     ..Default::default()
/// };
/// let server = Server::builder(options, Instrumentation::builder().build()?)?
///     .route(RouteSpec::new(RouteMethod::Get, "/ping", "ping"), || async { "pong" })?
///     .build();
/// server.serve().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Server {
    router: Router,
    options: ServerOptions,
}

impl Server {
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the options are invalid.
    pub fn builder(options: ServerOptions, instrumentation: Instrumentation) -> Result<ServerBuilder> {
        options.validate().map_err(|e| Error::Validation(e.message()))?;
        Ok(ServerBuilder {
            options,
            instrumentation,
            router: Router::new(),
            labels: RouteLabels::default(),
            registered: HashSet::new(),
            shapes: HashMap::new(),
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Binds the configured address and serves until the process stops.
    pub async fn serve(self) -> Result<()> {
        let address = self.options.address();
        let listener = tokio::net::TcpListener::bind(&address).await?;
        tracing::info!(address = %address, "Serving HTTP");
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

/// Collects routes before the server is built.
pub struct ServerBuilder {
    options: ServerOptions,
    instrumentation: Instrumentation,
    router: Router,
    labels: RouteLabels,
    registered: HashSet<(RouteMethod, String)>,
    /// Path with capture names erased → the path first registered with it.
    shapes: HashMap<String, String>,
}

impl ServerBuilder {
    /// Registers `handler` and records the route's label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the path is empty, not absolute, uses
    /// `:name` or `*name` segments, repeats a method and path already
    /// registered, or differs from a registered path only in capture names.
    pub fn route<H, T>(mut self, spec: RouteSpec, handler: H) -> Result<Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        spec.validate().map_err(|e| Error::Validation(e.message()))?;

        let key = (spec.method, spec.path.clone());
        if self.registered.contains(&key) {
            return Err(Error::Validation(format!(
                "route {} {} is already registered",
                spec.method.as_str(),
                spec.path
            )));
        }
        let shape = route_shape(&spec.path);
        if let Some(existing) = self.shapes.get(&shape) {
            if *existing != spec.path {
                return Err(Error::Validation(format!(
                    "path {} conflicts with {}",
                    spec.path, existing
                )));
            }
        }
        self.registered.insert(key);
        self.shapes.insert(shape, spec.path.clone());

        self.router = self.router.route(&spec.path, spec.method.router(handler));
        self.labels.insert(spec.path, spec.label);
        Ok(self)
    }

    /// Freezes the label registry and installs the middleware stack.
    ///
    /// Panic recovery sits inside the instrumentation so recovered panics are
    /// still logged; CORS sits outside it.
    pub fn build(self) -> Server {
        tracing::debug!(routes = self.labels.len(), "Building server");
        let state = InstrumentState::new(self.instrumentation, Arc::new(self.labels));

        let mut router = self.router;
        if !self.options.disable_recover {
            router = router.layer(CatchPanicLayer::new());
        }
        router = router.layer(from_fn_with_state(state, instrument));
        if !self.options.disable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        Server {
            router,
            options: self.options,
        }
    }
}

/// Erases capture names so `/a/{id}` and `/a/{key}` compare equal.
fn route_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with("{*") && segment.ends_with('}') {
                "{*}"
            } else if segment.starts_with('{') && segment.ends_with('}') {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
