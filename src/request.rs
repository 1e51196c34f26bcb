//! Outbound request description.

use crate::validate::{Checks, Validate, ValidationError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// HTTP method of an outbound call.
///
/// Only GET and POST are distinguished; anything else behaves as GET, and
/// unknown names deserialize to [`Method::Get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    /// Parses a method name, case-insensitively. Unknown names are GET.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("POST") {
            Method::Post
        } else {
            Method::Get
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Method::from_name(&name))
    }
}

/// Everything needed to execute one outbound request.
///
/// # Examples
///
/// ```
/// use calltrace::{Method, RequestSpec};
///
/// let spec = RequestSpec::new("https://api.example.com/orders")
///     .with_method(Method::Post)
///     .with_payload(r#"{"id":7}"#)
///     .with_timeout(5);
/// assert_eq!(spec.timeout, 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSpec {
    /// Target URL. Required and must parse.
    pub link: String,
    pub method: Method,
    /// Request body, sent as-is.
    pub payload: String,
    /// Seconds; zero selects the executor default.
    pub timeout: u64,
    /// Proxy URL; ignored unless longer than six characters.
    pub proxy: String,
    /// Accept invalid TLS certificates.
    pub enable_skip_verify: bool,
    /// Send `Host`, `Referer` and a browser `User-Agent` derived from `link`.
    pub enable_header: bool,
}

impl RequestSpec {
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = proxy.into();
        self
    }

    pub fn skip_verify(mut self, enable: bool) -> Self {
        self.enable_skip_verify = enable;
        self
    }

    pub fn with_browser_headers(mut self, enable: bool) -> Self {
        self.enable_header = enable;
        self
    }

    /// The proxy to use, if the configured value looks like a URL.
    pub(crate) fn effective_proxy(&self) -> Option<&str> {
        (self.proxy.chars().count() > 6).then_some(self.proxy.as_str())
    }
}

impl Validate for RequestSpec {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .required("link", &self.link)
            .url("link", &self.link)
            .finish()
    }
}
