//! The uniform result shape shared by both ends of the pipeline.
//!
//! The executor returns a [`ResultEnvelope`] for every call it makes, and the
//! middleware decodes handler responses back into one to find the error code
//! to log. Decoding is lenient: every field has a default.

use crate::code::ErrorCode;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of one HTTP exchange.
///
/// # Examples
///
/// ```
/// use calltrace::ResultEnvelope;
///
/// // Bodies that are not envelopes decode to defaults instead of failing.
/// let envelope = ResultEnvelope::decode_lossy(b"<html></html>");
/// assert_eq!(envelope, ResultEnvelope::default());
///
/// let envelope = ResultEnvelope::decode_lossy(
///     br#"{"text":"ok","status_code":200,"error_code":{"code":10000,"level":"info"}}"#,
/// );
/// assert_eq!(envelope.status_code, 200);
/// assert!(envelope.error_code.is_success());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultEnvelope {
    /// Response body as text.
    pub text: String,
    /// HTTP status, or 0 when no response arrived.
    pub status_code: u16,
    /// Details of the underlying response, when there was one.
    pub response: Option<ResponseSnapshot>,
    /// Classification of the outcome.
    pub error_code: ErrorCode,
}

impl ResultEnvelope {
    /// Decodes `bytes`, falling back to the default envelope on any error.
    pub fn decode_lossy(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }

    /// Returns a response header by (lowercase) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response.as_ref()?.headers.get(name).map(String::as_str)
    }
}

/// The parts of an upstream response the pipeline keeps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseSnapshot {
    /// Header values that are valid UTF-8, first value per name.
    pub headers: BTreeMap<String, String>,
    /// Milliseconds from dispatch until the body was read.
    pub latency_ms: u64,
}

impl ResponseSnapshot {
    pub fn from_headers(headers: &HeaderMap, latency_ms: u64) -> Self {
        let mut map = BTreeMap::new();
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                map.entry(name.as_str().to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        Self {
            headers: map,
            latency_ms,
        }
    }
}
