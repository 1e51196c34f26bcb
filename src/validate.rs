//! Field-level validation with human-readable messages.
//!
//! Types that cross a trust boundary (request specs, inbound headers, server
//! options) implement [`Validate`]. Failures never escape as raw errors; they
//! are turned into a formatted message such as `"link is required"`.

use std::fmt;
use url::Url;

/// A validation rule that a field failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Required,
    Url,
    MinLen(usize),
    MaxLen(usize),
    Min(i64),
    Max(i64),
    StartsWith(&'static str),
    /// No `/`-separated segment may start with the given character.
    SegmentPrefix(char),
}

/// A single failed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub rule: Rule,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = self.field;
        match &self.rule {
            Rule::Required => write!(f, "{field} is required"),
            Rule::Url => write!(f, "{field} must be a well-formed URL"),
            Rule::MinLen(n) => write!(f, "{field} must be at least {n} characters long"),
            Rule::MaxLen(n) => write!(f, "{field} must not exceed {n} characters"),
            Rule::Min(n) => write!(f, "{field} must not be less than {n}"),
            Rule::Max(n) => write!(f, "{field} must not be greater than {n}"),
            Rule::StartsWith(prefix) => write!(f, "{field} must start with {prefix}"),
            Rule::SegmentPrefix(c) => write!(f, "{field} segments must not start with {c}"),
        }
    }
}

/// All failures collected while validating one value.
///
/// Displays as the message of the first failed field, in the order the
/// checks were declared. Every failure stays available in [`failures`].
///
/// [`failures`]: ValidationError::failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    failures: Vec<FieldError>,
}

impl ValidationError {
    pub fn failures(&self) -> &[FieldError] {
        &self.failures
    }

    /// The formatted message reported to callers and written to logs.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failures.first() {
            Some(first) => first.fmt(f),
            None => f.write_str("validation failed"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Implemented by anything that can check its own fields.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Accumulates rule checks for the fields of one value.
///
/// Rules for a field are evaluated in order and stop at the first failure,
/// so `required` short-circuits `url` on an empty link.
///
/// # Examples
///
/// ```
/// use calltrace::validate::Checks;
///
/// let err = Checks::new()
///     .required("link", "")
///     .url("link", "")
///     .finish()
///     .unwrap_err();
/// assert_eq!(err.message(), "link is required");
/// assert_eq!(err.failures().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Checks {
    failures: Vec<FieldError>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    fn failed(&self, field: &str) -> bool {
        self.failures.iter().any(|f| f.field == field)
    }

    fn check(mut self, field: &'static str, ok: bool, rule: Rule) -> Self {
        if !ok && !self.failed(field) {
            self.failures.push(FieldError { field, rule });
        }
        self
    }

    pub fn required(self, field: &'static str, value: &str) -> Self {
        self.check(field, !value.is_empty(), Rule::Required)
    }

    /// Numeric `required`: zero counts as missing.
    pub fn required_number(self, field: &'static str, value: i64) -> Self {
        self.check(field, value != 0, Rule::Required)
    }

    pub fn url(self, field: &'static str, value: &str) -> Self {
        let ok = Url::parse(value).is_ok_and(|url| !url.scheme().is_empty());
        self.check(field, ok, Rule::Url)
    }

    pub fn min_len(self, field: &'static str, value: &str, min: usize) -> Self {
        self.check(field, value.chars().count() >= min, Rule::MinLen(min))
    }

    pub fn max_len(self, field: &'static str, value: &str, max: usize) -> Self {
        self.check(field, value.chars().count() <= max, Rule::MaxLen(max))
    }

    pub fn min(self, field: &'static str, value: i64, min: i64) -> Self {
        self.check(field, value >= min, Rule::Min(min))
    }

    pub fn max(self, field: &'static str, value: i64, max: i64) -> Self {
        self.check(field, value <= max, Rule::Max(max))
    }

    pub fn starts_with(self, field: &'static str, value: &str, prefix: &'static str) -> Self {
        self.check(field, value.starts_with(prefix), Rule::StartsWith(prefix))
    }

    pub fn no_segment_prefix(self, field: &'static str, value: &str, prefix: char) -> Self {
        let ok = !value.split('/').any(|segment| segment.starts_with(prefix));
        self.check(field, ok, Rule::SegmentPrefix(prefix))
    }

    pub fn finish(self) -> Result<(), ValidationError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                failures: self.failures,
            })
        }
    }
}
