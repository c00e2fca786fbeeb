//! The classified error taxonomy.
//!
//! An [`ErrorRecord`] is the canonical, immutable form of a failure once it has
//! been classified. Its [`ErrorKind`] supplies the default HTTP status and
//! description; explicit constructor overrides always win over the defaults.

use serde::Serialize;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::sync::Arc;

use super::RawError;

/// Commonly used HTTP status codes.
pub mod common_http {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const INTERNAL_SERVER: u16 = 500;
}

/// Description carried by every data-layer error.
pub const DATABASE_ERROR: &str = "DATABASE_ERROR";

/// Description carried by business/API errors, and the marker the classifier
/// looks for on raw errors.
pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";

/// Description given to unclassified errors that bring none of their own.
pub const UNCLASSIFIED_ERROR: &str = "UNCLASSIFIED_ERROR";

/// The closed set of error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Document failed schema validation.
    Validation,
    /// Unique-index violation.
    Duplicate,
    /// A value could not be cast to the expected type.
    CastOrType,
    /// An explicit business/API error raised by a handler.
    BusinessRule,
    /// Anything no rule recognised. Treated as a programmer error.
    Unclassified,
}

impl ErrorKind {
    /// HTTP status used when the constructor gives none.
    pub fn default_http_status(self) -> u16 {
        match self {
            ErrorKind::Validation | ErrorKind::Duplicate | ErrorKind::CastOrType => {
                common_http::BAD_REQUEST
            }
            ErrorKind::BusinessRule | ErrorKind::Unclassified => common_http::INTERNAL_SERVER,
        }
    }

    /// Description used when the constructor gives none.
    pub fn default_description(self) -> &'static str {
        match self {
            ErrorKind::Validation | ErrorKind::Duplicate | ErrorKind::CastOrType => DATABASE_ERROR,
            ErrorKind::BusinessRule => INTERNAL_SERVER_ERROR,
            ErrorKind::Unclassified => UNCLASSIFIED_ERROR,
        }
    }

    /// Operational errors are expected failures; the service keeps running.
    pub fn is_operational(self) -> bool {
        !matches!(self, ErrorKind::Unclassified)
    }

    /// Returns true for the data-layer kinds.
    pub fn is_database(self) -> bool {
        matches!(
            self,
            ErrorKind::Validation | ErrorKind::Duplicate | ErrorKind::CastOrType
        )
    }

    /// Name used as the first line of a captured stack.
    fn type_name(self) -> &'static str {
        match self {
            ErrorKind::Validation | ErrorKind::Duplicate | ErrorKind::CastOrType => "DatabaseError",
            ErrorKind::BusinessRule => "APIError",
            ErrorKind::Unclassified => "Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Duplicate => write!(f, "duplicate"),
            ErrorKind::CastOrType => write!(f, "cast_or_type"),
            ErrorKind::BusinessRule => write!(f, "business_rule"),
            ErrorKind::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// The data-layer subset of [`ErrorKind`], accepted by
/// [`ErrorRecord::database_error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseKind {
    Validation,
    Duplicate,
    CastOrType,
}

impl From<DatabaseKind> for ErrorKind {
    fn from(kind: DatabaseKind) -> Self {
        match kind {
            DatabaseKind::Validation => ErrorKind::Validation,
            DatabaseKind::Duplicate => ErrorKind::Duplicate,
            DatabaseKind::CastOrType => ErrorKind::CastOrType,
        }
    }
}

/// A classified error. Immutable once built.
///
/// Serializes to `{kind, message, httpStatus, description, isOperational,
/// originalStack}`; the raw cause is never serialized.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    kind: ErrorKind,
    message: String,
    http_status: u16,
    description: String,
    is_operational: bool,
    original_stack: String,
    #[serde(skip)]
    cause: Option<Arc<RawError>>,
}

impl ErrorRecord {
    /// Starts a data-layer error: status 400, description `DATABASE_ERROR`.
    pub fn database_error(kind: DatabaseKind, message: impl Into<String>) -> ErrorRecordBuilder {
        ErrorRecordBuilder::new(kind.into(), message)
    }

    /// Starts a business/API error: status 500, description `INTERNAL_SERVER_ERROR`.
    pub fn api_error(message: impl Into<String>) -> ErrorRecordBuilder {
        ErrorRecordBuilder::new(ErrorKind::BusinessRule, message)
    }

    /// Starts an unclassified (non-operational) error: status 500.
    pub fn unclassified(message: impl Into<String>) -> ErrorRecordBuilder {
        ErrorRecordBuilder::new(ErrorKind::Unclassified, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_operational(&self) -> bool {
        self.is_operational
    }

    pub fn original_stack(&self) -> &str {
        &self.original_stack
    }

    /// The raw error this record was classified from, for logging only.
    pub fn cause(&self) -> Option<&RawError> {
        self.cause.as_deref()
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorRecord {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Builder returned by the typed constructors on [`ErrorRecord`].
#[derive(Debug, Clone)]
#[must_use = "call build() to obtain the ErrorRecord"]
pub struct ErrorRecordBuilder {
    kind: ErrorKind,
    message: String,
    http_status: Option<u16>,
    description: Option<String>,
    stack: Option<String>,
    cause: Option<Arc<RawError>>,
}

impl ErrorRecordBuilder {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
            description: None,
            stack: None,
            cause: None,
        }
    }

    /// Overrides the kind's default HTTP status.
    pub fn http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Overrides the kind's default description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Uses the given stack text instead of capturing one.
    pub fn stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Attaches the raw error that triggered classification.
    pub fn cause(mut self, cause: Arc<RawError>) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn build(self) -> ErrorRecord {
        let kind = self.kind;
        let original_stack = match self.stack {
            Some(stack) => stack,
            None => capture_stack(kind.type_name(), &self.message),
        };

        ErrorRecord {
            kind,
            http_status: self.http_status.unwrap_or_else(|| kind.default_http_status()),
            description: self
                .description
                .unwrap_or_else(|| kind.default_description().to_string()),
            is_operational: kind.is_operational(),
            message: self.message,
            original_stack,
            cause: self.cause,
        }
    }
}

/// Frames belonging to backtrace capture and to this module are dropped so the
/// stack starts at the caller that raised the error.
const OWN_FRAME_PREFIXES: &[&str] = &["std::backtrace", "errorgate::error::"];

/// Captures `"<label>: <message>"` followed by the current backtrace, when
/// backtraces are enabled (`RUST_BACKTRACE`/`RUST_LIB_BACKTRACE`).
fn capture_stack(label: &str, message: &str) -> String {
    let header = format!("{}: {}", label, message);
    let backtrace = Backtrace::capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return header;
    }

    let frames = strip_own_frames(&backtrace.to_string());
    if frames.is_empty() {
        header
    } else {
        format!("{}\n{}", header, frames)
    }
}

fn strip_own_frames(rendered: &str) -> String {
    let mut kept = Vec::new();
    let mut skipping = false;

    for line in rendered.lines() {
        if let Some(symbol) = frame_symbol(line) {
            skipping = OWN_FRAME_PREFIXES
                .iter()
                .any(|prefix| symbol.starts_with(prefix));
        }
        if !skipping {
            kept.push(line);
        }
    }

    kept.join("\n")
}

/// Returns the symbol of a frame header line such as `  3: foo::bar`.
fn frame_symbol(line: &str) -> Option<&str> {
    let (index, symbol) = line.trim_start().split_once(": ")?;
    if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
        Some(symbol.trim())
    } else {
        None
    }
}
