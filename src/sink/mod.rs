//! Log sinks for classified errors.
//!
//! The policy engine writes one [`LogEntry`] per enabled channel. Sinks are
//! async and fallible; their failures are reported to a [`DiagnosticSink`]
//! and never reach the request path.

pub mod console;
pub mod diagnostics;
pub mod file;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;
use std::io;
use thiserror::Error;

use crate::error::ErrorRecord;

pub use console::ConsoleLogSink;
pub use diagnostics::{Diagnostic, DiagnosticSink, TracingDiagnostics};
pub use file::FileLogSink;

/// Errors raised by log sinks.
#[derive(Error, Debug)]
pub enum SinkError {
    /// IO error while writing the entry.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The sink cannot accept entries right now.
    #[error("log sink unavailable: {0}")]
    Unavailable(String),
}

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// The channels a [`crate::policy::LogOptions`] can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogChannel {
    File,
    Console,
}

impl fmt::Display for LogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogChannel::File => write!(f, "file"),
            LogChannel::Console => write!(f, "console"),
        }
    }
}

/// A structured log record built from an [`ErrorRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub message: String,
    pub http_status: u16,
    pub stack: String,
}

impl LogEntry {
    pub fn from_record(record: &ErrorRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            description: record.description().to_string(),
            message: record.message().to_string(),
            http_status: record.http_status(),
            stack: record.original_stack().to_string(),
        }
    }

    /// `"<RFC 3339 timestamp> - <description>"`, used to address the entry.
    pub fn identity(&self) -> String {
        format!(
            "{} - {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.description
        )
    }

    /// The plain-text block written to log files.
    pub fn render(&self) -> String {
        format!(
            "----------- ERROR LOG START -----------\n\
             ERROR_MESSAGE: \"{}\"\n\
             HTTP_CODE: \"{}\"\n\
             DESCRIPTION: \"{}\"\n\
             STACK: {}\n\
             ----------- ERROR LOG END -----------\n",
            self.message, self.http_status, self.description, self.stack
        )
    }
}

/// A destination for log entries.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Writes one entry.
    async fn write_log(&self, entry: &LogEntry) -> SinkResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseKind, ErrorRecord};
    use chrono::TimeZone;

    fn sample_entry() -> LogEntry {
        let record = ErrorRecord::database_error(DatabaseKind::Duplicate, "dup")
            .stack("DatabaseError: dup")
            .build();
        let timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
        LogEntry::from_record(&record, timestamp)
    }

    #[test]
    fn test_entry_from_record() {
        let entry = sample_entry();
        assert_eq!(entry.description, "DATABASE_ERROR");
        assert_eq!(entry.message, "dup");
        assert_eq!(entry.http_status, 400);
        assert_eq!(entry.stack, "DatabaseError: dup");
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let json = serde_json::to_value(sample_entry()).unwrap();
        assert_eq!(json["httpStatus"], 400);
        assert_eq!(json["description"], "DATABASE_ERROR");
        assert!(json["timestamp"]
            .as_str()
            .unwrap()
            .starts_with("2024-03-01T12:30:45"));
    }

    #[test]
    fn test_entry_identity() {
        assert_eq!(
            sample_entry().identity(),
            "2024-03-01T12:30:45.000Z - DATABASE_ERROR"
        );
    }

    #[test]
    fn test_entry_render() {
        let rendered = sample_entry().render();
        assert!(rendered.starts_with("----------- ERROR LOG START -----------\n"));
        assert!(rendered.contains("ERROR_MESSAGE: \"dup\"\n"));
        assert!(rendered.contains("HTTP_CODE: \"400\"\n"));
        assert!(rendered.contains("DESCRIPTION: \"DATABASE_ERROR\"\n"));
        assert!(rendered.contains("STACK: DatabaseError: dup\n"));
        assert!(rendered.ends_with("----------- ERROR LOG END -----------\n"));
    }

    #[test]
    fn test_log_channel_display() {
        assert_eq!(LogChannel::File.to_string(), "file");
        assert_eq!(LogChannel::Console.to_string(), "console");
    }

    #[test]
    fn test_sink_error_display() {
        let err = SinkError::Unavailable("closed".to_string());
        assert_eq!(err.to_string(), "log sink unavailable: closed");
        let err = SinkError::from(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(err.to_string(), "IO error: denied");
    }
}
