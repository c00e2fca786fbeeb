//! Diagnostic side channel.
//!
//! Receives what must not be lost but must not disturb the request path:
//! failed log writes and fatal (non-operational) errors.

use super::LogChannel;

/// Something an operator should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A log sink returned an error.
    LogWriteFailed { channel: LogChannel, error: String },
    /// A log sink panicked while writing.
    LogWritePanicked { channel: LogChannel, message: String },
    /// A non-operational error was handled; shutdown follows.
    FatalError {
        description: String,
        message: String,
        http_status: u16,
        stack: String,
    },
}

/// Receives diagnostics. Must not block and must not fail.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Default diagnostic sink: emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::LogWriteFailed { channel, error } => {
                tracing::warn!(%channel, %error, "failed to write error log");
            }
            Diagnostic::LogWritePanicked { channel, message } => {
                tracing::warn!(%channel, panic = %message, "error log sink panicked");
            }
            Diagnostic::FatalError {
                description,
                message,
                http_status,
                stack,
            } => {
                tracing::error!(
                    %description,
                    http_status,
                    %stack,
                    "non-operational error: {}",
                    message
                );
            }
        }
    }
}
