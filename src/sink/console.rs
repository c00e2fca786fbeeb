//! Console log sink backed by `tracing`.

use async_trait::async_trait;

use super::{LogEntry, LogSink, SinkResult};

/// Target used for console error events, so they can be filtered separately.
pub const CONSOLE_TARGET: &str = "errorgate::console";

/// Emits each entry as a single `ERROR` event on stderr through the global
/// tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleLogSink;

impl ConsoleLogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LogSink for ConsoleLogSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn write_log(&self, entry: &LogEntry) -> SinkResult<()> {
        tracing::error!(
            target: CONSOLE_TARGET,
            http_status = entry.http_status,
            description = %entry.description,
            stack = %entry.stack,
            id = %entry.identity(),
            "{}",
            entry.message
        );
        Ok(())
    }
}
