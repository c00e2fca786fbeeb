//! The policy engine: one decision per handled error.
//!
//! [`ErrorHandler::handle`] renders the response for the runtime environment,
//! then applies the side-effect policy: operational errors are logged to the
//! enabled channels in detached tasks, non-operational errors are reported to
//! the diagnostic sink and trigger a process shutdown.

pub mod response;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::error::{classify, ErrorRecord, RawError};
use crate::lifecycle::{catch_handled, ShutdownReason, ShutdownRequester};
use crate::sink::{
    ConsoleLogSink, Diagnostic, DiagnosticSink, FileLogSink, LogChannel, LogEntry, LogSink,
    TracingDiagnostics,
};

pub use response::{
    status_label, DevelopmentPayload, ProductionPayload, ResponsePayload, ResponseSink,
};

/// Process-wide runtime mode. Decides how much of an error reaches the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Full error object and stack in responses.
    Development,
    /// Status and message only.
    #[default]
    Production,
}

impl fmt::Display for RuntimeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeEnvironment::Development => write!(f, "development"),
            RuntimeEnvironment::Production => write!(f, "production"),
        }
    }
}

/// Returned when a string names no known environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown environment '{0}', expected 'development' or 'production'")]
pub struct ParseEnvironmentError(String);

impl FromStr for RuntimeEnvironment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(RuntimeEnvironment::Development),
            "production" | "prod" => Ok(RuntimeEnvironment::Production),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Which log channels receive operational errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOptions {
    #[serde(default = "default_true")]
    pub log_to_file: bool,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_to_file: true,
            log_to_console: true,
        }
    }
}

impl LogOptions {
    pub fn new(log_to_file: bool, log_to_console: bool) -> Self {
        Self {
            log_to_file,
            log_to_console,
        }
    }

    /// Both channels disabled.
    pub fn none() -> Self {
        Self::new(false, false)
    }

    /// Enabled channels, file first.
    pub fn enabled_channels(&self) -> Vec<LogChannel> {
        let mut channels = Vec::with_capacity(2);
        if self.log_to_file {
            channels.push(LogChannel::File);
        }
        if self.log_to_console {
            channels.push(LogChannel::Console);
        }
        channels
    }
}

/// What [`ErrorHandler::handle`] set in motion.
#[derive(Debug)]
pub struct HandleOutcome {
    log_tasks: Vec<(LogChannel, JoinHandle<()>)>,
    shutdown_requested: bool,
}

impl HandleOutcome {
    /// Channels a log write was dispatched to.
    pub fn log_channels(&self) -> Vec<LogChannel> {
        self.log_tasks.iter().map(|(channel, _)| *channel).collect()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Waits for every dispatched log write to finish. Dropping the outcome
    /// instead leaves the writes running detached.
    pub async fn settle(self) {
        futures::future::join_all(self.log_tasks.into_iter().map(|(_, task)| task)).await;
    }
}

/// The single chokepoint for handled errors.
///
/// Holds its configuration and collaborators; no per-call mutable state, so
/// one instance can serve concurrent requests.
#[derive(Clone)]
pub struct ErrorHandler {
    environment: RuntimeEnvironment,
    options: LogOptions,
    file_sink: Arc<dyn LogSink>,
    console_sink: Arc<dyn LogSink>,
    diagnostics: Arc<dyn DiagnosticSink>,
    lifecycle: Arc<dyn ShutdownRequester>,
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("environment", &self.environment)
            .field("options", &self.options)
            .field("file_sink", &self.file_sink.name())
            .field("console_sink", &self.console_sink.name())
            .finish_non_exhaustive()
    }
}

impl ErrorHandler {
    /// Creates a handler with the default sinks: files under `errorLogs`,
    /// tracing for console and diagnostics.
    pub fn new(
        environment: RuntimeEnvironment,
        options: LogOptions,
        lifecycle: Arc<dyn ShutdownRequester>,
    ) -> Self {
        Self {
            environment,
            options,
            file_sink: Arc::new(FileLogSink::default()),
            console_sink: Arc::new(ConsoleLogSink::new()),
            diagnostics: Arc::new(TracingDiagnostics),
            lifecycle,
        }
    }

    /// Creates a handler from the loaded application configuration.
    pub fn from_config(config: &AppConfig, lifecycle: Arc<dyn ShutdownRequester>) -> Self {
        Self::new(config.environment, config.log, lifecycle)
            .with_file_sink(Arc::new(FileLogSink::new(config.log_dir.clone())))
    }

    pub fn with_file_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.file_sink = sink;
        self
    }

    pub fn with_console_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.console_sink = sink;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn environment(&self) -> RuntimeEnvironment {
        self.environment
    }

    pub fn options(&self) -> LogOptions {
        self.options
    }

    /// Handles one classified error.
    ///
    /// The response is sent first, exactly once. Afterwards:
    /// - operational: one detached write per enabled log channel; failures go
    ///   to the diagnostic sink;
    /// - non-operational: a diagnostic report, then one shutdown request.
    ///
    /// Must be called within a tokio runtime.
    pub async fn handle(
        &self,
        record: ErrorRecord,
        responder: &mut (dyn ResponseSink + '_),
    ) -> HandleOutcome {
        let payload = ResponsePayload::render(&record, self.environment);
        responder.send_response(record.http_status(), payload).await;

        if record.is_operational() {
            let entry = Arc::new(LogEntry::from_record(&record, Utc::now()));
            let log_tasks = self
                .options
                .enabled_channels()
                .into_iter()
                .map(|channel| (channel, self.dispatch_log(channel, Arc::clone(&entry))))
                .collect();
            return HandleOutcome {
                log_tasks,
                shutdown_requested: false,
            };
        }

        self.diagnostics.report(Diagnostic::FatalError {
            description: record.description().to_string(),
            message: record.message().to_string(),
            http_status: record.http_status(),
            stack: record.original_stack().to_string(),
        });
        self.lifecycle.request_shutdown(ShutdownReason::FatalError {
            description: record.description().to_string(),
            message: record.message().to_string(),
        });

        HandleOutcome {
            log_tasks: Vec::new(),
            shutdown_requested: true,
        }
    }

    /// Classifies `raw`, then handles the resulting record.
    pub async fn handle_raw(
        &self,
        raw: impl Into<Arc<RawError>>,
        responder: &mut (dyn ResponseSink + '_),
    ) -> HandleOutcome {
        self.handle(classify(raw), responder).await
    }

    fn dispatch_log(&self, channel: LogChannel, entry: Arc<LogEntry>) -> JoinHandle<()> {
        let sink = match channel {
            LogChannel::File => Arc::clone(&self.file_sink),
            LogChannel::Console => Arc::clone(&self.console_sink),
        };
        let diagnostics = Arc::clone(&self.diagnostics);

        tokio::spawn(async move {
            let write = catch_handled(sink.write_log(&entry));
            match write.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => diagnostics.report(Diagnostic::LogWriteFailed {
                    channel,
                    error: error.to_string(),
                }),
                Err(panic) => diagnostics.report(Diagnostic::LogWritePanicked {
                    channel,
                    message: RawError::from_panic(&*panic).message,
                }),
            }
        })
    }
}
