//! Tracing subscriber setup.
//!
//! All output goes to stderr so that the `classify` subcommand can keep stdout
//! for its JSON report. `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::{fmt, EnvFilter};

/// Log level for the process-wide subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl From<u8> for LogLevel {
    /// 0 = Info, 1 = Debug, 2+ = Trace
    fn from(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub with_timestamps: bool,
    pub with_target: bool,
    /// Emit `tower_http` request spans at debug level as well.
    pub with_http_trace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamps: true,
            with_target: true,
            with_http_trace: false,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_http_trace(mut self, enabled: bool) -> Self {
        self.with_http_trace = enabled;
        self
    }

    /// Verbosity 1 and above also turns on HTTP request tracing.
    pub fn from_verbosity(verbosity: u8) -> Self {
        Self::default()
            .with_level(LogLevel::from(verbosity))
            .with_http_trace(verbosity > 0)
    }

    /// The filter directives this configuration produces without `RUST_LOG`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.directive().to_string();
        if self.with_http_trace && self.level != LogLevel::Off {
            directives.push_str(",tower_http=debug");
        }
        directives
    }
}

/// Installs the global subscriber. Returns false if one was already set.
pub fn init_logging(config: LoggingConfig) -> bool {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.directives())
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(config.with_target);

    let installed = if config.with_timestamps {
        subscriber.try_init()
    } else {
        subscriber.without_time().try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_verbosity() {
        assert_eq!(LogLevel::from(0), LogLevel::Info);
        assert_eq!(LogLevel::from(1), LogLevel::Debug);
        assert_eq!(LogLevel::from(2), LogLevel::Trace);
        assert_eq!(LogLevel::from(9), LogLevel::Trace);
    }

    #[test]
    fn test_directives() {
        assert_eq!(LoggingConfig::default().directives(), "info");
        assert_eq!(
            LoggingConfig::from_verbosity(1).directives(),
            "debug,tower_http=debug"
        );
        assert_eq!(
            LoggingConfig::new()
                .with_level(LogLevel::Off)
                .with_http_trace(true)
                .directives(),
            "off"
        );
    }

    #[test]
    fn test_builder() {
        let config = LoggingConfig::new()
            .with_level(LogLevel::Warn)
            .with_timestamps(false)
            .with_target(false);
        assert_eq!(config.level, LogLevel::Warn);
        assert!(!config.with_timestamps);
        assert!(!config.with_target);
        assert!(!config.with_http_trace);
    }
}
