//! Tracing/logging initialization.
//!
//! Unit-of-work lifecycle events are emitted as structured `tracing` events
//! (`correlation_id`, `context` fields), so JSON output is the default.

use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    /// Parse `STOCKER_LOG_FORMAT` values; unknown values fall back to JSON.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LogConfig {
    /// Read `STOCKER_LOG_FORMAT` and `STOCKER_LOG_LEVEL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(format) = std::env::var("STOCKER_LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }
        if let Ok(level) = std::env::var("STOCKER_LOG_LEVEL") {
            if !level.trim().is_empty() {
                config.default_filter = level.trim().to_string();
            }
        }
        config
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
