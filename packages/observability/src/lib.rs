//! # Observability
//!
//! Logging bootstrap shared by every Cactus binary.
//!
//! Services call [`init`] or [`init_with_config`] once at startup and then use
//! plain `tracing` macros. Events are written as JSON lines to a central file
//! (`~/.cactus/logs/dev.jsonl` unless overridden), with credentials scrubbed
//! before they reach disk. A compact stderr layer can be enabled for
//! foreground runs.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "cactus-cli".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod file_sink;
mod json_layer;
mod redact;

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file_sink::{FileSink, SinkWriterFactory};
pub use json_layer::{JsonLayer, LogEntry};
pub use redact::{redact_fields, REDACTED};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into every log line.
    pub service_name: String,

    /// Default filter directive, overridden by `RUST_LOG`.
    pub default_level: String,

    /// Custom JSONL file path. Defaults to `~/.cactus/logs/dev.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Mirror events to stderr.
    pub also_stderr: bool,

    /// Replace credential-looking fields with `[REDACTED]`.
    pub redact_secrets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            redact_secrets: true,
        }
    }
}

/// Default central log location.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".cactus").join("logs").join("dev.jsonl"))
}

/// Initialize logging with defaults for the given service.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// If the log file cannot be opened the JSONL layer is skipped and a
/// stderr-only subscriber is installed instead. Calling this twice is
/// harmless: the second global subscriber install is ignored.
pub fn init_with_config(config: LogConfig) {
    let log_path = config.log_path.clone().or_else(default_log_path);
    let sink = log_path.as_ref().map(|path| (path, FileSink::open(path)));

    let env_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let json_layer = match &sink {
        Some((_, Ok(sink))) => Some(
            JsonLayer::new(
                config.service_name.clone(),
                SinkWriterFactory::new(sink.clone()),
                config.redact_secrets,
            )
            .with_filter(env_filter()),
        ),
        _ => None,
    };

    let stderr_layer = if config.also_stderr || json_layer.is_none() {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .compact()
                .with_writer(std::io::stderr)
                .with_filter(env_filter()),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    match sink {
        Some((path, Ok(_))) => {
            tracing::info!(log_path = %path.display(), service = %config.service_name, "observability initialized");
        }
        Some((path, Err(e))) => {
            tracing::warn!(log_path = %path.display(), error = %e, "log file unavailable, logging to stderr only");
        }
        None => {
            tracing::warn!("no home directory, logging to stderr only");
        }
    }
}

pub use tracing::{debug, error, info, instrument, trace, warn};
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
        assert!(config.redact_secrets);
    }

    #[test]
    fn test_default_log_path_under_cactus_dir() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with(".cactus/logs/dev.jsonl"));
        }
    }
}
