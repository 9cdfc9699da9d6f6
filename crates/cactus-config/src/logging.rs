//! Logging initialization.
//!
//! Thin wrapper over the `observability` crate so binaries only pass a level.

use observability::LogConfig;

/// Initialize logging for the default `cactus` service.
pub fn init_logging(level: &str) {
    init_logging_for_service("cactus", level);
}

/// Initialize logging under a custom service name.
///
/// `CACTUS_LOG_STDERR=1` mirrors events to stderr.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    let also_stderr = std::env::var("CACTUS_LOG_STDERR")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false);

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).as_str().to_ascii_lowercase(),
        also_stderr,
        ..Default::default()
    });
}

/// Parse a log level string into a tracing Level, defaulting to INFO.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
