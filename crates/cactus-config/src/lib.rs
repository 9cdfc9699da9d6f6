//! Configuration, paths, and logging bootstrap for Cactus.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_APP_ID, DEFAULT_BASE_URL, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
