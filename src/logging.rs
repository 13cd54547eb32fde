//! Structured logging with tracing.
//!
//! The crate only emits `tracing` events. Applications that do not install a
//! subscriber of their own can call [`init`] (or [`init_from_config`]) once
//! at startup.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::AppConfig;
use crate::error::{DiError, DiResult};

/// Environment variable holding an `EnvFilter` directive, e.g.
/// `ferrous_nest=debug,info`. Takes precedence over the configured level.
pub const LOG_ENV: &str = "FERROUS_NEST_LOG";

/// Installs a formatted stdout subscriber filtered at `level`.
///
/// Fails when `level` is not a known level or a global subscriber is
/// already set.
pub fn init(level: &str) -> DiResult<()> {
    let level = parse_log_level(level)?;
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let stdout = fmt::layer()
        .with_target(true)
        .with_thread_names(true);
    Registry::default()
        .with(filter)
        .with(stdout)
        .try_init()
        .map_err(|err| DiError::Config(format!("logging already initialized: {}", err)))?;

    tracing::debug!("Logging initialized with level: {}", level);
    Ok(())
}

/// [`init`] with the configured `log_level`.
pub fn init_from_config(config: &AppConfig) -> DiResult<()> {
    init(&config.log_level)
}

/// Parses a level name, case-insensitively.
pub fn parse_log_level(level: &str) -> DiResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(DiError::Config(format!(
            "Invalid log level: {}. Use trace, debug, info, warn, or error",
            level
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_log_level("WARNING").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("Debug").unwrap(), Level::DEBUG);
        assert!(matches!(parse_log_level("loud"), Err(DiError::Config(_))));
    }
}
