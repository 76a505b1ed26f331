use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::PrettyFields;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const LOG_LEVEL_ENV_VAR: &str = "LOG_LEVEL";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("init logging error: `{0}`")]
    TryInitError(String),
}

/// Defines the logging configuration of the adapter.
#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    level: LogLevel,
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level: LogLevel(level),
        }
    }

    pub fn level(&self) -> Level {
        self.level.0
    }

    /// Attempts to initialize the global logging subscriber. Logs go to stderr so that the
    /// command output on stdout stays machine readable.
    pub fn try_init(&self) -> Result<(), LoggingError> {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
            .with_env_filter(self.logging_filter()?)
            .fmt_fields(PrettyFields::new())
            .try_init()
            .map_err(|_| {
                LoggingError::TryInitError("unable to set global logging subscriber".to_string())
            })?;

        debug!("Logging initialized successfully");
        Ok(())
    }

    fn logging_filter(&self) -> Result<EnvFilter, LoggingError> {
        let level = self.level().to_string().to_lowercase();
        let crate_directive = format!("{}={}", env!("CARGO_CRATE_NAME"), level)
            .parse::<Directive>()
            .map_err(|err| LoggingError::TryInitError(err.to_string()))?;

        Ok(EnvFilter::builder()
            .with_default_directive(crate_directive)
            .with_env_var(LOG_LEVEL_ENV_VAR)
            .from_env_lossy())
    }
}

#[derive(Debug, PartialEq, Clone)]
struct LogLevel(Level);

impl Default for LogLevel {
    fn default() -> Self {
        Self(Level::INFO)
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value_str = String::deserialize(deserializer)?;
        Level::from_str(&value_str)
            .map(LogLevel)
            .map_err(serde::de::Error::custom)
    }
}
