use std::process::ExitCode;

use thiserror::Error;

use crate::{config::ConfigError, logging::LoggingError, packages::PackageManagerError};

/// Ways the `apt-adapter` binary can fail, each with its own exit code.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid adapter configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("could not install the termination signal handler: {0}")]
    SignalHandler(#[from] ctrlc::Error),

    #[error("could not initialize logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("package operation failed: {0}")]
    PackageTool(#[from] PackageManagerError),

    #[error("could not render the result as {format}: {reason}")]
    Render { format: &'static str, reason: String },
}

impl From<CliError> for ExitCode {
    /// Setup problems map to `EX_UNAVAILABLE` (69) and logging to `EX_SOFTWARE` (70) from
    /// sysexits(3); a failed package operation exits with 1.
    fn from(value: CliError) -> Self {
        match value {
            CliError::Config(_) | CliError::SignalHandler(_) => Self::from(69),
            CliError::Logging(_) => Self::from(70),
            CliError::PackageTool(_) | CliError::Render { .. } => Self::from(1),
        }
    }
}
