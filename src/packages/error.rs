use std::fmt::Display;

use thiserror::Error;

use crate::command::{CommandError, CommandSpec, ExecutionOutcome};

/// dpkg prints this hint when its database was left half configured, typically after an
/// interrupted run, and refuses to continue until it is repaired.
pub(crate) const REPAIR_SIGNATURE: &str = "dpkg --configure -a";

#[derive(Error, Debug)]
pub enum PackageManagerError {
    #[error("could not run `{command}`: {source}")]
    Command {
        command: String,
        #[source]
        source: CommandError,
    },

    #[error("{0}")]
    Execution(ExecutionFailure),

    #[error("repairing the package database failed: {0}")]
    Repair(Box<PackageManagerError>),

    #[error("refreshing package metadata failed: {0}")]
    MetadataRefresh(Box<PackageManagerError>),

    #[error("no packages were provided")]
    NoPackages,

    #[error("invalid package file `{path}`: {reason}")]
    InvalidPackageFile { path: String, reason: String },
}

impl PackageManagerError {
    pub(crate) fn command(spec: &CommandSpec, source: CommandError) -> Self {
        Self::Command {
            command: spec.to_string(),
            source,
        }
    }
}

/// A command that ran to completion but reported a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFailure {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl ExecutionFailure {
    pub(crate) fn new(spec: &CommandSpec, outcome: &ExecutionOutcome) -> Self {
        Self {
            command: spec.to_string(),
            exit_code: outcome.exit_code,
            stderr: String::from_utf8_lossy(&outcome.stderr).trim().to_string(),
        }
    }

    /// Whether the failure was caused by an interrupted dpkg run that `dpkg --configure -a`
    /// can fix.
    pub fn needs_repair(&self) -> bool {
        self.stderr.contains(REPAIR_SIGNATURE)
    }
}

impl Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "`{}` exited with code {code}", self.command)?,
            None => write!(f, "`{}` was terminated by a signal", self.command)?,
        }
        if !self.stderr.is_empty() {
            write!(f, ": {}", self.stderr)?;
        }
        Ok(())
    }
}
