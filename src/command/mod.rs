pub mod command_os;
pub mod error;

use std::{collections::BTreeMap, fmt::Display, path::PathBuf};

use crate::context::Context;

pub use command_os::OsCommandExecutor;
pub use error::CommandError;

/// Runs a [`CommandSpec`] to completion and captures everything the process wrote.
///
/// Implementations must return the captured streams even if the process fails, as callers
/// classify failures by their standard error. Retrying is never the executor's concern.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor {
    fn run(&self, spec: &CommandSpec, ctx: &Context) -> Result<ExecutionOutcome, CommandError>;
}

/// A single external invocation: program, ordered arguments and environment overrides that are
/// merged over the environment of the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(env.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        self.args.iter().try_for_each(|arg| write!(f, " {arg}"))
    }
}

/// What a finished process left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ExecutionOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
