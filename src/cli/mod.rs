pub mod error;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::{
    config::{AdapterConfig, ConfigLoader, ConfigLoaderFile},
    context::Context,
    packages::{PackageManager, PackageManagerError},
};
use error::CliError;
use output::{OutputFormat, Report};

/// Manage Debian packages through apt-get and dpkg
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
pub struct Cli {
    #[command(subcommand)]
    pub operation: Operation,

    /// Adapter configuration file. Built-in defaults are used when absent.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Format of the results written to stdout
    #[arg(short, long, global = true, value_enum, default_value_t)]
    output: OutputFormat,

    #[arg(long, global = true)]
    print_debug_info: bool,
}

#[derive(Debug, Subcommand, PartialEq)]
pub enum Operation {
    /// Install or upgrade packages
    Install {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Remove packages
    Remove {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Install a local .deb file
    InstallDeb { path: PathBuf },
    /// Print name, architecture and version of a local .deb file
    DebInfo { path: PathBuf },
    /// List installed packages
    ListInstalled,
    /// List packages with pending updates
    ListUpdates {
        /// Also list packages the upgrade would newly install
        #[arg(long)]
        show_new: bool,
    },
}

impl Cli {
    /// Loads the configuration file, or the defaults when none was given.
    pub fn load_config(&self) -> Result<AdapterConfig, CliError> {
        let Some(path) = &self.config else {
            return Ok(AdapterConfig::default());
        };
        Ok(ConfigLoaderFile::new(path).load_config()?)
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    pub fn print_debug_info(&self) -> bool {
        self.print_debug_info
    }
}

impl Operation {
    /// Runs the operation against `manager`. Operations that only change the system produce no
    /// report.
    pub fn execute<P: PackageManager>(
        &self,
        manager: &P,
        ctx: &Context,
    ) -> Result<Option<Report>, PackageManagerError> {
        match self {
            Operation::Install { names } => {
                manager.install(names, ctx)?;
                info!(packages = ?names, "packages installed");
                Ok(None)
            }
            Operation::Remove { names } => {
                manager.remove(names, ctx)?;
                info!(packages = ?names, "packages removed");
                Ok(None)
            }
            Operation::InstallDeb { path } => {
                manager.install_deb_file(path, ctx)?;
                info!(path = %path.display(), "package file installed");
                Ok(None)
            }
            Operation::DebInfo { path } => manager.deb_file_info(path, ctx).map(Report::Record).map(Some),
            Operation::ListInstalled => manager.list_installed(ctx).map(Report::Records).map(Some),
            Operation::ListUpdates { show_new } => {
                let updates = manager.list_updates(*show_new, ctx)?;
                info!(count = updates.len(), "pending updates found");
                Ok(Some(Report::Records(updates)))
            }
        }
    }
}
