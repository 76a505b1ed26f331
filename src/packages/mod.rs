//! Package management on Debian based hosts through the apt and dpkg tools.
pub mod apt;
pub mod apt_simulation;
pub mod arch;
pub mod commands;
pub mod deb_info;
pub mod dpkg_query;
pub mod error;
pub mod record;

use std::path::Path;

use crate::context::Context;

pub use apt::AptPackageManager;
pub use arch::Architecture;
pub use commands::{AptCommands, UpgradeType};
pub use error::{ExecutionFailure, PackageManagerError};
pub use record::PackageRecord;

/// An interface for a system package manager.
///
/// Every operation blocks until the underlying tools finish or `ctx` is cancelled.
pub trait PackageManager {
    /// Installs the named packages, or upgrades them if they are already installed.
    fn install(&self, names: &[String], ctx: &Context) -> Result<(), PackageManagerError>;

    /// Removes the named packages.
    fn remove(&self, names: &[String], ctx: &Context) -> Result<(), PackageManagerError>;

    /// Lists every package currently installed, in the order the package database reports them.
    fn list_installed(&self, ctx: &Context) -> Result<Vec<PackageRecord>, PackageManagerError>;

    /// Lists the packages an upgrade would touch, after refreshing the package metadata.
    ///
    /// Packages that are not installed yet are only reported with `include_newly_configured`.
    fn list_updates(
        &self,
        include_newly_configured: bool,
        ctx: &Context,
    ) -> Result<Vec<PackageRecord>, PackageManagerError>;

    /// Installs a package from a local package file.
    fn install_deb_file(&self, path: &Path, ctx: &Context) -> Result<(), PackageManagerError>;

    /// Reads name, architecture and version out of a local package file.
    fn deb_file_info(&self, path: &Path, ctx: &Context) -> Result<PackageRecord, PackageManagerError>;
}
