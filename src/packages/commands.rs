use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use super::{dpkg_query::QUERY_FORMAT, error::REPAIR_SIGNATURE};
use crate::command::CommandSpec;

pub const APT_GET: &str = "/usr/bin/apt-get";
pub const DPKG: &str = "/usr/bin/dpkg";
pub const DPKG_QUERY: &str = "/usr/bin/dpkg-query";
pub const DPKG_DEB: &str = "/usr/bin/dpkg-deb";

const NONINTERACTIVE_ENV: (&str, &str) = ("DEBIAN_FRONTEND", "noninteractive");

/// Flavour of upgrade apt-get simulates when looking for pending updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpgradeType {
    #[default]
    Upgrade,
    DistUpgrade,
    FullUpgrade,
}

impl UpgradeType {
    fn as_arg(&self) -> &'static str {
        match self {
            UpgradeType::Upgrade => "upgrade",
            UpgradeType::DistUpgrade => "dist-upgrade",
            UpgradeType::FullUpgrade => "full-upgrade",
        }
    }
}

/// The command lines of the apt/dpkg tools, exactly as their CLIs expect them.
#[derive(Debug, Clone, PartialEq)]
pub struct AptCommands {
    pub apt_get: PathBuf,
    pub dpkg: PathBuf,
    pub dpkg_query: PathBuf,
    pub dpkg_deb: PathBuf,
    pub upgrade_type: UpgradeType,
    /// Extra environment for the commands that modify the system.
    pub env: BTreeMap<String, String>,
}

impl Default for AptCommands {
    fn default() -> Self {
        Self {
            apt_get: PathBuf::from(APT_GET),
            dpkg: PathBuf::from(DPKG),
            dpkg_query: PathBuf::from(DPKG_QUERY),
            dpkg_deb: PathBuf::from(DPKG_DEB),
            upgrade_type: UpgradeType::default(),
            env: BTreeMap::new(),
        }
    }
}

impl AptCommands {
    pub fn install(&self, names: &[String]) -> CommandSpec {
        self.modifying(CommandSpec::new(&self.apt_get).with_args(["install", "-y"]))
            .with_args(names.iter().cloned())
    }

    pub fn remove(&self, names: &[String]) -> CommandSpec {
        self.modifying(CommandSpec::new(&self.apt_get).with_args(["remove", "-y"]))
            .with_args(names.iter().cloned())
    }

    pub fn install_deb(&self, path: &Path) -> CommandSpec {
        self.modifying(CommandSpec::new(&self.dpkg).with_args(["-i"]))
            .with_args([path.to_string_lossy()])
    }

    pub fn repair(&self) -> CommandSpec {
        CommandSpec::new(&self.dpkg).with_args(REPAIR_SIGNATURE.split_whitespace().skip(1))
    }

    pub fn list_installed(&self) -> CommandSpec {
        CommandSpec::new(&self.dpkg_query).with_args(["-W", "-f", QUERY_FORMAT])
    }

    pub fn refresh(&self) -> CommandSpec {
        CommandSpec::new(&self.apt_get).with_args(["update"])
    }

    pub fn simulate_upgrade(&self) -> CommandSpec {
        CommandSpec::new(&self.apt_get).with_args(["--just-print", "-qq", self.upgrade_type.as_arg()])
    }

    pub fn deb_info(&self, path: &Path) -> CommandSpec {
        CommandSpec::new(&self.dpkg_deb)
            .with_args(["-I"])
            .with_args([path.to_string_lossy()])
    }

    // the noninteractive frontend is applied last so the configured env cannot turn prompts back on
    fn modifying(&self, spec: CommandSpec) -> CommandSpec {
        spec.with_env(self.env.clone()).with_env([NONINTERACTIVE_ENV])
    }
}
