use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use duration_str::deserialize_duration;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    command::command_os::DEFAULT_SHUTDOWN_TIMEOUT,
    logging::LoggingConfig,
    packages::commands::{AptCommands, UpgradeType},
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error loading config `{path}`: `{source}`")]
    IOError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing config `{path}`: `{source}`")]
    SerdeYamlError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Settings of the apt adapter. Every field is optional.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    pub apt_get: PathBuf,
    pub dpkg: PathBuf,
    pub dpkg_query: PathBuf,
    pub dpkg_deb: PathBuf,
    pub upgrade_type: UpgradeType,
    /// Upper bound for a single command; unbounded when absent.
    pub command_timeout: Option<CommandTimeout>,
    pub shutdown_timeout: ShutdownTimeout,
    /// Extra environment for the commands that modify the system.
    pub env: BTreeMap<String, String>,
    pub log: LoggingConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        let AptCommands {
            apt_get,
            dpkg,
            dpkg_query,
            dpkg_deb,
            upgrade_type,
            env,
        } = AptCommands::default();
        Self {
            apt_get,
            dpkg,
            dpkg_query,
            dpkg_deb,
            upgrade_type,
            command_timeout: None,
            shutdown_timeout: ShutdownTimeout::default(),
            env,
            log: LoggingConfig::default(),
        }
    }
}

impl AdapterConfig {
    pub fn commands(&self) -> AptCommands {
        AptCommands {
            apt_get: self.apt_get.clone(),
            dpkg: self.dpkg.clone(),
            dpkg_query: self.dpkg_query.clone(),
            dpkg_deb: self.dpkg_deb.clone(),
            upgrade_type: self.upgrade_type,
            env: self.env.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Copy, PartialEq)]
pub struct CommandTimeout(#[serde(deserialize_with = "deserialize_duration")] Duration);

impl From<CommandTimeout> for Duration {
    fn from(value: CommandTimeout) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Deserialize, Copy, PartialEq)]
pub struct ShutdownTimeout(#[serde(deserialize_with = "deserialize_duration")] Duration);

impl From<ShutdownTimeout> for Duration {
    fn from(value: ShutdownTimeout) -> Self {
        value.0
    }
}

impl Default for ShutdownTimeout {
    fn default() -> Self {
        Self(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

pub trait ConfigLoader {
    fn load_config(&self) -> Result<AdapterConfig, ConfigError>;
}

pub struct ConfigLoaderFile {
    file_path: PathBuf,
}

impl ConfigLoaderFile {
    pub fn new(file_path: &Path) -> Self {
        Self {
            file_path: file_path.to_path_buf(),
        }
    }
}

impl ConfigLoader for ConfigLoaderFile {
    fn load_config(&self) -> Result<AdapterConfig, ConfigError> {
        let f = std::fs::File::open(&self.file_path).map_err(|source| ConfigError::IOError {
            path: self.file_path.clone(),
            source,
        })?;
        serde_yaml::from_reader(f).map_err(|source| ConfigError::SerdeYamlError {
            path: self.file_path.clone(),
            source,
        })
    }
}
