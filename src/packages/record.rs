use serde::Serialize;

use super::arch::Architecture;

/// One installed or updatable package as reported by the package tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRecord {
    pub name: String,
    pub architecture: Architecture,
    pub version: String,
}

impl PackageRecord {
    /// Builds a record from tool-native tokens, normalizing the architecture.
    pub fn new(name: &str, arch: &str, version: &str) -> Self {
        Self::with_architecture(name, Architecture::normalize(arch), version)
    }

    /// Builds a record from an architecture that was already normalized.
    pub fn with_architecture(name: &str, architecture: Architecture, version: &str) -> Self {
        Self {
            name: name.to_string(),
            architecture,
            version: version.to_string(),
        }
    }
}
