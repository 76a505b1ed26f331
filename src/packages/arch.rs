//! Canonical architecture vocabulary.
//!
//! Package tools name the same architecture differently (dpkg says `amd64`, rpm says `x86_64`).
//! Every record produced by this crate carries the canonical spelling so that records coming
//! from different commands can be compared with each other.

use std::fmt::Display;

use serde::Serialize;

/// An architecture token that already went through [`Architecture::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Architecture(String);

impl Architecture {
    /// Used when the tool output carries no architecture annotation at all.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn normalize(token: &str) -> Self {
        let canonical = match token {
            "amd64" | "64-bit" => "x86_64",
            "i386" | "i686" | "32-bit" => "x86_32",
            "noarch" => "all",
            other => other,
        };
        Self(canonical.to_string())
    }

    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for Architecture {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
