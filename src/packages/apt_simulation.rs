//! Parser for the output of a simulated upgrade (`apt-get --just-print`).
//!
//! Relevant lines look like:
//!
//! ```text
//! Inst libldap-common [2.4.45+dfsg-1ubuntu1.2] (2.4.45+dfsg-1ubuntu1.3 Ubuntu:18.04/bionic-updates [all])
//! Inst firmware-linux-free (3.4 Debian:9.9/stable [all])
//! Conf firmware-linux-free (3.4 Debian:9.9/stable [all])
//! ```
//!
//! An `Inst` line with a bracketed old version upgrades an installed package, one without it
//! installs a new package. `Conf` lines are configuration steps.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::{arch::Architecture, record::PackageRecord};

static INST_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Inst\s+(?P<name>\S+)\s+(?:\[(?P<old>[^\]\s]+)\]\s+)?\((?P<version>[^\s)]+)(?P<rest>[^)]*)\)")
        .expect("valid Inst regex")
});

static CONF_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Conf\s+(?P<name>\S+)\s+\((?P<version>[^\s)]+)(?P<rest>[^)]*)\)")
        .expect("valid Conf regex")
});

// last bracketed token inside the parenthesized group, e.g. `[amd64]`
static ARCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(?P<arch>[^\]\s]+)\]\s*$").expect("valid arch regex"));

#[derive(Debug, Clone, Copy, PartialEq)]
enum EntryKind {
    Upgrade,
    NewInstall,
    Configure,
}

/// A recognised simulation line, before normalization.
#[derive(Debug, PartialEq)]
struct SimulationEntry<'a> {
    kind: EntryKind,
    name: &'a str,
    version: &'a str,
    arch: Option<&'a str>,
}

impl<'a> SimulationEntry<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if let Some(caps) = INST_LINE.captures(line) {
            let kind = if caps.name("old").is_some() {
                EntryKind::Upgrade
            } else {
                EntryKind::NewInstall
            };
            return Self::from_captures(kind, &caps);
        }
        CONF_LINE
            .captures(line)
            .and_then(|caps| Self::from_captures(EntryKind::Configure, &caps))
    }

    fn from_captures(kind: EntryKind, caps: &regex::Captures<'a>) -> Option<Self> {
        let arch = caps
            .name("rest")
            .and_then(|rest| ARCH.captures(rest.as_str()))
            .and_then(|arch| arch.name("arch"))
            .map(|arch| arch.as_str());

        Some(Self {
            kind,
            name: caps.name("name")?.as_str(),
            version: caps.name("version")?.as_str(),
            arch,
        })
    }

    fn into_record(self) -> PackageRecord {
        let architecture = self
            .arch
            .map(Architecture::normalize)
            .unwrap_or_else(Architecture::unknown);
        PackageRecord::with_architecture(self.name, architecture, self.version)
    }
}

/// Extracts the packages a simulated upgrade would touch.
///
/// Upgrades of installed packages are always reported. With `include_newly_configured`, packages
/// the upgrade would newly install are reported too, followed by packages that only show up in
/// `Conf` lines. A package is never reported twice. Unrecognised lines are skipped.
pub fn parse_updates(data: &[u8], include_newly_configured: bool) -> Vec<PackageRecord> {
    let output = String::from_utf8_lossy(data);
    let entries: Vec<SimulationEntry> = output.lines().filter_map(SimulationEntry::parse).collect();

    let (configured, installed): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .filter(|entry| include_newly_configured || entry.kind == EntryKind::Upgrade)
        .partition(|entry| entry.kind == EntryKind::Configure);

    let mut seen: HashSet<&str> = installed.iter().map(|entry| entry.name).collect();
    let configured_only: Vec<SimulationEntry> = configured
        .into_iter()
        .filter(|entry| seen.insert(entry.name))
        .collect();

    installed
        .into_iter()
        .chain(configured_only)
        .map(SimulationEntry::into_record)
        .collect()
}
