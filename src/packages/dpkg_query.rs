//! Parser for the installed packages listing produced by `dpkg-query`.
//!
//! The query format makes dpkg print one package per line as `name architecture version`.

use super::record::PackageRecord;

/// The `-f` format argument matching [`parse_installed`].
pub const QUERY_FORMAT: &str = "${Package} ${Architecture} ${Version}\n";

/// A line split into the three fields of [`QUERY_FORMAT`], before normalization.
#[derive(Debug, PartialEq)]
struct InstalledLine<'a> {
    name: &'a str,
    arch: &'a str,
    version: &'a str,
}

impl<'a> InstalledLine<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(name), Some(arch), Some(version), None) => Some(Self {
                name,
                arch,
                version,
            }),
            _ => None,
        }
    }

    fn into_record(self) -> PackageRecord {
        PackageRecord::new(self.name, self.arch, self.version)
    }
}

/// Returns one record per well formed line, in input order. Lines that do not have exactly
/// three fields are skipped so that garbled output does not discard the whole listing.
pub fn parse_installed(data: &[u8]) -> Vec<PackageRecord> {
    String::from_utf8_lossy(data)
        .lines()
        .filter_map(InstalledLine::parse)
        .map(InstalledLine::into_record)
        .collect()
}
