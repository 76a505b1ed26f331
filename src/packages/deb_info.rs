//! Parser for the control information of a `.deb` file as printed by `dpkg-deb -I`.

use super::record::PackageRecord;

const PACKAGE_FIELD: &str = "Package";
const ARCHITECTURE_FIELD: &str = "Architecture";
const VERSION_FIELD: &str = "Version";

/// Control fields needed to build a [`PackageRecord`].
#[derive(Debug, Default, PartialEq)]
struct ControlFields<'a> {
    package: Option<&'a str>,
    architecture: Option<&'a str>,
    version: Option<&'a str>,
}

impl<'a> ControlFields<'a> {
    fn parse(output: &'a str) -> Self {
        output
            .lines()
            .filter_map(|line| line.trim().split_once(':'))
            .fold(Self::default(), |mut fields, (key, value)| {
                let slot = match key.trim() {
                    PACKAGE_FIELD => &mut fields.package,
                    ARCHITECTURE_FIELD => &mut fields.architecture,
                    VERSION_FIELD => &mut fields.version,
                    _ => return fields,
                };
                // the first occurrence wins, description text may repeat the keys
                slot.get_or_insert(value.trim());
                fields
            })
    }
}

/// Builds the record described by the control information, or returns the name of the first
/// missing field.
pub fn parse_deb_info(data: &[u8]) -> Result<PackageRecord, &'static str> {
    let output = String::from_utf8_lossy(data);
    let fields = ControlFields::parse(&output);

    let package = fields
        .package
        .filter(|p| !p.is_empty())
        .ok_or(PACKAGE_FIELD)?;
    let architecture = fields.architecture.ok_or(ARCHITECTURE_FIELD)?;
    let version = fields.version.ok_or(VERSION_FIELD)?;

    Ok(PackageRecord::new(package, architecture, version))
}
