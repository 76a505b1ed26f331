use clap::ValueEnum;
use serde::Serialize;

use super::error::CliError;
use crate::packages::PackageRecord;

/// Format of the results written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

/// Result of an operation that produces data.
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    Records(Vec<PackageRecord>),
    Record(PackageRecord),
}

impl OutputFormat {
    pub fn render(&self, report: &Report) -> Result<String, CliError> {
        match self {
            OutputFormat::Yaml => serde_yaml::to_string(report).map_err(|err| err.to_string()),
            OutputFormat::Json => serde_json::to_string_pretty(report).map_err(|err| err.to_string()),
        }
        .map_err(|reason| CliError::Render {
            format: self.name(),
            reason,
        })
    }

    fn name(&self) -> &'static str {
        match self {
            OutputFormat::Yaml => "yaml",
            OutputFormat::Json => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Report {
        Report::Records(vec![
            PackageRecord::new("foo", "amd64", "1.2.3-4"),
            PackageRecord::new("bar", "noarch", "2.0"),
        ])
    }

    #[test]
    fn render_yaml() {
        assert_eq!(
            OutputFormat::Yaml.render(&records()).unwrap(),
            "- name: foo\n  architecture: x86_64\n  version: 1.2.3-4\n- name: bar\n  architecture: all\n  version: '2.0'\n"
        );
    }

    #[test]
    fn render_json() {
        let rendered = OutputFormat::Json
            .render(&Report::Record(PackageRecord::new("foo", "i686", "1.0")))
            .unwrap();

        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&rendered).unwrap(),
            serde_json::json!({"name": "foo", "architecture": "x86_32", "version": "1.0"})
        );
    }

    #[test]
    fn render_empty_list() {
        assert_eq!(OutputFormat::Json.render(&Report::Records(vec![])).unwrap(), "[]");
    }
}
