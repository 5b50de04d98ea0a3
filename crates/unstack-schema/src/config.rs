use crate::descriptor::StackDescriptor;
use crate::types::{KeyName, StackName};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported config_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("stack #{index} has an empty name")]
    EmptyStackName { index: usize },
    #[error("stack '{0}' is declared more than once")]
    DuplicateStack(StackName),
    #[error("stack '{stack}' depends on unknown stack '{dependency}'")]
    UnknownDependency {
        stack: StackName,
        dependency: StackName,
    },
    #[error("stack '{0}' depends on itself")]
    SelfDependency(StackName),
    #[error("circular dependency between stacks: {}", format_cycle(.0))]
    Cycle(Vec<StackName>),
    #[error("invalid [teardown] setting: {0}")]
    InvalidTeardown(String),
}

fn format_cycle(names: &[StackName]) -> String {
    names
        .iter()
        .map(StackName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Top-level teardown configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TeardownConfig {
    pub config_version: u32,
    #[serde(default)]
    pub teardown: TeardownSection,
    #[serde(default)]
    pub keys: KeysSection,
    #[serde(default, rename = "stack")]
    pub stacks: Vec<StackSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TeardownSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Sub-second interval; takes precedence over `poll_interval_secs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_delete_requests")]
    pub max_delete_requests: u32,
}

impl Default for TeardownSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            poll_interval_ms: None,
            max_attempts: default_max_attempts(),
            max_delete_requests: default_max_delete_requests(),
        }
    }
}

impl TeardownSection {
    pub fn poll_interval(&self) -> Duration {
        match self.poll_interval_ms {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(self.poll_interval_secs),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    10
}

fn default_max_delete_requests() -> u32 {
    3
}

/// Key material created for the stacks, removed after a successful teardown.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KeysSection {
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
    #[serde(default)]
    pub names: Vec<KeyName>,
}

impl KeysSection {
    pub fn is_empty(&self) -> bool {
        self.local_dir.is_none() && self.names.is_empty()
    }
}

/// One `[[stack]]` entry.
///
/// Only `name` and `depends_on` drive the teardown. The template fields are
/// what the stacks were deployed with and are kept so the same file serves
/// both directions.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StackSection {
    pub name: StackName,
    #[serde(default)]
    pub depends_on: Vec<StackName>,
    #[serde(default)]
    pub template_path: Option<String>,
    #[serde(default)]
    pub params_path: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl TeardownConfig {
    /// Stack descriptors in declaration order, names trimmed.
    pub fn descriptors(&self) -> Vec<StackDescriptor> {
        self.stacks
            .iter()
            .map(|s| StackDescriptor {
                name: StackName::new(s.name.trim()),
                depends_on: s
                    .depends_on
                    .iter()
                    .map(|d| StackName::new(d.trim()))
                    .collect(),
            })
            .collect()
    }

    /// Check version, teardown settings and referential integrity of the stack list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config_version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.config_version));
        }
        if self.teardown.poll_interval().is_zero() {
            return Err(ConfigError::InvalidTeardown(
                "poll interval must be greater than zero".to_owned(),
            ));
        }
        if self.teardown.max_attempts == 0 {
            return Err(ConfigError::InvalidTeardown(
                "max_attempts must be at least 1".to_owned(),
            ));
        }
        if self.teardown.max_delete_requests == 0 {
            return Err(ConfigError::InvalidTeardown(
                "max_delete_requests must be at least 1".to_owned(),
            ));
        }
        crate::validate::validate_descriptors(&self.descriptors())
    }
}

pub fn parse_config_str(input: &str) -> Result<TeardownConfig, ConfigError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_config_file(path: impl AsRef<Path>) -> Result<TeardownConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse and validate a config file in one step.
pub fn load_config(path: impl AsRef<Path>) -> Result<TeardownConfig, ConfigError> {
    let config = parse_config_file(path)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
config_version = 1

[teardown]
poll_interval_secs = 2
max_attempts = 4
max_delete_requests = 2

[keys]
local_dir = "ssh_keys"
names = ["bastion", "worker"]

[[stack]]
name = "network"
template_path = "templates/network.yaml"

[[stack]]
name = "compute"
depends_on = ["network"]
template_path = "templates/compute.yaml"
params_path = "params/compute.json"
capabilities = ["CAPABILITY_IAM"]
"#;

    #[test]
    fn parses_full_config() {
        let config = parse_config_str(FULL).expect("should parse");
        assert_eq!(config.config_version, 1);
        assert_eq!(config.teardown.poll_interval_secs, 2);
        assert_eq!(config.teardown.max_attempts, 4);
        assert_eq!(config.keys.names.len(), 2);
        assert_eq!(config.keys.local_dir.as_deref(), Some(Path::new("ssh_keys")));
        assert_eq!(config.stacks.len(), 2);
        assert_eq!(config.stacks[1].capabilities, vec!["CAPABILITY_IAM"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = parse_config_str("config_version = 1\n").expect("should parse");
        assert_eq!(config.teardown, TeardownSection::default());
        assert_eq!(config.teardown.poll_interval_secs, 5);
        assert!(config.keys.is_empty());
        assert!(config.stacks.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn descriptors_keep_order_and_trim_names() {
        let config = parse_config_str(
            r#"
config_version = 1
[[stack]]
name = " b "
depends_on = [" a"]
[[stack]]
name = "a"
"#,
        )
        .unwrap();
        let descriptors = config.descriptors();
        assert_eq!(descriptors[0], StackDescriptor::new("b", ["a"]));
        assert_eq!(descriptors[1], StackDescriptor::root("a"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"
config_version = 1
[[stack]]
name = "a"
region = "eu-west-1"
"#;
        assert!(parse_config_str(input).is_err());
    }

    #[test]
    fn rejects_unsupported_version() {
        let config = parse_config_str("config_version = 2\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn rejects_zero_retry_budget() {
        let config = parse_config_str(
            r"
config_version = 1
[teardown]
max_attempts = 0
",
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTeardown(_))
        ));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        for teardown in ["poll_interval_secs = 0", "poll_interval_ms = 0"] {
            let config =
                parse_config_str(&format!("config_version = 1\n[teardown]\n{teardown}\n"))
                    .unwrap();
            let err = config.validate().unwrap_err();
            assert!(
                err.to_string().contains("poll interval"),
                "{teardown}: {err}"
            );
        }
    }

    #[test]
    fn millisecond_poll_interval_takes_precedence() {
        let config = parse_config_str(
            r"
config_version = 1
[teardown]
poll_interval_secs = 0
poll_interval_ms = 20
",
        )
        .unwrap();
        assert_eq!(config.teardown.poll_interval(), Duration::from_millis(20));
        assert!(config.validate().is_ok());
        assert_eq!(TeardownSection::default().poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn load_config_validates_references() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stacks.toml");
        fs::write(
            &path,
            r#"
config_version = 1
[[stack]]
name = "compute"
depends_on = ["network"]
"#,
        )
        .unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unknown stack 'network'"));
    }

    #[test]
    fn load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn cycle_error_lists_stacks() {
        let err = ConfigError::Cycle(vec![StackName::from("a"), StackName::from("b")]);
        assert_eq!(err.to_string(), "circular dependency between stacks: a, b");
    }
}
