//! Teardown configuration, stack descriptors, and deletion planning for unstack.
//!
//! This crate defines the input layer: TOML config parsing (`TeardownConfig`),
//! the `StackDescriptor` records the orchestrator consumes, referential and
//! acyclicity validation, and the wave-by-wave deletion plan.

pub mod config;
pub mod descriptor;
pub mod plan;
pub mod types;
pub mod validate;

pub use config::{
    load_config, parse_config_file, parse_config_str, ConfigError, KeysSection, StackSection,
    TeardownConfig, TeardownSection, CONFIG_VERSION,
};
pub use descriptor::StackDescriptor;
pub use plan::{deletion_plan, DeletionPlan};
pub use types::{KeyName, StackName};
pub use validate::validate_descriptors;
