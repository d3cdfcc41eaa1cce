//! Configuration loading, schema, and validation.
//!
//! The declaration file (`groundplan.yaml`) is the single source of
//! truth for what the resource graph should contain.

mod parser;
mod spec;
mod validator;

pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{
    DeployConfig, FailurePolicy, ProjectConfig, ResourceConfig, RunSettings, StateBackend,
    StateConfig, UnitConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
