//! Configuration validation for resource declarations.
//!
//! This module provides comprehensive validation of declaration files,
//! ensuring all values are well-formed before graph construction.
//! Structural graph errors (duplicates, dangling references, cycles)
//! are the graph builder's job; the validator catches the shallow
//! problems that make a declaration unreadable.

use crate::error::{ConfigError, GroundplanError, Result};
use crate::graph::{RawReference, ResourceKind};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{DeployConfig, ResourceConfig, UnitConfig};

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_run(&config.run, &mut result);
        Self::validate_units(&config.units, &mut result);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(GroundplanError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates project configuration.
    fn validate_project(project: &super::spec::ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: String::from("Project name cannot be empty"),
            });
        } else if !is_valid_name(&project.name) {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            });
        }

        if project.environment.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.environment"),
                message: String::from("Environment cannot be empty"),
            });
        }
    }

    /// Validates run settings.
    fn validate_run(run: &super::spec::RunSettings, result: &mut ValidationResult) {
        if run.parallelism == 0 {
            result.errors.push(ValidationError {
                field: String::from("run.parallelism"),
                message: String::from("Parallelism must be at least 1"),
            });
        }

        if run.parallelism > 64 {
            result.warnings.push(format!(
                "run.parallelism: {} concurrent provisioning calls is unusual",
                run.parallelism
            ));
        }
    }

    /// Validates all unit declarations.
    fn validate_units(units: &[UnitConfig], result: &mut ValidationResult) {
        if units.is_empty() {
            result
                .warnings
                .push(String::from("No units defined in configuration"));
            return;
        }

        let mut seen_units = HashSet::new();

        for (i, unit) in units.iter().enumerate() {
            let prefix = format!("units[{i}]");

            if seen_units.contains(&unit.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!("Duplicate unit name: {}", unit.name),
                });
            } else {
                seen_units.insert(&unit.name);
            }

            if !is_valid_name(&unit.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Unit name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        unit.name
                    ),
                });
            }

            if unit.resources.is_empty() {
                result
                    .warnings
                    .push(format!("{prefix}: unit '{}' declares no resources", unit.name));
            }

            for (j, resource) in unit.resources.iter().enumerate() {
                Self::validate_resource(resource, &format!("{prefix}.resources[{j}]"), result);
            }

            for (key, expr) in &unit.exports {
                if let Err(message) = RawReference::parse(expr) {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.exports.{key}"),
                        message,
                    });
                }
            }
        }
    }

    /// Validates a single resource declaration.
    fn validate_resource(resource: &ResourceConfig, prefix: &str, result: &mut ValidationResult) {
        if !is_valid_name(&resource.name) {
            result.errors.push(ValidationError {
                field: format!("{prefix}.name"),
                message: format!(
                    "Resource name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    resource.name
                ),
            });
        }

        match &resource.kind {
            ResourceKind::Custom(kind) => {
                if !is_valid_name(kind) {
                    result.errors.push(ValidationError {
                        field: format!("{prefix}.kind"),
                        message: format!("Custom kind '{kind}' is invalid"),
                    });
                }
                if resource.outputs.is_empty() {
                    result.warnings.push(format!(
                        "{prefix}: custom kind '{kind}' declares no outputs; nothing can reference it"
                    ));
                }
            }
            _ => {
                if !resource.outputs.is_empty() {
                    result.warnings.push(format!(
                        "{prefix}.outputs: ignored for built-in kind '{}'",
                        resource.kind
                    ));
                }
            }
        }

        // Surface reference syntax problems early with a field path.
        for (key, value) in &resource.properties {
            if let Some(s) = value.as_str()
                && let Err(message) = RawReference::parse(s)
            {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.properties.{key}"),
                    message,
                });
            }
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    let mut chars = name.chars();

    if let Some(first) = chars.next()
        && !first.is_ascii_lowercase()
    {
        return false;
    }

    for c in chars {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return false;
        }
    }

    if name.ends_with('-') {
        return false;
    }

    if name.contains("--") {
        return false;
    }

    true
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("queue"));
        assert!(is_valid_name("queue-alarm-1"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Queue")); // uppercase
        assert!(!is_valid_name("1-queue")); // starts with number
        assert!(!is_valid_name("queue_arn")); // underscore
        assert!(!is_valid_name("queue-")); // ends with hyphen
        assert!(!is_valid_name("queue--arn")); // consecutive hyphens
    }

    #[test]
    fn test_validate_minimal() {
        let yaml = r"
project:
  name: test-project
units: []
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let result = ConfigValidator::new().validate(&config).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1); // no units
    }

    #[test]
    fn test_validate_zero_parallelism() {
        let yaml = r"
project:
  name: test-project
run:
  parallelism: 0
units: []
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let result = ConfigValidator::new().validate(&config);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_duplicate_unit_names() {
        let yaml = r"
project:
  name: test-project
units:
  - name: core
    resources:
      - name: queue
        kind: queue
  - name: core
    resources:
      - name: cluster
        kind: cluster
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let result = ConfigValidator::new().validate(&config);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_bad_reference_syntax() {
        let yaml = r#"
project:
  name: test-project
units:
  - name: core
    resources:
      - name: alarm
        kind: alarm
        properties:
          arn: "prefix-${queue.arn}"
"#;
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let result = ConfigValidator::new().validate(&config);
        assert!(result.is_err());
    }
}
