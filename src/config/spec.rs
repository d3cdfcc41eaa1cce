//! Configuration specification types for the provisioning engine.
//!
//! This module defines all the structs that map to the `groundplan.yaml` file.
//! These types are declarative and fully describe the desired resource graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::graph::ResourceKind;

/// The root configuration structure for a Groundplan deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// State backend configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Execution settings.
    #[serde(default)]
    pub run: RunSettings,
    /// Deployment units, each declaring a set of resources.
    pub units: Vec<UnitConfig>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// State backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Backend type.
    #[serde(default)]
    pub backend: StateBackend,
    /// Local state directory (for the local backend).
    #[serde(default)]
    pub path: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based state storage.
    #[default]
    Local,
}

/// Execution settings for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSettings {
    /// Maximum number of resources provisioned concurrently within a layer.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// What to do when a resource fails to provision.
    #[serde(default)]
    pub on_failure: FailurePolicy,
}

/// Policy applied when a resource fails to provision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop dispatching new resources; everything not yet started is skipped.
    #[default]
    Abort,
    /// Keep provisioning independent branches; only descendants of the
    /// failed resource are skipped.
    Continue,
}

/// A deployment unit: a named collection of resources sharing a
/// deployment boundary (the account/region analogue).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitConfig {
    /// Unique name for the unit within this project.
    pub name: String,
    /// Resources declared by this unit.
    pub resources: Vec<ResourceConfig>,
    /// Named outputs exported by this unit, as reference expressions
    /// (e.g. `"${queue.arn}"`).
    #[serde(default)]
    pub exports: BTreeMap<String, String>,
}

/// A single declared resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    /// Unique name for the resource within its unit.
    pub name: String,
    /// Resource kind (queue, alarm, repository, cluster, service, or custom).
    pub kind: ResourceKind,
    /// Declared properties. A whole-string value of the form
    /// `${node.output}` or `${unit/node.output}` is a reference to
    /// another resource's output; everything else is a literal.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Output contract for custom kinds. Ignored for built-in kinds,
    /// which carry a fixed contract.
    #[serde(default)]
    pub outputs: Vec<String>,
}

// Default value functions

const fn default_parallelism() -> usize {
    4
}

fn default_environment() -> String {
    String::from("dev")
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            on_failure: FailurePolicy::default(),
        }
    }
}

impl DeployConfig {
    /// Returns the fully qualified project name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Returns the total number of declared resources across all units.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.units.iter().map(|u| u.resources.len()).sum()
    }

    /// Returns unit names in declaration order.
    #[must_use]
    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }
}

impl UnitConfig {
    /// Returns resource names declared by this unit, in declaration order.
    #[must_use]
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Abort => "abort",
            Self::Continue => "continue",
        };
        write!(f, "{s}")
    }
}
