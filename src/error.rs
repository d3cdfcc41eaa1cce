//! Error types for the Groundplan provisioning engine.
//!
//! This module provides a comprehensive error hierarchy for all operations
//! in the provisioning lifecycle: configuration, graph construction,
//! planning, execution, and state management.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Groundplan provisioning engine.
#[derive(Debug, Error)]
pub enum GroundplanError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Graph construction errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Execution errors.
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A property value uses invalid reference syntax.
    #[error("Invalid reference syntax in '{value}': {message}")]
    InvalidReference {
        /// The offending property value.
        value: String,
        /// Description of the syntax problem.
        message: String,
    },
}

/// Graph construction errors.
///
/// All of these are build-time fatal: no plan is produced and no
/// provisioning call is ever made against an invalid graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Two nodes declared with the same identifier within a unit.
    #[error("Duplicate resource '{id}' in unit '{unit}'")]
    DuplicateResource {
        /// The duplicated node identifier.
        id: String,
        /// The unit containing the duplicate.
        unit: String,
    },

    /// A reference targets an output not declared by the producer's kind.
    #[error(
        "Resource '{producer}' ({kind}) declares no output '{output}' (referenced by '{consumer}')"
    )]
    UnknownOutputKey {
        /// The producing node identifier.
        producer: String,
        /// The producer's kind.
        kind: String,
        /// The unknown output key.
        output: String,
        /// The consuming node identifier.
        consumer: String,
    },

    /// A reference points at a node that does not exist in the graph.
    #[error("Resource '{consumer}' references unknown resource '{producer}'")]
    UnresolvedReference {
        /// The consuming node identifier.
        consumer: String,
        /// The missing producer identifier.
        producer: String,
    },

    /// The declared references form a cycle.
    #[error("Cyclic dependency detected: {cycle}")]
    CyclicDependency {
        /// The node sequence forming the cycle, rendered `a -> b -> a`.
        cycle: String,
    },
}

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A provisioned producer did not return a referenced output key.
    #[error("Resource '{producer}' was provisioned but returned no output '{output}'")]
    MissingOutput {
        /// The producing node identifier.
        producer: String,
        /// The absent output key.
        output: String,
    },

    /// The provider failed to provision a node.
    #[error("Failed to provision '{id}': {reason}")]
    ProvisioningFailed {
        /// The node identifier.
        id: String,
        /// Reason reported by the provider.
        reason: String,
    },

    /// The run was cancelled before completion.
    #[error("Run cancelled: {reason}")]
    Cancelled {
        /// Why the run was cancelled.
        reason: String,
    },

    /// Execution stopped short of provisioning everything.
    #[error("Execution aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// Backend IO failure.
    #[error("State backend error: {message}")]
    BackendError {
        /// Description of the backend error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Result type alias for Groundplan operations.
pub type Result<T> = std::result::Result<T, GroundplanError>;

impl GroundplanError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error occurred before any provisioning call.
    ///
    /// Build-time errors guarantee that nothing was partially provisioned.
    #[must_use]
    pub const fn is_build_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Graph(_))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates a backend error with the given message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::BackendError {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ExecError {
    /// Creates a provisioning failure for a node.
    #[must_use]
    pub fn provisioning(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProvisioningFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
