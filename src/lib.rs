// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Groundplan
//!
//! A declarative, idempotent provisioning engine for dependent infrastructure
//! resources.
//!
//! ## Overview
//!
//! Groundplan turns a YAML declaration of resources and the references
//! between them into a validated dependency graph, computes a layered
//! provisioning plan, and executes it against a provider:
//!
//! - Declare resources and wire their inputs to other resources' outputs
//! - Cycles, unknown outputs, and duplicate names are rejected before
//!   anything is provisioned
//! - Independent resources provision concurrently; dependents wait for
//!   their producers
//! - Unchanged resources are recognized from state and never re-provisioned
//!
//! ## Architecture
//!
//! 1. **Configuration**: parsed and validated from `groundplan.yaml`
//! 2. **Graph**: resources become nodes, references become edges
//! 3. **Plan**: nodes are grouped into layers by dependency depth
//! 4. **Execution**: layers run in order, bounded concurrency within each
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`graph`]: Dependency graph construction and reference resolution
//! - [`planner`]: Layered plan computation and graph fingerprinting
//! - [`exec`]: Plan execution against a resource provider
//! - [`state`]: State storage backends
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: messaging-stack
//!   environment: prod
//!
//! units:
//!   - name: messaging
//!     resources:
//!       - name: work-queue
//!         kind: queue
//!       - name: depth-alarm
//!         kind: alarm
//!         properties:
//!           metric_source: ${work-queue.arn}
//!     exports:
//!       queue_arn: ${work-queue.arn}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod graph;
pub mod planner;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, DeployConfig};
pub use error::{GroundplanError, Result};
pub use exec::{CancelToken, PlanExecutor, ResourceProvider, SimulatedProvider};
pub use graph::{DependencyGraph, GraphBuilder, NodeId, ResourceNode};
pub use planner::{GraphHasher, ProvisioningPlan};
pub use state::{LocalStateStore, RunState, StateStore};
