//! Topological planning over the dependency graph.

mod fingerprint;
mod plan;

pub use fingerprint::GraphHasher;
pub use plan::ProvisioningPlan;
