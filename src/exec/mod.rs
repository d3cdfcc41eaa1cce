//! Plan execution: providers, the layered executor, and run reports.

mod executor;
mod provider;
mod report;

pub use executor::{CancelToken, PlanExecutor, PriorResource, PriorState};
pub use provider::{ProvisionedResource, ResourceProvider, ResourceRequest, SimulatedProvider};
pub use report::{NodeReport, RunReport};
