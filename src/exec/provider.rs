//! Provisioning collaborator contract.
//!
//! The engine never talks to a cloud API directly. For each resource
//! kind the external collaborator implements `create` and `update`;
//! the executor calls them with fully resolved properties and records
//! the outputs they return.

use async_trait::async_trait;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::Result;
use crate::graph::{NodeId, ResourceKind};

/// A fully resolved provisioning request for a single node.
///
/// Every reference in the declared properties has been replaced by the
/// producer's concrete output value before the provider sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    /// The node being provisioned.
    pub id: NodeId,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resolved property values.
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Output keys the node's contract declares.
    pub output_contract: Vec<String>,
}

/// The result of a successful provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedResource {
    /// Provider-assigned identifier, used for later updates.
    pub remote_id: String,
    /// Concrete output values.
    pub outputs: BTreeMap<String, serde_json::Value>,
}

/// External collaborator that realizes resources.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Creates a new resource and returns its identifier and outputs.
    async fn create(&self, request: &ResourceRequest) -> Result<ProvisionedResource>;

    /// Updates an existing resource in place and returns its outputs.
    async fn update(
        &self,
        remote_id: &str,
        request: &ResourceRequest,
    ) -> Result<ProvisionedResource>;
}

/// A provider that fabricates outputs locally.
///
/// Useful for exercising the engine end to end without a cloud
/// account: every contract output gets a deterministic placeholder
/// value derived from the node and key.
#[derive(Debug, Default)]
pub struct SimulatedProvider;

impl SimulatedProvider {
    /// Creates a new simulated provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn fabricate_outputs(request: &ResourceRequest) -> BTreeMap<String, serde_json::Value> {
        request
            .output_contract
            .iter()
            .map(|key| {
                let value = format!("sim:{}:{}:{key}", request.kind, request.id);
                (key.clone(), serde_json::Value::String(value))
            })
            .collect()
    }
}

#[async_trait]
impl ResourceProvider for SimulatedProvider {
    async fn create(&self, request: &ResourceRequest) -> Result<ProvisionedResource> {
        let remote_id = format!("sim-{}", &Uuid::new_v4().to_string()[..8]);
        Ok(ProvisionedResource {
            remote_id,
            outputs: Self::fabricate_outputs(request),
        })
    }

    async fn update(
        &self,
        remote_id: &str,
        request: &ResourceRequest,
    ) -> Result<ProvisionedResource> {
        Ok(ProvisionedResource {
            remote_id: remote_id.to_string(),
            outputs: Self::fabricate_outputs(request),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_request() -> ResourceRequest {
        ResourceRequest {
            id: NodeId::new("messaging", "queue"),
            kind: ResourceKind::Queue,
            properties: BTreeMap::new(),
            output_contract: vec![String::from("arn"), String::from("url")],
        }
    }

    #[tokio::test]
    async fn test_simulated_create_honors_contract() {
        let provider = SimulatedProvider::new();
        let created = provider.create(&queue_request()).await.unwrap();

        assert!(created.remote_id.starts_with("sim-"));
        assert_eq!(created.outputs.len(), 2);
        assert_eq!(
            created.outputs["arn"],
            serde_json::json!("sim:queue:messaging/queue:arn")
        );
    }

    #[tokio::test]
    async fn test_simulated_update_keeps_remote_id() {
        let provider = SimulatedProvider::new();
        let updated = provider.update("sim-abcd1234", &queue_request()).await.unwrap();
        assert_eq!(updated.remote_id, "sim-abcd1234");
    }

    #[tokio::test]
    async fn test_mock_provider() {
        let mut mock = MockResourceProvider::new();
        mock.expect_create().times(1).returning(|request| {
            Ok(ProvisionedResource {
                remote_id: String::from("r-1"),
                outputs: request
                    .output_contract
                    .iter()
                    .map(|k| (k.clone(), serde_json::json!("value")))
                    .collect(),
            })
        });

        let created = mock.create(&queue_request()).await.unwrap();
        assert_eq!(created.remote_id, "r-1");
    }
}
