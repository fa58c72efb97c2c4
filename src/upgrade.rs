//! OpenShift version upgrade orchestration against the workload cluster
//!
//! The control-plane reconciler only sequences when these calls happen; the
//! mechanics of a version transition belong to the workload cluster's own
//! operators. Everything here goes through the spoke API.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};
use crate::FIELD_MANAGER;

/// The singleton ClusterVersion object's well-known name.
const CLUSTER_VERSION_NAME: &str = "version";

const MCO_STATE_ANNOTATION: &str = "machineconfiguration.openshift.io/state";
const MCO_STATE_DONE: &str = "Done";

/// Desired or historical update entry on the ClusterVersion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHistory {
    /// `Completed` or `Partial`
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionStatus {
    #[serde(default)]
    pub desired: Update,
    /// Most recent entry first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<UpdateHistory>,
}

/// Partial view of the workload cluster's ClusterVersion singleton.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "config.openshift.io",
    version = "v1",
    kind = "ClusterVersion",
    status = "ClusterVersionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_update: Option<Update>,
}

/// Sequencing interface the control-plane reconciler drives.
#[async_trait]
pub trait Upgrader: Send + Sync {
    async fn is_upgrade_in_progress(&self) -> Result<bool>;
    async fn get_current_version(&self) -> Result<String>;
    async fn update_cluster_version_desired_update(&self, version: &str) -> Result<()>;
    /// Whether every node has finished rolling its machine config.
    async fn verify_upgraded_nodes(&self) -> Result<bool>;
}

/// Upgrader backed by the workload cluster's ClusterVersion and Node APIs.
pub struct ClusterVersionUpgrader {
    client: Client,
}

impl ClusterVersionUpgrader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn cluster_version(&self) -> Result<ClusterVersion> {
        let api: Api<ClusterVersion> = Api::all(self.client.clone());
        Ok(api.get(CLUSTER_VERSION_NAME).await?)
    }
}

#[async_trait]
impl Upgrader for ClusterVersionUpgrader {
    async fn is_upgrade_in_progress(&self) -> Result<bool> {
        let cv = self.cluster_version().await?;
        Ok(cv
            .status
            .as_ref()
            .and_then(|s| s.history.first())
            .map(|h| h.state != "Completed")
            .unwrap_or(false))
    }

    async fn get_current_version(&self) -> Result<String> {
        let cv = self.cluster_version().await?;
        let status = cv
            .status
            .as_ref()
            .ok_or_else(|| Error::LookupFailed("cluster version has no status yet".to_string()))?;
        status
            .history
            .iter()
            .find(|h| h.state == "Completed")
            .map(|h| h.version.clone())
            .ok_or_else(|| {
                Error::LookupFailed("cluster version has no completed history entry".to_string())
            })
    }

    async fn update_cluster_version_desired_update(&self, version: &str) -> Result<()> {
        let api: Api<ClusterVersion> = Api::all(self.client.clone());
        api.patch(
            CLUSTER_VERSION_NAME,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&json!({
                "spec": { "desiredUpdate": { "version": version } }
            })),
        )
        .await?;
        Ok(())
    }

    async fn verify_upgraded_nodes(&self) -> Result<bool> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        for node in nodes.list(&ListParams::default()).await? {
            let done = node
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(MCO_STATE_ANNOTATION))
                .map(|s| s == MCO_STATE_DONE)
                .unwrap_or(false);
            if !done {
                debug!("node {} still rolling machine config", node.name_any());
                return Ok(false);
            }
        }
        Ok(true)
    }
}
