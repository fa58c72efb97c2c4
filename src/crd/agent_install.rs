//! Partial typed views of the assisted-install discovery objects
//!
//! InfraEnv describes one discovery environment (boot image) per machine
//! pool; Agent represents one host that booted the image and reported its
//! inventory.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{KernelArgument, LocalObjectReference, ObjectReference, Proxy};

/// Host roles assigned during adoption.
pub const HOST_ROLE_MASTER: &str = "master";
pub const HOST_ROLE_WORKER: &str = "worker";

/// Debug info block surfaced on the InfraEnv by the assisted service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfraEnvDebugInfo {
    /// Events URL; only present after the backend has processed the
    /// InfraEnv. Source for the ignition download URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfraEnvStatus {
    /// Discovery ISO download URL, set once the image is generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso_download_url: Option<String>,
    #[serde(default)]
    pub infra_env_debug_info: InfraEnvDebugInfo,
}

/// InfraEnv: one discovery environment per machine pool.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "agent-install.openshift.io",
    version = "v1beta1",
    kind = "InfraEnv",
    namespaced,
    status = "InfraEnvStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InfraEnvSpec {
    /// The ClusterDeployment this environment discovers hosts for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_ref: Option<ObjectReference>,

    #[serde(default)]
    pub pull_secret_ref: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_authorized_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Proxy>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kernel_arguments: Vec<KernelArgument>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_ntp_sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_trust_bundle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_architecture: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_image_version: Option<String>,
}

/// One reported network interface of a discovered host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostInterface {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mac_address: String,
}

/// Hardware inventory reported by a discovered host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostInventory {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<HostInterface>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    #[serde(default)]
    pub inventory: HostInventory,
}

/// Agent: a host that booted the discovery image.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "agent-install.openshift.io",
    version = "v1beta1",
    kind = "Agent",
    namespaced,
    status = "AgentStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    /// The ClusterDeployment this agent was discovered for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_deployment_name: Option<ObjectReference>,

    #[serde(default)]
    pub approved: bool,

    /// `master` or `worker`, assigned during adoption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Raw ignition config merged into the host's install ignition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignition_config_overrides: Option<String>,

    /// Labels applied to the resulting node
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_labels: BTreeMap<String, String>,
}

impl Agent {
    /// MAC addresses of all reported interfaces. Empty until the host
    /// posts its inventory.
    pub fn interface_macs(&self) -> Vec<&str> {
        self.status
            .as_ref()
            .map(|s| {
                s.inventory
                    .interfaces
                    .iter()
                    .map(|i| i.mac_address.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}
