//! OpenshiftAssistedConfig Custom Resource Definition
//!
//! The per-Machine bootstrap config object. CAPI's bootstrap contract: the
//! controller must eventually publish a data secret name and flip `ready`.
//! Here the data secret is a pointer ignition merging the discovery config;
//! the actual boot medium is the live ISO injected into the infrastructure
//! machine.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{Condition, KernelArgument, LocalObjectReference, ObjectReference, Proxy};

/// Condition type reported by the bootstrap reconciler.
pub const DATA_SECRET_AVAILABLE_CONDITION: &str = "DataSecretAvailable";

/// Condition reasons for `DataSecretAvailable=False`.
pub const WAITING_FOR_CLUSTER_INFRASTRUCTURE_REASON: &str = "WaitingForClusterInfrastructure";
pub const WAITING_FOR_ASSISTED_INSTALLER_REASON: &str = "WaitingForAssistedInstaller";
pub const WAITING_FOR_INSTALL_COMPLETE_REASON: &str = "WaitingForInstallComplete";
pub const WAITING_FOR_LIVE_ISO_URL_REASON: &str = "WaitingForLiveISOURL";
pub const INFRAENV_FAILED_REASON: &str = "InfraEnvFailed";
pub const PROPAGATING_LIVE_ISO_URL_FAILED_REASON: &str = "PropagatingLiveISOURLFailed";
pub const CREATING_SECRET_FAILED_REASON: &str = "CreatingSecretFailed";

/// Finalizer protecting agent teardown ordering on deletion.
pub const BOOTSTRAP_CONFIG_FINALIZER: &str =
    "openshiftassistedconfig.bootstrap.cluster.x-k8s.io/deprovision";

/// Node registration options propagated to the kubelet via ignition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeRegistrationOptions {
    /// Extra labels applied to the node's kubelet at boot
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kubelet_extra_labels: Vec<String>,
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "bootstrap.cluster.x-k8s.io",
    version = "v1alpha1",
    kind = "OpenshiftAssistedConfig",
    namespaced,
    status = "OpenshiftAssistedConfigStatus",
    shortname = "oac",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".metadata.labels['cluster\\.x-k8s\\.io/cluster-name']"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpenshiftAssistedConfigSpec {
    /// CPU architecture of the discovery image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_architecture: Option<String>,

    /// Kernel arguments applied to hosts booting the discovery image
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kernel_arguments: Vec<KernelArgument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Proxy>,

    /// Pull secret used by the discovery environment; falls back to the
    /// control plane's pull secret when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secret_ref: Option<LocalObjectReference>,

    /// SSH key installed on discovery hosts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_authorized_key: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_ntp_sources: Vec<String>,

    /// PEM bundle of additional trusted certificates for the discovery hosts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_trust_bundle: Option<String>,

    /// RHCOS image version override for the discovery ISO
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_image_version: Option<String>,

    #[serde(default)]
    pub node_registration: NodeRegistrationOptions,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenshiftAssistedConfigStatus {
    /// Set once the data secret has been created
    #[serde(default)]
    pub ready: bool,

    /// Name of the generated CAPI data secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_secret_name: Option<String>,

    /// The InfraEnv serving this machine's pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra_env_ref: Option<ObjectReference>,

    /// The Agent adopted for this machine, once discovered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_ref: Option<LocalObjectReference>,

    /// Discovery ISO download URL, copied from the InfraEnv once generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso_download_url: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl OpenshiftAssistedConfig {
    /// Whether this config bootstraps a control-plane machine.
    pub fn is_control_plane(&self) -> bool {
        self.metadata
            .labels
            .as_ref()
            .map(|l| l.contains_key(crate::CONTROL_PLANE_LABEL))
            .unwrap_or(false)
    }

    /// Labels as a map, empty if unset.
    pub fn labels_or_default(&self) -> BTreeMap<String, String> {
        self.metadata.labels.clone().unwrap_or_default()
    }
}
