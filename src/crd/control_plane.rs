//! OpenshiftAssistedControlPlane Custom Resource Definition
//!
//! The CAPI control-plane provider object. Owns the ClusterDeployment for
//! its cluster and sequences OpenShift version upgrades on the workload
//! cluster.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::bootstrap_config::OpenshiftAssistedConfigSpec;
use super::types::{Condition, DiskEncryption, LocalObjectReference, ObjectReference, Proxy};

/// Condition type tracking ClusterDeployment creation.
pub const CLUSTER_DEPLOYMENT_CREATED_CONDITION: &str = "ClusterDeploymentCreated";

/// Condition reason when the requested version is below the supported floor.
pub const UNSUPPORTED_VERSION_REASON: &str = "UnsupportedVersion";

/// Condition reason when the ClusterDeployment could not be created.
pub const CLUSTER_DEPLOYMENT_FAILED_REASON: &str = "ClusterDeploymentFailed";

/// Condition type tracking the workload cluster's version transition.
pub const UPGRADE_COMPLETED_CONDITION: &str = "UpgradeCompleted";

/// Finalizer gating deletion until owned objects are cleaned up.
pub const CONTROL_PLANE_FINALIZER: &str =
    "openshiftassistedcontrolplane.controlplane.cluster.x-k8s.io/finalizer";

/// Oldest OpenShift version this provider knows how to install.
pub const MINIMUM_OPENSHIFT_VERSION: &str = "4.14.0";

/// Name of the generated pull secret when the config specifies none.
pub const PLACEHOLDER_PULL_SECRET_NAME: &str = "placeholder-pull-secret";

/// Machine template for control-plane machines.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneMachineTemplate {
    /// Infrastructure template cloned per control-plane machine
    pub infrastructure_ref: ObjectReference,
}

/// Desired state of the assisted-installed cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfig {
    /// Friendly cluster name; defaults to the CAPI cluster name when empty.
    /// Used for subdomains and anywhere a cluster name is surfaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Base domain the cluster belongs to
    pub base_domain: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secret_ref: Option<LocalObjectReference>,

    /// Virtual IPs for the cluster API endpoint (at most one per IP stack)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_vips: Vec<String>,

    /// Virtual IPs for cluster ingress traffic
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingress_vips: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Proxy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_encryption: Option<DiskEncryption>,

    /// SSH key for accessing cluster nodes after installation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_authorized_key: Option<String>,

    /// Release image to install from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_image: Option<String>,

    /// Allow workloads on control-plane nodes
    #[serde(default)]
    pub masters_schedulable: bool,
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "controlplane.cluster.x-k8s.io",
    version = "v1alpha2",
    kind = "OpenshiftAssistedControlPlane",
    namespaced,
    status = "OpenshiftAssistedControlPlaneStatus",
    shortname = "oacp",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".metadata.labels['cluster\\.x-k8s\\.io/cluster-name']"}"#,
    printcolumn = r#"{"name":"Desired","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct OpenshiftAssistedControlPlaneSpec {
    #[serde(default)]
    pub config: ControlPlaneConfig,

    pub machine_template: ControlPlaneMachineTemplate,

    /// Bootstrap config spec stamped onto every control-plane machine
    #[serde(default)]
    pub openshift_assisted_config_spec: OpenshiftAssistedConfigSpec,

    #[serde(default)]
    pub replicas: i32,

    /// Target OpenShift version, e.g. `4.16.3`
    pub version: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenshiftAssistedControlPlaneStatus {
    /// The ClusterDeployment created for this control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_deployment_ref: Option<ObjectReference>,

    #[serde(default)]
    pub replicas: i32,

    #[serde(default)]
    pub ready_replicas: i32,

    #[serde(default)]
    pub updated_replicas: i32,

    #[serde(default)]
    pub unavailable_replicas: i32,

    /// Version currently reported by the workload cluster, if reachable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub initialized: bool,

    /// API server became ready during initial provisioning. Part of the
    /// CAPI contract; never reset after provisioning completes.
    #[serde(default)]
    pub ready: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl OpenshiftAssistedControlPlane {
    /// The assisted-install cluster name: the config override when present,
    /// else the CAPI cluster name. Every label match and record name must
    /// use the same resolution or the one-record-per-cluster invariant
    /// breaks.
    pub fn assisted_cluster_name(&self, capi_cluster_name: &str) -> String {
        match &self.spec.config.cluster_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => capi_cluster_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assisted_cluster_name_defaults_to_capi_name() {
        let acp = OpenshiftAssistedControlPlane::new(
            "cp",
            OpenshiftAssistedControlPlaneSpec::default(),
        );
        assert_eq!(acp.assisted_cluster_name("my-cluster"), "my-cluster");
    }

    #[test]
    fn test_assisted_cluster_name_honors_override() {
        let mut spec = OpenshiftAssistedControlPlaneSpec::default();
        spec.config.cluster_name = Some("friendly".to_string());
        let acp = OpenshiftAssistedControlPlane::new("cp", spec);
        assert_eq!(acp.assisted_cluster_name("my-cluster"), "friendly");
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let mut spec = OpenshiftAssistedControlPlaneSpec::default();
        spec.config.cluster_name = Some(String::new());
        let acp = OpenshiftAssistedControlPlane::new("cp", spec);
        assert_eq!(acp.assisted_cluster_name("my-cluster"), "my-cluster");
    }
}
