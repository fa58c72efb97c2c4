//! Partial typed views of the hive installation objects
//!
//! ClusterDeployment is the assisted-install domain's record of one
//! cluster's installation; AgentClusterInstall carries the installation
//! state machine's phase. Both are owned by the assisted-install backend.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::LocalObjectReference;

/// Reference from a ClusterDeployment to its cluster-install object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInstallLocalReference {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub name: String,
}

/// Agent bare-metal platform marker. Carries no configuration; its
/// presence selects the platform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AgentBareMetalPlatform {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_bare_metal: Option<AgentBareMetalPlatform>,
}

/// ClusterDeployment: exactly one exists per CAPI cluster, resolved by the
/// cluster-name label.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "hive.openshift.io",
    version = "v1",
    kind = "ClusterDeployment",
    namespaced,
    shortname = "cd"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDeploymentSpec {
    pub cluster_name: String,
    pub base_domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_install_ref: Option<ClusterInstallLocalReference>,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_secret_ref: Option<LocalObjectReference>,
}

/// Installation phases during which the assisted service still accepts new
/// hosts. An empty/unreported phase is treated as "not started yet", which
/// is permissive on purpose; see the bootstrap reconciler's day-2 gate.
pub const CLUSTER_STATE_ADDING_HOSTS: &str = "adding-hosts";
pub const CLUSTER_STATE_PENDING_FOR_INPUT: &str = "pending-for-input";
pub const CLUSTER_STATE_INSUFFICIENT: &str = "insufficient";

/// Debug info block surfaced by the assisted service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentClusterInstallDebugInfo {
    /// Installation state machine phase, e.g. `insufficient`, `installing`,
    /// `adding-hosts`. Empty until the backend reports.
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentClusterInstallStatus {
    #[serde(default)]
    pub debug_info: AgentClusterInstallDebugInfo,
}

/// AgentClusterInstall: the installation state for a ClusterDeployment.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "extensions.hive.openshift.io",
    version = "v1beta1",
    kind = "AgentClusterInstall",
    namespaced,
    status = "AgentClusterInstallStatus",
    shortname = "aci"
)]
#[serde(rename_all = "camelCase")]
pub struct AgentClusterInstallSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_deployment_ref: Option<LocalObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_set_ref: Option<LocalObjectReference>,
}

impl AgentClusterInstall {
    /// Whether the install is still in a phase that accepts new hosts.
    /// Empty state means the backend hasn't reported yet and is treated as
    /// accepting.
    pub fn accepts_new_hosts(&self) -> bool {
        let state = self
            .status
            .as_ref()
            .map(|s| s.debug_info.state.as_str())
            .unwrap_or("");
        matches!(
            state,
            CLUSTER_STATE_ADDING_HOSTS
                | CLUSTER_STATE_PENDING_FOR_INPUT
                | CLUSTER_STATE_INSUFFICIENT
                | ""
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aci_with_state(state: &str) -> AgentClusterInstall {
        let mut aci = AgentClusterInstall::new("test", AgentClusterInstallSpec::default());
        aci.status = Some(AgentClusterInstallStatus {
            debug_info: AgentClusterInstallDebugInfo {
                state: state.to_string(),
                events_url: None,
            },
        });
        aci
    }

    #[test]
    fn test_early_phases_accept_new_hosts() {
        for state in ["adding-hosts", "pending-for-input", "insufficient", ""] {
            assert!(aci_with_state(state).accepts_new_hosts(), "state {state:?}");
        }
    }

    #[test]
    fn test_later_phases_reject_new_hosts() {
        for state in ["installing", "finalizing", "installed", "error"] {
            assert!(!aci_with_state(state).accepts_new_hosts(), "state {state:?}");
        }
    }

    #[test]
    fn test_missing_status_accepts_new_hosts() {
        let aci = AgentClusterInstall::new("test", AgentClusterInstallSpec::default());
        assert!(aci.accepts_new_hosts());
    }
}
