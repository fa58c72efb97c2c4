//! ClusterDeployment construction
//!
//! The control-plane reconciler materializes exactly one ClusterDeployment
//! per cluster. Its cluster-name label is the join key every other
//! reconciler uses to find it, so the label must carry the CAPI cluster
//! name even when the assisted cluster name is overridden.

use std::collections::BTreeMap;

use kube::ResourceExt;

use crate::crd::control_plane::{OpenshiftAssistedControlPlane, PLACEHOLDER_PULL_SECRET_NAME};
use crate::crd::hive::{
    AgentBareMetalPlatform, ClusterDeployment, ClusterDeploymentSpec,
    ClusterInstallLocalReference, Platform,
};
use crate::crd::types::LocalObjectReference;
use crate::{CLUSTER_NAME_LABEL, CONTROL_PLANE_LABEL};

/// Labels stamped on control-plane owned objects for a cluster.
pub fn control_plane_labels(capi_cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CLUSTER_NAME_LABEL.to_string(), capi_cluster_name.to_string()),
        (CONTROL_PLANE_LABEL.to_string(), String::new()),
    ])
}

/// Build the desired ClusterDeployment for a control plane.
///
/// The name is the control plane's own name, so repeated reconciles
/// converge on the same object. A missing pull secret falls back to the
/// generated placeholder so the assisted service always has credentials.
pub fn build_cluster_deployment(
    acp: &OpenshiftAssistedControlPlane,
    capi_cluster_name: &str,
) -> ClusterDeployment {
    let config = &acp.spec.config;
    let pull_secret_ref = config.pull_secret_ref.clone().unwrap_or(LocalObjectReference {
        name: PLACEHOLDER_PULL_SECRET_NAME.to_string(),
    });

    let mut cd = ClusterDeployment::new(
        &acp.name_any(),
        ClusterDeploymentSpec {
            cluster_name: acp.assisted_cluster_name(capi_cluster_name),
            base_domain: config.base_domain.clone(),
            cluster_install_ref: Some(ClusterInstallLocalReference {
                group: "extensions.hive.openshift.io".to_string(),
                version: "v1beta1".to_string(),
                kind: "AgentClusterInstall".to_string(),
                name: acp.name_any(),
            }),
            platform: Platform {
                agent_bare_metal: Some(AgentBareMetalPlatform {}),
            },
            pull_secret_ref: Some(pull_secret_ref),
        },
    );
    cd.metadata.namespace = acp.namespace();
    cd.metadata.labels = Some(control_plane_labels(capi_cluster_name));
    cd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::control_plane::OpenshiftAssistedControlPlaneSpec;

    fn acp(name: &str) -> OpenshiftAssistedControlPlane {
        let mut spec = OpenshiftAssistedControlPlaneSpec::default();
        spec.config.base_domain = "example.com".to_string();
        let mut acp = OpenshiftAssistedControlPlane::new(name, spec);
        acp.metadata.namespace = Some("clusters".to_string());
        acp
    }

    #[test]
    fn test_deployment_name_matches_control_plane() {
        let cd = build_cluster_deployment(&acp("cp-1"), "cluster-1");
        assert_eq!(cd.name_any(), "cp-1");
        assert_eq!(cd.namespace().as_deref(), Some("clusters"));
        assert_eq!(cd.spec.base_domain, "example.com");
    }

    #[test]
    fn test_label_carries_capi_cluster_name_despite_override() {
        let mut acp = acp("cp-1");
        acp.spec.config.cluster_name = Some("friendly".to_string());
        let cd = build_cluster_deployment(&acp, "cluster-1");
        assert_eq!(cd.spec.cluster_name, "friendly");
        assert_eq!(
            cd.metadata.labels.as_ref().unwrap().get(CLUSTER_NAME_LABEL),
            Some(&"cluster-1".to_string())
        );
    }

    #[test]
    fn test_missing_pull_secret_falls_back_to_placeholder() {
        let cd = build_cluster_deployment(&acp("cp-1"), "cluster-1");
        assert_eq!(
            cd.spec.pull_secret_ref.unwrap().name,
            PLACEHOLDER_PULL_SECRET_NAME
        );
    }

    #[test]
    fn test_install_ref_targets_agent_cluster_install() {
        let cd = build_cluster_deployment(&acp("cp-1"), "cluster-1");
        let install_ref = cd.spec.cluster_install_ref.unwrap();
        assert_eq!(install_ref.kind, "AgentClusterInstall");
        assert_eq!(install_ref.name, "cp-1");
        assert!(cd.spec.platform.agent_bare_metal.is_some());
    }
}
