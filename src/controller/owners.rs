//! Owner reference helpers and owner graph traversal
//!
//! Reconcilers here constantly walk the CAPI ownership graph: bootstrap
//! config to Machine, Machine to control plane or MachineSet, anything to
//! the Cluster. Lookups that the graph guarantees to be unique fail loudly
//! when they are not.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::NamespaceResourceScope;
use kube::api::ListParams;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::crd::capi::{Cluster, Machine, MachineSet};
use crate::crd::control_plane::OpenshiftAssistedControlPlane;
use crate::crd::hive::ClusterDeployment;
use crate::error::{Error, Result};
use crate::CLUSTER_NAME_LABEL;

/// Build a controller owner reference to `owner`.
pub fn controller_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Find the owner reference with the given kind, if any.
pub fn owner_of_kind<'a, K>(obj: &'a K, kind: &str) -> Option<&'a OwnerReference>
where
    K: Resource,
{
    obj.meta()
        .owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| r.kind == kind))
}

/// Fetch the owning Machine of a namespaced object, if one is set.
pub async fn get_owner_machine<K>(client: &Client, obj: &K) -> Result<Option<Machine>>
where
    K: Resource<DynamicType = ()>,
{
    let Some(owner) = owner_of_kind(obj, "Machine") else {
        return Ok(None);
    };
    let namespace = obj.meta().namespace.clone().unwrap_or_default();
    let machines: Api<Machine> = Api::namespaced(client.clone(), &namespace);
    Ok(Some(machines.get(&owner.name).await?))
}

/// Fetch the CAPI Cluster a Machine belongs to.
pub async fn get_cluster(client: &Client, machine: &Machine) -> Result<Cluster> {
    let namespace = machine.namespace().unwrap_or_default();
    let clusters: Api<Cluster> = Api::namespaced(client.clone(), &namespace);
    Ok(clusters.get(&machine.spec.cluster_name).await?)
}

/// The two possible controllers of a CAPI Machine in this provider.
#[derive(Clone, Debug)]
pub enum MachineOwner {
    ControlPlane(Box<OpenshiftAssistedControlPlane>),
    MachineSet(Box<MachineSet>),
}

/// Resolve the Machine's controlling owner.
///
/// Control-plane machines are owned by an OpenshiftAssistedControlPlane,
/// workers by a MachineSet. Anything else means the machine is not ours.
pub async fn get_machine_owner(client: &Client, machine: &Machine) -> Result<MachineOwner> {
    let namespace = machine.namespace().unwrap_or_default();

    if let Some(owner) = owner_of_kind(machine, "OpenshiftAssistedControlPlane") {
        let api: Api<OpenshiftAssistedControlPlane> = Api::namespaced(client.clone(), &namespace);
        return Ok(MachineOwner::ControlPlane(Box::new(
            api.get(&owner.name).await?,
        )));
    }
    if let Some(owner) = owner_of_kind(machine, "MachineSet") {
        let api: Api<MachineSet> = Api::namespaced(client.clone(), &namespace);
        return Ok(MachineOwner::MachineSet(Box::new(
            api.get(&owner.name).await?,
        )));
    }
    Err(Error::LookupFailed(format!(
        "machine {}/{} has no control plane or machine set owner",
        namespace,
        machine.name_any()
    )))
}

/// Fetch the single ClusterDeployment labeled for a CAPI cluster.
///
/// Exactly one must exist per cluster. Zero means the control-plane
/// reconciler hasn't created it yet; more than one is a misconfiguration.
/// Both cases surface as a lookup failure for the caller to retry.
pub async fn get_cluster_deployment(
    client: &Client,
    namespace: &str,
    capi_cluster_name: &str,
) -> Result<ClusterDeployment> {
    let api: Api<ClusterDeployment> = Api::namespaced(client.clone(), namespace);
    let lp =
        ListParams::default().labels(&format!("{CLUSTER_NAME_LABEL}={capi_cluster_name}"));
    let mut found = api.list(&lp).await?.items;
    if found.len() != 1 {
        return Err(Error::AmbiguousLookup {
            kind: "ClusterDeployment".to_string(),
            found: found.len(),
        });
    }
    Ok(found.remove(0))
}

/// List all objects of a kind carrying the cluster-name label.
pub async fn list_for_cluster<K>(
    client: &Client,
    namespace: &str,
    capi_cluster_name: &str,
) -> Result<Vec<K>>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let lp =
        ListParams::default().labels(&format!("{CLUSTER_NAME_LABEL}={capi_cluster_name}"));
    Ok(api.list(&lp).await?.items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::bootstrap_config::{OpenshiftAssistedConfig, OpenshiftAssistedConfigSpec};

    #[test]
    fn test_owner_of_kind_matches() {
        let mut config =
            OpenshiftAssistedConfig::new("cfg", OpenshiftAssistedConfigSpec::default());
        config.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "cluster.x-k8s.io/v1beta1".to_string(),
            kind: "Machine".to_string(),
            name: "machine-0".to_string(),
            uid: "uid-0".to_string(),
            controller: Some(true),
            block_owner_deletion: None,
        }]);

        assert_eq!(
            owner_of_kind(&config, "Machine").map(|r| r.name.as_str()),
            Some("machine-0")
        );
        assert!(owner_of_kind(&config, "MachineSet").is_none());
    }

    #[test]
    fn test_controller_reference_shape() {
        let mut config =
            OpenshiftAssistedConfig::new("cfg", OpenshiftAssistedConfigSpec::default());
        config.metadata.uid = Some("abc-123".to_string());

        let owner_ref = controller_reference(&config);
        assert_eq!(owner_ref.kind, "OpenshiftAssistedConfig");
        assert_eq!(owner_ref.api_version, "bootstrap.cluster.x-k8s.io/v1alpha1");
        assert_eq!(owner_ref.name, "cfg");
        assert_eq!(owner_ref.uid, "abc-123");
        assert_eq!(owner_ref.controller, Some(true));
    }
}
