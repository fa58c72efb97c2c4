//! Agent-adoption reconciler
//!
//! Joins four independently-updated collections: a discovered Agent, the
//! BareMetalHost it booted on (matched by MAC), the Metal3Machine that
//! claimed the host, and the CAPI Machine owning it. None of the four is
//! updated transactionally, so every edge tolerates staleness by erroring
//! into the ambient retry until the graph converges.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher,
    },
    ResourceExt,
};
use serde_json::json;
use tracing::{debug, error, info, instrument};

use crate::assisted::bootstrap_overrides;
use crate::crd::agent_install::{Agent, HOST_ROLE_MASTER, HOST_ROLE_WORKER};
use crate::crd::bootstrap_config::OpenshiftAssistedConfig;
use crate::crd::capi::Machine;
use crate::crd::hive::ClusterDeployment;
use crate::crd::metal3::{BareMetalHost, Metal3Machine};
use crate::error::{Error, Result};
use crate::{CLUSTER_NAME_LABEL, FIELD_MANAGER, METAL3_UUID_LABEL};

use super::bootstrap::is_not_found;
use super::owners::{get_owner_machine, list_for_cluster};
use super::ControllerState;

/// Wait for a freshly booted host to post its inventory.
const INVENTORY_REQUEUE: Duration = Duration::from_secs(20);

/// Start the agent adoption controller.
pub async fn run_agent_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let agents: Api<Agent> = Api::all(client);

    info!("Starting Agent adoption controller");

    Controller::new(agents, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip(ctx), fields(name = %agent.name_any(), namespace = agent.namespace()))]
async fn reconcile(agent: Arc<Agent>, ctx: Arc<ControllerState>) -> Result<Action> {
    let client = &ctx.client;

    // Agents referencing a deployment we don't manage are not ours to touch.
    let Some(cd_ref) = agent.spec.cluster_deployment_name.as_ref() else {
        return Ok(Action::await_change());
    };
    let cd_namespace = cd_ref
        .namespace
        .clone()
        .or_else(|| agent.namespace())
        .unwrap_or_default();
    let deployments: Api<ClusterDeployment> = Api::namespaced(client.clone(), &cd_namespace);
    let cluster_deployment = match deployments.get(&cd_ref.name).await {
        Ok(cd) => cd,
        Err(e) if is_not_found(&e) => return Ok(Action::await_change()),
        Err(e) => return Err(e.into()),
    };

    // A managed deployment always carries the cluster-name label; its
    // absence is a misconfiguration, not a wait.
    let cluster_name = cluster_deployment
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(CLUSTER_NAME_LABEL))
        .cloned()
        .ok_or_else(|| Error::MissingLabel {
            label: CLUSTER_NAME_LABEL.to_string(),
            kind: "ClusterDeployment".to_string(),
            name: cluster_deployment.name_any(),
        })?;

    // Existence guard: never adopt hosts into a cluster this provider has
    // no bootstrap configs for.
    let configs: Vec<OpenshiftAssistedConfig> =
        list_for_cluster(client, &cd_namespace, &cluster_name).await?;
    if configs.is_empty() {
        return Err(Error::LookupFailed(format!(
            "no bootstrap configs found for cluster {cluster_name}"
        )));
    }

    let macs = agent.interface_macs();
    if macs.is_empty() {
        debug!("agent has not reported inventory yet");
        return Ok(Action::requeue(INVENTORY_REQUEUE));
    }

    let hosts: Api<BareMetalHost> = Api::all(client.clone());
    let all_hosts = hosts.list(&ListParams::default()).await?.items;
    let host = find_matching_host(&all_hosts, &macs).ok_or_else(|| {
        Error::LookupFailed(format!(
            "no bare metal host matches any interface of agent {}/{}",
            agent.namespace().unwrap_or_default(),
            agent.name_any()
        ))
    })?;
    let host_key = format!(
        "{}/{}",
        host.namespace().unwrap_or_default(),
        host.name_any()
    );

    let metal3_machines: Api<Metal3Machine> = Api::all(client.clone());
    let all_m3m = metal3_machines.list(&ListParams::default()).await?.items;
    let metal3_machine = find_claiming_machine(&all_m3m, &host_key)?;

    let machine = get_owner_machine(client, metal3_machine)
        .await?
        .ok_or_else(|| {
            Error::LookupFailed(format!(
                "metal3 machine {}/{} has no owning machine",
                metal3_machine.namespace().unwrap_or_default(),
                metal3_machine.name_any()
            ))
        })?;

    let config_ref = machine
        .spec
        .bootstrap
        .config_ref
        .as_ref()
        .ok_or_else(|| {
            Error::LookupFailed(format!(
                "machine {}/{} does not have any bootstrap config ref",
                machine.namespace().unwrap_or_default(),
                machine.name_any()
            ))
        })?;
    let config_ns = config_ref
        .namespace
        .clone()
        .or_else(|| machine.namespace())
        .unwrap_or_default();
    let config_api: Api<OpenshiftAssistedConfig> = Api::namespaced(client.clone(), &config_ns);
    let config = config_api.get(&config_ref.name).await?;

    adopt(client, &agent, &machine, &config, host).await?;

    Ok(Action::await_change())
}

/// The BareMetalHost whose boot MAC matches any of the agent's interface
/// MACs, case-insensitively.
pub(super) fn find_matching_host<'a>(
    hosts: &'a [BareMetalHost],
    agent_macs: &[&str],
) -> Option<&'a BareMetalHost> {
    hosts.iter().find(|host| {
        host.spec
            .boot_mac_address
            .as_deref()
            .map(|boot_mac| {
                agent_macs
                    .iter()
                    .any(|mac| mac.eq_ignore_ascii_case(boot_mac))
            })
            .unwrap_or(false)
    })
}

/// The unique Metal3Machine annotated as having claimed the host.
pub(super) fn find_claiming_machine<'a>(
    machines: &'a [Metal3Machine],
    host_key: &str,
) -> Result<&'a Metal3Machine> {
    let matching: Vec<&Metal3Machine> = machines
        .iter()
        .filter(|m| m.host_annotation() == Some(host_key))
        .collect();
    match matching.as_slice() {
        [one] => Ok(one),
        _ => Err(Error::LookupFailed(format!(
            "found {} metal3 machines, none uniquely matching bare metal host {}",
            machines.len(),
            host_key
        ))),
    }
}

/// The agent spec fields adoption converges on. Pure, so repeated
/// reconciles of the same quadruple produce identical output.
pub(super) fn desired_adoption(
    machine: &Machine,
    config: &OpenshiftAssistedConfig,
    host: &BareMetalHost,
) -> Result<serde_json::Value> {
    let role = if machine.is_control_plane() {
        HOST_ROLE_MASTER
    } else {
        HOST_ROLE_WORKER
    };
    let overrides = bootstrap_overrides(&config.spec.node_registration.kubelet_extra_labels)?;
    let host_uid = host.metadata.uid.clone().unwrap_or_default();

    Ok(json!({
        "spec": {
            "approved": true,
            "role": role,
            "ignitionConfigOverrides": overrides,
            "nodeLabels": { METAL3_UUID_LABEL: host_uid },
        }
    }))
}

async fn adopt(
    client: &Client,
    agent: &Agent,
    machine: &Machine,
    config: &OpenshiftAssistedConfig,
    host: &BareMetalHost,
) -> Result<()> {
    let patch = desired_adoption(machine, config, host)?;
    let namespace = agent.namespace().unwrap_or_default();
    let agents: Api<Agent> = Api::namespaced(client.clone(), &namespace);
    agents
        .patch(
            &agent.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

    // Record the adopted agent so the bootstrap deletion path can tear it
    // down with the config.
    let config_ns = config.namespace().unwrap_or_default();
    let configs: Api<OpenshiftAssistedConfig> = Api::namespaced(client.clone(), &config_ns);
    configs
        .patch_status(
            &config.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&json!({
                "status": { "agentRef": { "name": agent.name_any() } }
            })),
        )
        .await?;

    info!(
        "adopted agent {} for machine {} as {}",
        agent.name_any(),
        machine.name_any(),
        if machine.is_control_plane() { HOST_ROLE_MASTER } else { HOST_ROLE_WORKER }
    );
    Ok(())
}

fn error_policy(agent: Arc<Agent>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    error!(
        "Reconciliation error for {}: {:?}",
        agent.name_any(),
        error
    );

    let retry = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };
    Action::requeue(retry)
}
