//! Bootstrap reconciler for OpenshiftAssistedConfig
//!
//! Drives each bootstrap config to DataSecretAvailable=true: waits for the
//! cluster substrate, materializes the pool's InfraEnv, propagates the
//! discovery ISO into the metal3 layer, and publishes the CAPI data secret.
//! Deliberate waits use explicit requeue intervals; everything else leans
//! on the runtime's ambient backoff.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, PostParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher,
    },
    ResourceExt,
};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::assisted::ignition::user_data_ignition;
use crate::assisted::{build_infraenv, ignition_download_url, infraenv_name};
use crate::crd::agent_install::{Agent, InfraEnv};
use crate::crd::bootstrap_config::{
    OpenshiftAssistedConfig, OpenshiftAssistedConfigStatus, BOOTSTRAP_CONFIG_FINALIZER,
    CREATING_SECRET_FAILED_REASON, DATA_SECRET_AVAILABLE_CONDITION, INFRAENV_FAILED_REASON,
    PROPAGATING_LIVE_ISO_URL_FAILED_REASON, WAITING_FOR_ASSISTED_INSTALLER_REASON,
    WAITING_FOR_CLUSTER_INFRASTRUCTURE_REASON, WAITING_FOR_INSTALL_COMPLETE_REASON,
    WAITING_FOR_LIVE_ISO_URL_REASON,
};
use crate::crd::capi::Machine;
use crate::crd::hive::{AgentClusterInstall, ClusterDeployment};
use crate::crd::metal3::{Metal3Machine, Metal3MachineTemplate, LIVE_ISO_FORMAT};
use crate::crd::types::{Condition, ConditionSeverity, ObjectReference};
use crate::error::{Error, Result};
use crate::FIELD_MANAGER;

use super::conditions::{set_condition, summarize};
use super::owners::{
    controller_reference, get_cluster, get_cluster_deployment, get_machine_owner,
    get_owner_machine, MachineOwner,
};
use super::ControllerState;

/// Wait while the cluster substrate or the assisted service catches up.
const DEPENDENCY_REQUEUE: Duration = Duration::from_secs(20);

/// Wait for the day-2 path once the install has moved past host admission.
const INSTALL_COMPLETE_REQUEUE: Duration = Duration::from_secs(60);

/// Start the bootstrap config controller.
pub async fn run_bootstrap_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let configs: Api<OpenshiftAssistedConfig> = Api::all(client.clone());

    info!("Starting OpenshiftAssistedConfig controller");

    Controller::new(configs, watcher::Config::default())
        .owns::<InfraEnv>(Api::all(client.clone()), watcher::Config::default())
        .owns::<Secret>(Api::all(client.clone()), watcher::Config::default())
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

#[instrument(skip(ctx), fields(name = %config.name_any(), namespace = config.namespace()))]
async fn reconcile(
    config: Arc<OpenshiftAssistedConfig>,
    ctx: Arc<ControllerState>,
) -> Result<Action> {
    let namespace = config.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<OpenshiftAssistedConfig> = Api::namespaced(ctx.client.clone(), &namespace);

    let ctx = ctx.clone();
    finalizer(&api, BOOTSTRAP_CONFIG_FINALIZER, config, |event| async {
        match event {
            FinalizerEvent::Apply(config) => apply_config(&ctx, &config).await,
            FinalizerEvent::Cleanup(config) => cleanup_config(&ctx, &config).await,
        }
    })
    .await
    .map_err(Error::from)
}

/// A blocking admission outcome: the condition to record and how long to
/// wait. `requeue: None` waits for the next watch event instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct Blocked {
    pub reason: &'static str,
    pub severity: ConditionSeverity,
    pub message: &'static str,
    pub requeue: Option<Duration>,
}

/// Outcome of the admission gates, decided purely from the observed graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) enum GateDecision {
    /// No owning Machine yet; no condition is recorded, the next watch
    /// event re-triggers.
    AwaitOwner,
    Hold(Blocked),
    Proceed,
}

/// The ordered admission gates a bootstrap config passes before any object
/// is created: owner set, cluster substrate ready, installer objects
/// materialized, install still admitting this machine.
pub(super) fn admission_gate(
    machine: Option<&Machine>,
    infrastructure_ready: bool,
    cluster_deployment_found: bool,
    install: Option<&AgentClusterInstall>,
) -> GateDecision {
    let Some(machine) = machine else {
        return GateDecision::AwaitOwner;
    };
    if !infrastructure_ready {
        return GateDecision::Hold(Blocked {
            reason: WAITING_FOR_CLUSTER_INFRASTRUCTURE_REASON,
            severity: ConditionSeverity::Info,
            message: "cluster infrastructure is not ready",
            requeue: Some(DEPENDENCY_REQUEUE),
        });
    }
    if !cluster_deployment_found {
        return GateDecision::Hold(Blocked {
            reason: WAITING_FOR_ASSISTED_INSTALLER_REASON,
            severity: ConditionSeverity::Info,
            message: "cluster deployment is not created yet",
            requeue: Some(DEPENDENCY_REQUEUE),
        });
    }
    let Some(install) = install else {
        return GateDecision::Hold(Blocked {
            reason: WAITING_FOR_ASSISTED_INSTALLER_REASON,
            severity: ConditionSeverity::Info,
            message: "agent cluster install is not created yet",
            requeue: Some(DEPENDENCY_REQUEUE),
        });
    };
    // Workers arriving after the install stopped accepting hosts must join
    // through the day-2 path instead.
    if day2_blocked(machine, install) {
        return GateDecision::Hold(Blocked {
            reason: WAITING_FOR_INSTALL_COMPLETE_REASON,
            severity: ConditionSeverity::Info,
            message: "install has progressed past host admission; worker must join as day-2 host",
            requeue: Some(INSTALL_COMPLETE_REQUEUE),
        });
    }
    GateDecision::Proceed
}

/// Gate on the discovery ISO. Holds without a requeue: the InfraEnv watch
/// re-triggers once the image is generated.
pub(super) fn iso_hold(iso_download_url: Option<&str>) -> Option<Blocked> {
    match iso_download_url {
        Some(url) if !url.is_empty() => None,
        _ => Some(Blocked {
            reason: WAITING_FOR_LIVE_ISO_URL_REASON,
            severity: ConditionSeverity::Info,
            message: "discovery ISO is not generated yet",
            requeue: None,
        }),
    }
}

async fn apply_config(ctx: &ControllerState, config: &OpenshiftAssistedConfig) -> Result<Action> {
    let client = &ctx.client;
    let namespace = config.namespace().unwrap_or_else(|| "default".to_string());

    // Each fetch tolerates its dependency being absent; the gate decides
    // what the combination means.
    let machine = get_owner_machine(client, config).await?;
    let infrastructure_ready = match machine.as_ref() {
        Some(machine) => get_cluster(client, machine)
            .await?
            .status
            .map(|s| s.infrastructure_ready)
            .unwrap_or(false),
        None => false,
    };
    let cluster_deployment = match machine.as_ref() {
        Some(machine) if infrastructure_ready => {
            match get_cluster_deployment(client, &namespace, &machine.spec.cluster_name).await {
                Ok(cd) => Some(cd),
                Err(Error::AmbiguousLookup { found: 0, .. }) => None,
                Err(e) => return Err(e),
            }
        }
        _ => None,
    };
    let install = match cluster_deployment.as_ref() {
        Some(cd) => get_agent_cluster_install(client, cd).await?,
        None => None,
    };

    match admission_gate(
        machine.as_ref(),
        infrastructure_ready,
        cluster_deployment.is_some(),
        install.as_ref(),
    ) {
        GateDecision::AwaitOwner => {
            debug!("bootstrap config has no owning machine yet");
            return Ok(Action::await_change());
        }
        GateDecision::Hold(block) => {
            hold(client, config, block.reason, block.severity, block.message).await?;
            return Ok(match block.requeue {
                Some(after) => Action::requeue(after),
                None => Action::await_change(),
            });
        }
        GateDecision::Proceed => {}
    }
    let (Some(machine), Some(cluster_deployment)) = (machine, cluster_deployment) else {
        return Ok(Action::await_change());
    };

    let infraenv = match ensure_infraenv(client, config, &cluster_deployment).await {
        Ok(infraenv) => infraenv,
        Err(e) => {
            hold(
                client,
                config,
                INFRAENV_FAILED_REASON,
                ConditionSeverity::Error,
                &e.to_string(),
            )
            .await?;
            return Err(e);
        }
    };

    let mut status = config.status.clone().unwrap_or_default();
    if status.infra_env_ref.is_none() {
        status.infra_env_ref = Some(ObjectReference::new(
            &infraenv.name_any(),
            infraenv.namespace().as_deref().unwrap_or(&namespace),
        ));
    }

    let iso_url = infraenv
        .status
        .as_ref()
        .and_then(|s| s.iso_download_url.as_deref());
    if let Some(block) = iso_hold(iso_url) {
        // The local status keeps the infraEnvRef recorded above.
        set_condition(
            &mut status.conditions,
            Condition::false_(
                DATA_SECRET_AVAILABLE_CONDITION,
                block.reason,
                block.severity,
                block.message,
            ),
        );
        summarize(&mut status.conditions);
        patch_status(client, config, &status).await?;
        return Ok(Action::await_change());
    }
    let iso_url = iso_url.unwrap_or_default().to_string();
    status.iso_download_url = Some(iso_url.clone());

    if let Err(e) = propagate_live_iso(client, &machine, &iso_url).await {
        hold(
            client,
            config,
            PROPAGATING_LIVE_ISO_URL_FAILED_REASON,
            ConditionSeverity::Error,
            &e.to_string(),
        )
        .await?;
        return Err(e);
    }

    // The data secret points hosts at the discovery ignition, which is
    // only addressable once the assisted service has published the
    // InfraEnv's events URL.
    let ignition_url = match ignition_download_url(&ctx.service_config, &infraenv) {
        Ok(url) => url,
        Err(Error::ConfigError(message)) => {
            hold(
                client,
                config,
                WAITING_FOR_ASSISTED_INSTALLER_REASON,
                ConditionSeverity::Info,
                &message,
            )
            .await?;
            return Ok(Action::requeue(DEPENDENCY_REQUEUE));
        }
        Err(e) => return Err(e),
    };

    let secret_name = match ensure_data_secret(client, config, &ignition_url).await {
        Ok(name) => name,
        Err(e) => {
            hold(
                client,
                config,
                CREATING_SECRET_FAILED_REASON,
                ConditionSeverity::Error,
                &e.to_string(),
            )
            .await?;
            return Err(e);
        }
    };

    status.data_secret_name = Some(secret_name);
    status.ready = true;
    status.observed_generation = config.metadata.generation;
    set_condition(
        &mut status.conditions,
        Condition::true_(DATA_SECRET_AVAILABLE_CONDITION),
    );
    summarize(&mut status.conditions);
    patch_status(client, config, &status).await?;

    Ok(Action::await_change())
}

/// Whether a worker's bootstrap must divert to the day-2 path.
pub(super) fn day2_blocked(machine: &Machine, install: &AgentClusterInstall) -> bool {
    !machine.is_control_plane() && !install.accepts_new_hosts()
}

/// Whether deleting this config would strip a live control plane of its
/// credential object.
pub(super) fn deletion_refused(
    config: &OpenshiftAssistedConfig,
    owner_machine: Option<&Machine>,
) -> bool {
    config.is_control_plane()
        && owner_machine
            .map(|m| m.metadata.deletion_timestamp.is_none())
            .unwrap_or(false)
}

/// Deletion path. A control-plane config is the credential object of a live
/// control plane; deleting it while its machine survives is refused.
async fn cleanup_config(ctx: &ControllerState, config: &OpenshiftAssistedConfig) -> Result<Action> {
    let client = &ctx.client;
    let namespace = config.namespace().unwrap_or_else(|| "default".to_string());

    let owner_machine = get_owner_machine(client, config).await?;
    if deletion_refused(config, owner_machine.as_ref()) {
        warn!(
            "refusing to delete bootstrap config {} for a live control-plane machine",
            config.name_any()
        );
        return Err(Error::ControlPlaneProtected);
    }

    if let Some(agent_ref) = config.status.as_ref().and_then(|s| s.agent_ref.as_ref()) {
        let agents: Api<Agent> = Api::namespaced(client.clone(), &namespace);
        match agents.delete(&agent_ref.name, &Default::default()).await {
            Ok(_) => info!("deleted agent {} for {}", agent_ref.name, config.name_any()),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(Action::await_change())
}

async fn get_agent_cluster_install(
    client: &Client,
    cluster_deployment: &ClusterDeployment,
) -> Result<Option<AgentClusterInstall>> {
    let Some(install_ref) = cluster_deployment.spec.cluster_install_ref.as_ref() else {
        return Ok(None);
    };
    let namespace = cluster_deployment.namespace().unwrap_or_default();
    let api: Api<AgentClusterInstall> = Api::namespaced(client.clone(), &namespace);
    match api.get(&install_ref.name).await {
        Ok(install) => Ok(Some(install)),
        Err(e) if is_not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Create the pool's InfraEnv if absent. Concurrent reconciles of machines
/// in the same pool race on creation; losing the race is success.
async fn ensure_infraenv(
    client: &Client,
    config: &OpenshiftAssistedConfig,
    cluster_deployment: &ClusterDeployment,
) -> Result<InfraEnv> {
    let name = infraenv_name(&config.labels_or_default())?;
    let namespace = config.namespace().unwrap_or_default();
    let api: Api<InfraEnv> = Api::namespaced(client.clone(), &namespace);

    let mut infraenv = build_infraenv(&name, config, cluster_deployment);
    infraenv.metadata.owner_references = Some(vec![controller_reference(config)]);

    match api.create(&PostParams::default(), &infraenv).await {
        Ok(created) => Ok(created),
        Err(e) if is_already_exists(&e) => Ok(api.get(&name).await?),
        Err(e) => Err(e.into()),
    }
}

/// Push the discovery ISO URL into the metal3 layer: always the machine
/// template (future machines), and the live Metal3Machine when it already
/// exists.
async fn propagate_live_iso(client: &Client, machine: &Machine, iso_url: &str) -> Result<()> {
    let namespace = machine.namespace().unwrap_or_default();

    let template_ref = match get_machine_owner(client, machine).await? {
        MachineOwner::ControlPlane(acp) => acp.spec.machine_template.infrastructure_ref.clone(),
        MachineOwner::MachineSet(ms) => ms.spec.template.spec.infrastructure_ref.clone(),
    };
    let template_ns = template_ref.namespace.as_deref().unwrap_or(&namespace);
    let templates: Api<Metal3MachineTemplate> = Api::namespaced(client.clone(), template_ns);
    let image = json!({
        "url": iso_url,
        "diskFormat": LIVE_ISO_FORMAT,
    });
    templates
        .patch(
            &template_ref.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&json!({
                "spec": { "template": { "spec": { "image": image } } }
            })),
        )
        .await?;

    let instance_ref = &machine.spec.infrastructure_ref;
    if instance_ref.name.is_empty() {
        return Ok(());
    }
    let instance_ns = instance_ref.namespace.as_deref().unwrap_or(&namespace);
    let machines: Api<Metal3Machine> = Api::namespaced(client.clone(), instance_ns);
    match machines.get(&instance_ref.name).await {
        Ok(m3m) => {
            let already = m3m
                .spec
                .image
                .as_ref()
                .map(|i| i.is_live_iso(iso_url))
                .unwrap_or(false);
            if !already {
                machines
                    .patch(
                        &instance_ref.name,
                        &PatchParams::apply(FIELD_MANAGER),
                        &Patch::Merge(&json!({ "spec": { "image": image } })),
                    )
                    .await?;
            }
            Ok(())
        }
        // Machine infrastructure not instantiated yet; the template covers it.
        Err(e) if is_not_found(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// The CAPI data secret for a machine: a pointer ignition that merges the
/// discovery ignition served by the assisted service.
pub(super) fn data_secret(
    config: &OpenshiftAssistedConfig,
    ignition_url: &str,
) -> Result<Secret> {
    let user_data = user_data_ignition(ignition_url)?;
    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(config.name_any()),
            namespace: config.namespace(),
            labels: config.metadata.labels.clone(),
            owner_references: Some(vec![controller_reference(config)]),
            ..Default::default()
        },
        type_: Some("cluster.x-k8s.io/secret".to_string()),
        string_data: Some(
            [
                ("format".to_string(), "ignition".to_string()),
                ("value".to_string(), user_data),
            ]
            .into(),
        ),
        ..Default::default()
    })
}

async fn ensure_data_secret(
    client: &Client,
    config: &OpenshiftAssistedConfig,
    ignition_url: &str,
) -> Result<String> {
    let namespace = config.namespace().unwrap_or_default();
    let secret = data_secret(config, ignition_url)?;
    let name = config.name_any();

    let secrets: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    match secrets.create(&PostParams::default(), &secret).await {
        Ok(_) => Ok(name),
        Err(e) if is_already_exists(&e) => Ok(name),
        Err(e) => Err(e.into()),
    }
}

/// Record a blocking condition on the config without flipping readiness.
async fn hold(
    client: &Client,
    config: &OpenshiftAssistedConfig,
    reason: &str,
    severity: ConditionSeverity,
    message: &str,
) -> Result<()> {
    let mut status = config.status.clone().unwrap_or_default();
    set_condition(
        &mut status.conditions,
        Condition::false_(DATA_SECRET_AVAILABLE_CONDITION, reason, severity, message),
    );
    summarize(&mut status.conditions);
    patch_status(client, config, &status).await
}

async fn patch_status(
    client: &Client,
    config: &OpenshiftAssistedConfig,
    status: &OpenshiftAssistedConfigStatus,
) -> Result<()> {
    let namespace = config.namespace().unwrap_or_default();
    let api: Api<OpenshiftAssistedConfig> = Api::namespaced(client.clone(), &namespace);
    api.patch_status(
        &config.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&json!({ "status": status })),
    )
    .await?;
    Ok(())
}

pub(super) fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

pub(super) fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

fn error_policy(
    config: Arc<OpenshiftAssistedConfig>,
    error: &Error,
    _ctx: Arc<ControllerState>,
) -> Action {
    error!(
        "Reconciliation error for {}: {:?}",
        config.name_any(),
        error
    );

    let retry = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };
    Action::requeue(retry)
}
