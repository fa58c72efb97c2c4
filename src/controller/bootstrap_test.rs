//! Tests for the bootstrap gating and data-secret construction

use std::collections::BTreeMap;
use std::time::Duration;

use super::bootstrap::{
    admission_gate, data_secret, day2_blocked, deletion_refused, iso_hold, GateDecision,
};
use crate::crd::bootstrap_config::{
    OpenshiftAssistedConfig, OpenshiftAssistedConfigSpec, WAITING_FOR_ASSISTED_INSTALLER_REASON,
    WAITING_FOR_CLUSTER_INFRASTRUCTURE_REASON, WAITING_FOR_INSTALL_COMPLETE_REASON,
    WAITING_FOR_LIVE_ISO_URL_REASON,
};
use crate::crd::capi::{Machine, MachineSpec};
use crate::crd::hive::{
    AgentClusterInstall, AgentClusterInstallDebugInfo, AgentClusterInstallSpec,
    AgentClusterInstallStatus,
};
use crate::CONTROL_PLANE_LABEL;

fn machine(control_plane: bool, deleting: bool) -> Machine {
    let mut machine = Machine::new(
        "machine-0",
        MachineSpec {
            cluster_name: "c1".to_string(),
            ..Default::default()
        },
    );
    machine.metadata.namespace = Some("clusters".to_string());
    if control_plane {
        machine.metadata.labels = Some(BTreeMap::from([(
            CONTROL_PLANE_LABEL.to_string(),
            String::new(),
        )]));
    }
    if deleting {
        machine.metadata.deletion_timestamp = Some(
            k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
        );
    }
    machine
}

fn install_in_state(state: &str) -> AgentClusterInstall {
    let mut install = AgentClusterInstall::new("install", AgentClusterInstallSpec::default());
    install.status = Some(AgentClusterInstallStatus {
        debug_info: AgentClusterInstallDebugInfo {
            state: state.to_string(),
            events_url: None,
        },
    });
    install
}

fn config(control_plane: bool) -> OpenshiftAssistedConfig {
    let mut config = OpenshiftAssistedConfig::new("cfg", OpenshiftAssistedConfigSpec::default());
    config.metadata.namespace = Some("clusters".to_string());
    if control_plane {
        config.metadata.labels = Some(BTreeMap::from([(
            CONTROL_PLANE_LABEL.to_string(),
            String::new(),
        )]));
    }
    config
}

fn blocked_reason(decision: &GateDecision) -> (&'static str, Option<Duration>) {
    match decision {
        GateDecision::Hold(block) => (block.reason, block.requeue),
        other => panic!("expected a hold, got {other:?}"),
    }
}

#[test]
fn test_gate_waits_for_missing_owner_without_condition() {
    // No owning Machine yet: no error, no condition, next watch event
    // re-triggers.
    assert_eq!(
        admission_gate(None, false, false, None),
        GateDecision::AwaitOwner
    );
}

#[test]
fn test_gate_holds_until_infrastructure_ready() {
    let machine = machine(true, false);
    let (reason, requeue) = blocked_reason(&admission_gate(Some(&machine), false, false, None));
    assert_eq!(reason, WAITING_FOR_CLUSTER_INFRASTRUCTURE_REASON);
    assert_eq!(requeue, Some(Duration::from_secs(20)));
}

#[test]
fn test_gate_waits_for_installer_objects() {
    let machine = machine(true, false);

    // No ClusterDeployment yet.
    let (reason, requeue) = blocked_reason(&admission_gate(Some(&machine), true, false, None));
    assert_eq!(reason, WAITING_FOR_ASSISTED_INSTALLER_REASON);
    assert_eq!(requeue, Some(Duration::from_secs(20)));

    // ClusterDeployment present but its AgentClusterInstall is not.
    let (reason, requeue) = blocked_reason(&admission_gate(Some(&machine), true, true, None));
    assert_eq!(reason, WAITING_FOR_ASSISTED_INSTALLER_REASON);
    assert_eq!(requeue, Some(Duration::from_secs(20)));
}

#[test]
fn test_gate_diverts_day2_workers_with_long_requeue() {
    let worker = machine(false, false);
    let install = install_in_state("installed");
    let (reason, requeue) =
        blocked_reason(&admission_gate(Some(&worker), true, true, Some(&install)));
    assert_eq!(reason, WAITING_FOR_INSTALL_COMPLETE_REASON);
    assert_eq!(requeue, Some(Duration::from_secs(60)));

    let control_plane = machine(true, false);
    assert_eq!(
        admission_gate(Some(&control_plane), true, true, Some(&install)),
        GateDecision::Proceed
    );
}

#[test]
fn test_gate_proceeds_when_graph_is_wired() {
    let worker = machine(false, false);
    let install = install_in_state("adding-hosts");
    assert_eq!(
        admission_gate(Some(&worker), true, true, Some(&install)),
        GateDecision::Proceed
    );
}

#[test]
fn test_missing_iso_url_holds_without_requeue() {
    for url in [None, Some("")] {
        let block = iso_hold(url).expect("expected a hold");
        assert_eq!(block.reason, WAITING_FOR_LIVE_ISO_URL_REASON);
        assert_eq!(block.requeue, None);
    }
    assert!(iso_hold(Some("https://assisted.example.com/images/1.iso")).is_none());
}

#[test]
fn test_day2_gate_blocks_late_workers() {
    // Installed clusters no longer admit day-1 workers.
    assert!(day2_blocked(&machine(false, false), &install_in_state("installing")));
    assert!(day2_blocked(&machine(false, false), &install_in_state("installed")));
    assert!(day2_blocked(&machine(false, false), &install_in_state("finalizing")));
}

#[test]
fn test_day2_gate_never_blocks_control_plane() {
    assert!(!day2_blocked(&machine(true, false), &install_in_state("installed")));
}

#[test]
fn test_day2_gate_allows_admitting_phases() {
    for state in ["adding-hosts", "pending-for-input", "insufficient", ""] {
        assert!(
            !day2_blocked(&machine(false, false), &install_in_state(state)),
            "state {state:?}"
        );
    }
}

#[test]
fn test_deletion_refused_for_live_control_plane() {
    assert!(deletion_refused(&config(true), Some(&machine(true, false))));
}

#[test]
fn test_deletion_allowed_when_machine_also_deleting() {
    assert!(!deletion_refused(&config(true), Some(&machine(true, true))));
}

#[test]
fn test_deletion_allowed_for_workers_and_orphans() {
    assert!(!deletion_refused(&config(false), Some(&machine(false, false))));
    assert!(!deletion_refused(&config(true), None));
}

#[test]
fn test_data_secret_shape() {
    let url = "https://assisted.example.com/api/assisted-install/v2/infra-envs/1/downloads/files";
    let secret = data_secret(&config(true), url).unwrap();

    assert_eq!(secret.metadata.name.as_deref(), Some("cfg"));
    assert_eq!(secret.metadata.namespace.as_deref(), Some("clusters"));
    assert_eq!(secret.type_.as_deref(), Some("cluster.x-k8s.io/secret"));

    let owner = &secret.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!(owner.kind, "OpenshiftAssistedConfig");

    let data = secret.string_data.as_ref().unwrap();
    assert_eq!(data.get("format").map(String::as_str), Some("ignition"));
    assert!(data.get("value").unwrap().contains(url));
}
