//! Tests for the agent adoption join logic

use std::collections::BTreeMap;

use super::agent::{desired_adoption, find_claiming_machine, find_matching_host};
use crate::crd::agent_install::{HOST_ROLE_MASTER, HOST_ROLE_WORKER};
use crate::crd::bootstrap_config::{OpenshiftAssistedConfig, OpenshiftAssistedConfigSpec};
use crate::crd::capi::{Machine, MachineSpec};
use crate::crd::metal3::{BareMetalHost, BareMetalHostSpec, Metal3Machine, Metal3MachineSpec};
use crate::{BAREMETAL_HOST_ANNOTATION, CONTROL_PLANE_LABEL, METAL3_UUID_LABEL};

fn host(name: &str, boot_mac: Option<&str>) -> BareMetalHost {
    let mut host = BareMetalHost::new(
        name,
        BareMetalHostSpec {
            boot_mac_address: boot_mac.map(str::to_string),
        },
    );
    host.metadata.namespace = Some("metal".to_string());
    host.metadata.uid = Some(format!("uid-{name}"));
    host
}

fn metal3_machine(name: &str, claimed_host: Option<&str>) -> Metal3Machine {
    let mut m3m = Metal3Machine::new(name, Metal3MachineSpec::default());
    m3m.metadata.namespace = Some("clusters".to_string());
    if let Some(key) = claimed_host {
        m3m.metadata.annotations = Some(BTreeMap::from([(
            BAREMETAL_HOST_ANNOTATION.to_string(),
            key.to_string(),
        )]));
    }
    m3m
}

fn machine(control_plane: bool) -> Machine {
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
    machine
}

#[test]
fn test_mac_matching_is_case_insensitive() {
    let hosts = vec![
        host("other", Some("AA:BB:CC:00:11:22")),
        host("target", Some("00-B0-D0-63-C2-26")),
    ];
    let matched = find_matching_host(&hosts, &["00-b0-d0-63-c2-26"]).unwrap();
    assert_eq!(matched.metadata.name.as_deref(), Some("target"));
}

#[test]
fn test_no_matching_host() {
    let hosts = vec![host("h1", Some("aa:aa:aa:aa:aa:aa")), host("h2", None)];
    assert!(find_matching_host(&hosts, &["bb:bb:bb:bb:bb:bb"]).is_none());
    assert!(find_matching_host(&hosts, &[]).is_none());
}

#[test]
fn test_claiming_machine_must_be_unique() {
    let machines = vec![
        metal3_machine("m1", Some("metal/h1")),
        metal3_machine("m2", None),
    ];
    let claimed = find_claiming_machine(&machines, "metal/h1").unwrap();
    assert_eq!(claimed.metadata.name.as_deref(), Some("m1"));

    let err = find_claiming_machine(&machines, "metal/h2").unwrap_err();
    assert!(err.to_string().contains("found 2 metal3 machines"));

    let duplicated = vec![
        metal3_machine("m1", Some("metal/h1")),
        metal3_machine("m2", Some("metal/h1")),
    ];
    assert!(find_claiming_machine(&duplicated, "metal/h1").is_err());
}

#[test]
fn test_adoption_assigns_role_by_machine_kind() {
    let config = OpenshiftAssistedConfig::new("cfg", OpenshiftAssistedConfigSpec::default());
    let bmh = host("h1", Some("aa:aa:aa:aa:aa:aa"));

    let master = desired_adoption(&machine(true), &config, &bmh).unwrap();
    assert_eq!(master["spec"]["role"], HOST_ROLE_MASTER);
    assert_eq!(master["spec"]["approved"], true);

    let worker = desired_adoption(&machine(false), &config, &bmh).unwrap();
    assert_eq!(worker["spec"]["role"], HOST_ROLE_WORKER);
}

#[test]
fn test_adoption_sets_uuid_node_label() {
    let config = OpenshiftAssistedConfig::new("cfg", OpenshiftAssistedConfigSpec::default());
    let bmh = host("h1", Some("aa:aa:aa:aa:aa:aa"));

    let patch = desired_adoption(&machine(false), &config, &bmh).unwrap();
    assert_eq!(patch["spec"]["nodeLabels"][METAL3_UUID_LABEL], "uid-h1");
}

#[test]
fn test_adoption_is_idempotent() {
    let mut spec = OpenshiftAssistedConfigSpec::default();
    spec.node_registration.kubelet_extra_labels = vec!["pool=a".to_string()];
    let config = OpenshiftAssistedConfig::new("cfg", spec);
    let bmh = host("h1", Some("aa:aa:aa:aa:aa:aa"));
    let machine = machine(true);

    let first = desired_adoption(&machine, &config, &bmh).unwrap();
    let second = desired_adoption(&machine, &config, &bmh).unwrap();
    assert_eq!(first, second);
}
