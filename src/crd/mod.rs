//! Custom Resource Definitions and partial foreign resource types
//!
//! Two CRDs are owned by this operator (OpenshiftAssistedConfig and
//! OpenshiftAssistedControlPlane). Everything else is a partial typed view
//! of a resource owned by CAPI core, hive, the assisted service, or metal3.

pub mod agent_install;
pub mod bootstrap_config;
pub mod capi;
pub mod control_plane;
pub mod hive;
pub mod metal3;
pub mod types;

pub use agent_install::{
    Agent, AgentSpec, AgentStatus, HostInterface, HostInventory, InfraEnv, InfraEnvSpec,
    InfraEnvStatus, HOST_ROLE_MASTER, HOST_ROLE_WORKER,
};
pub use bootstrap_config::{
    OpenshiftAssistedConfig, OpenshiftAssistedConfigSpec, OpenshiftAssistedConfigStatus,
};
pub use capi::{Cluster, ClusterStatus, Machine, MachineSet, MachineSpec};
pub use control_plane::{
    OpenshiftAssistedControlPlane, OpenshiftAssistedControlPlaneSpec,
    OpenshiftAssistedControlPlaneStatus,
};
pub use hive::{AgentClusterInstall, ClusterDeployment, ClusterDeploymentSpec};
pub use metal3::{BareMetalHost, Metal3Machine, Metal3MachineTemplate, LIVE_ISO_FORMAT};
pub use types::{
    Condition, ConditionSeverity, ConditionStatus, LocalObjectReference, ObjectReference,
};
