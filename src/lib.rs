//! Assisted CAPI Operator: Cluster API provider for assisted OpenShift installation
//!
//! This crate bridges three control loops: the CAPI machine/cluster
//! lifecycle, the assisted-install service's cluster/host state machine, and
//! bare-metal host provisioning. It also rotates the workload cluster's
//! kubeconfig client certificate via CSRs, never holding a CA key.

pub mod assisted;
pub mod controller;
pub mod crd;
pub mod error;
pub mod kubeconfig;
pub mod upgrade;
pub mod workload;

pub use crate::error::{Error, Result};

/// Label CAPI stamps on every object belonging to a cluster.
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Marker label carried by control-plane machines and their derived objects.
pub const CONTROL_PLANE_LABEL: &str = "cluster.x-k8s.io/control-plane";

/// Label carrying the MachineDeployment a worker machine belongs to.
pub const MACHINE_DEPLOYMENT_NAME_LABEL: &str = "cluster.x-k8s.io/deployment-name";

/// Watch-filter label consulted by the kubeconfig rotation controller.
pub const WATCH_FILTER_LABEL: &str = "cluster.x-k8s.io/watch-filter";

/// Sentinel value of [`WATCH_FILTER_LABEL`] marking rotatable kubeconfigs.
pub const CONTROL_PLANE_KUBECONFIG_WATCH_VALUE: &str = "control-plane-kubeconfig";

/// Node label key propagated to agents so nodes can be joined back to their
/// BareMetalHost by provider ID.
pub const METAL3_UUID_LABEL: &str = "metal3.io/uuid";

/// Annotation metal3 sets on a Metal3Machine pointing at the BareMetalHost
/// it claimed, as `{namespace}/{name}`.
pub const BAREMETAL_HOST_ANNOTATION: &str = "metal3.io/BareMetalHost";

/// Field manager name used for all patches issued by this operator.
pub const FIELD_MANAGER: &str = "assisted-capi-operator";
