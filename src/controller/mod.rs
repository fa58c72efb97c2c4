//! Reconcilers for the assisted bootstrap and control-plane providers
//!
//! Four independent controllers share one state object: bootstrap configs,
//! agent adoption, the control plane, and kubeconfig rotation.

use std::sync::Arc;

use kube::Client;

use crate::assisted::ServiceConfig;
use crate::workload::WorkloadClientFactory;

pub mod agent;
#[cfg(test)]
mod agent_test;
pub mod bootstrap;
#[cfg(test)]
mod bootstrap_test;
pub mod conditions;
pub mod control_plane;
pub mod kubeconfig;
#[cfg(test)]
mod kubeconfig_test;
pub mod owners;

pub use agent::run_agent_controller;
pub use bootstrap::run_bootstrap_controller;
pub use control_plane::run_control_plane_controller;
pub use kubeconfig::run_kubeconfig_controller;

/// Shared state handed to every controller.
pub struct ControllerState {
    pub client: Client,
    /// How generated ignition URLs address the assisted service
    pub service_config: ServiceConfig,
    /// Client factory for the workload cluster, substitutable in tests
    pub workload: Arc<dyn WorkloadClientFactory>,
}
