//! Mapping from CAPI objects to the assisted-install domain
//!
//! Pure construction and derivation logic; no API traffic. The reconcilers
//! in `controller` apply what is built here.

pub mod cluster_deployment;
pub mod ignition;
pub mod infraenv;

pub use cluster_deployment::{build_cluster_deployment, control_plane_labels};
pub use ignition::bootstrap_overrides;
pub use infraenv::{build_infraenv, ignition_download_url, infraenv_name, ServiceConfig};
