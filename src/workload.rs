//! Workload cluster client construction
//!
//! The upgrade orchestrator and the kubeconfig rotation path both need an
//! API client for the spoke cluster, built from kubeconfig bytes stored in
//! a hub secret. The factory is a trait so reconciler tests can substitute
//! a canned client.

use async_trait::async_trait;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::error::{Error, Result};

#[async_trait]
pub trait WorkloadClientFactory: Send + Sync {
    /// Build a client for the cluster the kubeconfig points at.
    async fn client_from_kubeconfig(&self, kubeconfig: &[u8]) -> Result<Client>;
}

/// Factory backed by the standard kubeconfig loading path.
#[derive(Clone, Copy, Debug, Default)]
pub struct KubeconfigClientFactory;

#[async_trait]
impl WorkloadClientFactory for KubeconfigClientFactory {
    async fn client_from_kubeconfig(&self, kubeconfig: &[u8]) -> Result<Client> {
        let parsed: Kubeconfig = serde_yaml::from_slice(kubeconfig)?;
        let config = Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::KubeconfigError(e.to_string()))?;
        Client::try_from(config).map_err(Error::from)
    }
}
