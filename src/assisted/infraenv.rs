//! InfraEnv naming, construction and ignition URL derivation
//!
//! One InfraEnv serves one machine pool. Its name is derived purely from
//! the bootstrap config's CAPI labels so every machine of the same pool
//! resolves to the same object.

use std::collections::BTreeMap;

use kube::ResourceExt;
use url::Url;

use crate::crd::agent_install::{InfraEnv, InfraEnvSpec};
use crate::crd::bootstrap_config::OpenshiftAssistedConfig;
use crate::crd::hive::ClusterDeployment;
use crate::crd::types::ObjectReference;
use crate::error::{Error, Result};
use crate::{CLUSTER_NAME_LABEL, CONTROL_PLANE_LABEL, MACHINE_DEPLOYMENT_NAME_LABEL};

/// Port the assisted service listens on inside the cluster.
const ASSISTED_SERVICE_PORT: u16 = 8090;

const IGNITION_FILE_NAME: &str = "discovery.ign";

/// How generated ignition download URLs address the assisted service.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Rewrite download URLs to the in-cluster service DNS name instead of
    /// the external route taken from the events URL
    pub use_internal_image_url: bool,
    pub assisted_service_name: String,
    /// Namespace of the assisted service; defaults to the InfraEnv's own
    /// namespace when unset
    pub assisted_installer_namespace: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            use_internal_image_url: false,
            assisted_service_name: "assisted-service".to_string(),
            assisted_installer_namespace: None,
        }
    }
}

/// Derive the pool-scoped InfraEnv name from the config's CAPI labels.
///
/// Control-plane configs map to `{cluster}-control-plane`; worker configs
/// map to `{cluster}-{machineDeployment}`. Deterministic, so every machine
/// of a pool shares one discovery environment.
pub fn infraenv_name(labels: &BTreeMap<String, String>) -> Result<String> {
    let cluster_name = labels
        .get(CLUSTER_NAME_LABEL)
        .ok_or_else(|| Error::MissingLabel {
            label: CLUSTER_NAME_LABEL.to_string(),
            kind: "OpenshiftAssistedConfig".to_string(),
            name: String::new(),
        })?;

    if labels.contains_key(CONTROL_PLANE_LABEL) {
        return Ok(format!("{cluster_name}-control-plane"));
    }

    let md_name = labels
        .get(MACHINE_DEPLOYMENT_NAME_LABEL)
        .ok_or_else(|| Error::MissingLabel {
            label: MACHINE_DEPLOYMENT_NAME_LABEL.to_string(),
            kind: "OpenshiftAssistedConfig".to_string(),
            name: String::new(),
        })?;
    Ok(format!("{cluster_name}-{md_name}"))
}

/// Build the desired InfraEnv for a bootstrap config's machine pool.
///
/// The pull secret falls back to the ClusterDeployment's when the config
/// carries none, so the discovery image can always authenticate.
pub fn build_infraenv(
    name: &str,
    config: &OpenshiftAssistedConfig,
    cluster_deployment: &ClusterDeployment,
) -> InfraEnv {
    let spec = &config.spec;
    let pull_secret_ref = spec
        .pull_secret_ref
        .clone()
        .or_else(|| cluster_deployment.spec.pull_secret_ref.clone());

    let mut infraenv = InfraEnv::new(
        name,
        InfraEnvSpec {
            cluster_ref: Some(ObjectReference::new(
                &cluster_deployment.name_any(),
                cluster_deployment.namespace().as_deref().unwrap_or_default(),
            )),
            pull_secret_ref,
            ssh_authorized_key: spec.ssh_authorized_key.clone(),
            proxy: spec.proxy.clone(),
            kernel_arguments: spec.kernel_arguments.clone(),
            additional_ntp_sources: spec.additional_ntp_sources.clone(),
            additional_trust_bundle: spec.additional_trust_bundle.clone(),
            cpu_architecture: spec.cpu_architecture.clone(),
            os_image_version: spec.os_image_version.clone(),
        },
    );
    infraenv.metadata.namespace = config.namespace();

    let mut labels = BTreeMap::new();
    if let Some(cluster) = config.labels_or_default().get(CLUSTER_NAME_LABEL) {
        labels.insert(CLUSTER_NAME_LABEL.to_string(), cluster.clone());
    }
    infraenv.metadata.labels = Some(labels);
    infraenv
}

/// Derive the discovery ignition download URL for an InfraEnv.
///
/// The assisted service only exposes the infra-env id and a download API
/// key through the events URL in its status, so both are recovered from
/// its query string. The external route's scheme and host are kept unless
/// internal addressing is configured.
pub fn ignition_download_url(
    service_config: &ServiceConfig,
    infraenv: &InfraEnv,
) -> Result<String> {
    let events_url = infraenv
        .status
        .as_ref()
        .and_then(|s| s.infra_env_debug_info.events_url.as_deref())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            Error::ConfigError(
                "cannot generate ignition url if events URL is not generated".to_string(),
            )
        })?;

    let events = Url::parse(events_url)
        .map_err(|e| Error::ConfigError(format!("malformed events URL {events_url}: {e}")))?;

    let mut infra_env_id = None;
    let mut api_key = None;
    for (k, v) in events.query_pairs() {
        match k.as_ref() {
            "infra_env_id" => infra_env_id = Some(v.into_owned()),
            "api_key" => api_key = Some(v.into_owned()),
            _ => {}
        }
    }
    let infra_env_id = infra_env_id
        .ok_or_else(|| Error::ConfigError("events URL carries no infra_env_id".to_string()))?;
    let api_key =
        api_key.ok_or_else(|| Error::ConfigError("events URL carries no api_key".to_string()))?;

    let base = if service_config.use_internal_image_url {
        let namespace = service_config
            .assisted_installer_namespace
            .clone()
            .or_else(|| infraenv.namespace())
            .unwrap_or_default();
        format!(
            "http://{}.{}.svc.cluster.local:{}",
            service_config.assisted_service_name, namespace, ASSISTED_SERVICE_PORT
        )
    } else {
        let host = events
            .host_str()
            .ok_or_else(|| Error::ConfigError("events URL carries no host".to_string()))?;
        match events.port() {
            Some(port) => format!("{}://{}:{}", events.scheme(), host, port),
            None => format!("{}://{}", events.scheme(), host),
        }
    };

    let mut url = Url::parse(&base)
        .map_err(|e| Error::ConfigError(format!("malformed service URL {base}: {e}")))?;
    url.set_path(&format!(
        "/api/assisted-install/v2/infra-envs/{infra_env_id}/downloads/files"
    ));
    url.query_pairs_mut()
        .append_pair("api_key", &api_key)
        .append_pair("file_name", IGNITION_FILE_NAME);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::agent_install::{InfraEnvDebugInfo, InfraEnvStatus};

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_control_plane_pool_name() {
        let labels = labels(&[(CLUSTER_NAME_LABEL, "c1"), (CONTROL_PLANE_LABEL, "")]);
        assert_eq!(infraenv_name(&labels).unwrap(), "c1-control-plane");
    }

    #[test]
    fn test_worker_pool_name() {
        let labels = labels(&[
            (CLUSTER_NAME_LABEL, "c1"),
            (MACHINE_DEPLOYMENT_NAME_LABEL, "md-0"),
        ]);
        assert_eq!(infraenv_name(&labels).unwrap(), "c1-md-0");
    }

    #[test]
    fn test_name_requires_cluster_label() {
        let err = infraenv_name(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::MissingLabel { .. }));
    }

    #[test]
    fn test_worker_name_requires_deployment_label() {
        let labels = labels(&[(CLUSTER_NAME_LABEL, "c1")]);
        let err = infraenv_name(&labels).unwrap_err();
        assert!(matches!(err, Error::MissingLabel { .. }));
    }

    fn infraenv_with_events_url(url: Option<&str>) -> InfraEnv {
        let mut infraenv = InfraEnv::new("test", InfraEnvSpec::default());
        infraenv.metadata.namespace = Some("test-ns".to_string());
        infraenv.status = Some(InfraEnvStatus {
            iso_download_url: None,
            infra_env_debug_info: InfraEnvDebugInfo {
                events_url: url.map(str::to_string),
            },
        });
        infraenv
    }

    const EVENTS_URL: &str =
        "https://assisted.example.com/api/assisted-install/v2/events?api_key=eyJhbGciOiJFUzI1NiJ9&infra_env_id=1234-5678";

    #[test]
    fn test_external_url_keeps_route_host() {
        let infraenv = infraenv_with_events_url(Some(EVENTS_URL));
        let url = ignition_download_url(&ServiceConfig::default(), &infraenv).unwrap();
        assert_eq!(
            url,
            "https://assisted.example.com/api/assisted-install/v2/infra-envs/1234-5678/downloads/files?api_key=eyJhbGciOiJFUzI1NiJ9&file_name=discovery.ign"
        );
    }

    #[test]
    fn test_internal_url_defaults_to_infraenv_namespace() {
        let infraenv = infraenv_with_events_url(Some(EVENTS_URL));
        let config = ServiceConfig {
            use_internal_image_url: true,
            ..ServiceConfig::default()
        };
        let url = ignition_download_url(&config, &infraenv).unwrap();
        assert_eq!(
            url,
            "http://assisted-service.test-ns.svc.cluster.local:8090/api/assisted-install/v2/infra-envs/1234-5678/downloads/files?api_key=eyJhbGciOiJFUzI1NiJ9&file_name=discovery.ign"
        );
    }

    #[test]
    fn test_internal_url_honors_namespace_override() {
        let infraenv = infraenv_with_events_url(Some(EVENTS_URL));
        let config = ServiceConfig {
            use_internal_image_url: true,
            assisted_service_name: "my-assisted-service".to_string(),
            assisted_installer_namespace: Some("my-assisted-ns".to_string()),
        };
        let url = ignition_download_url(&config, &infraenv).unwrap();
        assert!(url.starts_with(
            "http://my-assisted-service.my-assisted-ns.svc.cluster.local:8090/"
        ));
    }

    #[test]
    fn test_missing_events_url_is_an_error() {
        for infraenv in [
            infraenv_with_events_url(None),
            infraenv_with_events_url(Some("")),
            InfraEnv::new("test", InfraEnvSpec::default()),
        ] {
            let err = ignition_download_url(&ServiceConfig::default(), &infraenv).unwrap_err();
            assert_eq!(
                err.to_string(),
                "configuration error: cannot generate ignition url if events URL is not generated"
            );
        }
    }
}
