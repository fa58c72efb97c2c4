//! Partial typed views of the metal3 bare-metal provisioning objects
//!
//! BareMetalHost is the physical inventory entry (its boot MAC is the join
//! key for agent adoption); Metal3Machine and Metal3MachineTemplate carry
//! the image reference the provisioning layer boots from.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Disk format marker for live ISO images.
pub const LIVE_ISO_FORMAT: &str = "live-iso";

/// BareMetalHost: bare-metal inventory entry.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "metal3.io",
    version = "v1alpha1",
    kind = "BareMetalHost",
    namespaced,
    shortname = "bmh"
)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostSpec {
    /// MAC address of the NIC the host PXE/ISO boots from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_mac_address: Option<String>,
}

/// Image reference booted by the provisioning layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Metal3Image {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_format: Option<String>,
}

impl Metal3Image {
    /// Whether this image already points at the given live ISO URL.
    pub fn is_live_iso(&self, url: &str) -> bool {
        self.url == url && self.disk_format.as_deref() == Some(LIVE_ISO_FORMAT)
    }
}

/// Metal3Machine: the per-machine infrastructure object.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3Machine",
    namespaced,
    shortname = "m3m"
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3MachineSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Metal3Image>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Metal3MachineTemplateResource {
    #[serde(default)]
    pub spec: Metal3MachineSpec,
}

/// Metal3MachineTemplate: the template machines are cloned from.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3MachineTemplate",
    namespaced,
    shortname = "m3mt"
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3MachineTemplateSpec {
    #[serde(default)]
    pub template: Metal3MachineTemplateResource,
}

impl Metal3Machine {
    /// The `{namespace}/{name}` of the BareMetalHost this machine claimed,
    /// if metal3 has annotated it yet.
    pub fn host_annotation(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(crate::BAREMETAL_HOST_ANNOTATION))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_live_iso_detection() {
        let image = Metal3Image {
            url: "http://example.com/discovery.iso".to_string(),
            checksum: None,
            disk_format: Some(LIVE_ISO_FORMAT.to_string()),
        };
        assert!(image.is_live_iso("http://example.com/discovery.iso"));
        assert!(!image.is_live_iso("http://example.com/other.iso"));

        let raw = Metal3Image {
            url: "http://example.com/discovery.iso".to_string(),
            checksum: None,
            disk_format: None,
        };
        assert!(!raw.is_live_iso("http://example.com/discovery.iso"));
    }
}
