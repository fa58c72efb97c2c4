//! Ignition override payload construction
//!
//! Builds the ignition config merged into each adopted host's install
//! ignition: a bootstrap completion marker consumed by CAPI's sentinel-file
//! check, and a script exporting kubelet extra labels.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;

use crate::error::Result;

const IGNITION_VERSION: &str = "3.1.0";

/// CAPI looks for this file to declare bootstrap complete.
const BOOTSTRAP_SUCCESS_PATH: &str = "/run/cluster-api/bootstrap-success.complete";

/// base64("success")
const BOOTSTRAP_SUCCESS_CONTENT: &str = "c3VjY2Vzcw==";

const KUBELET_LABELS_PATH: &str = "/usr/local/bin/kubelet_custom_labels";

#[derive(Serialize)]
struct IgnitionConfig {
    ignition: IgnitionHeader,
    storage: IgnitionStorage,
}

#[derive(Serialize)]
struct IgnitionHeader {
    version: String,
}

#[derive(Serialize)]
struct IgnitionStorage {
    files: Vec<IgnitionFile>,
}

#[derive(Serialize)]
struct IgnitionFile {
    path: String,
    mode: u32,
    overwrite: bool,
    user: IgnitionFileUser,
    contents: IgnitionFileContents,
}

#[derive(Serialize)]
struct IgnitionFileUser {
    name: String,
}

#[derive(Serialize)]
struct IgnitionFileContents {
    source: String,
}

fn ignition_file(path: &str, user: &str, source: String, mode: u32) -> IgnitionFile {
    IgnitionFile {
        path: path.to_string(),
        mode,
        overwrite: true,
        user: IgnitionFileUser {
            name: user.to_string(),
        },
        contents: IgnitionFileContents { source },
    }
}

fn data_url(b64_content: &str) -> String {
    format!("data:text/plain;charset=utf-8;base64,{b64_content}")
}

/// Build the ignition overrides payload for an adopted host.
///
/// Deterministic given the kubelet extra labels: identical inputs always
/// serialize to identical bytes.
pub fn bootstrap_overrides(kubelet_extra_labels: &[String]) -> Result<String> {
    let success_file = ignition_file(
        BOOTSTRAP_SUCCESS_PATH,
        "root",
        data_url(BOOTSTRAP_SUCCESS_CONTENT),
        0o644,
    );

    let script = format!(
        "#!/bin/bash\necho \"CUSTOM_KUBELET_LABELS={}\" | tee -a /etc/kubernetes/kubelet-env >/dev/null\n",
        kubelet_extra_labels.join(",")
    );
    let labels_file = ignition_file(
        KUBELET_LABELS_PATH,
        "root",
        data_url(&STANDARD.encode(script.as_bytes())),
        0o755,
    );

    let config = IgnitionConfig {
        ignition: IgnitionHeader {
            version: IGNITION_VERSION.to_string(),
        },
        storage: IgnitionStorage {
            files: vec![success_file, labels_file],
        },
    };
    Ok(serde_json::to_string(&config)?)
}

/// Build the CAPI user-data ignition: a pointer config that merges the
/// discovery ignition served by the assisted service.
pub fn user_data_ignition(ignition_url: &str) -> Result<String> {
    let config = serde_json::json!({
        "ignition": {
            "version": IGNITION_VERSION,
            "config": {
                "merge": [ { "source": ignition_url } ]
            }
        }
    });
    Ok(serde_json::to_string(&config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_are_deterministic() {
        let labels = vec!["zone=a".to_string(), "pool=workers".to_string()];
        let first = bootstrap_overrides(&labels).unwrap();
        let second = bootstrap_overrides(&labels).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_overrides_contain_both_files() {
        let payload = bootstrap_overrides(&[]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["ignition"]["version"], "3.1.0");

        let files = parsed["storage"]["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["path"], "/run/cluster-api/bootstrap-success.complete");
        assert_eq!(files[0]["mode"], 420);
        assert_eq!(files[0]["overwrite"], true);
        assert_eq!(files[0]["user"]["name"], "root");
        assert_eq!(
            files[0]["contents"]["source"],
            "data:text/plain;charset=utf-8;base64,c3VjY2Vzcw=="
        );
        assert_eq!(files[1]["path"], "/usr/local/bin/kubelet_custom_labels");
        assert_eq!(files[1]["mode"], 493);
    }

    #[test]
    fn test_kubelet_labels_are_embedded() {
        let payload =
            bootstrap_overrides(&["node-role.kubernetes.io/gpu=".to_string()]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        let source = parsed["storage"]["files"][1]["contents"]["source"]
            .as_str()
            .unwrap();
        let b64 = source.rsplit(',').next().unwrap();
        let script = String::from_utf8(STANDARD.decode(b64).unwrap()).unwrap();
        assert!(script.contains("CUSTOM_KUBELET_LABELS=node-role.kubernetes.io/gpu="));
        assert!(script.contains("/etc/kubernetes/kubelet-env"));
    }

    #[test]
    fn test_user_data_merges_remote_ignition() {
        let url = "https://assisted.example.com/api/assisted-install/v2/infra-envs/1/downloads/files?file_name=discovery.ign";
        let payload = user_data_ignition(url).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["ignition"]["version"], "3.1.0");
        assert_eq!(parsed["ignition"]["config"]["merge"][0]["source"], url);
    }
}
