//! Shared types for the operator's CRDs
//!
//! Conditions follow the CAPI convention: a small ordered list keyed by
//! condition type, each carrying a reason, a severity, and a message. A
//! separate summarization step folds them into a single readiness verdict.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Severity classifies how bad a `False` condition is. Ordering matters:
/// `Error` outranks `Warning`, which outranks `Info`, when summarizing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum ConditionSeverity {
    Error,
    Warning,
    #[default]
    Info,
}

/// Condition status following Kubernetes conventions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    #[default]
    False,
    Unknown,
}

/// A single observed condition on an object's status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, unique within a condition list
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConditionSeverity>,
    pub last_transition_time: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    /// A condition that is satisfied.
    pub fn true_(type_: &str) -> Self {
        Condition {
            type_: type_.to_string(),
            status: ConditionStatus::True,
            severity: None,
            last_transition_time: Utc::now().to_rfc3339(),
            reason: String::new(),
            message: String::new(),
        }
    }

    /// A condition that is not satisfied, with the blocking cause attached.
    pub fn false_(type_: &str, reason: &str, severity: ConditionSeverity, message: &str) -> Self {
        Condition {
            type_: type_.to_string(),
            status: ConditionStatus::False,
            severity: Some(severity),
            last_transition_time: Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }
}

/// Reference to an object in the same namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    pub name: String,
}

/// Reference to an object by namespace and name, with an optional kind for
/// owner dispatch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl ObjectReference {
    pub fn new(name: &str, namespace: &str) -> Self {
        ObjectReference {
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            kind: None,
            api_version: None,
        }
    }
}

/// Proxy settings propagated into the discovery environment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Proxy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<String>,
}

/// A kernel argument applied to discovery hosts at boot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KernelArgument {
    /// `append`, `replace` or `delete`
    pub operation: String,
    pub value: String,
}

/// Disk encryption configuration for cluster nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiskEncryption {
    /// Which node roles get encrypted disks: `none`, `all`, `masters`, `workers`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_on: Option<String>,
    /// Encryption mode: `tpmv2` or `tang`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_is_worst_first() {
        assert!(ConditionSeverity::Error < ConditionSeverity::Warning);
        assert!(ConditionSeverity::Warning < ConditionSeverity::Info);
    }

    #[test]
    fn test_condition_constructors() {
        let ok = Condition::true_("DataSecretAvailable");
        assert_eq!(ok.status, ConditionStatus::True);
        assert!(ok.severity.is_none());

        let blocked = Condition::false_(
            "DataSecretAvailable",
            "WaitingForLiveISOURL",
            ConditionSeverity::Info,
            "",
        );
        assert_eq!(blocked.status, ConditionStatus::False);
        assert_eq!(blocked.severity, Some(ConditionSeverity::Info));
        assert_eq!(blocked.reason, "WaitingForLiveISOURL");
    }
}
