//! Error types shared across the operator
//!
//! Reconcilers distinguish three classes of failure: retryable operational
//! errors (surfaced to the runtime's backoff), structural/configuration
//! errors (surfaced as status conditions), and terminal errors that require
//! operator intervention.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// A required label is absent from an object
    #[error("missing label {label} on {kind} {name}")]
    MissingLabel {
        label: String,
        kind: String,
        name: String,
    },

    /// A lookup that must resolve to exactly one object did not
    #[error("found {found} {kind}, exactly one is needed")]
    AmbiguousLookup { kind: String, found: usize },

    /// Object graph is not yet consistent; retry under ambient backoff
    #[error("{0}")]
    LookupFailed(String),

    /// Invalid or unsupported configuration
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Spec validation failure
    #[error("validation error: {0}")]
    ValidationError(String),

    /// CSR submitted but not yet approved/signed; reconcile again shortly
    #[error("CSR is still processing: {0}")]
    CsrProcessing(String),

    /// Client certificate expired before rotation could happen. Terminal:
    /// the kubeconfig must be replaced manually.
    #[error("kubeconfig client-certificate expired. Please update it manually with a valid client-certificate")]
    CertificateExpired,

    /// Refusal to delete a control-plane bootstrap config while its control
    /// plane is still live. Terminal until the owner is deleted.
    #[error("bootstrap config belongs to control plane that's not being deleted")]
    ControlPlaneProtected,

    /// Kubeconfig could not be parsed or lacks expected structure
    #[error("kubeconfig error: {0}")]
    KubeconfigError(String),

    /// Certificate parsing or generation failure
    #[error("certificate error: {0}")]
    CertificateError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Finalizer add/remove failure from the runtime helper
    #[error("finalizer error: {0}")]
    FinalizerError(Box<kube::runtime::finalizer::Error<Error>>),
}

impl From<kube::runtime::finalizer::Error<Error>> for Error {
    fn from(err: kube::runtime::finalizer::Error<Error>) -> Self {
        Error::FinalizerError(Box::new(err))
    }
}

impl Error {
    /// Whether the error is expected to resolve on its own with a retry.
    ///
    /// Terminal errors (expired certificates, protected deletions) need a
    /// human; everything else is a candidate for the short retry interval.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            Error::CertificateExpired | Error::ControlPlaneProtected | Error::ValidationError(_)
        )
    }

    /// Whether the error is the soft "CSR still processing" signal that
    /// deserves a short requeue rather than backoff.
    pub fn is_csr_processing(&self) -> bool {
        matches!(self, Error::CsrProcessing(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_errors_are_not_retriable() {
        assert!(!Error::CertificateExpired.is_retriable());
        assert!(!Error::ControlPlaneProtected.is_retriable());
    }

    #[test]
    fn test_operational_errors_are_retriable() {
        assert!(Error::LookupFailed("no cluster deployment".into()).is_retriable());
        assert!(Error::AmbiguousLookup {
            kind: "ClusterDeployment".into(),
            found: 2
        }
        .is_retriable());
    }

    #[test]
    fn test_csr_processing_detection() {
        assert!(Error::CsrProcessing("awaiting approval".into()).is_csr_processing());
        assert!(!Error::CertificateExpired.is_csr_processing());
    }
}
