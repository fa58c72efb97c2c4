//! Kubeconfig parsing and client-certificate splicing
//!
//! The rotation path must rewrite exactly two fields of a kubeconfig (the
//! current user's certificate and key data) while preserving every other
//! byte of structure the original author put there. Manipulating the YAML
//! document directly guarantees that; a typed round-trip would silently
//! drop fields our structs don't know about.

pub mod client_certificate;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use serde_yaml::Value;
use x509_parser::pem::parse_x509_pem;

use crate::error::{Error, Result};

pub use client_certificate::{csr_name, generate_key_and_csr, short_hash};

/// Parse kubeconfig bytes into a YAML document.
pub fn parse(bytes: &[u8]) -> Result<Value> {
    Ok(serde_yaml::from_slice(bytes)?)
}

/// Serialize the document back to bytes.
pub fn serialize(doc: &Value) -> Result<Vec<u8>> {
    Ok(serde_yaml::to_string(doc)?.into_bytes())
}

/// Resolve the user name of the current context.
pub fn current_user_name(doc: &Value) -> Result<String> {
    let current_context = doc
        .get("current-context")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::KubeconfigError("no current-context set".to_string()))?;

    let contexts = doc
        .get("contexts")
        .and_then(Value::as_sequence)
        .ok_or_else(|| Error::KubeconfigError("no contexts listed".to_string()))?;
    let context = contexts
        .iter()
        .find(|c| c.get("name").and_then(Value::as_str) == Some(current_context))
        .ok_or_else(|| {
            Error::KubeconfigError(format!("current context {current_context} not found"))
        })?;

    context
        .get("context")
        .and_then(|c| c.get("user"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::KubeconfigError(format!("context {current_context} names no user"))
        })
}

fn user_entry<'a>(doc: &'a Value, user: &str) -> Result<&'a Value> {
    doc.get("users")
        .and_then(Value::as_sequence)
        .and_then(|users| {
            users
                .iter()
                .find(|u| u.get("name").and_then(Value::as_str) == Some(user))
        })
        .and_then(|u| u.get("user"))
        .ok_or_else(|| Error::KubeconfigError(format!("user {user} not found")))
}

/// The user's embedded client certificate, PEM bytes.
pub fn client_certificate_pem(doc: &Value, user: &str) -> Result<Vec<u8>> {
    let encoded = user_entry(doc, user)?
        .get("client-certificate-data")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::KubeconfigError(format!("user {user} has no client-certificate-data"))
        })?;
    STANDARD
        .decode(encoded)
        .map_err(|e| Error::KubeconfigError(format!("client-certificate-data: {e}")))
}

/// Replace the user's certificate and key, leaving every other field alone.
pub fn set_user_credentials(
    doc: &mut Value,
    user: &str,
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<()> {
    let users = doc
        .get_mut("users")
        .and_then(Value::as_sequence_mut)
        .ok_or_else(|| Error::KubeconfigError("no users listed".to_string()))?;
    let entry = users
        .iter_mut()
        .find(|u| u.get("name").and_then(Value::as_str) == Some(user))
        .and_then(|u| u.get_mut("user"))
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| Error::KubeconfigError(format!("user {user} not found")))?;

    entry.insert(
        Value::from("client-certificate-data"),
        Value::from(STANDARD.encode(cert_pem)),
    );
    entry.insert(
        Value::from("client-key-data"),
        Value::from(STANDARD.encode(key_pem)),
    );
    Ok(())
}

/// NotBefore and NotAfter of a PEM-encoded certificate.
pub fn certificate_validity(cert_pem: &[u8]) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (_, pem) = parse_x509_pem(cert_pem)
        .map_err(|e| Error::CertificateError(format!("invalid PEM: {e}")))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| Error::CertificateError(format!("invalid certificate: {e}")))?;

    let validity = cert.validity();
    let not_before = Utc
        .timestamp_opt(validity.not_before.timestamp(), 0)
        .single()
        .ok_or_else(|| Error::CertificateError("invalid notBefore".to_string()))?;
    let not_after = Utc
        .timestamp_opt(validity.not_after.timestamp(), 0)
        .single()
        .ok_or_else(|| Error::CertificateError("invalid notAfter".to_string()))?;
    Ok((not_before, not_after))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: spoke
  cluster:
    server: https://api.spoke.example.com:6443
    certificate-authority-data: Y2EtZGF0YQ==
contexts:
- name: admin@spoke
  context:
    cluster: spoke
    user: admin
    namespace: default
current-context: admin@spoke
preferences: {}
users:
- name: admin
  user:
    client-certificate-data: b2xkLWNlcnQ=
    client-key-data: b2xkLWtleQ==
"#;

    #[test]
    fn test_current_user_resolution() {
        let doc = parse(KUBECONFIG.as_bytes()).unwrap();
        assert_eq!(current_user_name(&doc).unwrap(), "admin");
    }

    #[test]
    fn test_certificate_data_decoding() {
        let doc = parse(KUBECONFIG.as_bytes()).unwrap();
        assert_eq!(client_certificate_pem(&doc, "admin").unwrap(), b"old-cert");
    }

    #[test]
    fn test_missing_user_is_an_error() {
        let doc = parse(KUBECONFIG.as_bytes()).unwrap();
        assert!(client_certificate_pem(&doc, "ghost").is_err());
    }

    #[test]
    fn test_splice_preserves_every_other_field() {
        let mut doc = parse(KUBECONFIG.as_bytes()).unwrap();
        set_user_credentials(&mut doc, "admin", b"new-cert", b"new-key").unwrap();

        let out = serialize(&doc).unwrap();
        let reparsed = parse(&out).unwrap();

        assert_eq!(client_certificate_pem(&reparsed, "admin").unwrap(), b"new-cert");
        assert_eq!(
            reparsed["users"][0]["user"]["client-key-data"].as_str(),
            Some(STANDARD.encode(b"new-key").as_str())
        );

        // Untouched structure survives the round trip.
        assert_eq!(reparsed["current-context"].as_str(), Some("admin@spoke"));
        assert_eq!(
            reparsed["clusters"][0]["cluster"]["server"].as_str(),
            Some("https://api.spoke.example.com:6443")
        );
        assert_eq!(
            reparsed["clusters"][0]["cluster"]["certificate-authority-data"].as_str(),
            Some("Y2EtZGF0YQ==")
        );
        assert_eq!(
            reparsed["contexts"][0]["context"]["namespace"].as_str(),
            Some("default")
        );
    }
}
