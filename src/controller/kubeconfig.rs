//! Kubeconfig client-certificate rotation
//!
//! Watches control-plane kubeconfig secrets and rotates the embedded
//! client certificate before it expires by submitting a CSR to the
//! workload cluster and approving it in-band. Never touches a CA key:
//! the workload cluster's signer does the signing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition, CertificateSigningRequestSpec,
};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::ByteString;
use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, PostParams},
    runtime::{
        controller::{Action, Controller},
        watcher,
    },
    ResourceExt,
};
use serde_json::json;
use tracing::{debug, error, info, instrument};

use crate::error::{Error, Result};
use crate::kubeconfig::{
    certificate_validity, client_certificate_pem, current_user_name, parse, serialize,
    set_user_credentials,
};
use crate::kubeconfig::client_certificate::{csr_for_key, csr_name, generate_key_and_csr};
use crate::{CONTROL_PLANE_KUBECONFIG_WATCH_VALUE, FIELD_MANAGER, WATCH_FILTER_LABEL};

use super::bootstrap::{is_already_exists, is_not_found};
use super::owners::owner_of_kind;
use super::ControllerState;

/// Kubeconfig bytes live under this key in the secret.
const KUBECONFIG_KEY: &str = "value";

/// Pending rotation key, persisted so every reconcile of one rotation
/// signs the same request with the same key.
const PENDING_KEY_KEY: &str = "rotation-key.pem";

/// Rotation starts this many days before expiry.
const RENEWAL_WINDOW_DAYS: i64 = 30;

const CSR_SIGNER: &str = "kubernetes.io/kube-apiserver-client";

/// Poll interval while a submitted CSR waits for approval/signing.
const CSR_POLL: Duration = Duration::from_secs(10);

/// Start the kubeconfig rotation controller.
pub async fn run_kubeconfig_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let secrets: Api<Secret> = Api::all(client);

    info!("Starting kubeconfig rotation controller");

    let watch = watcher::Config::default().labels(&format!(
        "{WATCH_FILTER_LABEL}={CONTROL_PLANE_KUBECONFIG_WATCH_VALUE}"
    ));
    Controller::new(secrets, watch)
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// What to do with a certificate given its validity bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum RotationDecision {
    /// Already expired; manual intervention required.
    Expired,
    /// Nothing to do until this instant.
    WaitUntil(DateTime<Utc>),
    /// Inside the renewal window; rotate now.
    Rotate,
}

pub(super) fn decide(
    now: DateTime<Utc>,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> RotationDecision {
    if now > not_after {
        return RotationDecision::Expired;
    }
    let renewal_start = not_after - chrono::Duration::days(RENEWAL_WINDOW_DAYS);
    if now < renewal_start {
        return RotationDecision::WaitUntil(renewal_start);
    }
    // Clock skew or a backdated certificate; wait for it to become valid.
    if now < not_before {
        return RotationDecision::WaitUntil(not_before);
    }
    RotationDecision::Rotate
}

fn requeue_at(when: DateTime<Utc>) -> Action {
    Action::requeue((when - Utc::now()).to_std().unwrap_or_default())
}

#[instrument(skip(ctx), fields(name = %secret.name_any(), namespace = secret.namespace()))]
async fn reconcile(secret: Arc<Secret>, ctx: Arc<ControllerState>) -> Result<Action> {
    // The label filter narrows the watch; the owner check keeps us off
    // kubeconfigs other providers manage.
    if owner_of_kind(secret.as_ref(), "OpenshiftAssistedControlPlane").is_none() {
        return Ok(Action::await_change());
    }

    let Some(kubeconfig) = secret.data.as_ref().and_then(|d| d.get(KUBECONFIG_KEY)) else {
        debug!("secret has no kubeconfig payload");
        return Ok(Action::await_change());
    };
    let kubeconfig = kubeconfig.0.clone();

    let doc = parse(&kubeconfig)?;
    let user = current_user_name(&doc)?;
    let cert_pem = client_certificate_pem(&doc, &user)?;
    let (not_before, not_after) = certificate_validity(&cert_pem)?;

    match decide(Utc::now(), not_before, not_after) {
        RotationDecision::Expired => Err(Error::CertificateExpired),
        RotationDecision::WaitUntil(when) => Ok(requeue_at(when)),
        RotationDecision::Rotate => rotate(&ctx, &secret, &kubeconfig, &user).await,
    }
}

async fn rotate(
    ctx: &ControllerState,
    secret: &Secret,
    kubeconfig: &[u8],
    user: &str,
) -> Result<Action> {
    let namespace = secret.namespace().unwrap_or_default();
    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), &namespace);

    // Reuse the pending key if one is already persisted; otherwise mint one
    // and persist it before submitting, so a crash between the two steps
    // never orphans a ticket signed with a lost key.
    let key_pem = match secret
        .data
        .as_ref()
        .and_then(|d| d.get(PENDING_KEY_KEY))
        .map(|b| String::from_utf8_lossy(&b.0).into_owned())
    {
        Some(pem) => pem,
        None => {
            let (key_pem, _) = generate_key_and_csr(user)?;
            secrets
                .patch(
                    &secret.name_any(),
                    &PatchParams::apply(FIELD_MANAGER),
                    &Patch::Merge(&json!({
                        "data": { PENDING_KEY_KEY: ByteString(key_pem.clone().into_bytes()) }
                    })),
                )
                .await?;
            key_pem
        }
    };
    let csr_pem = csr_for_key(&key_pem, user)?;

    let workload_client = ctx.workload.client_from_kubeconfig(kubeconfig).await?;
    let csrs: Api<CertificateSigningRequest> = Api::all(workload_client);
    let ticket_name = csr_name(user, kubeconfig);

    let ticket = match csrs.get(&ticket_name).await {
        Ok(ticket) => ticket,
        Err(e) if is_not_found(&e) => {
            let csr = CertificateSigningRequest {
                metadata: ObjectMeta {
                    name: Some(ticket_name.clone()),
                    ..Default::default()
                },
                spec: CertificateSigningRequestSpec {
                    request: ByteString(csr_pem.into_bytes()),
                    signer_name: CSR_SIGNER.to_string(),
                    usages: Some(vec![
                        "digital signature".to_string(),
                        "key encipherment".to_string(),
                        "client auth".to_string(),
                    ]),
                    ..Default::default()
                },
                ..Default::default()
            };
            match csrs.create(&PostParams::default(), &csr).await {
                Ok(_) => {}
                // Lost a race with a concurrent reconcile; same ticket.
                Err(e) if is_already_exists(&e) => {}
                Err(e) => return Err(e.into()),
            }
            return Err(Error::CsrProcessing(format!(
                "submitted CSR {ticket_name}, awaiting approval"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    if !is_approved(&ticket) {
        approve(&csrs, &ticket_name).await?;
        return Err(Error::CsrProcessing(format!(
            "approved CSR {ticket_name}, awaiting signing"
        )));
    }

    let Some(signed) = ticket
        .status
        .as_ref()
        .and_then(|s| s.certificate.as_ref())
        .filter(|c| !c.0.is_empty())
    else {
        return Err(Error::CsrProcessing(format!(
            "CSR {ticket_name} approved, certificate not issued yet"
        )));
    };

    let mut doc = parse(kubeconfig)?;
    set_user_credentials(&mut doc, user, &signed.0, key_pem.as_bytes())?;
    let updated = serialize(&doc)?;

    secrets
        .patch(
            &secret.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&json!({
                "data": {
                    KUBECONFIG_KEY: ByteString(updated),
                    PENDING_KEY_KEY: null,
                }
            })),
        )
        .await?;

    let (new_not_before, _) = certificate_validity(&signed.0)?;
    info!(
        "rotated client certificate for {} in {}/{}",
        user,
        namespace,
        secret.name_any()
    );
    Ok(requeue_at(new_not_before))
}

fn is_approved(ticket: &CertificateSigningRequest) -> bool {
    ticket
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Approved" && c.status == "True")
        })
        .unwrap_or(false)
}

/// This provider is the approver: no separate cluster admin is in the loop.
async fn approve(csrs: &Api<CertificateSigningRequest>, name: &str) -> Result<()> {
    let now = Time(Utc::now());
    let condition = CertificateSigningRequestCondition {
        type_: "Approved".to_string(),
        status: "True".to_string(),
        reason: Some("AutoApproved".to_string()),
        message: Some("approved by the assisted bootstrap provider".to_string()),
        last_update_time: Some(now),
        last_transition_time: None,
    };
    csrs.patch_approval(
        name,
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&json!({ "status": { "conditions": [condition] } })),
    )
    .await?;
    Ok(())
}

fn error_policy(secret: Arc<Secret>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    if error.is_csr_processing() {
        debug!("rotation for {} in flight: {}", secret.name_any(), error);
        return Action::requeue(CSR_POLL);
    }

    error!(
        "Reconciliation error for {}: {:?}",
        secret.name_any(),
        error
    );
    let retry = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };
    Action::requeue(retry)
}
