//! Tests for the rotation timing state machine

use chrono::{Duration, Utc};

use super::kubeconfig::{decide, RotationDecision};

#[test]
fn test_expired_certificate_is_terminal() {
    let now = Utc::now();
    let decision = decide(now, now - Duration::days(300), now - Duration::hours(1));
    assert_eq!(decision, RotationDecision::Expired);
}

#[test]
fn test_far_from_expiry_waits_until_renewal_window() {
    let now = Utc::now();
    let not_after = now + Duration::days(200);
    let decision = decide(now, now - Duration::days(1), not_after);
    assert_eq!(
        decision,
        RotationDecision::WaitUntil(not_after - Duration::days(30))
    );
}

#[test]
fn test_inside_window_rotates() {
    let now = Utc::now();
    let decision = decide(now, now - Duration::days(1), now + Duration::days(10));
    assert_eq!(decision, RotationDecision::Rotate);
}

#[test]
fn test_backdated_certificate_waits_for_not_before() {
    // Inside the renewal window but the certificate is not yet valid;
    // wait for notBefore instead of rotating with an unusable credential.
    let now = Utc::now();
    let not_before = now + Duration::hours(2);
    let decision = decide(now, not_before, now + Duration::days(10));
    assert_eq!(decision, RotationDecision::WaitUntil(not_before));
}

#[test]
fn test_window_boundary_rotates() {
    let now = Utc::now();
    // Exactly 30 days out is not strictly before the window start.
    let decision = decide(now, now - Duration::days(1), now + Duration::days(30));
    assert_eq!(decision, RotationDecision::Rotate);
}
