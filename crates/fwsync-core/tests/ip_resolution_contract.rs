//! Contract Test: Desired State Resolution
//!
//! Constraints verified:
//! - No resolved IP means zero provider calls and an ERROR entry
//! - Every failed endpoint is surfaced as a WARNING
//! - No enabled provider skips the run before the resolver is consulted
//! - The resolved address is recorded with its source endpoint
//!
//! If this test fails, runs may be mutating rules without a desired state.

mod common;

use common::*;
use fwsync_core::engine::RunSkip;
use fwsync_core::{AuditLevel, RunOutcome};

#[tokio::test]
async fn unresolved_ip_aborts_with_zero_provider_calls() {
    let volc = FakeFirewall::volcengine();
    let aws = FakeFirewall::lightsail();
    let harness = Harness::new(
        complete_settings("volcengine,aws"),
        StaticResolver::failing(),
        &[&volc, &aws],
    );

    let outcome = harness.reconciler.reconcile().await;

    assert!(matches!(
        outcome,
        RunOutcome::Skipped {
            reason: RunSkip::IpUnresolved,
            ..
        }
    ));
    assert_eq!(volc.created(), 0);
    assert_eq!(aws.created(), 0);
    assert!(volc.calls().is_empty());
    assert!(aws.calls().is_empty());

    let errors = harness.messages_at(AuditLevel::Error).await;
    assert_eq!(errors, vec!["cannot resolve IP, skipping check".to_string()]);

    // One warning per default endpoint
    let warnings = harness.messages_at(AuditLevel::Warning).await;
    assert_eq!(warnings.len(), 4);
    assert_eq!(warnings[0], "https://api.ipify.org returned HTTP 503");
}

#[tokio::test]
async fn no_provider_selected_skips_before_resolving() {
    let volc = FakeFirewall::volcengine();
    let harness = Harness::new(
        complete_settings("gcp, azure"),
        StaticResolver::resolving(CURRENT_IP),
        &[&volc],
    );

    let outcome = harness.reconciler.reconcile().await;

    assert!(matches!(
        outcome,
        RunOutcome::Skipped {
            reason: RunSkip::NoProviders,
            ..
        }
    ));
    assert_eq!(harness.resolver.calls(), 0);
    assert!(volc.calls().is_empty());
    assert_eq!(
        harness.messages_at(AuditLevel::Warning).await,
        vec!["no cloud provider selected, skipping check".to_string()]
    );
}

#[tokio::test]
async fn blank_provider_fields_default_to_volcengine() {
    let volc = FakeFirewall::volcengine();
    let mut settings = complete_settings("");
    settings.provider = String::new();
    let harness = Harness::new(settings, StaticResolver::resolving(CURRENT_IP), &[&volc]);

    let outcome = harness.reconciler.reconcile().await;

    assert!(outcome.report().is_some());
    assert!(!volc.calls().is_empty());
}

#[tokio::test]
async fn resolved_ip_is_recorded_with_source() {
    let volc = FakeFirewall::volcengine();
    let mut settings = complete_settings("volcengine");
    settings.ip_services = "\n https://echo.example/ip \n".into();
    let harness = Harness::new(settings, StaticResolver::resolving(CURRENT_IP), &[&volc]);

    let outcome = harness.reconciler.reconcile().await;

    let report = outcome.report().unwrap();
    assert_eq!(report.ip, CURRENT_IP);
    assert_eq!(report.endpoint, "https://echo.example/ip");

    let info = harness.messages_at(AuditLevel::Info).await;
    assert!(info.contains(
        &"current public IP: 203.0.113.5 (source: https://echo.example/ip)".to_string()
    ));
}

#[tokio::test]
async fn last_outcome_reflects_most_recent_run() {
    let volc = FakeFirewall::volcengine();
    let harness = Harness::new(
        complete_settings("volcengine"),
        StaticResolver::resolving(CURRENT_IP),
        &[&volc],
    );

    assert!(harness.reconciler.last_outcome().await.is_none());
    let outcome = harness.reconciler.reconcile().await;
    assert_eq!(harness.reconciler.last_outcome().await, Some(outcome));
}
