//! Contract Test: Best-Effort Partial Failure
//!
//! Constraints verified:
//! - A failed revoke is a WARNING and does not block the authorize
//! - A failed authorize is an ERROR for that port only
//! - A failed list skips that provider; other providers proceed
//! - Incomplete configuration skips the provider before any network call
//! - An empty port list skips the provider; others proceed
//!
//! If this test fails, one broken unit of work is taking down the whole run.

mod common;

use common::*;
use fwsync_core::engine::ProviderSkip;
use fwsync_core::{AuditLevel, PortState, ProviderKind};

#[tokio::test]
async fn revoke_failure_still_authorizes() {
    let firewall = FakeFirewall::volcengine().with_rules(vec![sg_rule(22, "198.51.100.7/32")]);
    firewall.fail_revoke();
    let harness = Harness::new(
        complete_settings("volcengine"),
        StaticResolver::resolving(CURRENT_IP),
        &[&firewall],
    );

    let outcome = harness.reconciler.reconcile().await;

    let port = outcome
        .report()
        .and_then(|r| r.provider(ProviderKind::Volcengine))
        .and_then(|p| p.port(22))
        .cloned()
        .unwrap();
    assert_eq!(port.state(), PortState::Authorized);
    assert_eq!(port.revoke_failures, 1);
    assert_eq!(port.revoked, 0);

    let warnings = harness.messages_at(AuditLevel::Warning).await;
    assert!(warnings.iter().any(|m| m.contains("port 22: revoke failed")));
    assert!(
        firewall
            .mutations()
            .iter()
            .any(|call| matches!(call, Call::Authorize { port: 22, .. }))
    );
}

#[tokio::test]
async fn authorize_failure_is_isolated_to_its_port() {
    let firewall = FakeFirewall::volcengine();
    firewall.fail_authorize(22);
    let mut settings = complete_settings("volcengine");
    settings.volcengine_ports = "22,443".into();
    let harness = Harness::new(settings, StaticResolver::resolving(CURRENT_IP), &[&firewall]);

    let outcome = harness.reconciler.reconcile().await;

    let provider = outcome
        .report()
        .and_then(|r| r.provider(ProviderKind::Volcengine))
        .cloned()
        .unwrap();
    assert_eq!(provider.port(22).unwrap().state(), PortState::Failed);
    assert_eq!(provider.port(443).unwrap().state(), PortState::Authorized);

    let errors = harness.messages_at(AuditLevel::Error).await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("port 22: authorize failed"));
}

#[tokio::test]
async fn list_failure_skips_only_that_provider() {
    let volc = FakeFirewall::volcengine();
    volc.fail_list();
    let aws = FakeFirewall::lightsail();
    let harness = Harness::new(
        complete_settings("volcengine,aws"),
        StaticResolver::resolving(CURRENT_IP),
        &[&volc, &aws],
    );

    let outcome = harness.reconciler.reconcile().await;
    let report = outcome.report().unwrap();

    assert!(matches!(
        report.provider(ProviderKind::Volcengine).unwrap().skipped,
        Some(ProviderSkip::ListFailed { .. })
    ));
    assert!(volc.mutations().is_empty());
    assert_eq!(
        report.provider(ProviderKind::Aws).unwrap().port(22).unwrap().state(),
        PortState::Authorized
    );

    let errors = harness.messages_at(AuditLevel::Error).await;
    let listing = errors
        .iter()
        .find(|m| m.starts_with("provider=volcengine: failed to list rules"))
        .expect("list failure recorded");
    assert!(listing.contains("connection reset"));
}

#[tokio::test]
async fn incomplete_config_skips_before_any_call() {
    let volc = FakeFirewall::volcengine();
    let aws = FakeFirewall::lightsail();
    let mut settings = complete_settings("volcengine,aws");
    settings.secret_key = "  ".into();
    settings.security_group_id = String::new();
    let harness = Harness::new(settings, StaticResolver::resolving(CURRENT_IP), &[&volc, &aws]);

    let outcome = harness.reconciler.reconcile().await;

    assert_eq!(volc.created(), 0);
    assert!(volc.calls().is_empty());
    assert_eq!(
        outcome
            .report()
            .unwrap()
            .provider(ProviderKind::Volcengine)
            .unwrap()
            .skipped,
        Some(ProviderSkip::IncompleteConfig {
            missing: vec!["Volc_SK".into(), "Volc_SG_ID".into()]
        })
    );
    assert!(!aws.calls().is_empty());

    let warnings = harness.messages_at(AuditLevel::Warning).await;
    assert!(warnings.contains(
        &"provider=volcengine skipped: incomplete configuration (Volc_SK/Volc_SG_ID missing)"
            .to_string()
    ));
}

#[tokio::test]
async fn empty_port_list_skips_provider() {
    let volc = FakeFirewall::volcengine();
    let aws = FakeFirewall::lightsail();
    let mut settings = complete_settings("volcengine,aws");
    settings.aws_ports = "0, 70000, ssh".into();
    let harness = Harness::new(settings, StaticResolver::resolving(CURRENT_IP), &[&volc, &aws]);

    let outcome = harness.reconciler.reconcile().await;
    let report = outcome.report().unwrap();

    assert_eq!(
        report.provider(ProviderKind::Aws).unwrap().skipped,
        Some(ProviderSkip::NoPorts)
    );
    assert!(aws.calls().is_empty());
    assert_eq!(report.count(PortState::Authorized), 1);
}

#[tokio::test]
async fn provider_notices_are_surfaced_as_warnings() {
    let aws = FakeFirewall::lightsail()
        .with_warning("region ap-southeast-1a looks like an availability zone, using ap-southeast-1");
    let harness = Harness::new(
        complete_settings("aws"),
        StaticResolver::resolving(CURRENT_IP),
        &[&aws],
    );

    harness.reconciler.reconcile().await;

    let warnings = harness.messages_at(AuditLevel::Warning).await;
    assert_eq!(
        warnings,
        vec![
            "provider=aws: region ap-southeast-1a looks like an availability zone, using ap-southeast-1"
                .to_string()
        ]
    );
}

#[tokio::test]
async fn unregistered_provider_is_reported_not_fatal() {
    let aws = FakeFirewall::lightsail();
    // Volcengine enabled and configured, but no factory registered
    let harness = Harness::new(
        complete_settings("volcengine,aws"),
        StaticResolver::resolving(CURRENT_IP),
        &[&aws],
    );

    let outcome = harness.reconciler.reconcile().await;
    let report = outcome.report().unwrap();

    assert!(matches!(
        report.provider(ProviderKind::Volcengine).unwrap().skipped,
        Some(ProviderSkip::ClientUnavailable { .. })
    ));
    assert_eq!(report.count(PortState::Authorized), 1);
}
