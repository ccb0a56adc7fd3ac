// # Firewall Provider Trait
//
// Defines the interface for reading and mutating firewall rules via a cloud
// provider API.
//
// ## Implementations
//
// - Volcengine security groups: `fwsync-provider-volcengine` crate
// - AWS Lightsail instance firewalls: `fwsync-provider-lightsail` crate
//
// ## Usage
//
// ```rust,ignore
// use fwsync_core::{FirewallProvider, RuleSpec};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* FirewallProvider implementation */;
//
//     let rules = provider.list_ingress_rules("sg-123").await?;
//     let matches = provider.semantics().find_matches(&rules, 22);
//
//     provider
//         .authorize_rule("sg-123", &RuleSpec::single_port_tcp(22, "203.0.113.5/32"), "ssh")
//         .await?;
//
//     Ok(())
// }
// ```

use crate::config::{ProviderCredentials, ProviderKind};
use crate::rules::{MatchSemantics, RuleSpec};
use async_trait::async_trait;

/// Trait for firewall provider implementations
///
/// One instance is created per provider per run, from that run's settings
/// snapshot. The `resource` argument is the security group ID or instance
/// name the rules live on.
///
/// # Trust Level: Untrusted
///
/// Providers are **untrusted** components with strict limitations:
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Translate native rule shapes to and from [`RuleSpec`]
/// - ✅ Return success or failure
///
/// ## Forbidden Capabilities
/// - ❌ Decide whether a port is synced (owned by [`MatchSemantics`] + the engine)
/// - ❌ Implement retry logic or backoff
/// - ❌ Write audit entries (the engine records every decision)
/// - ❌ Spawn tasks or cache rules across calls
///
/// Every call is single-shot: one request, one result. A failed call is
/// reported to the engine, which logs it and moves on to the next unit of work.
#[async_trait]
pub trait FirewallProvider: Send + Sync {
    /// Which provider this is
    fn kind(&self) -> ProviderKind;

    /// How the engine matches rules from [`list_ingress_rules`](Self::list_ingress_rules)
    fn semantics(&self) -> MatchSemantics;

    /// Setup notices worth surfacing to the operator
    ///
    /// For example, a region given in availability-zone form that was
    /// normalized to its base region.
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }

    /// List the rules currently attached to `resource`
    ///
    /// Called once per provider per run; every port is diffed against this
    /// snapshot.
    async fn list_ingress_rules(&self, resource: &str) -> Result<Vec<RuleSpec>, crate::Error>;

    /// Remove `rule` from `resource`
    ///
    /// `rule` is a revocation target produced by
    /// [`MatchSemantics::revocations`], already narrowed to one port.
    async fn revoke_rule(&self, resource: &str, rule: &RuleSpec) -> Result<(), crate::Error>;

    /// Allow `rule` on `resource`
    async fn authorize_rule(
        &self,
        resource: &str,
        rule: &RuleSpec,
        description: &str,
    ) -> Result<(), crate::Error>;
}

/// Helper trait for constructing firewall providers from credentials
pub trait FirewallProviderFactory: Send + Sync {
    /// Create a provider for one run
    ///
    /// Credentials are already known to be complete; factories only fail on
    /// values they cannot use (for example a malformed region).
    fn create(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<Box<dyn FirewallProvider>, crate::Error>;
}
