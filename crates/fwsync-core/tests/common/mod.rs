//! Test doubles and common utilities for reconciliation contract tests
//!
//! The fakes keep real rule state in memory so that a run's effects can be
//! observed by a second run, the way a live provider would behave.

#![allow(dead_code)]

use async_trait::async_trait;
use fwsync_core::error::{EndpointFailure, EndpointFailureReason, ResolveError, Result};
use fwsync_core::traits::{FirewallProviderFactory, ResolvedIp};
use fwsync_core::{
    Direction, Error, FirewallProvider, IpResolver, MatchSemantics, MemoryAuditLog,
    MemorySettingsStore, ProviderCredentials, ProviderKind, ProviderRegistry, Reconciler, RuleSpec,
    Settings,
};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// A call observed by a fake provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Revoke { port: u16, protocol: String },
    Authorize { port: u16, cidr: String, description: String },
}

/// Mutable state shared by every handle of one fake provider
#[derive(Default)]
struct FakeState {
    rules: Vec<RuleSpec>,
    calls: Vec<Call>,
    fail_list: bool,
    fail_revoke: bool,
    fail_authorize_ports: HashSet<u16>,
    warnings: Vec<String>,
}

/// In-memory firewall that records every call
#[derive(Clone)]
pub struct FakeFirewall {
    kind: ProviderKind,
    semantics: MatchSemantics,
    state: Arc<Mutex<FakeState>>,
    /// When set, `list_ingress_rules` waits for a permit
    gate: Option<Arc<Semaphore>>,
    created: Arc<AtomicUsize>,
}

impl FakeFirewall {
    /// Security-group style provider (exact port matching)
    pub fn volcengine() -> Self {
        Self::new(ProviderKind::Volcengine, MatchSemantics::ExactPort)
    }

    /// Instance-firewall style provider (range containment)
    pub fn lightsail() -> Self {
        Self::new(ProviderKind::Aws, MatchSemantics::RangeContainment)
    }

    fn new(kind: ProviderKind, semantics: MatchSemantics) -> Self {
        Self {
            kind,
            semantics,
            state: Arc::new(Mutex::new(FakeState::default())),
            gate: None,
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Block list calls until the returned semaphore gets a permit
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn with_rules(self, rules: Vec<RuleSpec>) -> Self {
        self.state.lock().unwrap().rules = rules;
        self
    }

    pub fn with_warning(self, warning: &str) -> Self {
        self.state.lock().unwrap().warnings.push(warning.to_string());
        self
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn fail_revoke(&self) {
        self.state.lock().unwrap().fail_revoke = true;
    }

    pub fn fail_authorize(&self, port: u16) {
        self.state.lock().unwrap().fail_authorize_ports.insert(port);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Calls other than listing
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| *call != Call::List)
            .collect()
    }

    pub fn rules(&self) -> Vec<RuleSpec> {
        self.state.lock().unwrap().rules.clone()
    }

    /// Number of adapters the factory built
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn factory(&self) -> Box<dyn FirewallProviderFactory> {
        Box::new(FakeFactory {
            firewall: self.clone(),
        })
    }
}

#[async_trait]
impl FirewallProvider for FakeFirewall {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn semantics(&self) -> MatchSemantics {
        self.semantics
    }

    fn warnings(&self) -> Vec<String> {
        self.state.lock().unwrap().warnings.clone()
    }

    async fn list_ingress_rules(&self, _resource: &str) -> Result<Vec<RuleSpec>> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List);
        if state.fail_list {
            return Err(Error::provider(self.kind.as_str(), "connection reset"));
        }
        Ok(state.rules.clone())
    }

    async fn revoke_rule(&self, _resource: &str, rule: &RuleSpec) -> Result<()> {
        let port = rule.from_port as u16;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Revoke {
            port,
            protocol: rule.protocol.clone(),
        });
        if state.fail_revoke {
            return Err(Error::provider(self.kind.as_str(), "revoke rejected"));
        }

        let semantics = self.semantics;
        state.rules.retain(|existing| {
            let same_protocol = existing.protocol_is(rule.protocol.trim());
            match semantics {
                MatchSemantics::ExactPort => {
                    !(same_protocol
                        && existing.is_exactly(port)
                        && existing.primary_cidr() == rule.primary_cidr())
                }
                MatchSemantics::RangeContainment => !(same_protocol && existing.contains(port)),
            }
        });
        Ok(())
    }

    async fn authorize_rule(&self, _resource: &str, rule: &RuleSpec, description: &str) -> Result<()> {
        let port = rule.from_port as u16;
        let cidr = rule.primary_cidr().unwrap_or_default().to_string();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Authorize {
            port,
            cidr: cidr.clone(),
            description: description.to_string(),
        });
        if state.fail_authorize_ports.contains(&port) {
            return Err(Error::provider(self.kind.as_str(), "authorize rejected"));
        }

        let mut stored = rule.clone();
        stored.description = Some(description.to_string());
        if self.semantics == MatchSemantics::RangeContainment {
            stored.state = Some("open".to_string());
        }
        state.rules.push(stored);
        Ok(())
    }
}

struct FakeFactory {
    firewall: FakeFirewall,
}

impl FirewallProviderFactory for FakeFactory {
    fn create(&self, _credentials: &ProviderCredentials) -> Result<Box<dyn FirewallProvider>> {
        self.firewall.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.firewall.clone()))
    }
}

/// Resolver returning a fixed answer
pub struct StaticResolver {
    ip: Option<Ipv4Addr>,
    calls: AtomicUsize,
}

impl StaticResolver {
    pub fn resolving(ip: Ipv4Addr) -> Self {
        Self {
            ip: Some(ip),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            ip: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IpResolver for StaticResolver {
    async fn resolve(&self, endpoints: &[String]) -> std::result::Result<ResolvedIp, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.ip {
            Some(ip) => Ok(ResolvedIp {
                ip,
                endpoint: endpoints.first().cloned().unwrap_or_default(),
                failures: Vec::new(),
            }),
            None => Err(ResolveError {
                failures: endpoints
                    .iter()
                    .map(|endpoint| EndpointFailure {
                        endpoint: endpoint.clone(),
                        reason: EndpointFailureReason::Status(503),
                    })
                    .collect(),
            }),
        }
    }
}

/// Settings with complete credentials for both providers
pub fn complete_settings(providers: &str) -> Settings {
    Settings {
        providers: providers.to_string(),
        access_key: "volc-ak".into(),
        secret_key: "volc-sk".into(),
        region: "cn-beijing".into(),
        security_group_id: "sg-123".into(),
        aws_access_key: "AKIA".into(),
        aws_secret_key: "aws-sk".into(),
        aws_region: "ap-southeast-1".into(),
        aws_instance_name: "web-1".into(),
        volcengine_ports: "22".into(),
        aws_ports: "22".into(),
        ..Settings::default()
    }
}

/// Security-group rule on a single port
pub fn sg_rule(port: i32, cidr: &str) -> RuleSpec {
    RuleSpec {
        direction: Direction::Ingress,
        protocol: "TCP".into(),
        from_port: port,
        to_port: port,
        cidrs: vec![cidr.to_string()],
        ipv6_cidrs: vec![],
        cidr_aliases: vec![],
        source_group: None,
        description: None,
        state: None,
        policy: Some("accept".into()),
        priority: Some(1),
    }
}

/// Instance-firewall port state
pub fn port_state(protocol: &str, from: i32, to: i32, cidrs: &[&str]) -> RuleSpec {
    RuleSpec {
        direction: Direction::Ingress,
        protocol: protocol.to_string(),
        from_port: from,
        to_port: to,
        cidrs: cidrs.iter().map(|cidr| cidr.to_string()).collect(),
        ipv6_cidrs: vec![],
        cidr_aliases: vec![],
        source_group: None,
        description: None,
        state: Some("open".into()),
        policy: None,
        priority: None,
    }
}

/// Everything a contract test needs to drive and observe one reconciler
pub struct Harness {
    pub reconciler: Arc<Reconciler>,
    pub settings: MemorySettingsStore,
    pub audit: MemoryAuditLog,
    pub resolver: Arc<StaticResolver>,
}

impl Harness {
    pub fn new(settings: Settings, resolver: StaticResolver, firewalls: &[&FakeFirewall]) -> Self {
        let mut registry = ProviderRegistry::new();
        for firewall in firewalls {
            registry.register_provider(firewall.kind, firewall.factory());
        }

        let settings = MemorySettingsStore::new(settings);
        let audit = MemoryAuditLog::new();
        let resolver = Arc::new(resolver);

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(settings.clone()),
            Arc::new(audit.clone()),
            Arc::clone(&resolver) as Arc<dyn IpResolver>,
            Arc::new(registry),
        ));

        Self {
            reconciler,
            settings,
            audit,
            resolver,
        }
    }

    /// Messages recorded at `level`, oldest first
    pub async fn messages_at(&self, level: fwsync_core::AuditLevel) -> Vec<String> {
        self.audit
            .entries()
            .await
            .into_iter()
            .filter(|entry| entry.level == level)
            .map(|entry| entry.message)
            .collect()
    }
}

pub const CURRENT_IP: Ipv4Addr = Ipv4Addr::new(203, 0, 113, 5);
pub const CURRENT_CIDR: &str = "203.0.113.5/32";
