//! Core reconciliation engine
//!
//! The Reconciler is responsible for:
//! - Reading one settings snapshot per run
//! - Resolving the desired IP via the IpResolver
//! - Diffing each provider's live rules against the desired state
//! - Issuing the minimal revoke/authorize calls
//! - Recording every decision in the AuditLog
//!
//! ## Architecture
//!
//! ```text
//!                 trigger (scheduler / manual)
//!                             │
//!                             ▼
//! ┌───────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ SettingsStore │──>│  Reconciler  │──>│  AuditLog   │
//! └───────────────┘   └──────────────┘   └─────────────┘
//!                       │          │
//!                       ▼          ▼
//!              ┌────────────┐  ┌──────────────────┐
//!              │ IpResolver │  │ ProviderRegistry │
//!              └────────────┘  └──────────────────┘
//!                                       │
//!                                       ▼
//!                              ┌──────────────────┐
//!                              │ FirewallProvider │
//!                              └──────────────────┘
//! ```
//!
//! ## Run Flow
//!
//! 1. Acquire the run guard (a concurrent run is dropped)
//! 2. Sweep audit entries past the retention window, load settings, normalize
//!    the provider list
//! 3. Resolve the current IP; abort with zero provider calls on failure
//! 4. Per provider: completeness check, port list, one rule listing
//! 5. Per port: synced → nothing; otherwise revoke stale rules, then authorize
//!
//! Runs are best-effort: a failure skips the current unit of work (port or
//! provider) and the run continues. Nothing rolls back.

mod report;

pub use report::{
    PortOutcome, PortState, ProviderReport, ProviderSkip, RunOutcome, RunReport, RunSkip,
};

use crate::config::{ProviderKind, Settings};
use crate::normalize::{normalize_providers, parse_ports};
use crate::registry::ProviderRegistry;
use crate::rules::{RuleSpec, host_cidr};
use crate::traits::audit_log::RETENTION_DAYS;
use crate::traits::{AuditLevel, AuditLog, FirewallProvider, IpResolver, SettingsStore};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Core reconciliation engine
///
/// All collaborators are passed in at construction; the engine holds no
/// global state. It is cheap to share behind an `Arc` between the scheduler
/// and the control API.
///
/// ## Single-flight
///
/// At most one run executes at a time. A call to [`reconcile`](Self::reconcile)
/// while a run is in progress returns [`RunOutcome::AlreadyRunning`] right
/// away without touching any provider.
pub struct Reconciler {
    settings: Arc<dyn SettingsStore>,
    audit: Arc<dyn AuditLog>,
    resolver: Arc<dyn IpResolver>,
    registry: Arc<ProviderRegistry>,

    /// Held for the duration of a run
    run_guard: Mutex<()>,
    running: AtomicBool,

    /// Outcome of the most recent run that was not dropped
    last_outcome: RwLock<Option<RunOutcome>>,
}

impl Reconciler {
    /// Create a new reconciler
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        audit: Arc<dyn AuditLog>,
        resolver: Arc<dyn IpResolver>,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            settings,
            audit,
            resolver,
            registry,
            run_guard: Mutex::new(()),
            running: AtomicBool::new(false),
            last_outcome: RwLock::new(None),
        }
    }

    /// `true` while a run holds the guard
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Outcome of the most recent completed or skipped run
    pub async fn last_outcome(&self) -> Option<RunOutcome> {
        self.last_outcome.read().await.clone()
    }

    /// Run one reconciliation pass
    ///
    /// Never fails: every error is recorded in the audit log and reflected
    /// in the returned outcome.
    pub async fn reconcile(&self) -> RunOutcome {
        let Ok(_guard) = self.run_guard.try_lock() else {
            self.record(AuditLevel::Info, "IP check already in progress, skipping this trigger")
                .await;
            return RunOutcome::AlreadyRunning;
        };

        self.running.store(true, Ordering::Release);
        let outcome = self.run_locked().await;
        self.running.store(false, Ordering::Release);
        *self.last_outcome.write().await = Some(outcome.clone());
        outcome
    }

    async fn run_locked(&self) -> RunOutcome {
        let started_at = Utc::now();
        self.sweep_retention().await;

        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                self.record(AuditLevel::Error, &format!("failed to load settings: {}", e))
                    .await;
                return RunOutcome::Skipped {
                    at: started_at,
                    reason: RunSkip::SettingsUnavailable {
                        error: e.to_string(),
                    },
                };
            }
        };

        let providers = normalize_providers(&settings.providers, &settings.provider);
        if providers.is_empty() {
            self.record(
                AuditLevel::Warning,
                "no cloud provider selected, skipping check",
            )
            .await;
            return RunOutcome::Skipped {
                at: started_at,
                reason: RunSkip::NoProviders,
            };
        }

        let names: Vec<&str> = providers.iter().map(ProviderKind::as_str).collect();
        self.record(
            AuditLevel::Info,
            &format!("Starting IP check (providers={})", names.join(",")),
        )
        .await;

        let resolved = match self.resolver.resolve(&settings.ip_endpoints()).await {
            Ok(resolved) => resolved,
            Err(e) => {
                for failure in &e.failures {
                    self.record(AuditLevel::Warning, &failure.to_string()).await;
                }
                self.record(AuditLevel::Error, "cannot resolve IP, skipping check")
                    .await;
                return RunOutcome::Skipped {
                    at: started_at,
                    reason: RunSkip::IpUnresolved,
                };
            }
        };

        for failure in &resolved.failures {
            self.record(AuditLevel::Warning, &failure.to_string()).await;
        }
        self.record(
            AuditLevel::Info,
            &format!(
                "current public IP: {} (source: {})",
                resolved.ip, resolved.endpoint
            ),
        )
        .await;

        let desired_cidr = host_cidr(resolved.ip);
        let mut reports = Vec::with_capacity(providers.len());
        for kind in providers {
            reports.push(self.reconcile_provider(kind, &settings, &desired_cidr).await);
        }

        RunOutcome::Completed(RunReport {
            started_at,
            finished_at: Utc::now(),
            ip: resolved.ip,
            endpoint: resolved.endpoint,
            providers: reports,
        })
    }

    async fn reconcile_provider(
        &self,
        kind: ProviderKind,
        settings: &Settings,
        desired_cidr: &str,
    ) -> ProviderReport {
        let missing = settings.missing_fields(kind);
        if !missing.is_empty() {
            self.record(
                AuditLevel::Warning,
                &format!(
                    "provider={} skipped: incomplete configuration ({} missing)",
                    kind,
                    missing.join("/")
                ),
            )
            .await;
            return ProviderReport::skipped(
                kind,
                ProviderSkip::IncompleteConfig {
                    missing: missing.into_iter().map(str::to_string).collect(),
                },
            );
        }

        let ports = parse_ports(settings.ports_source(kind));
        if ports.is_empty() {
            self.record(
                AuditLevel::Warning,
                &format!(
                    "provider={} skipped: no valid ports configured (use comma-separated ports, e.g. 22,8080)",
                    kind
                ),
            )
            .await;
            return ProviderReport::skipped(kind, ProviderSkip::NoPorts);
        }

        let credentials = settings.credentials(kind);
        let provider = match self.registry.create_provider(kind, &credentials) {
            Ok(provider) => provider,
            Err(e) => {
                self.record(
                    AuditLevel::Error,
                    &format!("provider={}: failed to create client: {}", kind, e),
                )
                .await;
                return ProviderReport::skipped(
                    kind,
                    ProviderSkip::ClientUnavailable {
                        error: e.to_string(),
                    },
                );
            }
        };

        for notice in provider.warnings() {
            self.record(AuditLevel::Warning, &format!("provider={}: {}", kind, notice))
                .await;
        }

        let resource = credentials.resource_id.as_str();
        let rules = match provider.list_ingress_rules(resource).await {
            Ok(rules) => rules,
            Err(e) => {
                self.record(
                    AuditLevel::Error,
                    &format!("provider={}: failed to list rules: {}", kind, e),
                )
                .await;
                return ProviderReport::skipped(
                    kind,
                    ProviderSkip::ListFailed {
                        error: e.to_string(),
                    },
                );
            }
        };
        debug!(provider = %kind, rules = rules.len(), "Listed firewall rules");

        let mut outcomes = Vec::with_capacity(ports.len());
        for port in ports {
            outcomes.push(
                self.reconcile_port(provider.as_ref(), resource, &rules, port, desired_cidr)
                    .await,
            );
        }

        ProviderReport {
            provider: kind,
            skipped: None,
            ports: outcomes,
        }
    }

    async fn reconcile_port(
        &self,
        provider: &dyn FirewallProvider,
        resource: &str,
        rules: &[RuleSpec],
        port: u16,
        desired_cidr: &str,
    ) -> PortOutcome {
        let kind = provider.kind();
        let semantics = provider.semantics();
        let mut outcome = PortOutcome::new(port);

        let matches = semantics.find_matches(rules, port);
        if semantics.is_synced(&matches, port, desired_cidr) {
            outcome.advance(PortState::MatchedSynced);
            self.record(
                AuditLevel::Info,
                &format!(
                    "provider={} port {}: IP unchanged ({}), nothing to do",
                    kind, port, desired_cidr
                ),
            )
            .await;
            return outcome;
        }

        if matches.is_empty() {
            outcome.advance(PortState::NoMatch);
            self.record(
                AuditLevel::Info,
                &format!(
                    "provider={} port {}: no existing rule, adding a new one",
                    kind, port
                ),
            )
            .await;
        } else {
            outcome.advance(PortState::MatchedStale);
            for target in semantics.revocations(&matches, port) {
                self.record(
                    AuditLevel::Info,
                    &format!(
                        "provider={} port {}: revoking old rule (protocol={}, cidr={})",
                        kind,
                        port,
                        target.protocol,
                        target.cidrs.join(",")
                    ),
                )
                .await;

                match provider.revoke_rule(resource, &target).await {
                    Ok(()) => outcome.revoked += 1,
                    Err(e) => {
                        outcome.revoke_failures += 1;
                        self.record(
                            AuditLevel::Warning,
                            &format!("provider={} port {}: revoke failed: {}", kind, port, e),
                        )
                        .await;
                    }
                }
            }
            outcome.advance(PortState::Revoked);
        }

        let description = semantics.description(&matches, port);
        let desired = RuleSpec::single_port_tcp(port, desired_cidr);
        self.record(
            AuditLevel::Info,
            &format!(
                "provider={} port {}: authorizing {}",
                kind, port, desired_cidr
            ),
        )
        .await;

        match provider.authorize_rule(resource, &desired, &description).await {
            Ok(()) => {
                outcome.advance(PortState::Authorized);
                self.record(
                    AuditLevel::Info,
                    &format!(
                        "provider={} port {}: now allowing {}",
                        kind, port, desired_cidr
                    ),
                )
                .await;
            }
            Err(e) => {
                outcome.advance(PortState::Failed);
                self.record(
                    AuditLevel::Error,
                    &format!("provider={} port {}: authorize failed: {}", kind, port, e),
                )
                .await;
            }
        }

        outcome
    }

    /// Delete audit entries older than the retention window
    ///
    /// Runs at the start of every run, scheduled or manual. A failed sweep is
    /// recorded and the run goes on.
    async fn sweep_retention(&self) {
        let cutoff = Utc::now() - ChronoDuration::days(RETENTION_DAYS);
        match self.audit.prune_before(cutoff).await {
            Ok(0) => {}
            Ok(removed) => {
                self.record(
                    AuditLevel::Info,
                    &format!(
                        "audit log cleanup: removed {} entries older than {} days",
                        removed, RETENTION_DAYS
                    ),
                )
                .await;
            }
            Err(e) => {
                self.record(AuditLevel::Warning, &format!("audit log cleanup failed: {}", e))
                    .await;
            }
        }
    }

    /// Record an audit entry and mirror it to tracing
    ///
    /// A failing audit sink is logged and otherwise ignored.
    async fn record(&self, level: AuditLevel, message: &str) {
        match level {
            AuditLevel::Info => info!("{}", message),
            AuditLevel::Warning => warn!("{}", message),
            AuditLevel::Error => error!("{}", message),
        }

        if let Err(e) = self.audit.record(level, message).await {
            error!("Failed to write audit entry: {}", e);
        }
    }
}
