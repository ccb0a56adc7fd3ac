//! Run outcomes
//!
//! In-memory record of what one reconciliation run did. Nothing here is
//! persisted; the audit log is the durable trail.

use crate::config::ProviderKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::Ipv4Addr;

/// Lifecycle of one (provider, port) unit of work
///
/// ```text
/// UNKNOWN ─┬─> MATCHED_SYNCED
///          ├─> MATCHED_STALE ─> REVOKED ─┬─> AUTHORIZED
///          └─> NO_MATCH ─────────────────┤
///                                        └─> FAILED
/// ```
///
/// `MATCHED_STALE` moves to `REVOKED` once the revocations have been
/// attempted, whether or not each one succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortState {
    /// Not evaluated yet
    Unknown,
    /// The live rule already allows exactly the desired CIDR
    MatchedSynced,
    /// Matching rules exist but do not allow the desired CIDR
    MatchedStale,
    /// No rule covers the port
    NoMatch,
    /// Stale rules were revoked (individual revokes may have failed)
    Revoked,
    /// The desired rule was authorized
    Authorized,
    /// Authorizing the desired rule failed
    Failed,
}

impl PortState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: PortState) -> bool {
        use PortState::*;
        matches!(
            (self, next),
            (Unknown, MatchedSynced)
                | (Unknown, MatchedStale)
                | (Unknown, NoMatch)
                | (MatchedStale, Revoked)
                | (Revoked, Authorized)
                | (Revoked, Failed)
                | (NoMatch, Authorized)
                | (NoMatch, Failed)
        )
    }

    /// No further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PortState::MatchedSynced | PortState::Authorized | PortState::Failed
        )
    }
}

/// What happened to one port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortOutcome {
    /// Target port
    pub port: u16,
    /// Every state visited, starting with `Unknown`
    pub history: Vec<PortState>,
    /// Revocations that succeeded
    pub revoked: usize,
    /// Revocations that failed
    pub revoke_failures: usize,
}

impl PortOutcome {
    pub(crate) fn new(port: u16) -> Self {
        Self {
            port,
            history: vec![PortState::Unknown],
            revoked: 0,
            revoke_failures: 0,
        }
    }

    /// Current (final, once the run is over) state
    pub fn state(&self) -> PortState {
        self.history.last().copied().unwrap_or(PortState::Unknown)
    }

    pub(crate) fn advance(&mut self, next: PortState) {
        debug_assert!(
            self.state().can_transition_to(next),
            "illegal port transition {:?} -> {:?}",
            self.state(),
            next
        );
        self.history.push(next);
    }
}

/// Why a provider did no per-port work
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderSkip {
    /// Required settings are blank
    IncompleteConfig { missing: Vec<String> },
    /// The port list normalized to nothing
    NoPorts,
    /// The adapter could not be constructed
    ClientUnavailable { error: String },
    /// The rule listing failed
    ListFailed { error: String },
}

/// What happened to one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderReport {
    /// Which provider
    pub provider: ProviderKind,
    /// Set when the provider was skipped as a whole
    pub skipped: Option<ProviderSkip>,
    /// Per-port outcomes, in configured order
    pub ports: Vec<PortOutcome>,
}

impl ProviderReport {
    pub(crate) fn skipped(provider: ProviderKind, reason: ProviderSkip) -> Self {
        Self {
            provider,
            skipped: Some(reason),
            ports: Vec::new(),
        }
    }

    /// Outcome for `port`, if it was processed
    pub fn port(&self, port: u16) -> Option<&PortOutcome> {
        self.ports.iter().find(|outcome| outcome.port == port)
    }
}

/// A run that got as far as resolving the desired IP
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Desired address for this run
    pub ip: Ipv4Addr,
    /// Echo endpoint that produced `ip`
    pub endpoint: String,
    /// One report per enabled provider, in normalized order
    pub providers: Vec<ProviderReport>,
}

impl RunReport {
    /// Report for `provider`, if it was enabled
    pub fn provider(&self, provider: ProviderKind) -> Option<&ProviderReport> {
        self.providers.iter().find(|report| report.provider == provider)
    }

    /// Number of ports that ended in `state`
    pub fn count(&self, state: PortState) -> usize {
        self.providers
            .iter()
            .flat_map(|report| report.ports.iter())
            .filter(|outcome| outcome.state() == state)
            .count()
    }
}

/// Why a run stopped before touching any provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunSkip {
    /// The settings record could not be read
    SettingsUnavailable { error: String },
    /// No recognized provider is enabled
    NoProviders,
    /// Every echo endpoint failed
    IpUnresolved,
}

/// Result of [`Reconciler::reconcile`](super::Reconciler::reconcile)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The run resolved an IP and processed every enabled provider
    Completed(RunReport),
    /// The run stopped early
    Skipped {
        /// When the run started
        at: DateTime<Utc>,
        /// Why
        reason: RunSkip,
    },
    /// Another run was in progress; nothing was done
    AlreadyRunning,
}

impl RunOutcome {
    /// The report, for completed runs
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}
