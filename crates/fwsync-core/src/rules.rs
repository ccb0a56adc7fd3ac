//! Provider-agnostic firewall rules and match semantics
//!
//! Each provider adapter translates its native rule listing into
//! [`RuleSpec`]s and declares which [`MatchSemantics`] applies to them. The
//! engine only ever reasons through these two types.
//!
//! The two semantics are deliberately different:
//!
//! - [`MatchSemantics::ExactPort`] models flat security-group rules. Only
//!   single-port rules on exactly the target port are managed; a range rule
//!   such as 20-30 is left alone when reconciling port 25.
//! - [`MatchSemantics::RangeContainment`] models range-keyed instance
//!   firewalls, where any entry whose range contains the port affects it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Protocol used for every rule the engine authorizes
pub const MANAGED_PROTOCOL: &str = "tcp";

/// Traffic direction of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Inbound traffic
    Ingress,
    /// Outbound traffic
    Egress,
}

/// Provider-agnostic shape of one firewall rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Traffic direction
    pub direction: Direction,
    /// Protocol as reported by the provider (compare case-insensitively)
    pub protocol: String,
    /// First port of the range
    pub from_port: i32,
    /// Last port of the range
    pub to_port: i32,
    /// IPv4 sources
    pub cidrs: Vec<String>,
    /// IPv6 sources
    #[serde(default)]
    pub ipv6_cidrs: Vec<String>,
    /// Named CIDR lists (provider-managed aliases)
    #[serde(default)]
    pub cidr_aliases: Vec<String>,
    /// Source security group, for rules that allow a group instead of a CIDR
    #[serde(default)]
    pub source_group: Option<String>,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
    /// Rule state, e.g. `open` or `closed`
    #[serde(default)]
    pub state: Option<String>,
    /// Accept/drop policy
    #[serde(default)]
    pub policy: Option<String>,
    /// Evaluation priority
    #[serde(default)]
    pub priority: Option<i32>,
}

impl RuleSpec {
    /// The rule the engine authorizes: one TCP port, one `/32` source
    pub fn single_port_tcp(port: u16, cidr: impl Into<String>) -> Self {
        Self {
            direction: Direction::Ingress,
            protocol: MANAGED_PROTOCOL.to_string(),
            from_port: i32::from(port),
            to_port: i32::from(port),
            cidrs: vec![cidr.into()],
            ipv6_cidrs: Vec::new(),
            cidr_aliases: Vec::new(),
            source_group: None,
            description: None,
            state: None,
            policy: None,
            priority: None,
        }
    }

    /// Case-insensitive protocol comparison
    pub fn protocol_is(&self, protocol: &str) -> bool {
        self.protocol.trim().eq_ignore_ascii_case(protocol)
    }

    /// Managed protocols: TCP or the catch-all `all`
    pub fn is_tcp_or_all(&self) -> bool {
        self.protocol_is("tcp") || self.protocol_is("all")
    }

    /// `true` when the range is exactly `[port, port]`
    pub fn is_exactly(&self, port: u16) -> bool {
        self.from_port == i32::from(port) && self.to_port == i32::from(port)
    }

    /// `true` when `port` falls within `[from_port, to_port]`
    pub fn contains(&self, port: u16) -> bool {
        let port = i32::from(port);
        self.from_port <= port && port <= self.to_port
    }

    /// Primary IPv4 source, if any
    pub fn primary_cidr(&self) -> Option<&str> {
        self.cidrs.first().map(String::as_str)
    }

    /// Copy of this rule narrowed to `[port, port]`
    pub fn narrowed_to(&self, port: u16) -> Self {
        Self {
            from_port: i32::from(port),
            to_port: i32::from(port),
            ..self.clone()
        }
    }
}

/// Host CIDR (`a.b.c.d/32`) for an address
pub fn host_cidr(ip: Ipv4Addr) -> String {
    format!("{}/32", ip)
}

/// Compare a provider-reported source with the desired host CIDR
///
/// A bare address without prefix counts as `/32`.
pub fn cidr_matches(actual: &str, desired: &str) -> bool {
    let actual = actual.trim();
    if actual.contains('/') {
        actual.eq_ignore_ascii_case(desired)
    } else {
        format!("{}/32", actual).eq_ignore_ascii_case(desired)
    }
}

/// Default description for a managed rule
pub fn generated_description(port: u16) -> String {
    format!("whitelist access (port {}) - managed by fwsync", port)
}

/// How a provider's rules relate to a target port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSemantics {
    /// Flat rule list; only exact single-port ingress rules are managed
    ExactPort,
    /// Range-keyed entries; any entry containing the port is managed
    RangeContainment,
}

impl MatchSemantics {
    /// Rules in `rules` that govern `port`
    pub fn find_matches(&self, rules: &[RuleSpec], port: u16) -> Vec<RuleSpec> {
        rules
            .iter()
            .filter(|rule| match self {
                MatchSemantics::ExactPort => {
                    rule.direction == Direction::Ingress
                        && rule.source_group.is_none()
                        && rule.is_tcp_or_all()
                        && rule.is_exactly(port)
                }
                MatchSemantics::RangeContainment => rule.contains(port) && rule.is_tcp_or_all(),
            })
            .cloned()
            .collect()
    }

    /// Whether `matches` already allow exactly `desired_cidr` on `port`
    ///
    /// Anything unexpected (several matches, aliases, IPv6 sources) is
    /// reported as not synced.
    pub fn is_synced(&self, matches: &[RuleSpec], port: u16, desired_cidr: &str) -> bool {
        let [rule] = matches else {
            return false;
        };

        match self {
            MatchSemantics::ExactPort => rule
                .primary_cidr()
                .is_some_and(|cidr| cidr_matches(cidr, desired_cidr)),
            MatchSemantics::RangeContainment => {
                rule.is_exactly(port)
                    && rule.protocol_is(MANAGED_PROTOCOL)
                    && rule
                        .state
                        .as_deref()
                        .is_some_and(|state| state.trim().eq_ignore_ascii_case("open"))
                    && rule.cidrs.len() == 1
                    && rule.cidr_aliases.is_empty()
                    && rule.ipv6_cidrs.is_empty()
                    && rule.cidrs[0].trim().eq_ignore_ascii_case(desired_cidr)
            }
        }
    }

    /// Rules to revoke before authorizing the desired rule on `port`
    pub fn revocations(&self, matches: &[RuleSpec], port: u16) -> Vec<RuleSpec> {
        match self {
            MatchSemantics::ExactPort => {
                matches.iter().map(|rule| rule.narrowed_to(port)).collect()
            }
            MatchSemantics::RangeContainment => {
                // One close per protocol; the provider closes by port + protocol
                let mut closed = HashSet::new();
                matches
                    .iter()
                    .filter_map(|rule| {
                        let protocol = rule.protocol.trim().to_lowercase();
                        if protocol.is_empty() || !closed.insert(protocol.clone()) {
                            return None;
                        }
                        let mut target = rule.narrowed_to(port);
                        target.protocol = protocol;
                        Some(target)
                    })
                    .collect()
            }
        }
    }

    /// Description for the replacement rule
    ///
    /// An existing description is preserved; otherwise one is generated.
    pub fn description(&self, matches: &[RuleSpec], port: u16) -> String {
        matches
            .iter()
            .filter_map(|rule| rule.description.as_deref())
            .find(|desc| !desc.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| generated_description(port))
    }
}
