// # Provider/Port Normalizer
//
// Turns the raw strings stored in `Settings` into clean work lists.
//
// - Providers: comma-separated, case-insensitive, unknown tokens dropped,
//   first-seen order kept, no duplicates.
// - Ports: comma-separated integers in [1, 65535], first-seen order kept,
//   no duplicates.
//
// Everything here is pure; the engine decides what an empty result means.

use crate::config::ProviderKind;
use std::collections::HashSet;

/// Resolve the enabled provider set
///
/// Source precedence: `providers`, then the legacy single `provider` field,
/// then `volcengine`. The default only applies when both sources are blank;
/// a non-blank source that filters down to nothing yields an empty list.
pub fn normalize_providers(providers: &str, legacy_provider: &str) -> Vec<ProviderKind> {
    let mut raw = providers.trim();
    if raw.is_empty() {
        raw = legacy_provider.trim();
    }
    if raw.is_empty() {
        raw = ProviderKind::Volcengine.as_str();
    }

    let mut seen = HashSet::new();
    raw.split(',')
        .filter_map(ProviderKind::parse)
        .filter(|kind| seen.insert(*kind))
        .collect()
}

/// Parse a comma-separated port list
pub fn parse_ports(raw: &str) -> Vec<u16> {
    let mut seen = HashSet::new();
    raw.split(',')
        .filter_map(|token| token.trim().parse::<i64>().ok())
        .filter(|port| (1..=65535).contains(port))
        .map(|port| port as u16)
        .filter(|port| seen.insert(*port))
        .collect()
}

/// Canonical provider string for values submitted by the configuration surface
///
/// Unlike [`normalize_providers`] the result is always in canonical order
/// (`volcengine` before `aws`), regardless of submission order.
pub fn providers_from_form<S: AsRef<str>>(values: &[S]) -> String {
    let selected: HashSet<ProviderKind> = values
        .iter()
        .filter_map(|value| ProviderKind::parse(value.as_ref()))
        .collect();

    ProviderKind::ALL
        .iter()
        .filter(|kind| selected.contains(*kind))
        .map(ProviderKind::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// First value that is not blank, or an empty string
pub fn first_non_empty<'a>(values: &[&'a str]) -> &'a str {
    values
        .iter()
        .copied()
        .find(|value| !value.trim().is_empty())
        .unwrap_or("")
}
