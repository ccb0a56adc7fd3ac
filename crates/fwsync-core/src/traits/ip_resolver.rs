// # IP Resolver Trait
//
// Defines the interface for discovering the caller's current public IPv4
// address from an ordered list of echo endpoints.
//
// ## Implementations
//
// - HTTP echo chain: `fwsync-ip-http` crate
//
// The resolver is the only source of desired state. A run that cannot
// resolve an address performs no provider calls at all.

use crate::error::{EndpointFailure, ResolveError};
use async_trait::async_trait;
use std::net::Ipv4Addr;

/// A successfully resolved address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIp {
    /// The public IPv4 address
    pub ip: Ipv4Addr,
    /// Endpoint that produced it
    pub endpoint: String,
    /// Endpoints tried (and failed) before the winning one
    pub failures: Vec<EndpointFailure>,
}

/// Trait for IP resolver implementations
///
/// # Contract
///
/// - Endpoints are tried strictly in the given order; blank entries are skipped
/// - The first endpoint that yields a valid IPv4 address wins (no quorum)
/// - Every failed attempt is reported, either in [`ResolvedIp::failures`] or
///   in the returned [`ResolveError`]
/// - An empty endpoint list is a failure
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Resolve the current public IPv4 address
    async fn resolve(&self, endpoints: &[String]) -> Result<ResolvedIp, ResolveError>;
}
