// # HTTP IP Resolver
//
// This crate provides the echo-service resolver for fwsync.
//
// ## Behavior
//
// Endpoints are tried strictly in order with a 5-second timeout each:
//
// - transport error, non-200 status or unreadable body: the endpoint fails
//   and the next one is tried
// - 200: the trimmed body is scanned for the first dotted-quad; if that is a
//   valid IPv4 address it wins, otherwise the whole body is parsed as an
//   IPv4 literal
//
// The first endpoint that yields an address wins. There is no quorum and no
// caching: every call hits the network.

use async_trait::async_trait;
use fwsync_core::Error;
use fwsync_core::error::{EndpointFailure, EndpointFailureReason, ResolveError};
use fwsync_core::traits::{IpResolver, ResolvedIp};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Per-endpoint request timeout
pub const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest response excerpt kept in an "unparseable" failure
const MAX_EXCERPT_CHARS: usize = 200;

/// Resolver that queries public echo services over HTTP
#[derive(Debug, Clone)]
pub struct HttpIpResolver {
    client: reqwest::Client,
}

impl HttpIpResolver {
    /// Create a resolver with the default per-endpoint timeout
    ///
    /// # Errors
    ///
    /// - `Error::Config`: the HTTP client could not be built (e.g. no TLS backend)
    pub fn new() -> Result<Self, Error> {
        Self::with_timeout(ENDPOINT_TIMEOUT)
    }

    /// Create a resolver with a custom per-endpoint timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn query(&self, endpoint: &str) -> Result<Ipv4Addr, EndpointFailureReason> {
        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| EndpointFailureReason::Transport(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(EndpointFailureReason::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EndpointFailureReason::Body(e.to_string()))?;

        let text = body.trim();
        parse_ip_response(text).ok_or_else(|| EndpointFailureReason::Unparseable(excerpt(text)))
    }
}

#[async_trait]
impl IpResolver for HttpIpResolver {
    async fn resolve(&self, endpoints: &[String]) -> Result<ResolvedIp, ResolveError> {
        let mut failures = Vec::new();

        for endpoint in endpoints.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
            match self.query(endpoint).await {
                Ok(ip) => {
                    tracing::debug!("Resolved {} via {}", ip, endpoint);
                    return Ok(ResolvedIp {
                        ip,
                        endpoint: endpoint.to_string(),
                        failures,
                    });
                }
                Err(reason) => {
                    let failure = EndpointFailure {
                        endpoint: endpoint.to_string(),
                        reason,
                    };
                    tracing::debug!("{}", failure);
                    failures.push(failure);
                }
            }
        }

        Err(ResolveError { failures })
    }
}

/// Extract an IPv4 address from an echo-service response
///
/// The first dotted-quad token wins if every octet is in range; otherwise
/// the whole text must be an IPv4 literal.
pub fn parse_ip_response(text: &str) -> Option<Ipv4Addr> {
    let text = text.trim();
    first_dotted_quad(text)
        .and_then(parse_octets)
        .or_else(|| text.parse::<Ipv4Addr>().ok())
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// First token of the form `d.d.d.d` (1-3 ASCII digits each) on word boundaries
///
/// Octet values are not checked here; only the first such token is returned.
fn first_dotted_quad(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();

    'start: for start in 0..bytes.len() {
        if !bytes[start].is_ascii_digit() {
            continue;
        }
        if start > 0 && is_word_byte(bytes[start - 1]) {
            continue;
        }

        let mut pos = start;
        for group in 0..4 {
            let run = bytes[pos..].iter().take_while(|b| b.is_ascii_digit()).count();
            if run == 0 || run > 3 {
                continue 'start;
            }
            pos += run;

            if group < 3 {
                if bytes.get(pos) != Some(&b'.') {
                    continue 'start;
                }
                pos += 1;
            } else if bytes.get(pos).is_some_and(|b| is_word_byte(*b)) {
                continue 'start;
            }
        }

        return Some(&text[start..pos]);
    }

    None
}

fn parse_octets(token: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = token.split('.');
    for octet in octets.iter_mut() {
        *octet = parts.next()?.parse::<u8>().ok()?;
    }
    Some(Ipv4Addr::from(octets))
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= MAX_EXCERPT_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_EXCERPT_CHARS).collect();
    cut.push_str("...");
    cut
}
