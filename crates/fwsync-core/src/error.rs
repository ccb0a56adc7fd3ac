//! Error types for the firewall sync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for fwsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the firewall sync system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings store errors
    #[error("Settings store error: {0}")]
    SettingsStore(String),

    /// Audit log errors
    #[error("Audit log error: {0}")]
    AuditLog(String),

    /// Local I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Resource (security group, instance) not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a settings store error
    pub fn settings_store(msg: impl Into<String>) -> Self {
        Self::SettingsStore(msg.into())
    }

    /// Create an audit log error
    pub fn audit_log(msg: impl Into<String>) -> Self {
        Self::AuditLog(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Why a single echo endpoint did not produce an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointFailureReason {
    /// Connection, TLS or timeout failure
    Transport(String),
    /// The endpoint answered with a status other than 200
    Status(u16),
    /// The body could not be read
    Body(String),
    /// The body did not contain a usable IPv4 address
    Unparseable(String),
}

/// A failed attempt against one echo endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointFailure {
    /// Endpoint URL as configured
    pub endpoint: String,
    /// What went wrong
    pub reason: EndpointFailureReason,
}

impl std::fmt::Display for EndpointFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.reason {
            EndpointFailureReason::Transport(e) => {
                write!(f, "failed to fetch IP from {}: {}", self.endpoint, e)
            }
            EndpointFailureReason::Status(status) => {
                write!(f, "{} returned HTTP {}", self.endpoint, status)
            }
            EndpointFailureReason::Body(e) => {
                write!(f, "failed to read response from {}: {}", self.endpoint, e)
            }
            EndpointFailureReason::Unparseable(body) => write!(
                f,
                "could not parse IP from {}, response: {}",
                self.endpoint, body
            ),
        }
    }
}

/// Every configured echo endpoint failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot resolve IP: {} endpoint(s) tried, none returned a valid IPv4 address", failures.len())]
pub struct ResolveError {
    /// One entry per attempted endpoint, in configured order
    pub failures: Vec<EndpointFailure>,
}
