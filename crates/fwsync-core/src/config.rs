//! Configuration types for the firewall sync system
//!
//! [`Settings`] is the singleton record owned by the settings store. The
//! engine reads one snapshot per run; nothing in this module performs I/O.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default region for Volcengine
pub const DEFAULT_VOLCENGINE_REGION: &str = "cn-beijing";

/// Default legacy port, shared by every provider whose own port list is blank
pub const DEFAULT_SSH_PORT: &str = "22";

/// Default check interval (seconds)
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 900;

/// Default echo services, in trust order
pub const DEFAULT_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
    "https://ident.me",
];

/// Cloud providers the engine knows how to reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Volcengine VPC security group
    Volcengine,
    /// AWS Lightsail instance firewall
    Aws,
}

impl ProviderKind {
    /// Every supported provider, in canonical order
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Volcengine, ProviderKind::Aws];

    /// Stable identifier used in settings, logs and the registry
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Volcengine => "volcengine",
            ProviderKind::Aws => "aws",
        }
    }

    /// Parse a provider token (trimmed, case-insensitive)
    ///
    /// Returns `None` for anything outside the fixed vocabulary.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "volcengine" => Some(ProviderKind::Volcengine),
            "aws" => Some(ProviderKind::Aws),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted settings record
///
/// Port lists and the provider set are kept as the raw strings the operator
/// typed; [`crate::normalize`] turns them into clean work lists per run.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Legacy single-provider field
    pub provider: String,
    /// Comma-separated enabled providers
    pub providers: String,

    /// Volcengine access key
    pub access_key: String,
    /// Volcengine secret key
    /// ⚠️ NEVER log this value
    pub secret_key: String,
    /// Volcengine region
    pub region: String,
    /// Volcengine security group ID
    pub security_group_id: String,

    /// AWS access key
    pub aws_access_key: String,
    /// AWS secret key
    /// ⚠️ NEVER log this value
    pub aws_secret_key: String,
    /// AWS region (availability-zone form is tolerated)
    pub aws_region: String,
    /// Lightsail instance name
    pub aws_instance_name: String,

    /// Comma-separated ports for Volcengine
    pub volcengine_ports: String,
    /// Comma-separated ports for AWS
    pub aws_ports: String,
    /// Legacy shared port field
    pub ssh_port: String,

    /// Check interval in seconds (0 = not scheduled)
    pub check_interval: u64,

    /// Newline-separated echo endpoints, in trust order
    pub ip_services: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: String::new(),
            providers: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            region: DEFAULT_VOLCENGINE_REGION.to_string(),
            security_group_id: String::new(),
            aws_access_key: String::new(),
            aws_secret_key: String::new(),
            aws_region: String::new(),
            aws_instance_name: String::new(),
            volcengine_ports: String::new(),
            aws_ports: String::new(),
            ssh_port: DEFAULT_SSH_PORT.to_string(),
            check_interval: DEFAULT_CHECK_INTERVAL_SECS,
            ip_services: DEFAULT_IP_SERVICES.join("\n"),
        }
    }
}

// Custom Debug implementation that hides both secret keys
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("providers", &self.providers)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<REDACTED>")
            .field("region", &self.region)
            .field("security_group_id", &self.security_group_id)
            .field("aws_access_key", &self.aws_access_key)
            .field("aws_secret_key", &"<REDACTED>")
            .field("aws_region", &self.aws_region)
            .field("aws_instance_name", &self.aws_instance_name)
            .field("volcengine_ports", &self.volcengine_ports)
            .field("aws_ports", &self.aws_ports)
            .field("ssh_port", &self.ssh_port)
            .field("check_interval", &self.check_interval)
            .field("ip_services", &self.ip_services)
            .finish()
    }
}

impl Settings {
    /// Fill blank fields from their legacy counterparts
    ///
    /// Returns `true` when anything changed, so the caller knows to write the
    /// record back.
    pub fn migrate_legacy(&mut self) -> bool {
        let mut changed = false;

        if self.provider.trim().is_empty() {
            self.provider = ProviderKind::Volcengine.as_str().to_string();
            changed = true;
        }
        if self.providers.trim().is_empty() {
            self.providers = self.provider.clone();
            changed = true;
        }
        if self.volcengine_ports.trim().is_empty() {
            self.volcengine_ports = self.ssh_port.clone();
            changed = true;
        }
        if self.aws_ports.trim().is_empty() {
            self.aws_ports = self.ssh_port.clone();
            changed = true;
        }

        // Single-provider AWS installs kept their credentials in the shared fields
        if ProviderKind::parse(&self.provider) == Some(ProviderKind::Aws) {
            changed |= fill_blank(&mut self.aws_access_key, &self.access_key);
            changed |= fill_blank(&mut self.aws_secret_key, &self.secret_key);
            changed |= fill_blank(&mut self.aws_region, &self.region);
            changed |= fill_blank(&mut self.aws_instance_name, &self.security_group_id);
        }

        changed
    }

    /// Credentials and resource handle for one provider (trimmed)
    pub fn credentials(&self, kind: ProviderKind) -> ProviderCredentials {
        match kind {
            ProviderKind::Volcengine => ProviderCredentials::new(
                &self.access_key,
                &self.secret_key,
                &self.region,
                &self.security_group_id,
            ),
            ProviderKind::Aws => ProviderCredentials::new(
                &self.aws_access_key,
                &self.aws_secret_key,
                &self.aws_region,
                &self.aws_instance_name,
            ),
        }
    }

    /// Names of required fields that are blank for `kind`
    ///
    /// The names are the labels operators see on the configuration surface.
    pub fn missing_fields(&self, kind: ProviderKind) -> Vec<&'static str> {
        let fields: [(&str, &'static str); 4] = match kind {
            ProviderKind::Volcengine => [
                (self.access_key.as_str(), "Volc_AK"),
                (self.secret_key.as_str(), "Volc_SK"),
                (self.region.as_str(), "Volc_Region"),
                (self.security_group_id.as_str(), "Volc_SG_ID"),
            ],
            ProviderKind::Aws => [
                (self.aws_access_key.as_str(), "AWS_AK"),
                (self.aws_secret_key.as_str(), "AWS_SK"),
                (self.aws_region.as_str(), "AWS_Region"),
                (self.aws_instance_name.as_str(), "AWS_InstanceName"),
            ],
        };

        fields
            .iter()
            .filter(|(value, _)| value.trim().is_empty())
            .map(|(_, name)| *name)
            .collect()
    }

    /// Raw port string that is authoritative for `kind`
    ///
    /// The provider-specific field wins when non-blank, otherwise the legacy
    /// shared field applies.
    pub fn ports_source(&self, kind: ProviderKind) -> &str {
        let own = match kind {
            ProviderKind::Volcengine => self.volcengine_ports.trim(),
            ProviderKind::Aws => self.aws_ports.trim(),
        };
        if own.is_empty() {
            self.ssh_port.trim()
        } else {
            own
        }
    }

    /// Echo endpoints in configured order, blanks removed
    pub fn ip_endpoints(&self) -> Vec<String> {
        self.ip_services
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn fill_blank(target: &mut String, source: &str) -> bool {
    if target.trim().is_empty() && !source.trim().is_empty() {
        *target = source.to_string();
        return true;
    }
    false
}

/// Per-provider credentials plus the resource the rules live on
///
/// `resource_id` is a security group ID for Volcengine and an instance name
/// for Lightsail.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    /// Access key ID
    pub access_key: String,
    /// Secret access key
    /// ⚠️ NEVER log this value
    pub secret_key: String,
    /// Region as configured
    pub region: String,
    /// Resource handle
    pub resource_id: String,
}

impl ProviderCredentials {
    /// Create credentials, trimming every field
    pub fn new(access_key: &str, secret_key: &str, region: &str, resource_id: &str) -> Self {
        Self {
            access_key: access_key.trim().to_string(),
            secret_key: secret_key.trim().to_string(),
            region: region.trim().to_string(),
            resource_id: resource_id.trim().to_string(),
        }
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<REDACTED>")
            .field("region", &self.region)
            .field("resource_id", &self.resource_id)
            .finish()
    }
}

/// Default timeout for provider API calls
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);

/// HTTP client options shared by provider adapters
///
/// Fixed at startup and handed to each provider's factory; per-run values
/// come from [`ProviderCredentials`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// Perform list calls but only log mutations
    pub dry_run: bool,
    /// Base URL override (`scheme://host[:port]`), used instead of the
    /// provider's public endpoint
    pub endpoint: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROVIDER_TIMEOUT,
            dry_run: false,
            endpoint: None,
        }
    }
}

impl ClientOptions {
    /// Options for a live client with the given timeout
    pub fn live(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Same options, pointed at another base URL
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Same options, in dry-run mode
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}
