// # Volcengine Security Group Provider
//
// This crate provides the Volcengine VPC security-group adapter for fwsync.
//
// ## Behavior
//
// - ✅ One HTTP request per trait call (list, revoke or authorize)
// - ✅ Full error propagation to the engine (no retries, no backoff)
// - ✅ HTTP timeout from `ClientOptions` (default 20 seconds)
// - ✅ HTTP status and `ResponseMetadata.Error` codes mapped to core errors
// - ✅ Dry-run mode: rules are listed, mutations are only logged
// - ❌ NO match or sync decisions (owned by `MatchSemantics::ExactPort`)
// - ❌ NO caching of rules across calls
//
// ### Trust Level: Untrusted (Firewall Provider)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTPS API calls to the Volcengine OpenAPI endpoint only
// - ✅ Translate `Permissions` entries to and from `RuleSpec`
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Write audit entries
// - ❌ Access other providers
//
// ## Security Requirements
//
// - Secret key NEVER appears in logs or `Debug` output
// - Every request is signed (`HMAC-SHA256`, service `vpc`)
//
// ## API Reference
//
// All actions are `GET https://open.volcengineapi.com/?Action=<A>&Version=2020-04-01&...`
//
// - `DescribeSecurityGroupAttributes`: `SecurityGroupId` → `Result.Permissions`
// - `RevokeSecurityGroupIngress`: `SecurityGroupId`, `Protocol`, `PortStart`,
//   `PortEnd`, `CidrIp`, `Policy`
// - `AuthorizeSecurityGroupIngress`: as revoke, plus `Priority` and `Description`

use async_trait::async_trait;
use chrono::Utc;
use fwsync_core::config::{ClientOptions, ProviderCredentials, ProviderKind};
use fwsync_core::registry::ProviderRegistry;
use fwsync_core::rules::{Direction, MatchSemantics, RuleSpec};
use fwsync_core::traits::{FirewallProvider, FirewallProviderFactory};
use fwsync_core::{Error, Result};
use fwsync_signer::{Scheme, SignableRequest, Signer, canonical_query_string};
use serde::Deserialize;
use serde_json::Value;

/// Volcengine OpenAPI base URL
const VOLCENGINE_API_BASE: &str = "https://open.volcengineapi.com";

/// VPC API version
const API_VERSION: &str = "2020-04-01";

/// Signing service name
const SERVICE: &str = "vpc";

/// Policy for authorized rules
const ACCEPT_POLICY: &str = "accept";

/// Priority for authorized rules (1 is evaluated first)
const MANAGED_PRIORITY: i32 = 1;

/// One entry of `Result.Permissions`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct Permission {
    direction: String,
    protocol: String,
    port_start: i32,
    port_end: i32,
    cidr_ip: String,
    source_group_id: String,
    policy: String,
    priority: Option<i32>,
    description: String,
}

impl From<Permission> for RuleSpec {
    fn from(perm: Permission) -> Self {
        let non_empty = |s: String| if s.trim().is_empty() { None } else { Some(s) };

        RuleSpec {
            direction: if perm.direction.trim().eq_ignore_ascii_case("ingress") {
                Direction::Ingress
            } else {
                Direction::Egress
            },
            protocol: perm.protocol,
            from_port: perm.port_start,
            to_port: perm.port_end,
            cidrs: non_empty(perm.cidr_ip).into_iter().collect(),
            ipv6_cidrs: Vec::new(),
            cidr_aliases: Vec::new(),
            source_group: non_empty(perm.source_group_id),
            description: non_empty(perm.description),
            state: None,
            policy: non_empty(perm.policy),
            priority: perm.priority,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct DescribeResult {
    permissions: Vec<Permission>,
}

/// Volcengine security group provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, `DescribeSecurityGroupAttributes` is still sent;
/// revoke and authorize calls are logged with their parameters and reported
/// as successful.
pub struct VolcengineProvider {
    signer: Signer,
    /// Base URL without trailing slash
    base_url: String,
    /// `host[:port]` covered by the signature
    host: String,
    client: reqwest::Client,
    dry_run: bool,
}

// Custom Debug implementation; the signer redacts the secret key
impl std::fmt::Debug for VolcengineProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolcengineProvider")
            .field("signer", &self.signer)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl VolcengineProvider {
    /// Create a provider for one set of credentials
    ///
    /// # Errors
    ///
    /// - `Error::Config`: empty access/secret key or region, unusable base URL
    pub fn new(credentials: &ProviderCredentials, options: &ClientOptions) -> Result<Self> {
        if credentials.access_key.is_empty() || credentials.secret_key.is_empty() {
            return Err(Error::config("Volcengine access key and secret key are required"));
        }
        if credentials.region.is_empty() {
            return Err(Error::config("Volcengine region is required"));
        }

        let base_url = options
            .endpoint
            .as_deref()
            .unwrap_or(VOLCENGINE_API_BASE)
            .trim_end_matches('/')
            .to_string();
        let host = host_of(&base_url)?;

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            signer: Signer::new(
                Scheme::VOLCENGINE,
                credentials.access_key.clone(),
                credentials.secret_key.clone(),
                credentials.region.clone(),
                SERVICE,
            ),
            base_url,
            host,
            client,
            dry_run: options.dry_run,
        })
    }

    /// Whether mutations are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send one signed action and return its `Result` object
    async fn call(&self, action: &str, params: Vec<(String, String)>) -> Result<Value> {
        let mut query = vec![
            ("Action".to_string(), action.to_string()),
            ("Version".to_string(), API_VERSION.to_string()),
        ];
        query.extend(params);

        let signed = self
            .signer
            .sign(
                &SignableRequest {
                    method: "GET",
                    host: &self.host,
                    path: "/",
                    query: &query,
                    headers: &[],
                    body: b"",
                },
                Utc::now(),
            )
            .map_err(|e| Error::provider("volcengine", e.to_string()))?;

        let url = format!("{}/?{}", self.base_url, canonical_query_string(&query));
        tracing::debug!("Volcengine {} ({})", action, self.signer.region());

        let mut request = self.client.get(&url);
        for (name, value) in &signed {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::provider("volcengine", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response".to_string());
        let json: Option<Value> = serde_json::from_str(&text).ok();

        // API errors may arrive with any status; prefer the coded error
        if let Some(err) = json.as_ref().and_then(api_error) {
            return Err(err);
        }

        if !status.is_success() {
            return Err(status_error(status.as_u16(), action, &text));
        }

        let json = json.ok_or_else(|| {
            Error::provider("volcengine", format!("Failed to parse {} response", action))
        })?;
        Ok(json.get("Result").cloned().unwrap_or(Value::Null))
    }

    async fn mutate(&self, action: &str, params: Vec<(String, String)>) -> Result<()> {
        if self.dry_run {
            let rendered = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", ");
            tracing::info!("[DRY-RUN] Would send {} with params: {}", action, rendered);
            return Ok(());
        }

        self.call(action, params).await.map(|_| ())
    }
}

/// Extract `ResponseMetadata.Error` as a core error
fn api_error(json: &Value) -> Option<Error> {
    let error = json.get("ResponseMetadata")?.get("Error")?;
    let code = error.get("Code").and_then(Value::as_str).unwrap_or("Unknown");
    let message = error.get("Message").and_then(Value::as_str).unwrap_or("");
    let detail = format!("{}: {}", code, message);

    Some(if code.contains("NotFound") {
        Error::not_found(detail)
    } else if code.contains("AccessKey") || code.contains("Signature") || code.contains("Auth") {
        Error::auth(detail)
    } else if code.contains("Throttl") || code.contains("FlowLimit") {
        Error::rate_limited(detail)
    } else {
        Error::provider("volcengine", detail)
    })
}

fn status_error(status: u16, action: &str, body: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "Invalid access key or insufficient permissions. Status: {}",
            status
        )),
        404 => Error::not_found(format!("{} returned 404", action)),
        429 => Error::rate_limited(format!("Rate limit exceeded. Status: {}", status)),
        500..=599 => Error::provider(
            "volcengine",
            format!("Volcengine server error (transient): {} - {}", status, body),
        ),
        _ => Error::provider("volcengine", format!("{} failed: {} - {}", action, status, body)),
    }
}

/// `host[:port]` of a base URL
fn host_of(base_url: &str) -> Result<String> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| Error::config(format!("Invalid endpoint {}: {}", base_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::config(format!("Endpoint has no host: {}", base_url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn rule_params(resource: &str, rule: &RuleSpec, protocol: String) -> Vec<(String, String)> {
    let mut params = vec![
        ("SecurityGroupId".to_string(), resource.to_string()),
        ("Protocol".to_string(), protocol),
        ("PortStart".to_string(), rule.from_port.to_string()),
        ("PortEnd".to_string(), rule.to_port.to_string()),
    ];
    if let Some(cidr) = rule.primary_cidr() {
        params.push(("CidrIp".to_string(), cidr.to_string()));
    }
    params
}

#[async_trait]
impl FirewallProvider for VolcengineProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Volcengine
    }

    fn semantics(&self) -> MatchSemantics {
        MatchSemantics::ExactPort
    }

    async fn list_ingress_rules(&self, resource: &str) -> Result<Vec<RuleSpec>> {
        let result = self
            .call(
                "DescribeSecurityGroupAttributes",
                vec![("SecurityGroupId".to_string(), resource.to_string())],
            )
            .await?;

        let parsed: DescribeResult = serde_json::from_value(result).map_err(|e| {
            Error::provider("volcengine", format!("Invalid Permissions format: {}", e))
        })?;

        tracing::debug!(
            "Security group {} has {} permission(s)",
            resource,
            parsed.permissions.len()
        );
        Ok(parsed.permissions.into_iter().map(RuleSpec::from).collect())
    }

    async fn revoke_rule(&self, resource: &str, rule: &RuleSpec) -> Result<()> {
        let mut params = rule_params(resource, rule, rule.protocol.clone());
        if let Some(policy) = &rule.policy {
            params.push(("Policy".to_string(), policy.clone()));
        }
        self.mutate("RevokeSecurityGroupIngress", params).await
    }

    async fn authorize_rule(
        &self,
        resource: &str,
        rule: &RuleSpec,
        description: &str,
    ) -> Result<()> {
        let mut params = rule_params(resource, rule, rule.protocol.to_uppercase());
        params.push((
            "Policy".to_string(),
            rule.policy.clone().unwrap_or_else(|| ACCEPT_POLICY.to_string()),
        ));
        params.push((
            "Priority".to_string(),
            rule.priority.unwrap_or(MANAGED_PRIORITY).to_string(),
        ));
        params.push(("Description".to_string(), description.to_string()));
        self.mutate("AuthorizeSecurityGroupIngress", params).await
    }
}

/// Factory for creating Volcengine providers
#[derive(Debug, Clone, Default)]
pub struct VolcengineFactory {
    options: ClientOptions,
}

impl VolcengineFactory {
    /// Create a factory whose providers share `options`
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

impl FirewallProviderFactory for VolcengineFactory {
    fn create(&self, credentials: &ProviderCredentials) -> Result<Box<dyn FirewallProvider>> {
        if self.options.dry_run {
            tracing::warn!("Volcengine provider running in DRY-RUN mode - no changes will be made");
        }
        Ok(Box::new(VolcengineProvider::new(credentials, &self.options)?))
    }
}

/// Register the Volcengine provider with a registry
pub fn register(registry: &mut ProviderRegistry, options: ClientOptions) {
    registry.register_provider(ProviderKind::Volcengine, Box::new(VolcengineFactory::new(options)));
}
