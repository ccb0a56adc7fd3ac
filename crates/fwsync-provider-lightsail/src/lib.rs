// # AWS Lightsail Firewall Provider
//
// This crate provides the Lightsail instance-firewall adapter for fwsync.
//
// ## Behavior
//
// - ✅ One HTTP request per trait call
// - ✅ Region given as an availability zone (`ap-southeast-1a`) is normalized
//   to its base region and reported through `warnings()`
// - ✅ `__type` error codes and HTTP statuses mapped to core errors
// - ✅ Dry-run mode: port states are read, open/close calls are only logged
// - ❌ NO match or sync decisions (owned by `MatchSemantics::RangeContainment`)
// - ❌ NO retry logic
//
// ### Trust Level: Untrusted (Firewall Provider)
//
// Same constraints as every provider: isolated, stateless, single-shot.
//
// ## API Reference
//
// `POST https://lightsail.<region>.amazonaws.com/`, `application/x-amz-json-1.1`,
// `X-Amz-Target: Lightsail_20161128.<Operation>`, SigV4 with service `lightsail`.
//
// - `GetInstancePortStates`: `{instanceName}` → `{portStates: [...]}`
// - `CloseInstancePublicPorts`: `{instanceName, portInfo: {fromPort, toPort, protocol}}`
// - `OpenInstancePublicPorts`: as close, with `portInfo.cidrs`

use async_trait::async_trait;
use chrono::Utc;
use fwsync_core::config::{ClientOptions, ProviderCredentials, ProviderKind};
use fwsync_core::registry::ProviderRegistry;
use fwsync_core::rules::{Direction, MatchSemantics, RuleSpec};
use fwsync_core::traits::{FirewallProvider, FirewallProviderFactory};
use fwsync_core::{Error, Result};
use fwsync_signer::{Scheme, SignableRequest, Signer};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Signing service name
const SERVICE: &str = "lightsail";

/// JSON protocol target prefix
const TARGET_PREFIX: &str = "Lightsail_20161128";

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// One entry of `portStates`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InstancePortState {
    from_port: i32,
    to_port: i32,
    protocol: String,
    state: String,
    cidrs: Vec<String>,
    ipv6_cidrs: Vec<String>,
    cidr_list_aliases: Vec<String>,
}

impl From<InstancePortState> for RuleSpec {
    fn from(state: InstancePortState) -> Self {
        RuleSpec {
            direction: Direction::Ingress,
            protocol: state.protocol,
            from_port: state.from_port,
            to_port: state.to_port,
            cidrs: state.cidrs,
            ipv6_cidrs: state.ipv6_cidrs,
            cidr_aliases: state.cidr_list_aliases,
            source_group: None,
            description: None,
            state: Some(state.state).filter(|s| !s.is_empty()),
            policy: None,
            priority: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PortStatesResponse {
    port_states: Vec<InstancePortState>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PortInfo<'a> {
    from_port: i32,
    to_port: i32,
    protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cidrs: Option<&'a [String]>,
}

/// Normalize an availability-zone style region to its base region
///
/// `ap-southeast-1a` becomes `ap-southeast-1`. Returns the (lower-cased,
/// trimmed) region and whether it was rewritten.
pub fn normalize_region(region: &str) -> (String, bool) {
    let region = region.trim().to_lowercase();

    let parts: Vec<&str> = region.split('-').collect();
    if parts.len() < 3 {
        return (region, false);
    }

    let last = parts[parts.len() - 1].as_bytes();
    let zone_form = last.len() == 2 && last[0].is_ascii_digit() && last[1].is_ascii_lowercase();
    if !zone_form {
        return (region, false);
    }

    // Drop the trailing zone letter
    let base = region[..region.len() - 1].to_string();
    (base, true)
}

/// Lightsail instance firewall provider
pub struct LightsailProvider {
    signer: Signer,
    base_url: String,
    host: String,
    client: reqwest::Client,
    dry_run: bool,
    warnings: Vec<String>,
}

// Custom Debug implementation; the signer redacts the secret key
impl std::fmt::Debug for LightsailProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightsailProvider")
            .field("signer", &self.signer)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl LightsailProvider {
    /// Create a provider for one set of credentials
    ///
    /// The configured region is normalized first; the endpoint is derived
    /// from the normalized region unless `options.endpoint` overrides it.
    pub fn new(credentials: &ProviderCredentials, options: &ClientOptions) -> Result<Self> {
        if credentials.access_key.is_empty() || credentials.secret_key.is_empty() {
            return Err(Error::config("AWS access key and secret key are required"));
        }

        let (region, changed) = normalize_region(&credentials.region);
        if region.is_empty() {
            return Err(Error::config("AWS region is required"));
        }

        let mut warnings = Vec::new();
        if changed {
            warnings.push(format!(
                "region given in availability-zone form ({}), normalized to {}",
                credentials.region, region
            ));
        }

        let base_url = match options.endpoint.as_deref() {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://lightsail.{}.amazonaws.com", region),
        };
        let url = reqwest::Url::parse(&base_url)
            .map_err(|e| Error::config(format!("Invalid endpoint {}: {}", base_url, e)))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(Error::config(format!("Endpoint has no host: {}", base_url))),
        };

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            signer: Signer::new(
                Scheme::AWS_V4,
                credentials.access_key.clone(),
                credentials.secret_key.clone(),
                region,
                SERVICE,
            ),
            base_url,
            host,
            client,
            dry_run: options.dry_run,
            warnings,
        })
    }

    /// Region requests are signed for
    pub fn region(&self) -> &str {
        self.signer.region()
    }

    /// Whether mutations are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn call(&self, operation: &str, payload: &Value) -> Result<Value> {
        let body = serde_json::to_vec(payload)?;
        let headers = vec![
            ("Content-Type".to_string(), CONTENT_TYPE.to_string()),
            ("X-Amz-Target".to_string(), format!("{}.{}", TARGET_PREFIX, operation)),
        ];

        let signed = self
            .signer
            .sign(
                &SignableRequest {
                    method: "POST",
                    host: &self.host,
                    path: "/",
                    query: &[],
                    headers: &headers,
                    body: &body,
                },
                Utc::now(),
            )
            .map_err(|e| Error::provider("aws", e.to_string()))?;

        tracing::debug!("Lightsail {} ({})", operation, self.region());

        let mut request = self.client.post(format!("{}/", self.base_url)).body(body);
        for (name, value) in headers.iter().chain(signed.iter()) {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::provider("aws", format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response".to_string());

        if !status.is_success() {
            return Err(response_error(status.as_u16(), operation, &text));
        }

        serde_json::from_str(&text).map_err(|e| {
            Error::provider("aws", format!("Failed to parse {} response: {}", operation, e))
        })
    }

    async fn mutate(&self, operation: &str, payload: Value) -> Result<()> {
        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send {} with payload: {}", operation, payload);
            return Ok(());
        }
        self.call(operation, &payload).await.map(|_| ())
    }
}

/// Map a failed response to a core error, using `__type` when present
fn response_error(status: u16, operation: &str, body: &str) -> Error {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("__type"))
        .and_then(Value::as_str)
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string());
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("Message")))
        .and_then(Value::as_str)
        .unwrap_or(body);

    match code.as_deref() {
        Some("NotFoundException") => Error::not_found(message.to_string()),
        Some(
            "UnauthenticatedException"
            | "AccessDeniedException"
            | "UnrecognizedClientException"
            | "InvalidSignatureException"
            | "AccountSetupInProgressException",
        ) => Error::auth(message.to_string()),
        Some("ThrottlingException") => Error::rate_limited(message.to_string()),
        Some(code) => Error::provider("aws", format!("{}: {}", code, message)),
        None => match status {
            401 | 403 => Error::auth(format!("Request rejected. Status: {}", status)),
            404 => Error::not_found(format!("{} returned 404", operation)),
            429 => Error::rate_limited(format!("Rate limit exceeded. Status: {}", status)),
            500..=599 => Error::provider(
                "aws",
                format!("Lightsail server error (transient): {} - {}", status, body),
            ),
            _ => Error::provider("aws", format!("{} failed: {} - {}", operation, status, body)),
        },
    }
}

#[async_trait]
impl FirewallProvider for LightsailProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    fn semantics(&self) -> MatchSemantics {
        MatchSemantics::RangeContainment
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.clone()
    }

    async fn list_ingress_rules(&self, resource: &str) -> Result<Vec<RuleSpec>> {
        let response = self
            .call("GetInstancePortStates", &json!({ "instanceName": resource }))
            .await?;
        let parsed: PortStatesResponse = serde_json::from_value(response)
            .map_err(|e| Error::provider("aws", format!("Invalid portStates format: {}", e)))?;

        Ok(parsed.port_states.into_iter().map(RuleSpec::from).collect())
    }

    async fn revoke_rule(&self, resource: &str, rule: &RuleSpec) -> Result<()> {
        let port_info = PortInfo {
            from_port: rule.from_port,
            to_port: rule.to_port,
            protocol: rule.protocol.to_lowercase(),
            cidrs: None,
        };
        self.mutate(
            "CloseInstancePublicPorts",
            json!({ "instanceName": resource, "portInfo": port_info }),
        )
        .await
    }

    async fn authorize_rule(
        &self,
        resource: &str,
        rule: &RuleSpec,
        description: &str,
    ) -> Result<()> {
        // Lightsail port entries carry no description
        tracing::debug!(
            "Opening {}-{} on {} ({})",
            rule.from_port,
            rule.to_port,
            resource,
            description
        );

        let port_info = PortInfo {
            from_port: rule.from_port,
            to_port: rule.to_port,
            protocol: rule.protocol.to_lowercase(),
            cidrs: Some(&rule.cidrs),
        };
        self.mutate(
            "OpenInstancePublicPorts",
            json!({ "instanceName": resource, "portInfo": port_info }),
        )
        .await
    }
}

/// Factory for creating Lightsail providers
#[derive(Debug, Clone, Default)]
pub struct LightsailFactory {
    options: ClientOptions,
}

impl LightsailFactory {
    /// Create a factory whose providers share `options`
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

impl FirewallProviderFactory for LightsailFactory {
    fn create(&self, credentials: &ProviderCredentials) -> Result<Box<dyn FirewallProvider>> {
        if self.options.dry_run {
            tracing::warn!("Lightsail provider running in DRY-RUN mode - no changes will be made");
        }
        Ok(Box::new(LightsailProvider::new(credentials, &self.options)?))
    }
}

/// Register the Lightsail provider with a registry
pub fn register(registry: &mut ProviderRegistry, options: ClientOptions) {
    registry.register_provider(ProviderKind::Aws, Box::new(LightsailFactory::new(options)));
}
