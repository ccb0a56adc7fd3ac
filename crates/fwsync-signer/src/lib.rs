//! HMAC-SHA256 v4-style request signing
//!
//! AWS Signature Version 4 and the Volcengine OpenAPI signature share one
//! algorithm and differ only in constants:
//!
//! | | AWS | Volcengine |
//! |---|---|---|
//! | algorithm | `AWS4-HMAC-SHA256` | `HMAC-SHA256` |
//! | key prefix | `AWS4` | (none) |
//! | scope terminator | `aws4_request` | `request` |
//! | date header | `X-Amz-Date` | `X-Date` |
//! | payload hash header | (none) | `X-Content-Sha256` |
//!
//! Signing steps:
//!
//! 1. Canonical request: method, URI, sorted query, sorted lower-cased
//!    headers, signed header list, payload hash
//! 2. String to sign: algorithm, timestamp, credential scope, hash of (1)
//! 3. Signing key: HMAC chain over date, region, service, terminator
//! 4. `Authorization` header with credential, signed headers and signature

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Signing failures
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// The HMAC key was rejected
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

/// Constants that distinguish one v4-style scheme from another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheme {
    /// Algorithm name in the string to sign and the `Authorization` header
    pub algorithm: &'static str,
    /// Prepended to the secret key before the first HMAC
    pub key_prefix: &'static str,
    /// Last element of the credential scope
    pub terminator: &'static str,
    /// Header carrying the request timestamp
    pub date_header: &'static str,
    /// Header carrying the payload hash, when the scheme signs one
    pub content_sha_header: Option<&'static str>,
}

impl Scheme {
    /// AWS Signature Version 4
    pub const AWS_V4: Scheme = Scheme {
        algorithm: "AWS4-HMAC-SHA256",
        key_prefix: "AWS4",
        terminator: "aws4_request",
        date_header: "X-Amz-Date",
        content_sha_header: None,
    };

    /// Volcengine OpenAPI signature
    pub const VOLCENGINE: Scheme = Scheme {
        algorithm: "HMAC-SHA256",
        key_prefix: "",
        terminator: "request",
        date_header: "X-Date",
        content_sha_header: Some("X-Content-Sha256"),
    };
}

/// The parts of an HTTP request that are covered by the signature
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    /// HTTP method, upper case
    pub method: &'a str,
    /// Host header value (`host[:port]`)
    pub host: &'a str,
    /// Absolute path, `/` when empty
    pub path: &'a str,
    /// Query parameters, unencoded
    pub query: &'a [(String, String)],
    /// Extra headers to sign (e.g. `Content-Type`), sent as given
    pub headers: &'a [(String, String)],
    /// Request body
    pub body: &'a [u8],
}

/// Request signer bound to one set of credentials, region and service
#[derive(Clone)]
pub struct Signer {
    scheme: Scheme,
    access_key: String,
    /// ⚠️ NEVER log this value
    secret_key: String,
    region: String,
    service: String,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("scheme", &self.scheme.algorithm)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<REDACTED>")
            .field("region", &self.region)
            .field("service", &self.service)
            .finish()
    }
}

impl Signer {
    /// Create a signer
    pub fn new(
        scheme: Scheme,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            scheme,
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
            service: service.into(),
        }
    }

    /// Region the signature is scoped to
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Headers to add to the request: timestamp, optional payload hash and
    /// `Authorization`
    pub fn sign(
        &self,
        request: &SignableRequest<'_>,
        at: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, SignError> {
        let timestamp = at.format("%Y%m%dT%H%M%SZ").to_string();
        let date = at.format("%Y%m%d").to_string();
        let payload_hash = sha256_hex(request.body);

        let mut added = vec![(self.scheme.date_header.to_string(), timestamp.clone())];
        if let Some(header) = self.scheme.content_sha_header {
            added.push((header.to_string(), payload_hash.clone()));
        }

        let mut signed: Vec<(String, String)> = Vec::new();
        signed.push(("host".to_string(), request.host.trim().to_string()));
        for (name, value) in request.headers.iter().chain(added.iter()) {
            signed.push((name.to_lowercase(), value.trim().to_string()));
        }
        signed.sort();

        let signed_headers = signed
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = signed
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value))
            .collect();

        let path = if request.path.is_empty() { "/" } else { request.path };
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method,
            path,
            canonical_query_string(request.query),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let scope = format!(
            "{}/{}/{}/{}",
            date, self.region, self.service, self.scheme.terminator
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            self.scheme.algorithm,
            timestamp,
            scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let key = self.signing_key(&date)?;
        let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

        added.push((
            "Authorization".to_string(),
            format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                self.scheme.algorithm, self.access_key, scope, signed_headers, signature
            ),
        ));
        Ok(added)
    }

    /// Derived signing key for `date` (`YYYYMMDD`)
    pub fn signing_key(&self, date: &str) -> Result<Vec<u8>, SignError> {
        let secret = format!("{}{}", self.scheme.key_prefix, self.secret_key);
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        hmac_sha256(&k_service, self.scheme.terminator.as_bytes())
    }
}

/// Query string in canonical form: RFC 3986 encoded, sorted by key then value
///
/// Send exactly this string on the wire so the signed and sent queries match.
pub fn canonical_query_string(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lower-case hex SHA-256 digest
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SignError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| SignError::InvalidKey(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_query_sorted_and_encoded() {
        let query = vec![
            ("Version".to_string(), "2020-04-01".to_string()),
            ("Action".to_string(), "DescribeSecurityGroupAttributes".to_string()),
            ("Description".to_string(), "a b/c~".to_string()),
        ];
        assert_eq!(
            canonical_query_string(&query),
            "Action=DescribeSecurityGroupAttributes&Description=a%20b%2Fc~&Version=2020-04-01"
        );
    }

    #[test]
    fn test_empty_payload_hash() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let signer = Signer::new(Scheme::VOLCENGINE, "AK", "very-secret", "cn-beijing", "vpc");
        assert!(!format!("{:?}", signer).contains("very-secret"));
    }
}
