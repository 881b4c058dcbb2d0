//! HTTP client for a Vault PKI mount
//!
//! # API
//!
//! ```text
//! POST {address}/v1/{mount}/issue/{role}   {"common_name": ..., "ttl": "<n>s", ...extra}
//!   -> {"data": {"certificate", "private_key", "private_key_type",
//!                "serial_number", "issuing_ca", "ca_chain"}}
//! GET  {address}/v1/{mount}/ca_chain       -> PEM text
//! LIST {address}/v1/{mount}/certs          -> {"data": {"keys": [serial, ...]}}
//! GET  {address}/v1/{mount}/cert/{serial}  -> {"data": {"certificate"}}
//!
//! Errors: {"errors": ["message", ...]}
//! ```
//!
//! Every request carries the bearer token and a fixed timeout. Nothing here
//! retries.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace};
use vault_pki_config::VaultConfig;

use crate::authority::CertificateAuthority;
use crate::error::{PkiError, PkiResult};
use crate::expiry;
use crate::trust::{load_trust_material, root_certificates, split_pem_blocks};
use crate::types::{Credential, IssueRequest, ReservedFieldPolicy, RESERVED_FIELDS};

/// API version path segment
pub const API_VERSION: &str = "v1";

/// Timeout applied to every request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct IssueData {
    certificate: String,
    private_key: String,
    #[serde(default)]
    private_key_type: String,
    serial_number: String,
    #[serde(default)]
    issuing_ca: String,
    #[serde(default)]
    ca_chain: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct KeyList {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct CertData {
    certificate: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    errors: Option<Vec<String>>,
}

/// Client for one PKI mount of a Vault server
#[derive(Debug, Clone)]
pub struct VaultClient {
    client: Client,
    base_url: String,
    token: String,
    reserved_fields: ReservedFieldPolicy,
}

impl VaultClient {
    /// Build a client from configuration.
    ///
    /// Trust material is read from disk here, so the client is only handed
    /// out once it is ready to make requests.
    pub async fn connect(config: &VaultConfig) -> PkiResult<Self> {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);

        if let Some(tls) = &config.tls {
            if tls.skip_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }
            if !tls.ca.is_empty() {
                let bundle = load_trust_material(&tls.ca).await?;
                let roots = root_certificates(&bundle)?;
                debug!(roots = roots.len(), "Using custom CA trust for Vault connection");
                builder = builder.tls_built_in_root_certs(false);
                for root in roots {
                    builder = builder.add_root_certificate(root);
                }
            }
        }

        let client = builder
            .build()
            .map_err(|e| PkiError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url(&config.address, &config.mount),
            token: config.token.clone(),
            reserved_fields: ReservedFieldPolicy::default(),
        })
    }

    /// Choose how extra fields named `common_name`/`ttl` are treated
    pub fn with_reserved_field_policy(mut self, policy: ReservedFieldPolicy) -> Self {
        self.reserved_fields = policy;
        self
    }

    /// Base URL all request paths are appended to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn send(&self, request: RequestBuilder) -> PkiResult<Response> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                PkiError::Issuance(format!(
                    "CA request timed out after {}s",
                    REQUEST_TIMEOUT.as_secs()
                ))
            } else {
                PkiError::Issuance(format!("CA request failed: {}", e))
            }
        })
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> PkiResult<T> {
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| PkiError::Issuance(format!("Malformed CA response: {}", e)))
    }

    /// Issue one certificate
    pub async fn issue(&self, request: &IssueRequest) -> PkiResult<Credential> {
        let body = issue_body(request, self.reserved_fields)?;

        debug!(
            role = %request.role,
            common_name = %request.common_name,
            ttl_secs = request.ttl_secs,
            "Requesting certificate"
        );

        let response = self
            .send(
                self.request(Method::POST, &format!("issue/{}", request.role))
                    .json(&body),
            )
            .await?;
        let issued: Envelope<IssueData> = Self::read_json(response).await?;
        let data = issued.data;

        let expires_in = expiry::remaining_seconds(&data.certificate, Utc::now())?;

        debug!(serial = %data.serial_number, expires_in, "Received certificate");

        Ok(Credential {
            serial: data.serial_number,
            certificate: data.certificate,
            private_key: data.private_key,
            key_type: data.private_key_type,
            issuing_ca: data.issuing_ca,
            chain: data.ca_chain.unwrap_or_default(),
            expires_in,
        })
    }

    /// Fetch the CA chain
    pub async fn ca_chain(&self) -> PkiResult<Vec<String>> {
        let response = self.send(self.request(Method::GET, "ca_chain")).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let text = response.text().await?;
        let chain = split_pem_blocks(&text)?;
        trace!(certificates = chain.len(), "Fetched CA chain");
        Ok(chain)
    }

    /// Fetch all serials on record. An empty mount answers 404, which is
    /// reported as an empty list.
    pub async fn list_serials(&self) -> PkiResult<Vec<String>> {
        let list = Method::from_bytes(b"LIST").map_err(|e| PkiError::Client(e.to_string()))?;
        let response = self.send(self.request(list, "certs")).await?;
        if response.status() == StatusCode::NOT_FOUND {
            trace!("No certificates on record");
            return Ok(Vec::new());
        }
        let listed: Envelope<KeyList> = Self::read_json(response).await?;
        trace!(count = listed.data.keys.len(), "Listed certificate serials");
        Ok(listed.data.keys)
    }

    /// Fetch one certificate by serial
    pub async fn certificate(&self, serial: &str) -> PkiResult<String> {
        let response = self
            .send(self.request(Method::GET, &format!("cert/{}", serial)))
            .await?;
        let cert: Envelope<CertData> = Self::read_json(response).await?;
        Ok(cert.data.certificate)
    }
}

#[async_trait]
impl CertificateAuthority for VaultClient {
    async fn issue(&self, request: &IssueRequest) -> PkiResult<Credential> {
        VaultClient::issue(self, request).await
    }

    async fn ca_chain(&self) -> PkiResult<Vec<String>> {
        VaultClient::ca_chain(self).await
    }

    async fn list_serials(&self) -> PkiResult<Vec<String>> {
        VaultClient::list_serials(self).await
    }

    async fn certificate(&self, serial: &str) -> PkiResult<String> {
        VaultClient::certificate(self, serial).await
    }
}

fn base_url(address: &str, mount: &str) -> String {
    format!(
        "{}/{}/{}",
        address.trim_end_matches('/'),
        API_VERSION,
        mount.trim_matches('/')
    )
}

/// Build the JSON body for an issue request.
///
/// Extra fields go in first and the reserved fields are written over them,
/// unless the policy rejects the collision outright.
pub fn issue_body(
    request: &IssueRequest,
    policy: ReservedFieldPolicy,
) -> PkiResult<serde_json::Value> {
    if policy == ReservedFieldPolicy::Reject {
        if let Some(field) = RESERVED_FIELDS
            .iter()
            .find(|field| request.extra.contains_key(**field))
        {
            return Err(PkiError::ReservedField(field.to_string()));
        }
    }

    let mut body = request.extra.clone();
    body.insert(
        "common_name".to_string(),
        serde_json::Value::String(request.common_name.clone()),
    );
    body.insert(
        "ttl".to_string(),
        serde_json::Value::String(format!("{}s", request.ttl_secs)),
    );
    Ok(serde_json::Value::Object(body))
}

async fn error_from_response(response: Response) -> PkiError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    PkiError::Issuance(error_message(status, &body))
}

/// Join the CA's error list with newlines, falling back to the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            errors: Some(errors),
        }) => errors.join("\n"),
        _ => body.to_string(),
    };

    if message.trim().is_empty() {
        format!("CA returned HTTP {}", status)
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalizes_slashes() {
        assert_eq!(
            base_url("https://vault:8200/", "/pki-api/"),
            "https://vault:8200/v1/pki-api"
        );
    }

    #[test]
    fn test_issue_body_ttl_suffix() {
        let body = issue_body(
            &IssueRequest::new("api", "api.example.com", 60),
            ReservedFieldPolicy::Override,
        )
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"common_name": "api.example.com", "ttl": "60s"})
        );
    }

    #[test]
    fn test_issue_body_reserved_fields_override_extra() {
        let request = IssueRequest::new("api", "api.example.com", 60)
            .with_field("common_name", "evil.example.com")
            .with_field("ttl", "9999h")
            .with_field("alt_names", "www.example.com");

        let body = issue_body(&request, ReservedFieldPolicy::Override).unwrap();

        assert_eq!(body["common_name"], "api.example.com");
        assert_eq!(body["ttl"], "60s");
        assert_eq!(body["alt_names"], "www.example.com");
    }

    #[test]
    fn test_issue_body_reject_policy() {
        let request = IssueRequest::new("api", "api.example.com", 60).with_field("ttl", "1h");
        assert!(matches!(
            issue_body(&request, ReservedFieldPolicy::Reject),
            Err(PkiError::ReservedField(field)) if field == "ttl"
        ));
    }

    #[test]
    fn test_error_message_joins_errors() {
        let body = r#"{"errors": ["role not found", "permission denied"]}"#;
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, body),
            "role not found\npermission denied"
        );
    }

    #[test]
    fn test_error_message_raw_body() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down"
        );
    }

    #[test]
    fn test_error_message_empty() {
        assert_eq!(
            error_message(StatusCode::SERVICE_UNAVAILABLE, r#"{"errors": []}"#),
            "CA returned HTTP 503 Service Unavailable"
        );
    }
}
