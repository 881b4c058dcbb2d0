//! Credential and request types shared by the client, renewal loop, and inventory

use std::fmt;

use serde::{Deserialize, Serialize};
use vault_pki_config::RenewalConfig;

/// Request fields set by [`IssueRequest`] itself
pub const RESERVED_FIELDS: [&str; 2] = ["common_name", "ttl"];

/// One issued certificate with its key and CA material.
///
/// Credentials are never mutated; each renewal produces a new one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Serial number, unique within the CA mount
    pub serial: String,
    /// PEM-encoded certificate
    pub certificate: String,
    /// PEM-encoded private key
    pub private_key: String,
    /// Key algorithm reported by the CA (e.g. "rsa", "ec")
    pub key_type: String,
    /// PEM-encoded issuing CA certificate
    pub issuing_ca: String,
    /// Ordered CA chain, PEM-encoded
    pub chain: Vec<String>,
    /// Seconds of validity left when the credential was received
    pub expires_in: i64,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("serial", &self.serial)
            .field("key_type", &self.key_type)
            .field("chain_len", &self.chain.len())
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// How extra request fields that collide with reserved names are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReservedFieldPolicy {
    /// The request's own `common_name`/`ttl` win over extra fields
    #[default]
    Override,
    /// Colliding extra fields fail the request before it is sent
    Reject,
}

/// Parameters for a single issuance
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRequest {
    /// Issuance role on the CA
    pub role: String,
    /// Common name for the certificate
    pub common_name: String,
    /// Requested validity, sent as `"<n>s"`
    pub ttl_secs: u64,
    /// Additional body fields, merged under the reserved ones
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IssueRequest {
    pub fn new(role: impl Into<String>, common_name: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            role: role.into(),
            common_name: common_name.into(),
            ttl_secs,
            extra: serde_json::Map::new(),
        }
    }

    /// Add an extra request field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

impl From<&RenewalConfig> for IssueRequest {
    fn from(config: &RenewalConfig) -> Self {
        Self {
            role: config.role.clone(),
            common_name: config.common_name.clone(),
            ttl_secs: config.ttl_secs,
            extra: config.extra.clone(),
        }
    }
}

/// A certificate on record with the CA, paired with the shared CA chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub certificate: String,
    pub chain: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_private_key() {
        let credential = Credential {
            serial: "01:02".to_string(),
            certificate: "cert".to_string(),
            private_key: "super-secret".to_string(),
            key_type: "rsa".to_string(),
            issuing_ca: "ca".to_string(),
            chain: vec![],
            expires_in: 60,
        };

        let rendered = format!("{:?}", credential);
        assert!(rendered.contains("01:02"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_request_from_renewal_config() {
        let mut extra = serde_json::Map::new();
        extra.insert("alt_names".to_string(), "b.example".into());
        let config = RenewalConfig {
            name: "api".to_string(),
            role: "web".to_string(),
            common_name: "a.example".to_string(),
            ttl_secs: 300,
            extra,
            output_dir: None,
        };

        let request = IssueRequest::from(&config);
        assert_eq!(
            request,
            IssueRequest::new("web", "a.example", 300).with_field("alt_names", "b.example")
        );
    }
}
