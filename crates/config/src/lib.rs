//! Configuration for the vault-pki credential renewer.
//!
//! Every recognized option is an explicit field on a typed structure; there is
//! no free-form fallback. Configuration is loaded from a KDL document (or JSON,
//! selected by file extension), then environment overrides are applied, then
//! the result is validated.
//!
//! # Example
//!
//! ```kdl
//! vault {
//!     address "https://vault.example.com:8200"
//!     token "s.xxxx"
//!     mount "pki-api"
//!     tls {
//!         ca "/etc/vault/ca.pem" "/etc/vault/ca.d"
//!         skip-verify #false
//!     }
//! }
//!
//! renewal "api" {
//!     role "api"
//!     common-name "api.example.com"
//!     ttl-secs 3600
//!     output-dir "/var/lib/vault-pki/api"
//!     extra {
//!         alt_names "www.example.com"
//!     }
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

pub mod kdl;

/// Environment variable overriding [`VaultConfig::address`]
pub const ENV_VAULT_ADDR: &str = "VAULT_ADDR";
/// Environment variable overriding [`VaultConfig::token`]
pub const ENV_VAULT_TOKEN: &str = "VAULT_TOKEN";

/// Default PKI mount path
pub const DEFAULT_MOUNT: &str = "pki";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Kdl(String),

    #[error("JSON configuration parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing required option '{0}'")]
    Missing(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Connection settings for the CA service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Base address, e.g. `https://vault.example.com:8200`
    pub address: String,
    /// Bearer token sent with every request
    pub token: String,
    /// PKI mount path, e.g. `pki-api`
    #[serde(default = "default_mount")]
    pub mount: String,
    /// Custom TLS trust; `None` uses the built-in web PKI roots
    #[serde(default)]
    pub tls: Option<TlsTrustConfig>,
}

fn default_mount() -> String {
    DEFAULT_MOUNT.to_string()
}

impl VaultConfig {
    pub fn new(address: impl Into<String>, token: impl Into<String>, mount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            mount: mount.into(),
            tls: None,
        }
    }

    pub fn with_tls(mut self, tls: TlsTrustConfig) -> Self {
        self.tls = Some(tls);
        self
    }
}

/// TLS trust configuration for the connection to the CA service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsTrustConfig {
    /// CA bundle sources. Each entry is a file, a directory (expanded one
    /// level), or, when no such path exists, inline PEM content.
    #[serde(default)]
    pub ca: Vec<String>,
    /// Disable server certificate verification
    #[serde(default)]
    pub skip_verify: bool,
}

/// One credential kept alive by a renewal loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenewalConfig {
    /// Unique name of this renewal
    pub name: String,
    /// Issuance role on the CA
    pub role: String,
    /// Common name to issue for
    pub common_name: String,
    /// Requested validity in seconds
    pub ttl_secs: u64,
    /// Additional request fields (alt_names, ip_sans, ...)
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Directory the renewed credential is written to
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub vault: VaultConfig,
    #[serde(default)]
    pub renewals: Vec<RenewalConfig>,
}

impl Config {
    /// Load configuration from a file, selecting the format by extension.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("kdl");

        debug!(path = %path.display(), format = extension, "Loading configuration");

        match extension {
            "kdl" => Self::from_kdl(&content),
            "json" => Self::from_json(&content),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Parse configuration from KDL text.
    pub fn from_kdl(content: &str) -> ConfigResult<Self> {
        let doc: ::kdl::KdlDocument = content
            .parse()
            .map_err(|e: ::kdl::KdlError| ConfigError::Kdl(kdl::format_parse_error(content, &e)))?;
        kdl::parse_kdl_document(doc)
    }

    /// Parse configuration from JSON text.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply `VAULT_ADDR` / `VAULT_TOKEN` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(address) = lookup(ENV_VAULT_ADDR).filter(|v| !v.is_empty()) {
            trace!(address = %address, "Overriding CA address from environment");
            self.vault.address = address;
        }
        if let Some(token) = lookup(ENV_VAULT_TOKEN).filter(|v| !v.is_empty()) {
            trace!("Overriding CA token from environment");
            self.vault.token = token;
        }
    }

    /// Check the configuration for values that can never work.
    pub fn validate(&self) -> ConfigResult<()> {
        self.validate_vault()?;
        self.validate_renewals()?;
        Ok(())
    }

    fn validate_vault(&self) -> ConfigResult<()> {
        let vault = &self.vault;
        if vault.address.is_empty() {
            return Err(ConfigError::Missing("vault.address".to_string()));
        }
        let url = url::Url::parse(&vault.address).map_err(|e| {
            ConfigError::Invalid(format!("vault.address '{}' is not a URL: {}", vault.address, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Invalid(format!(
                "vault.address must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if vault.token.is_empty() {
            return Err(ConfigError::Missing("vault.token".to_string()));
        }
        if vault.mount.trim_matches('/').is_empty() {
            return Err(ConfigError::Missing("vault.mount".to_string()));
        }
        Ok(())
    }

    fn validate_renewals(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for renewal in &self.renewals {
            if !seen.insert(renewal.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate renewal name '{}'",
                    renewal.name
                )));
            }
            if renewal.role.is_empty() {
                return Err(ConfigError::Missing(format!("renewal '{}' role", renewal.name)));
            }
            if renewal.common_name.is_empty() {
                return Err(ConfigError::Missing(format!(
                    "renewal '{}' common-name",
                    renewal.name
                )));
            }
            if renewal.ttl_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "renewal '{}' ttl-secs must be greater than zero",
                    renewal.name
                )));
            }
        }
        Ok(())
    }
}
