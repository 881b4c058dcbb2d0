//! Self-renewing short-lived X.509 credentials from a Vault PKI mount.
//!
//! # Components
//!
//! - [`expiry`] - remaining lifetime of a PEM certificate
//! - [`VaultClient`] - issue, list, and fetch certificates over HTTP
//! - [`RenewalLoop`] / [`start_renewal`] - keeps one credential renewed forever
//! - [`Inventory`] - every certificate on record, paired with the CA chain
//! - [`CredentialStore`] - writes renewed credentials to disk
//!
//! # Example
//!
//! ```ignore
//! let config = vault_pki_config::VaultConfig::new("https://vault:8200", token, "pki-api");
//! let client = Arc::new(VaultClient::connect(&config).await?);
//!
//! let handle = start_renewal(
//!     client,
//!     RenewalSubscription::new("api", IssueRequest::new("api", "api.example.com", 3600)),
//!     |update| match update {
//!         Ok(credential) => install(credential),
//!         Err(e) => eprintln!("renewal failed: {e}"),
//!     },
//! );
//! ```

pub mod authority;
pub mod client;
pub mod error;
pub mod expiry;
pub mod inventory;
pub mod renewal;
pub mod storage;
pub mod trust;
pub mod types;

pub use authority::CertificateAuthority;
pub use client::VaultClient;
pub use error::{PkiError, PkiResult};
pub use inventory::Inventory;
pub use renewal::{
    start_renewal, RenewalEvent, RenewalEvents, RenewalHandle, RenewalLoop, RenewalSubscription,
    TracingEvents,
};
pub use storage::{CredentialMeta, CredentialStore};
pub use types::{Credential, InventoryEntry, IssueRequest, ReservedFieldPolicy};

#[cfg(test)]
pub(crate) mod test_support {
    /// Self-signed certificate PEM valid from an hour ago until `valid_for` from now
    pub fn self_signed_pem(valid_for: std::time::Duration) -> String {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(vec!["example.com".to_string()]).unwrap();
        let now = time::OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::hours(1);
        params.not_after = now + valid_for;
        params.self_signed(&key).unwrap().pem()
    }
}
