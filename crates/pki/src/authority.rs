//! Certificate authority abstraction
//!
//! The renewal loop and the inventory talk to the CA only through this trait,
//! so they can run against [`VaultClient`](crate::client::VaultClient) or any
//! other implementation (including test doubles).

use async_trait::async_trait;

use crate::error::PkiResult;
use crate::types::{Credential, IssueRequest};

/// Outbound operations against a certificate authority.
///
/// Implementations must not retry; retry policy belongs to callers.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Issue one new certificate
    async fn issue(&self, request: &IssueRequest) -> PkiResult<Credential>;

    /// Fetch the CA chain shared by every issued certificate
    async fn ca_chain(&self) -> PkiResult<Vec<String>>;

    /// Fetch the serials of every certificate on record
    async fn list_serials(&self) -> PkiResult<Vec<String>>;

    /// Fetch one certificate body by serial
    async fn certificate(&self, serial: &str) -> PkiResult<String>;
}
