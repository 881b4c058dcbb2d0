//! Read-only listing of every certificate on record with the CA

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;

use crate::authority::CertificateAuthority;
use crate::error::PkiResult;
use crate::types::InventoryEntry;

/// Lists certificates held by a CA mount
#[derive(Clone)]
pub struct Inventory {
    ca: Arc<dyn CertificateAuthority>,
}

impl Inventory {
    pub fn new(ca: Arc<dyn CertificateAuthority>) -> Self {
        Self { ca }
    }

    /// Every certificate on record, each paired with the shared CA chain.
    ///
    /// All-or-nothing: the first failing fetch fails the whole listing.
    /// Entries keep the order the CA listed the serials in.
    pub async fn list_all(&self) -> PkiResult<Vec<InventoryEntry>> {
        let (serials, chain) = tokio::try_join!(self.ca.list_serials(), self.ca.ca_chain())?;

        debug!(
            serials = serials.len(),
            chain_len = chain.len(),
            "Fetching certificates on record"
        );

        let certificates =
            try_join_all(serials.iter().map(|serial| self.ca.certificate(serial))).await?;

        Ok(certificates
            .into_iter()
            .map(|certificate| InventoryEntry {
                certificate,
                chain: chain.clone(),
            })
            .collect())
    }
}

impl std::fmt::Debug for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inventory").finish_non_exhaustive()
    }
}
