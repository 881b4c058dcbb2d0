//! Certificate expiry calculation
//!
//! Remaining lifetime is derived from the certificate itself, never from the
//! TTL that was requested, so renewal timing follows whatever validity the CA
//! actually granted.

use chrono::{DateTime, Utc};
use x509_parser::prelude::parse_x509_certificate;

use crate::error::{PkiError, PkiResult};

/// Extract the "not valid after" instant of the first certificate in `pem`.
pub fn not_after(certificate_pem: &str) -> PkiResult<DateTime<Utc>> {
    let block = pem::parse(certificate_pem).map_err(|e| PkiError::Parse(e.to_string()))?;
    if block.tag() != "CERTIFICATE" {
        return Err(PkiError::Parse(format!(
            "expected a CERTIFICATE block, found '{}'",
            block.tag()
        )));
    }

    let (_, cert) =
        parse_x509_certificate(block.contents()).map_err(|e| PkiError::Parse(e.to_string()))?;

    let secs = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| PkiError::Parse(format!("not-after timestamp {} out of range", secs)))
}

/// Seconds between `now` and the certificate's expiry, rounded down.
///
/// The result is negative once the certificate has expired. Callers treat any
/// value `<= 0` as "renew immediately".
pub fn remaining_seconds(certificate_pem: &str, now: DateTime<Utc>) -> PkiResult<i64> {
    let expires = not_after(certificate_pem)?;
    let remaining_ms = expires.timestamp_millis() - now.timestamp_millis();
    Ok(remaining_ms.div_euclid(1000))
}
