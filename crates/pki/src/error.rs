//! Error types for credential issuance and renewal

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while issuing, inspecting, or renewing credentials
#[derive(Debug, Error)]
pub enum PkiError {
    /// The input is not a well-formed PEM X.509 certificate
    #[error("Failed to parse certificate: {0}")]
    Parse(String),

    /// The CA request failed, either in transport or as reported by the CA.
    /// The message holds the CA's error list joined with newlines.
    #[error("{0}")]
    Issuance(String),

    /// Trust material could not be read
    #[error("Failed to load trust material from '{path}': {source}")]
    TrustLoad {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Trust material was read but holds no usable CA certificate
    #[error("Invalid trust material: {0}")]
    InvalidTrust(String),

    /// The HTTP client could not be built from the configuration
    #[error("Failed to create CA client: {0}")]
    Client(String),

    /// An extra request field collides with a field this crate sets itself
    #[error("Extra field '{0}' is reserved and cannot be supplied")]
    ReservedField(String),

    /// Writing a renewed credential to disk failed
    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),

    /// Credential metadata could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for PkiError {
    fn from(e: serde_json::Error) -> Self {
        PkiError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for PkiError {
    fn from(e: reqwest::Error) -> Self {
        PkiError::Issuance(e.to_string())
    }
}

pub type PkiResult<T> = Result<T, PkiError>;
