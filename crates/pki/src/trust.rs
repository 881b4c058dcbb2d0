//! Trust material loading
//!
//! A trust source is a file, a directory, or inline PEM. Directories are
//! expanded one level; only regular files are read. Symlinks are not
//! followed, so a link in a bundle directory is skipped. A source that
//! does not exist on disk is taken to be the PEM content itself, so a CA bundle
//! can be given either by path or by value.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{PkiError, PkiResult};

fn trust_err(path: &Path, source: std::io::Error) -> PkiError {
    PkiError::TrustLoad {
        path: path.to_path_buf(),
        source,
    }
}

/// Read every trust source, returning one byte buffer per file or literal.
///
/// Files inside a directory are returned in file-name order.
pub async fn load_trust_material(sources: &[String]) -> PkiResult<Vec<Vec<u8>>> {
    let mut contents = Vec::new();

    for source in sources {
        let path = Path::new(source);

        // Inline PEM is rarely a valid path; any lookup failure means "not a file"
        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        if !exists {
            trace!("Trust source is not a path, using it as inline PEM");
            contents.push(source.as_bytes().to_vec());
            continue;
        }

        let metadata = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| trust_err(path, e))?;

        let files = if metadata.is_dir() {
            list_directory(path).await?
        } else {
            vec![path.to_path_buf()]
        };

        for file in files {
            let metadata = tokio::fs::symlink_metadata(&file)
                .await
                .map_err(|e| trust_err(&file, e))?;
            if !metadata.is_file() {
                trace!(path = %file.display(), "Skipping non-regular trust entry");
                continue;
            }
            let bytes = tokio::fs::read(&file)
                .await
                .map_err(|e| trust_err(&file, e))?;
            debug!(path = %file.display(), bytes = bytes.len(), "Loaded trust material");
            contents.push(bytes);
        }
    }

    Ok(contents)
}

async fn list_directory(dir: &Path) -> PkiResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| trust_err(dir, e))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| trust_err(dir, e))? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// Turn loaded trust material into root certificates for the HTTP client.
pub fn root_certificates(bundle: &[Vec<u8>]) -> PkiResult<Vec<reqwest::Certificate>> {
    let mut roots = Vec::new();

    for content in bundle {
        let mut reader = content.as_slice();
        for der in rustls_pemfile::certs(&mut reader) {
            let der = der.map_err(|e| PkiError::InvalidTrust(e.to_string()))?;
            let cert = reqwest::Certificate::from_der(der.as_ref())
                .map_err(|e| PkiError::InvalidTrust(e.to_string()))?;
            roots.push(cert);
        }
    }

    if roots.is_empty() && !bundle.is_empty() {
        return Err(PkiError::InvalidTrust("no certificates found".to_string()));
    }

    Ok(roots)
}

/// Split PEM text into its blocks, preserving order.
///
/// Text without any PEM markers is returned whole as a single element, and
/// blank text yields no elements. A BEGIN marker without a complete block is
/// an error rather than a shorter chain.
pub fn split_pem_blocks(text: &str) -> PkiResult<Vec<String>> {
    let begin_markers = text.matches("-----BEGIN ").count();
    if begin_markers == 0 {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![text.to_string()]);
    }

    let blocks = pem::parse_many(text).map_err(|e| PkiError::Parse(e.to_string()))?;
    if blocks.len() != begin_markers {
        return Err(PkiError::Parse(format!(
            "found {} PEM BEGIN markers but only {} complete blocks",
            begin_markers,
            blocks.len()
        )));
    }

    Ok(blocks
        .iter()
        .map(|block| {
            let config = pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF);
            pem::encode_config(block, config).trim_end().to_string()
        })
        .collect())
}
