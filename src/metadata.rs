//! Documents persisted as a JSON array whose order mirrors the index rows.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::storage::write_atomically;

/// Writes `documents` and returns the SHA-256 of the bytes written, which the
/// index records so a mismatched pair can be detected on open.
pub fn save(path: &Path, documents: &[Document]) -> Result<[u8; 32]> {
    let json = serde_json::to_vec_pretty(documents).map_err(io::Error::from)?;
    write_atomically(path, &[&json])?;
    debug!("Saved {} metadata records to {}", documents.len(), path.display());
    Ok(Sha256::digest(&json).into())
}

pub fn load(path: &Path) -> Result<Vec<Document>> {
    load_with_digest(path).map(|(documents, _)| documents)
}

/// Documents plus the SHA-256 of the file they were parsed from.
pub fn load_with_digest(path: &Path) -> Result<(Vec<Document>, [u8; 32])> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::MetadataNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    let documents: Vec<Document> =
        serde_json::from_slice(&bytes).map_err(|source| Error::CorruptMetadata {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Loaded {} metadata records from {}", documents.len(), path.display());
    Ok((documents, Sha256::digest(&bytes).into()))
}
