//! Verified scorer snapshots.
//!
//! Layout: a CBOR-encoded [`SnapshotHeader`] followed by the CBOR-encoded
//! body. The header carries SHA-256 checksums of itself and of the body, so
//! truncated or corrupted files are rejected before the body is decoded.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Magic bytes: "EQSS".
pub const MAGIC: [u8; 4] = [0x45, 0x51, 0x53, 0x53];

/// Format version (major.minor.patch packed one byte each, top byte unused).
pub const VERSION: u32 = 0x00_01_00_00;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u32,
    /// Backend identifier, e.g. `"linear"`.
    pub backend: String,
    pub content_length: u64,
    pub content_checksum: [u8; 32],
    pub header_checksum: [u8; 32],
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("not a scorer snapshot (bad magic bytes)")]
    InvalidMagic,
    #[error("incompatible snapshot version: file {file_version:#x}, reader {reader_version:#x}")]
    IncompatibleVersion { file_version: u32, reader_version: u32 },
    #[error("snapshot header checksum mismatch")]
    HeaderChecksumMismatch,
    #[error("snapshot content length mismatch: expected {expected}, got {actual}")]
    ContentLengthMismatch { expected: u64, actual: u64 },
    #[error("snapshot content checksum mismatch")]
    ContentChecksumMismatch,
    #[error("snapshot was written by backend `{found}`, expected `{expected}`")]
    BackendMismatch { expected: String, found: String },
    #[error("snapshot encoding error: {0}")]
    Encode(String),
    #[error("snapshot decoding error: {0}")]
    Decode(String),
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SnapshotHeader {
    fn new(backend: &str, content: &[u8]) -> Self {
        let mut header = Self {
            magic: MAGIC,
            version: VERSION,
            backend: backend.to_string(),
            content_length: content.len() as u64,
            content_checksum: sha256(content),
            header_checksum: [0u8; 32],
        };
        header.header_checksum = header.compute_header_checksum();
        header
    }

    fn compute_header_checksum(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.magic);
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.backend.as_bytes());
        hasher.update(self.content_length.to_le_bytes());
        hasher.update(self.content_checksum);
        hasher.finalize().into()
    }

    pub fn verify(&self) -> Result<(), SnapshotError> {
        if self.magic != MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }
        if !is_version_compatible(self.version, VERSION) {
            return Err(SnapshotError::IncompatibleVersion {
                file_version: self.version,
                reader_version: VERSION,
            });
        }
        if self.header_checksum != self.compute_header_checksum() {
            return Err(SnapshotError::HeaderChecksumMismatch);
        }
        Ok(())
    }

    pub fn verify_content(&self, content: &[u8]) -> Result<(), SnapshotError> {
        if content.len() as u64 != self.content_length {
            return Err(SnapshotError::ContentLengthMismatch {
                expected: self.content_length,
                actual: content.len() as u64,
            });
        }
        if sha256(content) != self.content_checksum {
            return Err(SnapshotError::ContentChecksumMismatch);
        }
        Ok(())
    }
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn is_version_compatible(file_version: u32, reader_version: u32) -> bool {
    let major = |v: u32| (v >> 16) & 0xFF;
    let minor = |v: u32| (v >> 8) & 0xFF;
    major(file_version) == major(reader_version) && minor(reader_version) >= minor(file_version)
}

pub fn encode<T: Serialize>(backend: &str, body: &T) -> Result<Vec<u8>, SnapshotError> {
    let mut content = Vec::new();
    ciborium::into_writer(body, &mut content).map_err(|e| SnapshotError::Encode(e.to_string()))?;

    let header = SnapshotHeader::new(backend, &content);
    let mut out = Vec::new();
    ciborium::into_writer(&header, &mut out).map_err(|e| SnapshotError::Encode(e.to_string()))?;
    out.extend_from_slice(&content);
    Ok(out)
}

pub fn decode<T: for<'de> Deserialize<'de>>(
    backend: &str,
    data: &[u8],
) -> Result<T, SnapshotError> {
    let mut cursor = std::io::Cursor::new(data);
    let header: SnapshotHeader =
        ciborium::from_reader(&mut cursor).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    header.verify()?;
    if header.backend != backend {
        return Err(SnapshotError::BackendMismatch {
            expected: backend.to_string(),
            found: header.backend,
        });
    }

    let content = data.get(cursor.position() as usize..).unwrap_or_default();
    header.verify_content(content)?;
    ciborium::from_reader(content).map_err(|e| SnapshotError::Decode(e.to_string()))
}

pub fn write_file<T: Serialize>(path: &Path, backend: &str, body: &T) -> Result<(), SnapshotError> {
    let bytes = encode(backend, body)?;
    std::fs::write(path, bytes).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Verified header of a snapshot file, without decoding the body.
pub fn read_header(path: &Path) -> Result<SnapshotHeader, SnapshotError> {
    let bytes = std::fs::read(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cursor = std::io::Cursor::new(bytes.as_slice());
    let header: SnapshotHeader =
        ciborium::from_reader(&mut cursor).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    header.verify()?;
    header.verify_content(bytes.get(cursor.position() as usize..).unwrap_or_default())?;
    Ok(header)
}

pub fn read_file<T: for<'de> Deserialize<'de>>(
    path: &Path,
    backend: &str,
) -> Result<T, SnapshotError> {
    let bytes = std::fs::read(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(backend, &bytes)
}
