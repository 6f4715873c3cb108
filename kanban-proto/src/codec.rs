//! Binary snapshot format for persisted task stores.
//!
//! Wire format: `[b"KNBN"][u16 version (LE)][postcard payload]`.
//! The header lets a reader reject foreign or newer files before handing
//! the payload to postcard.

use serde::{Deserialize, Serialize};

use crate::project::Project;
use crate::task::Task;

/// Magic bytes at the start of every snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"KNBN";

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: u16 = 1;

const HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + 2;

/// Error type for snapshot encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The input does not start with the snapshot magic.
    #[error("not a task snapshot (bad magic)")]
    BadMagic,
    /// The snapshot was written by a newer format version.
    #[error("unsupported snapshot version {0} (max {SNAPSHOT_VERSION})")]
    UnsupportedVersion(u16),
}

/// Everything a task store persists: projects and tasks, deleted ones included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// All projects.
    pub projects: Vec<Project>,
    /// All tasks in creation order, including soft-deleted ones.
    pub tasks: Vec<Task>,
}

/// Encodes a [`StoreSnapshot`] with the versioned header.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the snapshot cannot be serialized.
pub fn encode_snapshot(snapshot: &StoreSnapshot) -> Result<Vec<u8>, CodecError> {
    let payload =
        postcard::to_allocvec(snapshot).map_err(|e| CodecError::Serialization(e.to_string()))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decodes a [`StoreSnapshot`] written by [`encode_snapshot`].
///
/// # Errors
///
/// Returns `CodecError::BadMagic` for foreign input,
/// `CodecError::UnsupportedVersion` for newer formats, or
/// `CodecError::Serialization` if the payload is corrupt.
pub fn decode_snapshot(bytes: &[u8]) -> Result<StoreSnapshot, CodecError> {
    if bytes.len() < HEADER_LEN || bytes[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version > SNAPSHOT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    postcard::from_bytes(&bytes[HEADER_LEN..]).map_err(|e| CodecError::Serialization(e.to_string()))
}
