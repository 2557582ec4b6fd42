//! Checksummed bincode frames

use crate::error::{Result, StorageError};
use serde::{de::DeserializeOwned, Serialize};
use std::io::Write;
use std::path::Path;

const MAGIC: &[u8; 4] = b"SFC1";
const DIGEST_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + DIGEST_LEN;

/// Encode `value` into a frame
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(value)?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(blake3::hash(&payload).as_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a frame read from `path` (used in error messages)
pub fn decode<T: DeserializeOwned>(bytes: &[u8], path: &Path) -> Result<T> {
    let corrupt = |reason| StorageError::Corrupt {
        path: path.display().to_string(),
        reason,
    };
    if bytes.len() < HEADER_LEN {
        return Err(corrupt("truncated header"));
    }
    let (magic, rest) = bytes.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let (digest, payload) = rest.split_at(DIGEST_LEN);
    if blake3::hash(payload).as_bytes() != digest {
        return Err(corrupt("checksum mismatch"));
    }
    Ok(bincode::deserialize(payload)?)
}

/// Write `value` to `path` atomically
pub fn write<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = encode(value)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

/// Read and verify the frame at `path`
pub fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    decode(&bytes, path)
}
