//! Snapshot serialization and disk I/O

use std::path::Path;

use crate::core::{Error, Result};
use super::snapshot::{ArchivedTileSnapshot, TileSnapshot};

const MAGIC: &[u8; 4] = b"TSNP";

/// Serialize a snapshot to bytes (uncompressed)
pub fn serialize_snapshot(snapshot: &TileSnapshot) -> Result<Vec<u8>> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(snapshot).map_err(|e| Error::Snapshot(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Deserialize a snapshot from bytes (uncompressed)
pub fn deserialize_snapshot(data: &[u8]) -> Result<TileSnapshot> {
    // Archived data must be aligned before access
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(data.len());
    aligned.extend_from_slice(data);

    let archived = rkyv::access::<ArchivedTileSnapshot, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::Snapshot(e.to_string()))?;
    rkyv::deserialize::<TileSnapshot, rkyv::rancor::Error>(archived).map_err(|e| Error::Snapshot(e.to_string()))
}

/// Serialize and compress with LZ4, behind a magic tag
pub fn compress_snapshot(snapshot: &TileSnapshot) -> Result<Vec<u8>> {
    let serialized = serialize_snapshot(snapshot)?;
    let compressed = lz4_flex::compress_prepend_size(&serialized);
    let mut out = Vec::with_capacity(MAGIC.len() + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Inverse of [`compress_snapshot`]
pub fn decompress_snapshot(data: &[u8]) -> Result<TileSnapshot> {
    let body = data
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| Error::Snapshot("invalid magic bytes".into()))?;
    let decompressed = lz4_flex::decompress_size_prepended(body)
        .map_err(|e| Error::Snapshot(format!("LZ4 decompression failed: {}", e)))?;
    deserialize_snapshot(&decompressed)
}

/// Save a snapshot to disk (compressed)
pub fn save_snapshot(path: &Path, snapshot: &TileSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, compress_snapshot(snapshot)?)?;
    log::debug!("Saved {} tiles to {}", snapshot.len(), path.display());
    Ok(())
}

/// Load a snapshot from disk
pub fn load_snapshot_file(path: &Path) -> Result<TileSnapshot> {
    let data = std::fs::read(path)?;
    let snapshot = decompress_snapshot(&data)?;
    log::info!("Loaded snapshot with {} tiles from {}", snapshot.len(), path.display());
    Ok(snapshot)
}
