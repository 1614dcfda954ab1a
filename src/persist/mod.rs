//! Snapshot persistence: columnar scene data and compressed binary files

pub mod snapshot;
pub mod disk_io;

pub use snapshot::{FlagFields, TileSnapshot, LEGACY_VERSION, SNAPSHOT_VERSION, pack_flags, unpack_flags};
pub use disk_io::{compress_snapshot, decompress_snapshot, load_snapshot_file, save_snapshot};
