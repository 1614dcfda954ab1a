//! Tile identity, orientation, and per-tile data

pub mod key;
pub mod orientation;
pub mod record;
pub mod transform;

pub use key::{TileKey, COORD_SCALE, MAX_COORD, snap_to_half, snap_to_precision};
pub use orientation::{Axis, Orientation};
pub use record::{MeshShape, TextureMode, TileRecord, TransformParams, UvRect};
pub use transform::InstanceData;
