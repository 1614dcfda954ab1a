//! Tile storage: spatial index, instance batches, chunk registry and
//! the integrity validator tying them together

pub mod region;
pub mod spatial_index;
pub mod batch;
pub mod registry;
pub mod validator;

pub use region::RegionCoord;
pub use spatial_index::SpatialIndex;
pub use batch::{BatchHandle, InstanceBatch, Removal};
pub use registry::{BatchGroupKey, BatchId, ChunkRegistry, RegistryStats, SlotRef};
pub use validator::{IntegrityIssue, IntegrityReport, IntegrityValidator};
