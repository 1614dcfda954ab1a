//! Engine configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::Error;
use super::types::{Result, Vec2};

/// Default number of instances per chunk
pub const DEFAULT_CHUNK_CAPACITY: usize = 1000;

/// Default region edge length in grid units
pub const DEFAULT_REGION_SIZE: f32 = 50.0;

/// Default spatial index bucket edge length in grid units
pub const DEFAULT_SPATIAL_BUCKET_SIZE: f32 = 10.0;

/// Default ceiling on tiles touched by one area operation
pub const DEFAULT_MAX_AREA_TILES: usize = 10_000;

/// Tunables for the placement engine.
///
/// Owned by the engine and never shared through global state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// World units per grid step
    pub grid_size: f32,
    /// Edge length of a chunk region in grid units
    pub region_size: f32,
    /// Instances per chunk
    pub chunk_capacity: usize,
    /// Edge length of a spatial index bucket in grid units
    pub spatial_bucket_size: f32,
    /// Hard ceiling on tiles touched by one fill or erase-area call
    pub max_area_tiles: usize,
    /// Texture atlas size in pixels, used to normalize UV rects
    pub atlas_size: [f32; 2],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_size: 1.0,
            region_size: DEFAULT_REGION_SIZE,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            spatial_bucket_size: DEFAULT_SPATIAL_BUCKET_SIZE,
            max_area_tiles: DEFAULT_MAX_AREA_TILES,
            atlas_size: [256.0, 256.0],
        }
    }
}

impl EngineConfig {
    /// Atlas size as a vector
    pub fn atlas(&self) -> Vec2 {
        Vec2::from(self.atlas_size)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.grid_size > 0.0) {
            return Err(Error::Config(format!("grid_size must be positive, got {}", self.grid_size)));
        }
        if !(self.region_size > 0.0) {
            return Err(Error::Config(format!("region_size must be positive, got {}", self.region_size)));
        }
        if !(self.spatial_bucket_size > 0.0) {
            return Err(Error::Config(format!(
                "spatial_bucket_size must be positive, got {}",
                self.spatial_bucket_size
            )));
        }
        if self.chunk_capacity == 0 {
            return Err(Error::Config("chunk_capacity must be at least 1".into()));
        }
        if self.atlas_size.iter().any(|&s| !(s > 0.0)) {
            return Err(Error::Config(format!("atlas_size must be positive, got {:?}", self.atlas_size)));
        }
        Ok(())
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}
