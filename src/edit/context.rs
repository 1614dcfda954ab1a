//! Brush state passed into every paint call

use glam::Vec3;

use crate::tile::{MeshShape, Orientation, TextureMode, TileRecord, TransformParams, UvRect};

/// Everything a paint call needs to know about the active brush
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaintContext {
    pub orientation: Orientation,
    /// Quarter turns (0-3)
    pub rotation: u8,
    pub flipped: bool,
    pub shape: MeshShape,
    pub texture_mode: TextureMode,
    pub uv: UvRect,
    /// Autotile terrain, `None` for manual painting
    pub terrain: Option<u8>,
    pub params: TransformParams,
}

impl PaintContext {
    /// Brush for an orientation with everything else at defaults
    pub fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            ..Default::default()
        }
    }

    pub fn with_uv(mut self, uv: UvRect) -> Self {
        self.uv = uv;
        self
    }

    pub fn with_rotation(mut self, steps: u8) -> Self {
        self.rotation = steps & 3;
        self
    }

    pub fn with_shape(mut self, shape: MeshShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_texture_mode(mut self, mode: TextureMode) -> Self {
        self.texture_mode = mode;
        self
    }

    pub fn with_flip(mut self, flipped: bool) -> Self {
        self.flipped = flipped;
        self
    }

    pub fn with_terrain(mut self, terrain: Option<u8>) -> Self {
        self.terrain = terrain;
        self
    }

    pub fn with_params(mut self, params: TransformParams) -> Self {
        self.params = params;
        self
    }

    /// Tile this brush would put at a position
    pub fn record_at(&self, position: Vec3) -> TileRecord {
        TileRecord::new(position, self.orientation)
            .with_rotation(self.rotation)
            .with_flip(self.flipped)
            .with_shape(self.shape)
            .with_texture_mode(self.texture_mode)
            .with_terrain(self.terrain)
            .with_params(self.params)
            .with_uv(self.uv)
    }
}

/// Result of a single paint or erase call
#[derive(Clone, Debug, PartialEq)]
pub enum PaintOutcome {
    /// New tile placed
    Placed,
    /// Existing tile swapped for the brush tile
    Replaced,
    Erased,
    /// Nothing to do (identical tile, or nothing to erase)
    Unchanged,
    /// Refused without touching state
    Rejected(String),
}

impl PaintOutcome {
    /// Whether state changed
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Placed | Self::Replaced | Self::Erased)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_at_carries_brush() {
        let ctx = PaintContext::new(Orientation::WallNorth)
            .with_rotation(5)
            .with_shape(MeshShape::Prism)
            .with_terrain(Some(3))
            .with_uv(UvRect::new(16.0, 16.0, 16.0, 16.0));
        let record = ctx.record_at(Vec3::new(1.0, 2.0, 3.0));

        assert_eq!(record.orientation, Orientation::WallNorth);
        assert_eq!(record.rotation, 1);
        assert_eq!(record.shape, MeshShape::Prism);
        assert_eq!(record.terrain, Some(3));
        assert!(record.params.is_none());
    }

    #[test]
    fn test_outcome_is_change() {
        assert!(PaintOutcome::Placed.is_change());
        assert!(!PaintOutcome::Unchanged.is_change());
        assert!(!PaintOutcome::Rejected("out of range".into()).is_change());
    }
}
