//! Logical tile record and its parts

use glam::{Vec2, Vec3};

use super::orientation::Orientation;

/// Geometry a tile instance is drawn with
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeshShape {
    #[default]
    FlatQuad = 0,
    FlatTriangle = 1,
    Box = 2,
    Prism = 3,
}

impl MeshShape {
    /// All shapes in index order
    pub const ALL: [MeshShape; 4] = [
        MeshShape::FlatQuad,
        MeshShape::FlatTriangle,
        MeshShape::Box,
        MeshShape::Prism,
    ];

    /// Numeric index stored in snapshot flags
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Inverse of [`MeshShape::index`]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Shapes with thickness, where depth scale applies
    pub fn is_volumetric(self) -> bool {
        matches!(self, MeshShape::Box | MeshShape::Prism)
    }
}

/// How the atlas region maps onto volumetric sides
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureMode {
    #[default]
    Stretch = 0,
    Repeat = 1,
}

/// Rectangle into the shared texture atlas, in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UvRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl UvRect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Rect normalized to the atlas, packed as instance custom data
    pub fn normalized(&self, atlas: Vec2) -> [f32; 4] {
        [self.x / atlas.x, self.y / atlas.y, self.w / atlas.x, self.h / atlas.y]
    }
}

/// Secondary shape adjustments beyond orientation and quarter turns
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformParams {
    /// Extra rotation around the face normal, radians
    pub spin: f32,
    /// Rotation around the local X axis, radians
    pub tilt: f32,
    /// Stretch along the local Z axis
    pub diagonal_scale: f32,
    /// Offset along the face normal, grid units
    pub tilt_offset: f32,
    /// Thickness multiplier for volumetric shapes
    pub depth_scale: f32,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            spin: 0.0,
            tilt: 0.0,
            diagonal_scale: 1.0,
            tilt_offset: 0.0,
            depth_scale: 1.0,
        }
    }
}

impl TransformParams {
    /// True when every parameter is at its neutral value
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Values in snapshot order
    pub fn to_array(&self) -> [f32; 5] {
        [self.spin, self.tilt, self.diagonal_scale, self.tilt_offset, self.depth_scale]
    }

    /// Inverse of [`TransformParams::to_array`]
    pub fn from_array(v: [f32; 5]) -> Self {
        Self {
            spin: v[0],
            tilt: v[1],
            diagonal_scale: v[2],
            tilt_offset: v[3],
            depth_scale: v[4],
        }
    }
}

/// A placed tile
#[derive(Clone, Debug, PartialEq)]
pub struct TileRecord {
    /// Grid position, half-unit steps
    pub position: Vec3,
    pub orientation: Orientation,
    /// Quarter turns around the face normal (0-3)
    pub rotation: u8,
    /// Face mirrored so its front faces the other side
    pub flipped: bool,
    pub shape: MeshShape,
    pub texture_mode: TextureMode,
    /// Autotile terrain; `None` for manually painted tiles
    pub terrain: Option<u8>,
    /// Only present when non-default, keeping snapshots sparse
    pub params: Option<TransformParams>,
    pub uv: UvRect,
}

impl TileRecord {
    /// Create a flat quad at a position
    pub fn new(position: Vec3, orientation: Orientation) -> Self {
        Self {
            position,
            orientation,
            rotation: 0,
            flipped: false,
            shape: MeshShape::FlatQuad,
            texture_mode: TextureMode::Stretch,
            terrain: None,
            params: None,
            uv: UvRect::default(),
        }
    }

    /// Set quarter turns (wrapped to 0-3)
    pub fn with_rotation(mut self, steps: u8) -> Self {
        self.rotation = steps & 3;
        self
    }

    pub fn with_flip(mut self, flipped: bool) -> Self {
        self.flipped = flipped;
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

    pub fn with_terrain(mut self, terrain: Option<u8>) -> Self {
        self.terrain = terrain;
        self
    }

    /// Set secondary transform params; default params are dropped
    pub fn with_params(mut self, params: TransformParams) -> Self {
        self.params = (!params.is_default()).then_some(params);
        self
    }

    pub fn with_uv(mut self, uv: UvRect) -> Self {
        self.uv = uv;
        self
    }

    /// Effective transform params
    pub fn params(&self) -> TransformParams {
        self.params.unwrap_or_default()
    }
}
