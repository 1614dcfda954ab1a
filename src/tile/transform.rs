//! Per-instance render data built from a tile record

use std::f32::consts::FRAC_PI_2;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Vec2, Vec3};

use super::record::TileRecord;

/// One instance as the renderer consumes it (must match shader layout)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    /// Row-major 3x4 affine transform (basis columns + translation)
    pub transform: [[f32; 4]; 3],
    /// Normalized atlas rect: x, y, w, h
    pub custom: [f32; 4],
}

impl InstanceData {
    /// Pack a basis, an origin, and custom data
    pub fn from_parts(basis: Mat3, origin: Vec3, custom: [f32; 4]) -> Self {
        let mut transform = [[0.0; 4]; 3];
        for (i, row) in transform.iter_mut().enumerate() {
            *row = [basis.x_axis[i], basis.y_axis[i], basis.z_axis[i], origin[i]];
        }
        Self { transform, custom }
    }

    /// Translation part
    pub fn origin(&self) -> Vec3 {
        Vec3::new(self.transform[0][3], self.transform[1][3], self.transform[2][3])
    }

    /// Linear part
    pub fn basis(&self) -> Mat3 {
        let t = &self.transform;
        Mat3::from_cols(
            Vec3::new(t[0][0], t[1][0], t[2][0]),
            Vec3::new(t[0][1], t[1][1], t[2][1]),
            Vec3::new(t[0][2], t[1][2], t[2][2]),
        )
    }
}

/// Local-to-world basis of a tile, before grid scaling
pub fn tile_basis(record: &TileRecord) -> Mat3 {
    let params = record.params();
    let depth = if record.shape.is_volumetric() { params.depth_scale } else { 1.0 };
    let depth = if record.flipped { -depth } else { depth };

    let turn = record.rotation as f32 * FRAC_PI_2 + params.spin;
    let local = Mat3::from_rotation_y(turn)
        * Mat3::from_rotation_x(params.tilt)
        * Mat3::from_diagonal(Vec3::new(1.0, depth, params.diagonal_scale));

    record.orientation.basis() * local
}

/// World-space origin of a tile
pub fn tile_origin(record: &TileRecord, grid_size: f32) -> Vec3 {
    let offset = record.params().tilt_offset;
    (record.position + record.orientation.normal() * offset) * grid_size
}

/// Build the render instance for a record
pub fn instance_data(record: &TileRecord, grid_size: f32, atlas: Vec2) -> InstanceData {
    InstanceData::from_parts(
        tile_basis(record) * grid_size,
        tile_origin(record, grid_size),
        record.uv.normalized(atlas),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::orientation::Orientation;
    use crate::tile::record::{MeshShape, TransformParams, UvRect};

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn test_floor_tile_identity() {
        let record = TileRecord::new(Vec3::new(2.0, 0.0, 3.0), Orientation::Floor)
            .with_uv(UvRect::new(0.0, 0.0, 32.0, 32.0));
        let data = instance_data(&record, 1.0, Vec2::new(128.0, 128.0));

        assert_eq!(data.origin(), Vec3::new(2.0, 0.0, 3.0));
        assert!(approx(data.basis() * Vec3::Y, Vec3::Y));
        assert_eq!(data.custom, [0.0, 0.0, 0.25, 0.25]);
    }

    #[test]
    fn test_grid_size_scales_origin_and_basis() {
        let record = TileRecord::new(Vec3::new(1.0, 2.0, 0.5), Orientation::Floor);
        let data = instance_data(&record, 2.0, Vec2::ONE);
        assert_eq!(data.origin(), Vec3::new(2.0, 4.0, 1.0));
        assert!(approx(data.basis() * Vec3::X, Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_rotation_keeps_normal() {
        for steps in 0..4 {
            let record = TileRecord::new(Vec3::ZERO, Orientation::WallSouth).with_rotation(steps);
            let n = tile_basis(&record) * Vec3::Y;
            assert!(approx(n, Vec3::Z), "steps {} gave {:?}", steps, n);
        }
        let quarter = TileRecord::new(Vec3::ZERO, Orientation::Floor).with_rotation(1);
        assert!(approx(tile_basis(&quarter) * Vec3::X, Vec3::NEG_Z));
    }

    #[test]
    fn test_flip_reverses_normal() {
        let record = TileRecord::new(Vec3::ZERO, Orientation::Floor).with_flip(true);
        assert!(approx(tile_basis(&record) * Vec3::Y, Vec3::NEG_Y));
        assert!(tile_basis(&record).determinant() < 0.0);
    }

    #[test]
    fn test_depth_scale_only_for_volumetric() {
        let params = TransformParams { depth_scale: 3.0, ..Default::default() };
        let flat = TileRecord::new(Vec3::ZERO, Orientation::Floor).with_params(params);
        let boxed = flat.clone().with_shape(MeshShape::Box);

        assert!(approx(tile_basis(&flat) * Vec3::Y, Vec3::Y));
        assert!(approx(tile_basis(&boxed) * Vec3::Y, Vec3::new(0.0, 3.0, 0.0)));
    }

    #[test]
    fn test_tilt_offset_moves_along_normal() {
        let params = TransformParams { tilt_offset: 0.5, ..Default::default() };
        let record = TileRecord::new(Vec3::new(1.0, 1.0, 1.0), Orientation::WallEast).with_params(params);
        assert!(approx(tile_origin(&record, 1.0), Vec3::new(1.5, 1.0, 1.0)));
    }

    #[test]
    fn test_instance_is_plain_bytes() {
        let data = InstanceData::default();
        let bytes: &[u8] = bytemuck::bytes_of(&data);
        assert_eq!(bytes.len(), 64);
    }
}
