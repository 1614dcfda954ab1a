//! Coarse spatial partition used to group chunks

use glam::{IVec3, Vec3};

use crate::math::Aabb;

/// Integer coordinate identifying a region in the grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl RegionCoord {
    /// Create a new region coordinate
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Region containing a grid position
    pub fn from_grid_pos(pos: Vec3, region_size: f32) -> Self {
        let c = (pos / region_size).floor();
        Self {
            x: c.x as i32,
            y: c.y as i32,
            z: c.z as i32,
        }
    }

    /// Minimum corner in grid units
    pub fn origin(&self, region_size: f32) -> Vec3 {
        IVec3::new(self.x, self.y, self.z).as_vec3() * region_size
    }

    /// Bounds in grid units
    pub fn bounds(&self, region_size: f32) -> Aabb {
        let origin = self.origin(region_size);
        Aabb::new(origin, origin + Vec3::splat(region_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_grid_pos() {
        let size = 50.0;
        assert_eq!(RegionCoord::from_grid_pos(Vec3::new(25.0, 0.0, 49.5), size), RegionCoord::new(0, 0, 0));
        assert_eq!(RegionCoord::from_grid_pos(Vec3::new(50.0, 0.0, 0.0), size), RegionCoord::new(1, 0, 0));
        assert_eq!(RegionCoord::from_grid_pos(Vec3::new(-0.5, -50.0, -50.5), size), RegionCoord::new(-1, -1, -2));
    }

    #[test]
    fn test_bounds_contain_members() {
        let size = 50.0;
        let pos = Vec3::new(-12.5, 3.0, 77.0);
        let region = RegionCoord::from_grid_pos(pos, size);
        assert!(region.bounds(size).contains_point(pos));
        assert_eq!(region.origin(size), Vec3::new(-50.0, 0.0, 50.0));
    }
}
