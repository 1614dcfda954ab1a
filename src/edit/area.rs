//! Area enumeration for fill and erase.
//!
//! Fill is grid-locked: it enumerates integer positions on the brush
//! orientation's plane. Erase is forgiving: it takes the full 3D box and
//! widens it by half a grid step along the orientation's normal axis so
//! tiles sitting on half-grid offsets are still caught.

use glam::Vec3;

use crate::core::{Error, Result};
use crate::math::Aabb;
use crate::tile::{Orientation, TileKey};

/// Slack on the in-plane axes of an erase box
pub const IN_PLANE_TOLERANCE: f32 = 0.01;

/// Slack along the normal axis of an erase box
pub const NORMAL_TOLERANCE: f32 = 0.5 + IN_PLANE_TOLERANCE;

/// Integer positions a fill covers, in x, y, z order.
///
/// The plane coordinate comes from `start`, rounded to the grid. Fails
/// before enumerating when a corner is out of range or the count exceeds
/// `limit`.
pub fn fill_positions(orientation: Orientation, start: Vec3, end: Vec3, limit: usize) -> Result<Vec<Vec3>> {
    let axis = orientation.normal_axis().index();
    let mut lo = start.min(end).round();
    let mut hi = start.max(end).round();
    let plane = start[axis].round();
    lo[axis] = plane;
    hi[axis] = plane;

    TileKey::encode(lo, orientation)?;
    TileKey::encode(hi, orientation)?;

    let span = hi - lo + Vec3::ONE;
    let count = span.x as u64 * span.y as u64 * span.z as u64;
    if count > limit as u64 {
        return Err(Error::CapacityExceeded {
            requested: count as usize,
            limit,
        });
    }

    let mut positions = Vec::with_capacity(count as usize);
    for x in lo.x as i32..=hi.x as i32 {
        for y in lo.y as i32..=hi.y as i32 {
            for z in lo.z as i32..=hi.z as i32 {
                positions.push(Vec3::new(x as f32, y as f32, z as f32));
            }
        }
    }
    Ok(positions)
}

/// Box an erase covers, with axis-aware tolerance
pub fn erase_bounds(orientation: Orientation, start: Vec3, end: Vec3) -> Aabb {
    let mut tolerance = Vec3::splat(IN_PLANE_TOLERANCE);
    tolerance[orientation.normal_axis().index()] = NORMAL_TOLERANCE;
    Aabb::from_corners(start, end).expanded(tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_fill_is_planar() {
        let positions = fill_positions(Orientation::Floor, Vec3::ZERO, Vec3::new(9.0, 3.0, 9.0), 1000).unwrap();
        assert_eq!(positions.len(), 100);
        assert!(positions.iter().all(|p| p.y == 0.0));
        assert_eq!(positions[0], Vec3::ZERO);
        assert_eq!(positions[99], Vec3::new(9.0, 0.0, 9.0));
    }

    #[test]
    fn test_wall_fill_uses_start_plane() {
        let positions =
            fill_positions(Orientation::WallEast, Vec3::new(2.2, 0.0, 0.0), Vec3::new(-4.0, 2.0, 1.0), 1000).unwrap();
        assert_eq!(positions.len(), 6);
        assert!(positions.iter().all(|p| p.x == 2.0));
    }

    #[test]
    fn test_reversed_corners() {
        let a = fill_positions(Orientation::Floor, Vec3::new(3.0, 0.0, 3.0), Vec3::ZERO, 100).unwrap();
        let b = fill_positions(Orientation::Floor, Vec3::ZERO, Vec3::new(3.0, 0.0, 3.0), 100).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_capacity_boundary() {
        assert_eq!(fill_positions(Orientation::Floor, Vec3::ZERO, Vec3::new(9.0, 0.0, 9.0), 100).unwrap().len(), 100);
        let err = fill_positions(Orientation::Floor, Vec3::ZERO, Vec3::new(10.0, 0.0, 9.0), 100).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { requested: 110, limit: 100 }));
    }

    #[test]
    fn test_out_of_range_corner() {
        let err = fill_positions(Orientation::Floor, Vec3::ZERO, Vec3::new(3000.0, 0.0, 0.0), usize::MAX).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { axis: 'x', .. }));
    }

    #[test]
    fn test_erase_bounds_tolerance() {
        let floor = erase_bounds(Orientation::Floor, Vec3::ZERO, Vec3::new(2.0, 0.0, 2.0));
        assert!(floor.contains_point(Vec3::new(1.0, 0.5, 1.0)));
        assert!(!floor.contains_point(Vec3::new(2.5, 0.0, 1.0)));

        let wall = erase_bounds(Orientation::WallNorth, Vec3::ZERO, Vec3::new(2.0, 2.0, 0.0));
        assert!(wall.contains_point(Vec3::new(1.0, 1.0, -0.5)));
        assert!(!wall.contains_point(Vec3::new(1.0, 2.5, 0.0)));
    }
}
