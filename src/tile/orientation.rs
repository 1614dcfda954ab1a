//! Tile orientations: six base planes plus twelve 45° tilted variants.
//!
//! Tiles are authored in a local frame where the face lies in the XZ plane
//! with its normal along +Y. Each orientation maps that frame into the world.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI, SQRT_2};

use glam::{Mat3, Vec3};

/// Number of distinct orientations (fits the 5-bit key tag)
pub const ORIENTATION_COUNT: usize = 18;

/// Grid axis
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Component index (0, 1, 2)
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Unit vector along this axis
    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

/// Plane a tile is painted on
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Orientation {
    #[default]
    Floor = 0,
    Ceiling = 1,
    WallNorth = 2,
    WallSouth = 3,
    WallEast = 4,
    WallWest = 5,
    FloorTiltPosX = 6,
    FloorTiltNegX = 7,
    CeilingTiltPosX = 8,
    CeilingTiltNegX = 9,
    WallNorthTiltPosY = 10,
    WallNorthTiltNegY = 11,
    WallSouthTiltPosY = 12,
    WallSouthTiltNegY = 13,
    WallEastTiltPosY = 14,
    WallEastTiltNegY = 15,
    WallWestTiltPosY = 16,
    WallWestTiltNegY = 17,
}

impl Orientation {
    /// All orientations in tag order
    pub const ALL: [Orientation; ORIENTATION_COUNT] = [
        Orientation::Floor,
        Orientation::Ceiling,
        Orientation::WallNorth,
        Orientation::WallSouth,
        Orientation::WallEast,
        Orientation::WallWest,
        Orientation::FloorTiltPosX,
        Orientation::FloorTiltNegX,
        Orientation::CeilingTiltPosX,
        Orientation::CeilingTiltNegX,
        Orientation::WallNorthTiltPosY,
        Orientation::WallNorthTiltNegY,
        Orientation::WallSouthTiltPosY,
        Orientation::WallSouthTiltNegY,
        Orientation::WallEastTiltPosY,
        Orientation::WallEastTiltNegY,
        Orientation::WallWestTiltPosY,
        Orientation::WallWestTiltNegY,
    ];

    /// Numeric tag stored in keys and snapshot flags
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Orientation::tag`]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Whether this is one of the 45° variants
    pub fn is_tilted(self) -> bool {
        self.tag() >= 6
    }

    /// The untilted plane this orientation derives from
    pub fn base(self) -> Orientation {
        use Orientation::*;
        match self {
            FloorTiltPosX | FloorTiltNegX => Floor,
            CeilingTiltPosX | CeilingTiltNegX => Ceiling,
            WallNorthTiltPosY | WallNorthTiltNegY => WallNorth,
            WallSouthTiltPosY | WallSouthTiltNegY => WallSouth,
            WallEastTiltPosY | WallEastTiltNegY => WallEast,
            WallWestTiltPosY | WallWestTiltNegY => WallWest,
            base => base,
        }
    }

    /// Grid axis perpendicular to the base plane
    pub fn normal_axis(self) -> Axis {
        use Orientation::*;
        match self.base() {
            Floor | Ceiling => Axis::Y,
            WallNorth | WallSouth => Axis::Z,
            _ => Axis::X,
        }
    }

    /// Local axis the tilt rotates around and the signed angle, for tilted variants
    fn tilt(self) -> Option<(Axis, f32)> {
        use Orientation::*;
        match self {
            FloorTiltPosX | CeilingTiltPosX | WallEastTiltPosY | WallWestTiltPosY => {
                Some((Axis::Z, FRAC_PI_4))
            }
            FloorTiltNegX | CeilingTiltNegX | WallEastTiltNegY | WallWestTiltNegY => {
                Some((Axis::Z, -FRAC_PI_4))
            }
            WallNorthTiltPosY | WallSouthTiltPosY => Some((Axis::X, FRAC_PI_4)),
            WallNorthTiltNegY | WallSouthTiltNegY => Some((Axis::X, -FRAC_PI_4)),
            _ => None,
        }
    }

    fn base_rotation(self) -> Mat3 {
        use Orientation::*;
        match self.base() {
            Ceiling => Mat3::from_rotation_x(PI),
            WallSouth => Mat3::from_rotation_x(FRAC_PI_2),
            WallNorth => Mat3::from_rotation_x(-FRAC_PI_2),
            WallEast => Mat3::from_rotation_z(-FRAC_PI_2),
            WallWest => Mat3::from_rotation_z(FRAC_PI_2),
            _ => Mat3::IDENTITY,
        }
    }

    /// Local-to-world basis for a tile face.
    ///
    /// Tilted variants stretch the edge perpendicular to the tilt axis by √2
    /// so the face spans one grid diagonal.
    pub fn basis(self) -> Mat3 {
        let base = self.base_rotation();
        match self.tilt() {
            Some((Axis::Z, angle)) => {
                base * Mat3::from_rotation_z(angle) * Mat3::from_diagonal(Vec3::new(SQRT_2, 1.0, 1.0))
            }
            Some((_, angle)) => {
                base * Mat3::from_rotation_x(angle) * Mat3::from_diagonal(Vec3::new(1.0, 1.0, SQRT_2))
            }
            None => base,
        }
    }

    /// World-space face normal
    pub fn normal(self) -> Vec3 {
        (self.basis() * Vec3::Y).normalize()
    }

    /// Base orientation whose normal best matches a surface normal.
    ///
    /// Used by cursor collaborators that pick a plane from a raycast hit.
    pub fn from_normal(normal: Vec3) -> Orientation {
        let abs = normal.abs();
        if abs.y >= abs.x && abs.y >= abs.z {
            if normal.y >= 0.0 { Orientation::Floor } else { Orientation::Ceiling }
        } else if abs.z >= abs.x {
            if normal.z >= 0.0 { Orientation::WallSouth } else { Orientation::WallNorth }
        } else if normal.x >= 0.0 {
            Orientation::WallEast
        } else {
            Orientation::WallWest
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn test_tag_round_trip() {
        for (i, o) in Orientation::ALL.iter().enumerate() {
            assert_eq!(o.tag() as usize, i);
            assert_eq!(Orientation::from_tag(o.tag()), Some(*o));
        }
        assert_eq!(Orientation::from_tag(18), None);
        assert_eq!(Orientation::from_tag(31), None);
    }

    #[test]
    fn test_base_normals() {
        assert!(approx(Orientation::Floor.normal(), Vec3::Y));
        assert!(approx(Orientation::Ceiling.normal(), Vec3::NEG_Y));
        assert!(approx(Orientation::WallSouth.normal(), Vec3::Z));
        assert!(approx(Orientation::WallNorth.normal(), Vec3::NEG_Z));
        assert!(approx(Orientation::WallEast.normal(), Vec3::X));
        assert!(approx(Orientation::WallWest.normal(), Vec3::NEG_X));
    }

    #[test]
    fn test_tilted_normals_lean_off_base() {
        for o in Orientation::ALL.iter().filter(|o| o.is_tilted()) {
            let n = o.normal();
            let base = o.base().normal();
            let cos = n.dot(base);
            assert!((cos - FRAC_PI_4.cos()).abs() < 1e-4, "{:?} leans {}", o, cos);
        }
    }

    #[test]
    fn test_tilted_face_spans_diagonal() {
        let basis = Orientation::FloorTiltPosX.basis();
        let edge = basis * Vec3::X;
        assert!(approx(edge, Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn test_normal_axis() {
        assert_eq!(Orientation::Floor.normal_axis(), Axis::Y);
        assert_eq!(Orientation::CeilingTiltNegX.normal_axis(), Axis::Y);
        assert_eq!(Orientation::WallNorthTiltPosY.normal_axis(), Axis::Z);
        assert_eq!(Orientation::WallWest.normal_axis(), Axis::X);
    }

    #[test]
    fn test_from_normal() {
        assert_eq!(Orientation::from_normal(Vec3::new(0.1, 0.9, 0.2)), Orientation::Floor);
        assert_eq!(Orientation::from_normal(Vec3::new(0.0, -1.0, 0.0)), Orientation::Ceiling);
        assert_eq!(Orientation::from_normal(Vec3::new(0.2, 0.1, -0.9)), Orientation::WallNorth);
        assert_eq!(Orientation::from_normal(Vec3::new(-0.8, 0.1, 0.3)), Orientation::WallWest);
    }
}
