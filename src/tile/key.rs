//! Packed 64-bit tile identity.
//!
//! Layout, high to low: x (16 bits), y (16 bits), z (16 bits), 11 reserved
//! bits, orientation tag (5 bits). Each axis is stored as a two's-complement
//! fixed-point value with 0.1 precision. Every map in the engine keys off
//! `TileKey` rather than raw floating-point positions.

use std::fmt;

use glam::Vec3;

use crate::core::{Error, Result};
use super::orientation::Orientation;

/// Fixed-point scale (0.1 unit precision)
pub const COORD_SCALE: f32 = 10.0;

/// Largest accepted coordinate magnitude, kept below the i16 limit of ±3276.7
pub const MAX_COORD: f32 = 2500.0;

const MAX_FIXED: f32 = MAX_COORD * COORD_SCALE;
const ORIENTATION_MASK: u64 = 0x1f;
const RESERVED_MASK: u64 = 0xffe0;

/// Packed (position, orientation) identity of a tile
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey(u64);

impl TileKey {
    /// Pack a position and orientation, rejecting out-of-range coordinates
    pub fn encode(position: Vec3, orientation: Orientation) -> Result<TileKey> {
        let x = to_fixed('x', position.x)?;
        let y = to_fixed('y', position.y)?;
        let z = to_fixed('z', position.z)?;
        Ok(TileKey(
            (x as u16 as u64) << 48
                | (y as u16 as u64) << 32
                | (z as u16 as u64) << 16
                | orientation.tag() as u64,
        ))
    }

    /// Unpack into the snapped position and the raw orientation tag
    pub fn decode(self) -> (Vec3, u8) {
        let axis = |shift: u32| ((self.0 >> shift) as u16 as i16) as f32 / COORD_SCALE;
        (
            Vec3::new(axis(48), axis(32), axis(16)),
            (self.0 & ORIENTATION_MASK) as u8,
        )
    }

    /// Unpack, returning `None` for keys no `encode` call could have produced
    pub fn try_decode(self) -> Option<(Vec3, Orientation)> {
        if self.0 & RESERVED_MASK != 0 {
            return None;
        }
        let (position, tag) = self.decode();
        Orientation::from_tag(tag).map(|o| (position, o))
    }

    /// Snapped position encoded in this key
    pub fn position(self) -> Vec3 {
        self.decode().0
    }

    /// Orientation encoded in this key
    pub fn orientation(self) -> Option<Orientation> {
        Orientation::from_tag(self.decode().1)
    }

    /// Raw packed value
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Wrap a raw packed value
    pub fn from_raw(raw: u64) -> Self {
        TileKey(raw)
    }
}

impl fmt::Debug for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (p, tag) = self.decode();
        write!(f, "TileKey({:#018x} @ {}, {}, {} o{})", self.0, p.x, p.y, p.z, tag)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

fn to_fixed(axis: char, value: f32) -> Result<i16> {
    let fixed = (value * COORD_SCALE).round();
    if !fixed.is_finite() || fixed.abs() > MAX_FIXED {
        return Err(Error::OutOfRange { axis, value, limit: MAX_COORD });
    }
    Ok(fixed as i16)
}

/// Round a position to key precision
pub fn snap_to_precision(position: Vec3) -> Vec3 {
    (position * COORD_SCALE).round() / COORD_SCALE
}

/// Round a position to the half-grid step tiles are painted at
pub fn snap_to_half(position: Vec3) -> Vec3 {
    (position * 2.0).round() / 2.0
}

/// Whether every axis is encodable
pub fn is_in_range(position: Vec3) -> bool {
    position.is_finite() && (position * COORD_SCALE).round().abs().max_element() <= MAX_FIXED
}
