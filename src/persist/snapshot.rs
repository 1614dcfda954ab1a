//! Columnar tile snapshot embedded in the host scene format.
//!
//! One entry per tile across parallel arrays: positions (3 floats), atlas
//! rects (4 floats) and packed flags. Transform params are sparse: only
//! tiles with non-default params get an entry in the side table.
//!
//! Flags, current layout:
//!
//! | bits  | field                                  |
//! |-------|----------------------------------------|
//! | 0-4   | orientation                            |
//! | 5-6   | rotation                               |
//! | 7     | flip                                   |
//! | 8-9   | mesh shape                             |
//! | 10    | texture mode                           |
//! | 11-19 | terrain id + 1 (0 = manually painted)  |
//!
//! Legacy layout: bits 0-7 as above, bit 8 selects quad or triangle, and
//! params carry only spin, tilt and diagonal scale.

use glam::Vec3;

use crate::core::{Error, Result};
use crate::tile::{MeshShape, Orientation, TextureMode, TileRecord, TransformParams, UvRect};

/// Layout written by this version
pub const SNAPSHOT_VERSION: u32 = 2;

/// Layout with three-float params and no texture mode or terrain
pub const LEGACY_VERSION: u32 = 1;

const PARAM_STRIDE: usize = 5;
const LEGACY_PARAM_STRIDE: usize = 3;

const ORIENTATION_BITS: u32 = 0x1f;
const ROTATION_SHIFT: u32 = 5;
const FLIP_BIT: u32 = 1 << 7;
const SHAPE_SHIFT: u32 = 8;
const TEXTURE_MODE_BIT: u32 = 1 << 10;
const TERRAIN_SHIFT: u32 = 11;
const TERRAIN_MASK: u32 = 0x1ff;

/// Columnar tile data
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    serde::Serialize,
    serde::Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct TileSnapshot {
    /// 0 when absent (older scenes); the layout is then inferred
    #[serde(default)]
    pub version: u32,
    pub positions: Vec<f32>,
    pub uv_rects: Vec<f32>,
    pub flags: Vec<u32>,
    /// Tile indices that carry params, ascending
    #[serde(default)]
    pub param_indices: Vec<u32>,
    #[serde(default)]
    pub param_values: Vec<f32>,
}

/// Pack a record's discrete fields
pub fn pack_flags(record: &TileRecord) -> u32 {
    let terrain = record.terrain.map_or(0, |t| t as u32 + 1);
    let flip = if record.flipped { FLIP_BIT } else { 0 };
    let mode = match record.texture_mode {
        TextureMode::Repeat => TEXTURE_MODE_BIT,
        TextureMode::Stretch => 0,
    };
    (record.orientation.tag() as u32)
        | ((record.rotation as u32) & 3) << ROTATION_SHIFT
        | flip
        | ((record.shape.index() as u32) & 3) << SHAPE_SHIFT
        | mode
        | (terrain & TERRAIN_MASK) << TERRAIN_SHIFT
}

/// Decoded discrete fields
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlagFields {
    pub orientation: Orientation,
    pub rotation: u8,
    pub flipped: bool,
    pub shape: MeshShape,
    pub texture_mode: TextureMode,
    pub terrain: Option<u8>,
}

/// Unpack flags written by a given layout version
pub fn unpack_flags(flags: u32, version: u32) -> Option<FlagFields> {
    let orientation = Orientation::from_tag((flags & ORIENTATION_BITS) as u8)?;
    let rotation = ((flags >> ROTATION_SHIFT) & 3) as u8;
    let flipped = flags & FLIP_BIT != 0;

    if version == LEGACY_VERSION {
        let shape = if flags & (1 << SHAPE_SHIFT) != 0 {
            MeshShape::FlatTriangle
        } else {
            MeshShape::FlatQuad
        };
        return Some(FlagFields {
            orientation,
            rotation,
            flipped,
            shape,
            texture_mode: TextureMode::Stretch,
            terrain: None,
        });
    }

    let shape = MeshShape::from_index(((flags >> SHAPE_SHIFT) & 3) as u8)?;
    let texture_mode = if flags & TEXTURE_MODE_BIT != 0 {
        TextureMode::Repeat
    } else {
        TextureMode::Stretch
    };
    let terrain = match (flags >> TERRAIN_SHIFT) & TERRAIN_MASK {
        0 => None,
        t => Some(u8::try_from(t - 1).ok()?),
    };
    Some(FlagFields {
        orientation,
        rotation,
        flipped,
        shape,
        texture_mode,
        terrain,
    })
}

impl TileSnapshot {
    /// Build a current-layout snapshot
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a TileRecord>,
    {
        let mut snapshot = Self {
            version: SNAPSHOT_VERSION,
            ..Default::default()
        };
        for (i, record) in records.into_iter().enumerate() {
            snapshot.positions.extend(record.position.to_array());
            snapshot
                .uv_rects
                .extend([record.uv.x, record.uv.y, record.uv.w, record.uv.h]);
            snapshot.flags.push(pack_flags(record));
            if let Some(params) = record.params {
                snapshot.param_indices.push(i as u32);
                snapshot.param_values.extend(params.to_array());
            }
        }
        snapshot
    }

    /// Number of tiles
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Layout version, inferring it from the params stride when absent
    pub fn effective_version(&self) -> Result<u32> {
        match self.version {
            0 if self.param_indices.is_empty() => Ok(SNAPSHOT_VERSION),
            0 => match self.param_values.len() / self.param_indices.len() {
                LEGACY_PARAM_STRIDE => Ok(LEGACY_VERSION),
                PARAM_STRIDE => Ok(SNAPSHOT_VERSION),
                stride => Err(Error::Snapshot(format!("unknown params stride {}", stride))),
            },
            LEGACY_VERSION | SNAPSHOT_VERSION => Ok(self.version),
            v => Err(Error::Snapshot(format!("unsupported snapshot version {}", v))),
        }
    }

    /// Rewrite a legacy snapshot in the current layout
    pub fn migrate(&self) -> Result<Self> {
        if self.effective_version()? == SNAPSHOT_VERSION {
            let mut current = self.clone();
            current.version = SNAPSHOT_VERSION;
            return Ok(current);
        }
        let records = self.records()?;
        log::info!("Migrated {} tiles from snapshot version {}", records.len(), LEGACY_VERSION);
        Ok(Self::from_records(&records))
    }

    /// Decode every tile.
    ///
    /// Entries with invalid flags are skipped with a warning; mismatched
    /// column lengths are an error.
    pub fn records(&self) -> Result<Vec<TileRecord>> {
        let version = self.effective_version()?;
        let stride = if version == LEGACY_VERSION {
            LEGACY_PARAM_STRIDE
        } else {
            PARAM_STRIDE
        };

        let n = self.flags.len();
        if self.positions.len() != n * 3 || self.uv_rects.len() != n * 4 {
            return Err(Error::Snapshot(format!(
                "column lengths disagree: {} flags, {} position floats, {} uv floats",
                n,
                self.positions.len(),
                self.uv_rects.len()
            )));
        }
        if self.param_values.len() != self.param_indices.len() * stride {
            return Err(Error::Snapshot(format!(
                "{} param entries but {} values (stride {})",
                self.param_indices.len(),
                self.param_values.len(),
                stride
            )));
        }

        let mut params: Vec<Option<TransformParams>> = vec![None; n];
        for (entry, &index) in self.param_indices.iter().enumerate() {
            let Some(slot) = params.get_mut(index as usize) else {
                return Err(Error::Snapshot(format!("param entry for missing tile {}", index)));
            };
            let values = &self.param_values[entry * stride..(entry + 1) * stride];
            *slot = Some(if stride == LEGACY_PARAM_STRIDE {
                TransformParams {
                    spin: values[0],
                    tilt: values[1],
                    diagonal_scale: values[2],
                    ..Default::default()
                }
            } else {
                TransformParams::from_array([values[0], values[1], values[2], values[3], values[4]])
            });
        }

        let mut records = Vec::with_capacity(n);
        for (i, &flags) in self.flags.iter().enumerate() {
            let Some(fields) = unpack_flags(flags, version) else {
                log::warn!("Skipping snapshot tile {} with invalid flags {:#x}", i, flags);
                continue;
            };
            let p = &self.positions[i * 3..i * 3 + 3];
            let uv = &self.uv_rects[i * 4..i * 4 + 4];

            let mut record = TileRecord::new(Vec3::new(p[0], p[1], p[2]), fields.orientation)
                .with_rotation(fields.rotation)
                .with_flip(fields.flipped)
                .with_shape(fields.shape)
                .with_texture_mode(fields.texture_mode)
                .with_terrain(fields.terrain)
                .with_uv(UvRect::new(uv[0], uv[1], uv[2], uv[3]));
            if let Some(p) = params[i] {
                record = record.with_params(p);
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Serialize to JSON for embedding in a scene file
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TileRecord> {
        vec![
            TileRecord::new(Vec3::new(1.0, 0.0, 2.5), Orientation::Floor)
                .with_uv(UvRect::new(0.0, 32.0, 32.0, 32.0)),
            TileRecord::new(Vec3::new(-3.0, 4.5, 0.0), Orientation::WallWestTiltNegY)
                .with_rotation(3)
                .with_flip(true)
                .with_shape(MeshShape::Prism)
                .with_texture_mode(TextureMode::Repeat)
                .with_terrain(Some(255))
                .with_params(TransformParams {
                    spin: 0.25,
                    depth_scale: 2.0,
                    ..Default::default()
                }),
            TileRecord::new(Vec3::ZERO, Orientation::Ceiling).with_terrain(Some(0)),
        ]
    }

    #[test]
    fn test_records_survive_snapshot() {
        let records = sample();
        let snapshot = TileSnapshot::from_records(&records);

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.param_indices, vec![1]);
        assert_eq!(snapshot.param_values.len(), 5);
        assert_eq!(snapshot.records().unwrap(), records);
    }

    #[test]
    fn test_flag_bits() {
        let record = TileRecord::new(Vec3::ZERO, Orientation::WallEast)
            .with_rotation(2)
            .with_flip(true)
            .with_shape(MeshShape::Box)
            .with_texture_mode(TextureMode::Repeat)
            .with_terrain(Some(4));
        let flags = pack_flags(&record);

        assert_eq!(flags & 0x1f, 4);
        assert_eq!((flags >> 5) & 3, 2);
        assert_ne!(flags & (1 << 7), 0);
        assert_eq!((flags >> 8) & 3, 2);
        assert_ne!(flags & (1 << 10), 0);
        assert_eq!((flags >> 11) & 0x1ff, 5);
    }

    #[test]
    fn test_every_terrain_id_packs() {
        for id in [0u8, 127, 254, 255] {
            let record = TileRecord::new(Vec3::ZERO, Orientation::Floor).with_terrain(Some(id));
            let fields = unpack_flags(pack_flags(&record), SNAPSHOT_VERSION).unwrap();
            assert_eq!(fields.terrain, Some(id));
        }
        let manual = TileRecord::new(Vec3::ZERO, Orientation::Floor);
        assert_eq!(unpack_flags(pack_flags(&manual), SNAPSHOT_VERSION).unwrap().terrain, None);

        // Terrain field value past 256 cannot come from any u8 id
        assert!(unpack_flags(300 << 11, SNAPSHOT_VERSION).is_none());
    }

    #[test]
    fn test_legacy_snapshot_migrates() {
        // Legacy triangle on a wall with spin/tilt/diagonal params
        let legacy = TileSnapshot {
            version: LEGACY_VERSION,
            positions: vec![1.0, 2.0, 3.0, 0.0, 0.0, 0.0],
            uv_rects: vec![0.0, 0.0, 16.0, 16.0, 16.0, 0.0, 16.0, 16.0],
            flags: vec![2 | (1 << 5) | (1 << 8), 0],
            param_indices: vec![0],
            param_values: vec![0.5, 0.25, 1.5],
        };
        let records = legacy.records().unwrap();

        assert_eq!(records[0].orientation, Orientation::WallNorth);
        assert_eq!(records[0].rotation, 1);
        assert_eq!(records[0].shape, MeshShape::FlatTriangle);
        assert_eq!(records[0].texture_mode, TextureMode::Stretch);
        let params = records[0].params.unwrap();
        assert_eq!((params.spin, params.tilt, params.diagonal_scale), (0.5, 0.25, 1.5));
        assert_eq!(params.depth_scale, 1.0);
        assert_eq!(records[1].shape, MeshShape::FlatQuad);

        let migrated = legacy.migrate().unwrap();
        assert_eq!(migrated.version, SNAPSHOT_VERSION);
        assert_eq!(migrated.param_values.len(), 5);
        assert_eq!(migrated.records().unwrap(), records);
    }

    #[test]
    fn test_version_inferred_from_stride() {
        let mut unversioned = TileSnapshot {
            version: 0,
            positions: vec![0.0; 3],
            uv_rects: vec![0.0; 4],
            flags: vec![0],
            param_indices: vec![0],
            param_values: vec![0.1, 0.0, 1.0],
        };
        assert_eq!(unversioned.effective_version().unwrap(), LEGACY_VERSION);

        unversioned.param_values = vec![0.1, 0.0, 1.0, 0.0, 1.0];
        assert_eq!(unversioned.effective_version().unwrap(), SNAPSHOT_VERSION);

        unversioned.param_indices.clear();
        unversioned.param_values.clear();
        assert_eq!(unversioned.effective_version().unwrap(), SNAPSHOT_VERSION);
    }

    #[test]
    fn test_malformed_columns() {
        let mut snapshot = TileSnapshot::from_records(&sample());
        snapshot.positions.pop();
        assert!(matches!(snapshot.records(), Err(Error::Snapshot(_))));

        let mut snapshot = TileSnapshot::from_records(&sample());
        snapshot.param_indices = vec![9];
        assert!(matches!(snapshot.records(), Err(Error::Snapshot(_))));

        let snapshot = TileSnapshot {
            version: 7,
            ..Default::default()
        };
        assert!(snapshot.records().is_err());
    }

    #[test]
    fn test_invalid_orientation_skipped() {
        let mut snapshot = TileSnapshot::from_records(&sample());
        snapshot.flags[0] = 31;
        assert_eq!(snapshot.records().unwrap().len(), 2);
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = TileSnapshot::from_records(&sample());
        let json = snapshot.to_json().unwrap();
        assert_eq!(TileSnapshot::from_json(&json).unwrap(), snapshot);

        let legacy_json = r#"{"positions":[0,0,0],"uv_rects":[0,0,8,8],"flags":[256]}"#;
        let parsed = TileSnapshot::from_json(legacy_json).unwrap();
        assert_eq!(parsed.version, 0);
        assert_eq!(parsed.records().unwrap()[0].shape, MeshShape::FlatTriangle);
    }
}
