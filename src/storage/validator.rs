//! Cross-checks the redundant tile indices and heals them.
//!
//! The placement map is authoritative. Batch maps are repaired from
//! whichever side is intact, slot references are rebuilt from the batches,
//! missing instances are re-created from placement records, orphan
//! instances are dropped, and the spatial index is rebuilt on divergence.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::{Error, Result};
use crate::tile::{InstanceData, TileKey, TileRecord};
use super::batch::BatchHandle;
use super::registry::ChunkRegistry;
use super::spatial_index::SpatialIndex;

/// One detected inconsistency
#[derive(Clone, Debug, PartialEq)]
pub enum IntegrityIssue {
    /// Placed tile has no render slot
    MissingSlot(TileKey),
    /// Slot reference disagrees with the batch it names
    StaleSlot(TileKey),
    /// Slot for a tile that is not placed
    OrphanSlot(TileKey),
    /// Batch forward/reverse maps are not a bijection
    BatchMaps { handle: BatchHandle, detail: String },
    /// Instance for a tile that is not placed
    OrphanInstance { handle: BatchHandle, key: TileKey },
    /// Placed tile missing from the spatial index
    SpatialMissing(TileKey),
    /// Spatial index entry for a tile that is not placed
    SpatialExtra(TileKey),
    /// Record does not encode to the key it is stored under, and the key
    /// is not pinned
    KeyMismatch(TileKey),
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSlot(k) => write!(f, "{} has no render slot", k),
            Self::StaleSlot(k) => write!(f, "{} slot reference is stale", k),
            Self::OrphanSlot(k) => write!(f, "{} has a slot but is not placed", k),
            Self::BatchMaps { handle, detail } => write!(f, "{}: {}", handle, detail),
            Self::OrphanInstance { handle, key } => write!(f, "{} holds unplaced {}", handle, key),
            Self::SpatialMissing(k) => write!(f, "{} missing from spatial index", k),
            Self::SpatialExtra(k) => write!(f, "{} indexed spatially but not placed", k),
            Self::KeyMismatch(k) => write!(f, "record stored under {} encodes differently", k),
        }
    }
}

/// Outcome of a check or repair
#[derive(Clone, Debug, Default)]
pub struct IntegrityReport {
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    /// True when no issue was found
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validator over the placement map, registry and spatial index
pub struct IntegrityValidator;

impl IntegrityValidator {
    /// Report every inconsistency without touching anything.
    ///
    /// `pinned` keys may hold a record positioned elsewhere; such records
    /// only need to stay in range.
    pub fn check(
        tiles: &HashMap<TileKey, TileRecord>,
        pinned: &HashSet<TileKey>,
        registry: &ChunkRegistry,
        spatial: &SpatialIndex,
    ) -> IntegrityReport {
        let mut issues = Vec::new();

        for batch in registry.batches() {
            for detail in batch.check_bijective() {
                issues.push(IntegrityIssue::BatchMaps {
                    handle: batch.handle(),
                    detail,
                });
            }
            for key in batch.keys() {
                if !tiles.contains_key(&key) {
                    issues.push(IntegrityIssue::OrphanInstance {
                        handle: batch.handle(),
                        key,
                    });
                }
            }
        }

        for (key, record) in tiles {
            let keyed = match TileKey::encode(record.position, record.orientation) {
                Ok(own) => own == *key || pinned.contains(key),
                Err(_) => false,
            };
            if !keyed {
                issues.push(IntegrityIssue::KeyMismatch(*key));
            }
            match registry.slot(*key) {
                None => issues.push(IntegrityIssue::MissingSlot(*key)),
                Some(slot) => {
                    let live = registry
                        .batch(slot.batch)
                        .is_some_and(|b| b.index_of(*key) == Some(slot.instance) && b.key_at(slot.instance) == Some(*key));
                    if !live {
                        issues.push(IntegrityIssue::StaleSlot(*key));
                    }
                }
            }
            if !spatial.contains(*key) {
                issues.push(IntegrityIssue::SpatialMissing(*key));
            }
        }

        for (key, _) in registry.slots() {
            if !tiles.contains_key(&key) {
                issues.push(IntegrityIssue::OrphanSlot(key));
            }
        }
        issues.extend(
            spatial
                .keys()
                .filter(|k| !tiles.contains_key(k))
                .map(IntegrityIssue::SpatialExtra),
        );

        IntegrityReport { issues }
    }

    /// Heal every index from the placement map.
    ///
    /// Returns the issues found before repair. Fails only when a placement
    /// record cannot be re-keyed, which leaves nothing to rebuild from.
    pub fn repair<F>(
        tiles: &mut HashMap<TileKey, TileRecord>,
        pinned: &HashSet<TileKey>,
        registry: &mut ChunkRegistry,
        spatial: &mut SpatialIndex,
        build_instance: F,
    ) -> Result<IntegrityReport>
    where
        F: Fn(&TileRecord) -> InstanceData,
    {
        let report = Self::check(tiles, pinned, registry, spatial);
        if report.is_clean() {
            return Ok(report);
        }
        for issue in &report.issues {
            log::warn!("Integrity: {}", issue);
        }

        // Records under the wrong key are re-keyed from their own fields
        let mismatched: Vec<TileKey> = report
            .issues
            .iter()
            .filter_map(|i| match i {
                IntegrityIssue::KeyMismatch(k) => Some(*k),
                _ => None,
            })
            .collect();
        for key in mismatched {
            if let Some(record) = tiles.remove(&key) {
                let rekeyed = TileKey::encode(record.position, record.orientation).map_err(|e| {
                    Error::Integrity(format!("record under {} cannot be re-keyed: {}", key, e))
                })?;
                tiles.insert(rekeyed, record);
            }
        }

        // Batch maps: repair from the intact side, or drop the batch contents
        // and let placement records repopulate it
        for batch in registry.batches_mut() {
            if !batch.repair_maps() {
                log::warn!("{} maps unrecoverable, rebuilding from placement map", batch.handle());
                batch.clear();
            }
        }
        registry.rebuild_slots();

        let orphans: Vec<TileKey> = registry
            .slots()
            .map(|(k, _)| k)
            .filter(|k| !tiles.contains_key(k))
            .collect();
        for key in orphans {
            registry.remove(key);
        }

        let mut missing: Vec<TileKey> = tiles.keys().filter(|k| registry.slot(**k).is_none()).copied().collect();
        missing.sort();
        for key in missing {
            if let Some(record) = tiles.get(&key) {
                registry.insert(key, record.shape, record.texture_mode, record.position, build_instance(record))?;
            }
        }

        // Instances whose transform no longer matches their record
        for (key, record) in tiles.iter() {
            let expected = build_instance(record);
            let current = registry
                .slot(*key)
                .and_then(|s| registry.batch(s.batch))
                .and_then(|b| b.instance(*key).copied());
            if current != Some(expected) {
                registry.update_instance(*key, expected);
            }
        }

        if spatial.len() != tiles.len() || tiles.keys().any(|k| !spatial.contains(*k)) {
            log::warn!("Rebuilding spatial index ({} entries, {} tiles)", spatial.len(), tiles.len());
            spatial.rebuild(tiles.iter().map(|(k, r)| (*k, r.position)));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};
    use crate::tile::{Orientation, transform::instance_data};

    struct Parts {
        tiles: HashMap<TileKey, TileRecord>,
        pinned: HashSet<TileKey>,
        registry: ChunkRegistry,
        spatial: SpatialIndex,
    }

    fn build(record: &TileRecord) -> InstanceData {
        instance_data(record, 1.0, Vec2::splat(256.0))
    }

    fn parts(n: i32) -> Parts {
        let mut p = Parts {
            tiles: HashMap::new(),
            pinned: HashSet::new(),
            registry: ChunkRegistry::new(4, 50.0),
            spatial: SpatialIndex::new(10.0),
        };
        for i in 0..n {
            let record = TileRecord::new(Vec3::new(i as f32, 0.0, 0.0), Orientation::Floor);
            let key = TileKey::encode(record.position, record.orientation).unwrap();
            p.registry
                .insert(key, record.shape, record.texture_mode, record.position, build(&record))
                .unwrap();
            p.spatial.add(key, record.position);
            p.tiles.insert(key, record);
        }
        p
    }

    fn key(i: i32) -> TileKey {
        TileKey::encode(Vec3::new(i as f32, 0.0, 0.0), Orientation::Floor).unwrap()
    }

    fn check(p: &Parts) -> IntegrityReport {
        IntegrityValidator::check(&p.tiles, &p.pinned, &p.registry, &p.spatial)
    }

    fn repair(p: &mut Parts) -> IntegrityReport {
        IntegrityValidator::repair(&mut p.tiles, &p.pinned, &mut p.registry, &mut p.spatial, build).unwrap()
    }

    #[test]
    fn test_clean_state() {
        let p = parts(6);
        assert!(check(&p).is_clean());
    }

    #[test]
    fn test_detects_and_repairs_reverse_map_damage() {
        let mut p = parts(3);
        let slot = p.registry.slot(key(1)).unwrap();
        let handle = p.registry.batch(slot.batch).unwrap().handle();
        for b in p.registry.batches_mut() {
            if b.handle() == handle {
                b.corrupt_forget_reverse(slot.instance);
            }
        }

        let report = check(&p);
        assert!(report.issues.iter().any(|i| matches!(i, IntegrityIssue::BatchMaps { .. })));
        repair(&mut p);
        assert!(check(&p).is_clean());
    }

    #[test]
    fn test_repairs_missing_slot() {
        let mut p = parts(3);
        p.registry.corrupt_slot(key(2), None);
        assert!(check(&p).issues.contains(&IntegrityIssue::MissingSlot(key(2))));
        repair(&mut p);
        assert!(check(&p).is_clean());
        assert_eq!(p.registry.len(), 3);
    }

    #[test]
    fn test_drops_orphan_instance() {
        let mut p = parts(3);
        p.tiles.remove(&key(0));
        let report = check(&p);
        assert!(report.issues.contains(&IntegrityIssue::OrphanSlot(key(0))));
        assert!(report.issues.contains(&IntegrityIssue::SpatialExtra(key(0))));

        repair(&mut p);
        assert!(check(&p).is_clean());
        assert_eq!(p.registry.stats().instance_count, 2);
        assert_eq!(p.spatial.len(), 2);
    }

    #[test]
    fn test_rebuilds_spatial_index() {
        let mut p = parts(5);
        p.spatial.clear();
        assert_eq!(check(&p).len(), 5);
        repair(&mut p);
        assert_eq!(p.spatial.len(), 5);
        assert!(check(&p).is_clean());
    }

    #[test]
    fn test_both_batch_maps_damaged_rebuilds_from_placement() {
        let mut p = parts(3);
        let slot = p.registry.slot(key(1)).unwrap();
        for b in p.registry.batches_mut() {
            b.corrupt_forget_forward(key(1));
            b.corrupt_forget_reverse(slot.instance);
        }
        repair(&mut p);
        assert!(check(&p).is_clean());
        assert_eq!(p.registry.stats().instance_count, 3);
    }

    #[test]
    fn test_rekeys_mismatched_record() {
        let mut p = parts(2);
        let record = p.tiles.remove(&key(1)).unwrap();
        p.tiles.insert(key(5), record);
        assert!(check(&p).issues.contains(&IntegrityIssue::KeyMismatch(key(5))));
        repair(&mut p);
        assert!(p.tiles.contains_key(&key(1)));
        assert!(check(&p).is_clean());
    }

    #[test]
    fn test_pinned_key_may_hold_moved_record() {
        let mut p = parts(2);
        let record = p.tiles.remove(&key(1)).unwrap();
        p.tiles.insert(key(5), record);
        p.pinned.insert(key(5));
        let report = check(&p);
        assert!(!report.issues.contains(&IntegrityIssue::KeyMismatch(key(5))));

        repair(&mut p);
        assert!(p.tiles.contains_key(&key(5)));
        assert!(!p.tiles.contains_key(&key(1)));
        assert!(check(&p).is_clean());
    }
}
