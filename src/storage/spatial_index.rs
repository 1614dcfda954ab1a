//! Bucket grid from coarse cells to tile keys, for area queries.
//!
//! Queries return a superset of matching tiles; callers re-check exact
//! bounds against the placement map. The index is derived data and can be
//! rebuilt from the placement map at any time.

use std::collections::{HashMap, HashSet};

use glam::{I64Vec3, IVec3, Vec3};

use crate::tile::{TileKey, MAX_COORD};

/// Query boxes are clipped to this magnitude; no stored tile lies beyond it
const QUERY_LIMIT: f32 = MAX_COORD + 1.0;

/// Spatial bucket index over tile positions
#[derive(Debug)]
pub struct SpatialIndex {
    /// Bucket edge length in grid units
    bucket_size: f32,
    /// Cell -> keys whose position falls in it
    buckets: HashMap<IVec3, HashSet<TileKey>>,
    /// Key -> cell, so removal does not need the position
    cells: HashMap<TileKey, IVec3>,
}

impl SpatialIndex {
    /// Create an empty index
    pub fn new(bucket_size: f32) -> Self {
        Self {
            bucket_size,
            buckets: HashMap::new(),
            cells: HashMap::new(),
        }
    }

    /// Bucket edge length
    pub fn bucket_size(&self) -> f32 {
        self.bucket_size
    }

    fn cell_of(&self, position: Vec3) -> IVec3 {
        (position / self.bucket_size).floor().as_ivec3()
    }

    /// Index a key at a position, moving it if it was already indexed
    pub fn add(&mut self, key: TileKey, position: Vec3) {
        let cell = self.cell_of(position);
        if let Some(old) = self.cells.insert(key, cell) {
            if old == cell {
                return;
            }
            self.detach(key, old);
        }
        self.buckets.entry(cell).or_default().insert(key);
    }

    /// Drop a key from the index
    pub fn remove(&mut self, key: TileKey) -> bool {
        match self.cells.remove(&key) {
            Some(cell) => {
                self.detach(key, cell);
                true
            }
            None => false,
        }
    }

    fn detach(&mut self, key: TileKey, cell: IVec3) {
        if let Some(bucket) = self.buckets.get_mut(&cell) {
            bucket.remove(&key);
            if bucket.is_empty() {
                self.buckets.remove(&cell);
            }
        }
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.cells.clear();
    }

    /// Whether a key is indexed
    pub fn contains(&self, key: TileKey) -> bool {
        self.cells.contains_key(&key)
    }

    /// Cell a key is filed under
    pub fn cell(&self, key: TileKey) -> Option<IVec3> {
        self.cells.get(&key).copied()
    }

    /// Every indexed key
    pub fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.cells.keys().copied()
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the index holds no keys
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of non-empty buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Keys that may lie inside the box (superset; re-check exact bounds)
    pub fn query(&self, min: Vec3, max: Vec3) -> Box<dyn Iterator<Item = TileKey> + '_> {
        let limit = Vec3::splat(QUERY_LIMIT);
        let lo = self.cell_of(min.min(max).clamp(-limit, limit));
        let hi = self.cell_of(min.max(max).clamp(-limit, limit));
        let span = hi.as_i64vec3() - lo.as_i64vec3() + I64Vec3::ONE;
        let volume = span.x.saturating_mul(span.y).saturating_mul(span.z);

        if volume > self.buckets.len() as i64 {
            // Large selections: walk the occupied buckets instead of the cell range
            Box::new(
                self.buckets
                    .iter()
                    .filter(move |(cell, _)| cell.cmpge(lo).all() && cell.cmple(hi).all())
                    .flat_map(|(_, keys)| keys.iter().copied()),
            )
        } else {
            Box::new(
                (lo.x..=hi.x)
                    .flat_map(move |x| {
                        (lo.y..=hi.y).flat_map(move |y| (lo.z..=hi.z).map(move |z| IVec3::new(x, y, z)))
                    })
                    .filter_map(|cell| self.buckets.get(&cell))
                    .flat_map(|keys| keys.iter().copied()),
            )
        }
    }

    /// Rebuild from an authoritative (key, position) listing
    pub fn rebuild<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (TileKey, Vec3)>,
    {
        self.clear();
        for (key, position) in entries {
            self.add(key, position);
        }
    }

    /// Compare against the placement map size; divergence is only a warning
    pub fn check_size(&self, expected: usize) -> bool {
        if self.len() != expected {
            log::warn!(
                "Spatial index holds {} keys but placement map holds {}",
                self.len(),
                expected
            );
            return false;
        }
        true
    }
}
