//! Fixed-capacity instance batch ("chunk").
//!
//! A batch holds the render instances of one (mesh shape, texture mode,
//! region) combination. Slots `[0, visible_count)` are drawn and always
//! occupied; removal swaps the last visible instance into the freed slot so
//! the buffer never has gaps.

use std::collections::HashMap;
use std::fmt;

use crate::tile::{InstanceData, MeshShape, TextureMode, TileKey};
use super::region::RegionCoord;

/// Stable identity of a batch for the renderer.
///
/// Unlike region-local indices, a handle never changes while the batch lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchHandle(pub u64);

impl fmt::Display for BatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch#{}", self.0)
    }
}

/// Result of a swap-and-pop removal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Removal {
    /// Slot the removed tile occupied
    pub freed: u32,
    /// Tile that was moved into `freed`, if any; its slot reference is stale
    pub moved: Option<TileKey>,
}

/// Dense instance buffer with forward and reverse key maps
pub struct InstanceBatch {
    handle: BatchHandle,
    shape: MeshShape,
    texture_mode: TextureMode,
    region: RegionCoord,
    /// Preallocated to capacity; slots past `visible_count` are zeroed
    instances: Vec<InstanceData>,
    visible_count: usize,
    key_to_index: HashMap<TileKey, u32>,
    index_to_key: Vec<Option<TileKey>>,
    /// Needs a render sync at the next flush
    dirty: bool,
}

impl fmt::Debug for InstanceBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceBatch")
            .field("handle", &self.handle)
            .field("shape", &self.shape)
            .field("texture_mode", &self.texture_mode)
            .field("region", &self.region)
            .field("visible_count", &self.visible_count)
            .field("capacity", &self.capacity())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl InstanceBatch {
    /// Create an empty batch
    pub fn new(
        handle: BatchHandle,
        shape: MeshShape,
        texture_mode: TextureMode,
        region: RegionCoord,
        capacity: usize,
    ) -> Self {
        Self {
            handle,
            shape,
            texture_mode,
            region,
            instances: vec![InstanceData::default(); capacity],
            visible_count: 0,
            key_to_index: HashMap::with_capacity(capacity),
            index_to_key: vec![None; capacity],
            dirty: false,
        }
    }

    pub fn handle(&self) -> BatchHandle {
        self.handle
    }

    pub fn shape(&self) -> MeshShape {
        self.shape
    }

    pub fn texture_mode(&self) -> TextureMode {
        self.texture_mode
    }

    pub fn region(&self) -> RegionCoord {
        self.region
    }

    /// Maximum number of instances
    pub fn capacity(&self) -> usize {
        self.instances.len()
    }

    /// Number of drawn instances
    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    /// Check if the batch draws nothing (reclaimable)
    pub fn is_empty(&self) -> bool {
        self.visible_count == 0
    }

    /// Whether another instance fits
    pub fn has_space(&self) -> bool {
        self.visible_count < self.capacity()
    }

    /// Slot of a tile
    pub fn index_of(&self, key: TileKey) -> Option<u32> {
        self.key_to_index.get(&key).copied()
    }

    /// Tile in a slot
    pub fn key_at(&self, index: u32) -> Option<TileKey> {
        self.index_to_key.get(index as usize).copied().flatten()
    }

    /// Check if a tile lives in this batch
    pub fn contains(&self, key: TileKey) -> bool {
        self.key_to_index.contains_key(&key)
    }

    /// Instance data of a tile
    pub fn instance(&self, key: TileKey) -> Option<&InstanceData> {
        self.index_of(key).map(|i| &self.instances[i as usize])
    }

    /// Drawn instances
    pub fn instances(&self) -> &[InstanceData] {
        &self.instances[..self.visible_count]
    }

    /// Drawn instances as bytes for upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.instances())
    }

    /// Keys in slot order
    pub fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.index_to_key[..self.visible_count].iter().filter_map(|k| *k)
    }

    /// Number of entries in the forward map
    pub fn mapped_count(&self) -> usize {
        self.key_to_index.len()
    }

    /// Append an instance, returning its slot.
    ///
    /// Returns `None` when full. A key already present is updated in place.
    pub fn add(&mut self, key: TileKey, data: InstanceData) -> Option<u32> {
        if let Some(index) = self.index_of(key) {
            self.instances[index as usize] = data;
            self.dirty = true;
            return Some(index);
        }
        if !self.has_space() {
            return None;
        }

        let index = self.visible_count as u32;
        self.instances[self.visible_count] = data;
        self.index_to_key[self.visible_count] = Some(key);
        self.key_to_index.insert(key, index);
        self.visible_count += 1;
        self.dirty = true;
        Some(index)
    }

    /// Remove a tile by swap-and-pop
    pub fn remove(&mut self, key: TileKey) -> Option<Removal> {
        let freed = self.key_to_index.remove(&key)?;
        let last = self.visible_count.checked_sub(1)?;
        let freed_slot = freed as usize;
        if freed_slot > last {
            log::warn!("{}: {} mapped past visible_count at slot {}", self.handle, key, freed);
            return None;
        }

        let moved = if freed_slot != last {
            self.instances[freed_slot] = self.instances[last];
            let moved = self.index_to_key[last].take();
            self.index_to_key[freed_slot] = moved;
            if let Some(moved_key) = moved {
                self.key_to_index.insert(moved_key, freed);
            }
            moved
        } else {
            self.index_to_key[freed_slot] = None;
            None
        };

        self.instances[last] = InstanceData::default();
        self.visible_count = last;
        self.dirty = true;
        Some(Removal { freed, moved })
    }

    /// Replace the whole instance of a tile in place
    pub fn update_instance(&mut self, key: TileKey, data: InstanceData) -> bool {
        match self.index_of(key) {
            Some(index) => {
                self.instances[index as usize] = data;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Replace only the custom data (atlas rect) of a tile
    pub fn update_custom(&mut self, key: TileKey, custom: [f32; 4]) -> bool {
        match self.index_of(key) {
            Some(index) => {
                self.instances[index as usize].custom = custom;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Check if a render sync is pending
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flag for a render sync
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clear and return the dirty flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Describe every way the forward and reverse maps disagree
    pub fn check_bijective(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.key_to_index.len() != self.visible_count {
            issues.push(format!(
                "{}: forward map has {} entries, visible_count is {}",
                self.handle,
                self.key_to_index.len(),
                self.visible_count
            ));
        }
        for (i, slot) in self.index_to_key.iter().enumerate() {
            match (i < self.visible_count, slot) {
                (true, None) => issues.push(format!("{}: gap at slot {}", self.handle, i)),
                (true, Some(key)) => {
                    if self.key_to_index.get(key) != Some(&(i as u32)) {
                        issues.push(format!("{}: slot {} names {} but forward map disagrees", self.handle, i, key));
                    }
                }
                (false, Some(key)) => {
                    issues.push(format!("{}: hidden slot {} still names {}", self.handle, i, key));
                }
                (false, None) => {}
            }
        }
        for (key, &index) in &self.key_to_index {
            if index as usize >= self.visible_count {
                issues.push(format!("{}: {} points past visible_count at slot {}", self.handle, key, index));
            } else if self.index_to_key[index as usize] != Some(*key) {
                issues.push(format!("{}: {} -> slot {} not mirrored in reverse map", self.handle, key, index));
            }
        }
        issues
    }

    /// Whether the forward map alone describes a dense, duplicate-free layout
    fn forward_is_dense(&self) -> bool {
        let mut seen = vec![false; self.visible_count];
        self.key_to_index.len() == self.visible_count
            && self.key_to_index.values().all(|&i| {
                let i = i as usize;
                i < self.visible_count && !std::mem::replace(&mut seen[i], true)
            })
    }

    /// Whether the reverse map alone describes a dense layout
    fn reverse_is_dense(&self) -> bool {
        self.index_to_key[..self.visible_count].iter().all(Option::is_some)
            && self.index_to_key[self.visible_count..].iter().all(Option::is_none)
    }

    /// Rebuild the reverse map from the forward map
    pub fn rebuild_reverse(&mut self) -> bool {
        if !self.forward_is_dense() {
            return false;
        }
        self.index_to_key.iter_mut().for_each(|k| *k = None);
        for (key, &index) in &self.key_to_index {
            self.index_to_key[index as usize] = Some(*key);
        }
        self.dirty = true;
        true
    }

    /// Rebuild the forward map from the reverse map
    pub fn rebuild_forward(&mut self) -> bool {
        if !self.reverse_is_dense() {
            return false;
        }
        let forward: HashMap<TileKey, u32> = self.index_to_key[..self.visible_count]
            .iter()
            .enumerate()
            .filter_map(|(i, k)| k.map(|k| (k, i as u32)))
            .collect();
        // Duplicate keys in the reverse map collapse here
        if forward.len() != self.visible_count {
            return false;
        }
        self.key_to_index = forward;
        self.dirty = true;
        true
    }

    /// Repair whichever map is damaged from the intact one.
    ///
    /// Returns false when neither side is dense enough to rebuild from.
    pub fn repair_maps(&mut self) -> bool {
        self.check_bijective().is_empty() || self.rebuild_reverse() || self.rebuild_forward()
    }

    /// Drop every instance
    pub fn clear(&mut self) {
        self.instances.iter_mut().for_each(|d| *d = InstanceData::default());
        self.index_to_key.iter_mut().for_each(|k| *k = None);
        self.key_to_index.clear();
        self.visible_count = 0;
        self.dirty = true;
    }

    #[cfg(test)]
    pub(crate) fn corrupt_forget_reverse(&mut self, index: u32) {
        self.index_to_key[index as usize] = None;
    }

    #[cfg(test)]
    pub(crate) fn corrupt_forget_forward(&mut self, key: TileKey) {
        self.key_to_index.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use crate::tile::Orientation;

    fn key(i: i32) -> TileKey {
        TileKey::encode(Vec3::new(i as f32, 0.0, 0.0), Orientation::Floor).unwrap()
    }

    fn data(tag: f32) -> InstanceData {
        InstanceData { custom: [tag, 0.0, 0.0, 0.0], ..Default::default() }
    }

    fn batch(capacity: usize) -> InstanceBatch {
        InstanceBatch::new(BatchHandle(1), MeshShape::FlatQuad, TextureMode::Stretch, RegionCoord::default(), capacity)
    }

    fn assert_dense(batch: &InstanceBatch) {
        assert!(batch.check_bijective().is_empty(), "{:?}", batch.check_bijective());
        for i in 0..batch.visible_count() as u32 {
            let k = batch.key_at(i).expect("gap below visible_count");
            assert_eq!(batch.index_of(k), Some(i));
        }
    }

    #[test]
    fn test_add_until_full() {
        let mut b = batch(3);
        assert_eq!(b.add(key(0), data(0.0)), Some(0));
        assert_eq!(b.add(key(1), data(1.0)), Some(1));
        assert_eq!(b.add(key(2), data(2.0)), Some(2));
        assert!(!b.has_space());
        assert_eq!(b.add(key(3), data(3.0)), None);
        assert_eq!(b.visible_count(), 3);
        assert!(b.is_dirty());
    }

    #[test]
    fn test_add_existing_key_updates_in_place() {
        let mut b = batch(4);
        b.add(key(0), data(0.0));
        assert_eq!(b.add(key(0), data(9.0)), Some(0));
        assert_eq!(b.visible_count(), 1);
        assert_eq!(b.instance(key(0)).unwrap().custom[0], 9.0);
    }

    #[test]
    fn test_swap_and_pop_moves_last() {
        let mut b = batch(4);
        for i in 0..4 {
            b.add(key(i), data(i as f32));
        }

        let removal = b.remove(key(1)).unwrap();
        assert_eq!(removal, Removal { freed: 1, moved: Some(key(3)) });
        assert_eq!(b.visible_count(), 3);
        assert_eq!(b.index_of(key(3)), Some(1));
        assert_eq!(b.instances()[1].custom[0], 3.0);
        assert_dense(&b);
    }

    #[test]
    fn test_remove_last_moves_nothing() {
        let mut b = batch(4);
        b.add(key(0), data(0.0));
        b.add(key(1), data(1.0));
        let removal = b.remove(key(1)).unwrap();
        assert_eq!(removal, Removal { freed: 1, moved: None });
        assert_dense(&b);
        assert!(b.remove(key(1)).is_none());
    }

    #[test]
    fn test_remove_to_empty() {
        let mut b = batch(2);
        b.add(key(0), data(0.0));
        b.take_dirty();
        b.remove(key(0));
        assert!(b.is_empty());
        assert!(b.is_dirty());
        assert!(b.instances().is_empty());
    }

    #[test]
    fn test_no_gaps_after_mixed_sequence() {
        let mut b = batch(64);
        let mut live: Vec<i32> = Vec::new();
        // Deterministic pseudo-random add/remove pattern
        let mut state = 7u32;
        for step in 0..500 {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            let remove = (state >> 16) % 3 == 0 && !live.is_empty();
            if remove {
                let victim = live.swap_remove(((state >> 8) as usize) % live.len());
                assert!(b.remove(key(victim)).is_some());
            } else if b.has_space() {
                let k = step;
                if b.add(key(k), data(k as f32)).is_some() {
                    live.push(k);
                }
            }
            assert_eq!(b.visible_count(), live.len());
        }
        assert_dense(&b);
        for k in live {
            let index = b.index_of(key(k)).unwrap();
            assert_eq!(b.instances()[index as usize].custom[0], k as f32);
        }
    }

    #[test]
    fn test_update_custom() {
        let mut b = batch(2);
        b.add(key(0), data(0.0));
        assert!(b.update_custom(key(0), [0.5, 0.5, 0.25, 0.25]));
        assert_eq!(b.instance(key(0)).unwrap().custom, [0.5, 0.5, 0.25, 0.25]);
        assert!(!b.update_custom(key(5), [0.0; 4]));
    }

    #[test]
    fn test_as_bytes_covers_visible_only() {
        let mut b = batch(8);
        b.add(key(0), data(0.0));
        b.add(key(1), data(1.0));
        assert_eq!(b.as_bytes().len(), 2 * std::mem::size_of::<InstanceData>());
    }

    #[test]
    fn test_repair_reverse_from_forward() {
        let mut b = batch(4);
        for i in 0..3 {
            b.add(key(i), data(i as f32));
        }
        b.corrupt_forget_reverse(1);
        assert!(!b.check_bijective().is_empty());
        assert!(b.repair_maps());
        assert_dense(&b);
    }

    #[test]
    fn test_repair_forward_from_reverse() {
        let mut b = batch(4);
        for i in 0..3 {
            b.add(key(i), data(i as f32));
        }
        b.corrupt_forget_forward(key(2));
        assert!(b.repair_maps());
        assert_eq!(b.index_of(key(2)), Some(2));
        assert_dense(&b);
    }

    #[test]
    fn test_repair_fails_when_both_sides_damaged() {
        let mut b = batch(4);
        for i in 0..3 {
            b.add(key(i), data(i as f32));
        }
        b.corrupt_forget_forward(key(1));
        b.corrupt_forget_reverse(1);
        assert!(!b.repair_maps());
    }
}
