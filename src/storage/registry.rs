//! Chunk registry: finds or creates batches per (shape, texture mode,
//! region) group and owns the tile key -> instance slot map.

use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::core::{Error, Result};
use crate::math::Aabb;
use crate::tile::{InstanceData, MeshShape, TextureMode, TileKey};
use super::batch::{BatchHandle, InstanceBatch};
use super::region::RegionCoord;

/// Partition a batch belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchGroupKey {
    pub shape: MeshShape,
    pub texture_mode: TextureMode,
    pub region: RegionCoord,
}

/// Region-local address of a batch; changes on reindex
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchId {
    pub group: BatchGroupKey,
    pub local: u32,
}

/// Where a tile's render instance lives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotRef {
    pub batch: BatchId,
    pub instance: u32,
}

/// Registry counters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistryStats {
    pub batch_count: usize,
    pub instance_count: usize,
    pub pending_reclaim: usize,
    /// Instances per mesh shape, indexed by [`MeshShape::index`]
    pub per_shape: [usize; 4],
}

/// Owner of every instance batch
#[derive(Debug)]
pub struct ChunkRegistry {
    capacity: usize,
    region_size: f32,
    groups: HashMap<BatchGroupKey, Vec<InstanceBatch>>,
    slots: HashMap<TileKey, SlotRef>,
    /// Emptied batches awaiting the next flush
    pending_reclaim: HashSet<BatchHandle>,
    next_handle: u64,
    /// Set while a tile mutation is in flight
    busy: bool,
}

impl ChunkRegistry {
    /// Create an empty registry
    pub fn new(capacity: usize, region_size: f32) -> Self {
        Self {
            capacity: capacity.max(1),
            region_size,
            groups: HashMap::new(),
            slots: HashMap::new(),
            pending_reclaim: HashSet::new(),
            next_handle: 1,
            busy: false,
        }
    }

    /// Instances per batch
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn region_size(&self) -> f32 {
        self.region_size
    }

    /// Region containing a grid position
    pub fn region_of(&self, position: Vec3) -> RegionCoord {
        RegionCoord::from_grid_pos(position, self.region_size)
    }

    /// Find a batch with space in the group, or create one
    pub fn get_or_create(&mut self, shape: MeshShape, texture_mode: TextureMode, position: Vec3) -> BatchId {
        let group = BatchGroupKey {
            shape,
            texture_mode,
            region: self.region_of(position),
        };
        let batches = self.groups.entry(group).or_default();

        if let Some(local) = batches.iter().position(InstanceBatch::has_space) {
            return BatchId { group, local: local as u32 };
        }

        let handle = BatchHandle(self.next_handle);
        self.next_handle += 1;
        batches.push(InstanceBatch::new(handle, shape, texture_mode, group.region, self.capacity));
        log::debug!("Created {} for {:?} ({} in group)", handle, group, batches.len());

        BatchId {
            group,
            local: (batches.len() - 1) as u32,
        }
    }

    /// Batch at a region-local address
    pub fn batch(&self, id: BatchId) -> Option<&InstanceBatch> {
        self.groups.get(&id.group)?.get(id.local as usize)
    }

    fn batch_mut(&mut self, id: BatchId) -> Option<&mut InstanceBatch> {
        self.groups.get_mut(&id.group)?.get_mut(id.local as usize)
    }

    /// Batch by stable handle
    pub fn batch_by_handle(&self, handle: BatchHandle) -> Option<&InstanceBatch> {
        self.batches().find(|b| b.handle() == handle)
    }

    /// Store a tile's instance, moving it out of any previous slot
    pub fn insert(
        &mut self,
        key: TileKey,
        shape: MeshShape,
        texture_mode: TextureMode,
        position: Vec3,
        data: InstanceData,
    ) -> Result<SlotRef> {
        let was_busy = std::mem::replace(&mut self.busy, true);
        let result = self.insert_inner(key, shape, texture_mode, position, data);
        self.busy = was_busy;
        result
    }

    fn insert_inner(
        &mut self,
        key: TileKey,
        shape: MeshShape,
        texture_mode: TextureMode,
        position: Vec3,
        data: InstanceData,
    ) -> Result<SlotRef> {
        if self.slots.contains_key(&key) {
            self.remove_inner(key);
        }

        let id = self.get_or_create(shape, texture_mode, position);
        let batch = self
            .batch_mut(id)
            .ok_or_else(|| Error::Integrity(format!("batch {:?} vanished during insert", id)))?;
        let handle = batch.handle();
        let instance = batch
            .add(key, data)
            .ok_or_else(|| Error::Integrity(format!("{} reported space but rejected {}", handle, key)))?;
        self.pending_reclaim.remove(&handle);

        let slot = SlotRef { batch: id, instance };
        self.slots.insert(key, slot);
        Ok(slot)
    }

    /// Remove a tile's instance, fixing the slot of whichever tile was moved
    pub fn remove(&mut self, key: TileKey) -> Option<SlotRef> {
        let was_busy = std::mem::replace(&mut self.busy, true);
        let slot = self.remove_inner(key);
        self.busy = was_busy;
        slot
    }

    fn remove_inner(&mut self, key: TileKey) -> Option<SlotRef> {
        let slot = self.slots.remove(&key)?;

        let Some(batch) = self.batch_mut(slot.batch) else {
            log::warn!("{} referenced missing batch {:?}", key, slot.batch);
            return Some(slot);
        };
        let handle = batch.handle();
        let Some(removal) = batch.remove(key) else {
            log::warn!("{} not present in {} it was mapped to", key, handle);
            return Some(slot);
        };
        let emptied = batch.is_empty();

        if let Some(moved) = removal.moved {
            if let Some(moved_slot) = self.slots.get_mut(&moved) {
                moved_slot.instance = removal.freed;
            }
        }
        if emptied {
            self.pending_reclaim.insert(handle);
        }
        Some(slot)
    }

    /// Overwrite a tile's whole instance
    pub fn update_instance(&mut self, key: TileKey, data: InstanceData) -> bool {
        match self.slots.get(&key).copied() {
            Some(slot) => self.batch_mut(slot.batch).is_some_and(|b| b.update_instance(key, data)),
            None => false,
        }
    }

    /// Overwrite only a tile's custom data
    pub fn update_custom(&mut self, key: TileKey, custom: [f32; 4]) -> bool {
        match self.slots.get(&key).copied() {
            Some(slot) => self.batch_mut(slot.batch).is_some_and(|b| b.update_custom(key, custom)),
            None => false,
        }
    }

    /// Slot of a tile
    pub fn slot(&self, key: TileKey) -> Option<SlotRef> {
        self.slots.get(&key).copied()
    }

    /// Every mapped (key, slot) pair
    pub fn slots(&self) -> impl Iterator<Item = (TileKey, SlotRef)> + '_ {
        self.slots.iter().map(|(k, s)| (*k, *s))
    }

    /// Number of mapped tiles
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Check if a mutation is in flight
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub(crate) fn begin_mutation(&mut self) {
        self.busy = true;
    }

    pub(crate) fn end_mutation(&mut self) {
        self.busy = false;
    }

    /// Every batch
    pub fn batches(&self) -> impl Iterator<Item = &InstanceBatch> {
        self.groups.values().flatten()
    }

    pub(crate) fn batches_mut(&mut self) -> impl Iterator<Item = &mut InstanceBatch> {
        self.groups.values_mut().flatten()
    }

    /// Number of live batches
    pub fn batch_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Whether a batch is waiting to be reclaimed
    pub fn is_pending_reclaim(&self, handle: BatchHandle) -> bool {
        self.pending_reclaim.contains(&handle)
    }

    /// Batches whose region overlaps a box in grid units
    pub fn batches_in_aabb<'a>(&'a self, aabb: &'a Aabb) -> impl Iterator<Item = &'a InstanceBatch> + 'a {
        let region_size = self.region_size;
        self.groups
            .iter()
            .filter(move |(group, _)| group.region.bounds(region_size).intersects(aabb))
            .flat_map(|(_, batches)| batches.iter())
            .filter(|b| !b.is_empty())
    }

    /// Reassign region-local indices and refresh every slot reference
    pub fn reindex(&mut self) -> Result<()> {
        if self.busy {
            return Err(Error::RegistryBusy);
        }
        for (group, batches) in &self.groups {
            for (local, batch) in batches.iter().enumerate() {
                let id = BatchId {
                    group: *group,
                    local: local as u32,
                };
                for (instance, key) in batch.keys().enumerate() {
                    if let Some(slot) = self.slots.get_mut(&key) {
                        *slot = SlotRef {
                            batch: id,
                            instance: instance as u32,
                        };
                    }
                }
            }
        }
        Ok(())
    }

    /// Rebuild the slot map from the batches themselves
    pub(crate) fn rebuild_slots(&mut self) {
        self.slots.clear();
        for (group, batches) in &self.groups {
            for (local, batch) in batches.iter().enumerate() {
                let id = BatchId {
                    group: *group,
                    local: local as u32,
                };
                for (instance, key) in batch.keys().enumerate() {
                    self.slots.insert(
                        key,
                        SlotRef {
                            batch: id,
                            instance: instance as u32,
                        },
                    );
                }
            }
        }
    }

    /// Drop empty batches, reindex, and return the released handles
    pub fn reclaim_empty(&mut self) -> Result<Vec<BatchHandle>> {
        if self.busy {
            return Err(Error::RegistryBusy);
        }
        let mut released = Vec::new();
        for batches in self.groups.values_mut() {
            batches.retain(|b| {
                if b.is_empty() {
                    released.push(b.handle());
                    false
                } else {
                    true
                }
            });
        }
        self.groups.retain(|_, batches| !batches.is_empty());
        self.pending_reclaim.clear();

        if !released.is_empty() {
            released.sort();
            log::debug!("Reclaimed {} empty batches", released.len());
            self.reindex()?;
        }
        Ok(released)
    }

    /// Clear dirty flags, returning the batches that had them, by handle order
    pub fn take_dirty(&mut self) -> Vec<&InstanceBatch> {
        let mut dirty: Vec<&InstanceBatch> = self
            .groups
            .values_mut()
            .flatten()
            .filter_map(|b| if b.take_dirty() { Some(&*b) } else { None })
            .collect();
        dirty.sort_by_key(|b| b.handle());
        dirty
    }

    /// Mark every batch for a render sync
    pub fn mark_all_dirty(&mut self) {
        self.batches_mut().for_each(InstanceBatch::mark_dirty);
    }

    /// Drop every batch and slot, returning the released handles
    pub fn clear(&mut self) -> Vec<BatchHandle> {
        let mut released: Vec<BatchHandle> = self.batches().map(InstanceBatch::handle).collect();
        released.sort();
        self.groups.clear();
        self.slots.clear();
        self.pending_reclaim.clear();
        released
    }

    /// Counters for diagnostics
    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            batch_count: self.batch_count(),
            pending_reclaim: self.pending_reclaim.len(),
            ..Default::default()
        };
        for batch in self.batches() {
            stats.instance_count += batch.visible_count();
            stats.per_shape[batch.shape().index() as usize] += batch.visible_count();
        }
        stats
    }

    #[cfg(test)]
    pub(crate) fn corrupt_slot(&mut self, key: TileKey, slot: Option<SlotRef>) {
        match slot {
            Some(slot) => self.slots.insert(key, slot),
            None => self.slots.remove(&key),
        };
    }
}
