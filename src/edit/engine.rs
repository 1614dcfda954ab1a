//! Placement engine: owns the placement map, chunk registry and spatial
//! index, and keeps them in step.
//!
//! Every mutation runs inside a batch. Render sync and empty-chunk cleanup
//! are deferred until the outermost batch closes, so an area fill touching
//! thousands of tiles uploads each chunk once.

use std::collections::{HashMap, HashSet};

use glam::Vec3;

use crate::core::{EngineConfig, Error, Result};
use crate::math::Aabb;
use crate::persist::TileSnapshot;
use crate::render::{BatchUpload, InstanceSink, NullSink};
use crate::storage::{
    ChunkRegistry, InstanceBatch, IntegrityReport, IntegrityValidator, SlotRef, SpatialIndex,
};
use crate::tile::transform::instance_data;
use crate::tile::{snap_to_half, snap_to_precision, InstanceData, Orientation, TileKey, TileRecord, UvRect};
use super::area;
use super::command::{Command, TileCommand, Transaction};
use super::context::{PaintContext, PaintOutcome};

/// Stroke lifecycle
#[derive(Debug)]
enum StrokeState {
    Idle,
    Active(Transaction),
}

/// Engine counters
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineStats {
    pub tile_count: usize,
    pub batch_count: usize,
    pub instance_count: usize,
    pub pending_reclaim: usize,
    pub spatial_buckets: usize,
    /// Instances per mesh shape, indexed by [`crate::tile::MeshShape::index`]
    pub per_shape: [usize; 4],
}

/// Tile storage and editing front end
pub struct PlacementEngine<S: InstanceSink = NullSink> {
    config: EngineConfig,
    tiles: HashMap<TileKey, TileRecord>,
    /// Keys whose record was moved off its own position by `replace`
    pinned: HashSet<TileKey>,
    registry: ChunkRegistry,
    spatial: SpatialIndex,
    sink: S,
    batch_depth: u32,
    stroke: StrokeState,
}

impl PlacementEngine<NullSink> {
    /// Create a headless engine
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_sink(config, NullSink)
    }
}

impl<S: InstanceSink> PlacementEngine<S> {
    /// Create an engine that pushes chunk data to a renderer
    pub fn with_sink(config: EngineConfig, sink: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: ChunkRegistry::new(config.chunk_capacity, config.region_size),
            spatial: SpatialIndex::new(config.spatial_bucket_size),
            tiles: HashMap::new(),
            pinned: HashSet::new(),
            sink,
            batch_depth: 0,
            stroke: StrokeState::Idle,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn instance_for(&self, record: &TileRecord) -> InstanceData {
        instance_data(record, self.config.grid_size, self.config.atlas())
    }

    // ---- Batching ----

    /// Open a batch; batches nest
    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Close a batch, flushing when the outermost one closes
    pub fn end_batch(&mut self) -> Result<()> {
        if self.batch_depth == 0 {
            return Err(Error::BatchUnderflow);
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.flush();
        }
        Ok(())
    }

    /// Current batch nesting depth
    pub fn batch_depth(&self) -> u32 {
        self.batch_depth
    }

    fn batched<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.batch_depth += 1;
        let out = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.flush();
        }
        out
    }

    /// Reclaim empty chunks, then upload every dirty one
    fn flush(&mut self) {
        match self.registry.reclaim_empty() {
            Ok(released) => {
                for handle in released {
                    self.sink.release(handle);
                }
            }
            Err(e) => log::warn!("Deferred chunk cleanup skipped: {}", e),
        }
        for batch in self.registry.take_dirty() {
            self.sink.upload(&BatchUpload::from_batch(batch));
        }
    }

    // ---- Primitive mutations ----

    /// Store a tile under its key, replacing whatever was there.
    ///
    /// Returns the previous record.
    pub fn place(&mut self, key: TileKey, record: TileRecord) -> Result<Option<TileRecord>> {
        check_key(key, &record)?;
        self.place_under(key, record)
    }

    /// Store a tile under a key that need not match its position. The
    /// record must still be in range.
    pub(crate) fn place_under(&mut self, key: TileKey, mut record: TileRecord) -> Result<Option<TileRecord>> {
        let own = TileKey::encode(record.position, record.orientation)?;
        record.position = snap_to_precision(record.position);

        self.batched(|engine| -> Result<Option<TileRecord>> {
            let data = engine.instance_for(&record);
            engine.registry.begin_mutation();
            let slot = engine
                .registry
                .insert(key, record.shape, record.texture_mode, record.position, data);
            engine.registry.end_mutation();
            slot?;

            engine.spatial.add(key, record.position);
            if own == key {
                engine.pinned.remove(&key);
            } else {
                engine.pinned.insert(key);
            }
            log::debug!("Placed {} ({:?})", key, record.shape);
            Ok(engine.tiles.insert(key, record))
        })
    }

    /// Remove a tile. Returns false when nothing was there.
    pub fn erase(&mut self, key: TileKey) -> bool {
        self.take(key).is_some()
    }

    /// Remove a tile and hand back its record
    fn take(&mut self, key: TileKey) -> Option<TileRecord> {
        if !self.tiles.contains_key(&key) {
            return None;
        }
        self.batched(|engine| {
            engine.registry.begin_mutation();
            engine.registry.remove(key);
            let record = engine.tiles.remove(&key);
            engine.spatial.remove(key);
            engine.pinned.remove(&key);
            engine.registry.end_mutation();
            log::debug!("Erased {}", key);
            record
        })
    }

    /// Erase then place under the same key, even when the new record sits
    /// at a different position. Returns whether a tile was replaced.
    pub fn replace(&mut self, key: TileKey, record: TileRecord) -> Result<bool> {
        TileKey::encode(record.position, record.orientation)?;
        self.batched(|engine| -> Result<bool> {
            let existed = engine.erase(key);
            engine.place_under(key, record)?;
            Ok(existed)
        })
    }

    /// Whether the tile under a key was moved off its own position
    pub fn is_pinned(&self, key: TileKey) -> bool {
        self.pinned.contains(&key)
    }

    /// Change only a tile's atlas rect. Recorded when a stroke is active.
    pub fn update_uv(&mut self, key: TileKey, uv: UvRect) -> bool {
        match self.set_uv(key, uv) {
            Some(from) => {
                if from != uv {
                    self.record(TileCommand::SetUv { key, from, to: uv });
                }
                true
            }
            None => false,
        }
    }

    /// Swap a tile's atlas rect, returning the previous one
    pub(crate) fn set_uv(&mut self, key: TileKey, uv: UvRect) -> Option<UvRect> {
        let atlas = self.config.atlas();
        let record = self.tiles.get_mut(&key)?;
        let from = std::mem::replace(&mut record.uv, uv);
        self.batched(|engine| engine.registry.update_custom(key, uv.normalized(atlas)));
        Some(from)
    }

    /// Execute a command without recording it
    pub fn apply_command(&mut self, command: &TileCommand) -> Result<()> {
        command.apply(self)
    }

    // ---- Strokes ----

    /// Begin collecting paint calls into one transaction
    pub fn start_stroke(&mut self, label: impl Into<String>) -> Result<()> {
        if self.is_stroke_active() {
            return Err(Error::StrokeActive);
        }
        self.stroke = StrokeState::Active(Transaction::new(label));
        Ok(())
    }

    pub fn is_stroke_active(&self) -> bool {
        matches!(self.stroke, StrokeState::Active(_))
    }

    fn record(&mut self, command: TileCommand) {
        if let StrokeState::Active(tx) = &mut self.stroke {
            tx.push(command);
        }
    }

    /// Paint the brush tile at a position (snapped to the half grid)
    pub fn paint_at(&mut self, ctx: &PaintContext, position: Vec3) -> PaintOutcome {
        if !self.is_stroke_active() {
            log::warn!("paint_at outside a stroke ignored");
            return PaintOutcome::Rejected("no active stroke".into());
        }
        let position = snap_to_half(position);
        let key = match TileKey::encode(position, ctx.orientation) {
            Ok(key) => key,
            Err(e) => {
                log::warn!("Paint rejected: {}", e);
                return PaintOutcome::Rejected(e.to_string());
            }
        };
        let record = ctx.record_at(position);

        let (command, outcome) = match self.tiles.get(&key) {
            Some(existing) if *existing == record => return PaintOutcome::Unchanged,
            Some(existing) => (
                TileCommand::Replace {
                    key,
                    from: existing.clone(),
                    to: record,
                },
                PaintOutcome::Replaced,
            ),
            None => (TileCommand::Place { key, record }, PaintOutcome::Placed),
        };

        if let Err(e) = self.apply_command(&command) {
            log::warn!("Paint at {} failed: {}", key, e);
            return PaintOutcome::Rejected(e.to_string());
        }
        self.record(command);
        outcome
    }

    /// Erase whatever tile of the brush orientation sits at a position
    pub fn erase_at(&mut self, ctx: &PaintContext, position: Vec3) -> PaintOutcome {
        if !self.is_stroke_active() {
            log::warn!("erase_at outside a stroke ignored");
            return PaintOutcome::Rejected("no active stroke".into());
        }
        let key = match TileKey::encode(snap_to_half(position), ctx.orientation) {
            Ok(key) => key,
            Err(e) => {
                log::warn!("Erase rejected: {}", e);
                return PaintOutcome::Rejected(e.to_string());
            }
        };
        match self.take(key) {
            Some(record) => {
                self.record(TileCommand::Erase { key, record });
                PaintOutcome::Erased
            }
            None => PaintOutcome::Unchanged,
        }
    }

    /// Close the stroke and return what it did; nothing is re-executed
    pub fn end_stroke(&mut self) -> Result<Transaction> {
        match std::mem::replace(&mut self.stroke, StrokeState::Idle) {
            StrokeState::Active(tx) => {
                log::debug!("Stroke '{}' closed with {} ops", tx.label(), tx.len());
                Ok(tx)
            }
            StrokeState::Idle => Err(Error::NoStrokeActive),
        }
    }

    /// Abandon the stroke, undoing what it already did
    pub fn cancel_stroke(&mut self) -> Result<()> {
        let tx = self.end_stroke()?;
        log::debug!("Stroke '{}' cancelled, compensating {} ops", tx.label(), tx.len());
        tx.revert(self)
    }

    fn require_idle(&self) -> Result<()> {
        if self.is_stroke_active() {
            return Err(Error::StrokeActive);
        }
        Ok(())
    }

    // ---- Area operations ----

    /// Paint every integer grid position on the brush plane inside a box
    pub fn fill_area(&mut self, ctx: &PaintContext, min: Vec3, max: Vec3) -> Result<Transaction> {
        self.require_idle()?;
        let positions = area::fill_positions(ctx.orientation, min, max, self.config.max_area_tiles)?;

        let mut tx = Transaction::new("Fill Area");
        self.batched(|engine| -> Result<()> {
            for position in positions {
                let key = TileKey::encode(position, ctx.orientation)?;
                let record = ctx.record_at(position);
                let command = match engine.tiles.get(&key) {
                    Some(existing) if *existing == record => continue,
                    Some(existing) => TileCommand::Replace {
                        key,
                        from: existing.clone(),
                        to: record,
                    },
                    None => TileCommand::Place { key, record },
                };
                engine.apply_command(&command)?;
                tx.push(command);
            }
            Ok(())
        })?;

        log::info!("Filled {} tiles", tx.len());
        Ok(tx)
    }

    /// Erase every tile inside a box widened along the brush normal
    pub fn erase_area(&mut self, ctx: &PaintContext, min: Vec3, max: Vec3) -> Result<Transaction> {
        self.require_idle()?;
        let bounds = area::erase_bounds(ctx.orientation, min, max);
        let mut keys = self.keys_in(&bounds);
        if keys.len() > self.config.max_area_tiles {
            return Err(Error::CapacityExceeded {
                requested: keys.len(),
                limit: self.config.max_area_tiles,
            });
        }
        keys.sort();

        let mut tx = Transaction::new("Erase Area");
        self.batched(|engine| {
            for key in keys {
                if let Some(record) = engine.take(key) {
                    tx.push(TileCommand::Erase { key, record });
                }
            }
        });

        log::info!("Erased {} tiles", tx.len());
        Ok(tx)
    }

    /// Erase everything, as one undoable transaction
    pub fn clear(&mut self) -> Result<Transaction> {
        self.require_idle()?;
        let mut tiles: Vec<(TileKey, TileRecord)> = self.tiles.drain().collect();
        self.pinned.clear();
        tiles.sort_by_key(|(k, _)| *k);

        let mut tx = Transaction::new("Clear");
        self.batched(|engine| {
            engine.spatial.clear();
            for handle in engine.registry.clear() {
                engine.sink.release(handle);
            }
            for (key, record) in tiles {
                tx.push(TileCommand::Erase { key, record });
            }
        });

        log::info!("Cleared {} tiles", tx.len());
        Ok(tx)
    }

    // ---- Queries ----

    pub fn tile(&self, key: TileKey) -> Option<&TileRecord> {
        self.tiles.get(&key)
    }

    /// Tile at a position and orientation
    pub fn tile_at(&self, position: Vec3, orientation: Orientation) -> Option<&TileRecord> {
        TileKey::encode(position, orientation).ok().and_then(|k| self.tiles.get(&k))
    }

    pub fn tiles(&self) -> impl Iterator<Item = (TileKey, &TileRecord)> {
        self.tiles.iter().map(|(k, r)| (*k, r))
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    fn keys_in(&self, bounds: &Aabb) -> Vec<TileKey> {
        self.spatial
            .query(bounds.min, bounds.max)
            .filter(|k| self.tiles.get(k).is_some_and(|r| bounds.contains_point(r.position)))
            .collect()
    }

    /// Keys of tiles inside a box (inclusive), sorted
    pub fn tiles_in_area(&self, min: Vec3, max: Vec3) -> Vec<TileKey> {
        let mut keys = self.keys_in(&Aabb::from_corners(min, max));
        keys.sort();
        keys
    }

    /// Render slot of a tile
    pub fn slot(&self, key: TileKey) -> Option<SlotRef> {
        self.registry.slot(key)
    }

    pub fn registry(&self) -> &ChunkRegistry {
        &self.registry
    }

    /// Chunks overlapping a box in grid units, for culling
    pub fn batches_in_aabb<'a>(&'a self, aabb: &'a Aabb) -> impl Iterator<Item = &'a InstanceBatch> + 'a {
        self.registry.batches_in_aabb(aabb)
    }

    pub fn stats(&self) -> EngineStats {
        let registry = self.registry.stats();
        EngineStats {
            tile_count: self.tiles.len(),
            batch_count: registry.batch_count,
            instance_count: registry.instance_count,
            pending_reclaim: registry.pending_reclaim,
            spatial_buckets: self.spatial.bucket_count(),
            per_shape: registry.per_shape,
        }
    }

    // ---- Maintenance ----

    /// Change the atlas size and renormalize every instance's rect
    pub fn set_atlas_size(&mut self, size: [f32; 2]) -> Result<()> {
        let mut config = self.config.clone();
        config.atlas_size = size;
        config.validate()?;
        self.config = config;

        let atlas = self.config.atlas();
        self.batched(|engine| {
            for (key, record) in &engine.tiles {
                engine.registry.update_custom(*key, record.uv.normalized(atlas));
            }
        });
        Ok(())
    }

    /// Cross-check the indices without changing anything
    pub fn validate(&self) -> IntegrityReport {
        let report = IntegrityValidator::check(&self.tiles, &self.pinned, &self.registry, &self.spatial);
        self.spatial.check_size(self.tiles.len());
        report
    }

    /// Heal the indices from the placement map
    pub fn repair(&mut self) -> Result<IntegrityReport> {
        let grid_size = self.config.grid_size;
        let atlas = self.config.atlas();
        self.batched(|engine| {
            IntegrityValidator::repair(
                &mut engine.tiles,
                &engine.pinned,
                &mut engine.registry,
                &mut engine.spatial,
                |r| instance_data(r, grid_size, atlas),
            )
        })
    }

    // ---- Snapshots ----

    /// Export every tile in key order
    pub fn snapshot(&self) -> TileSnapshot {
        let mut records: Vec<(&TileKey, &TileRecord)> = self.tiles.iter().collect();
        records.sort_by_key(|(k, _)| **k);
        TileSnapshot::from_records(records.into_iter().map(|(_, r)| r))
    }

    /// Replace all tiles with a snapshot's contents. Not undoable.
    ///
    /// Out-of-range entries are skipped; duplicate keys keep the last entry.
    /// Returns the number of tiles loaded.
    pub fn load_snapshot(&mut self, snapshot: &TileSnapshot) -> Result<usize> {
        self.require_idle()?;
        let records = snapshot.records()?;
        let total = records.len();

        self.batched(|engine| -> Result<()> {
            engine.tiles.clear();
            engine.pinned.clear();
            engine.spatial.clear();
            for handle in engine.registry.clear() {
                engine.sink.release(handle);
            }

            for record in records {
                let key = match TileKey::encode(record.position, record.orientation) {
                    Ok(key) => key,
                    Err(e) => {
                        log::warn!("Skipping snapshot tile: {}", e);
                        continue;
                    }
                };
                engine.place(key, record)?;
            }
            Ok(())
        })?;

        log::info!("Loaded {} tiles from snapshot ({} entries)", self.tiles.len(), total);
        Ok(self.tiles.len())
    }

    #[cfg(test)]
    pub(crate) fn parts_mut(&mut self) -> (&mut HashMap<TileKey, TileRecord>, &mut ChunkRegistry, &mut SpatialIndex) {
        (&mut self.tiles, &mut self.registry, &mut self.spatial)
    }
}

/// Fail unless a record encodes to the key it is being stored under
fn check_key(key: TileKey, record: &TileRecord) -> Result<()> {
    if TileKey::encode(record.position, record.orientation)? != key {
        return Err(Error::Integrity(format!(
            "record at {:?} {:?} does not belong under {}",
            record.position, record.orientation, key
        )));
    }
    Ok(())
}
