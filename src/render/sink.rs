//! Instance upload interface between the placement engine and a renderer.
//!
//! The engine never talks to a graphics API. At the end of the outermost
//! batch it hands every dirty chunk to the sink once, and tells the sink
//! when a reclaimed chunk's resources can be dropped.

use std::collections::HashMap;

use crate::storage::{BatchHandle, InstanceBatch, RegionCoord};
use crate::tile::{InstanceData, MeshShape, TextureMode};

/// Visible contents of one chunk, borrowed for the duration of an upload
#[derive(Clone, Copy, Debug)]
pub struct BatchUpload<'a> {
    pub handle: BatchHandle,
    pub shape: MeshShape,
    pub texture_mode: TextureMode,
    pub region: RegionCoord,
    /// Instances `[0, visible_count)`
    pub instances: &'a [InstanceData],
    pub visible_count: usize,
}

impl<'a> BatchUpload<'a> {
    /// View a batch for upload
    pub fn from_batch(batch: &'a InstanceBatch) -> Self {
        Self {
            handle: batch.handle(),
            shape: batch.shape(),
            texture_mode: batch.texture_mode(),
            region: batch.region(),
            instances: batch.instances(),
            visible_count: batch.visible_count(),
        }
    }

    /// Raw instance bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.instances)
    }
}

/// Receiver of chunk instance data
pub trait InstanceSink {
    /// Replace the renderer's copy of a chunk
    fn upload(&mut self, batch: &BatchUpload<'_>);

    /// Drop the renderer's resources for a reclaimed chunk
    fn release(&mut self, handle: BatchHandle);
}

/// Sink that discards everything (headless use)
#[derive(Debug, Default)]
pub struct NullSink;

impl InstanceSink for NullSink {
    fn upload(&mut self, _batch: &BatchUpload<'_>) {}

    fn release(&mut self, _handle: BatchHandle) {}
}

/// One call observed by a [`RecordingSink`]
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    Upload { handle: BatchHandle, visible_count: usize },
    Release(BatchHandle),
}

/// Sink that mirrors uploads in memory, for tooling and tests
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
    live: HashMap<BatchHandle, Vec<InstanceData>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls observed so far
    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    /// Forget observed calls, keeping the mirrored state
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Number of uploads observed
    pub fn upload_count(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, SinkEvent::Upload { .. })).count()
    }

    /// Mirrored instances of a chunk
    pub fn instances(&self, handle: BatchHandle) -> Option<&[InstanceData]> {
        self.live.get(&handle).map(Vec::as_slice)
    }

    /// Chunks the renderer currently holds
    pub fn live_batches(&self) -> usize {
        self.live.len()
    }

    /// Instances the renderer would draw
    pub fn total_visible(&self) -> usize {
        self.live.values().map(Vec::len).sum()
    }
}

impl InstanceSink for RecordingSink {
    fn upload(&mut self, batch: &BatchUpload<'_>) {
        self.events.push(SinkEvent::Upload {
            handle: batch.handle,
            visible_count: batch.visible_count,
        });
        self.live.insert(batch.handle, batch.instances.to_vec());
    }

    fn release(&mut self, handle: BatchHandle) {
        self.events.push(SinkEvent::Release(handle));
        self.live.remove(&handle);
    }
}
