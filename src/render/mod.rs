//! Renderer seam: batches are pushed to an [`InstanceSink`] at flush time

pub mod sink;

pub use sink::{BatchUpload, InstanceSink, NullSink, RecordingSink, SinkEvent};
