//! Error types for the Tessel engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("coordinate out of range: {axis}={value} exceeds ±{limit}")]
    OutOfRange {
        axis: char,
        value: f32,
        limit: f32,
    },

    #[error("area operation touches {requested} tiles, limit is {limit}")]
    CapacityExceeded { requested: usize, limit: usize },

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("a stroke is already active")]
    StrokeActive,

    #[error("no stroke is active")]
    NoStrokeActive,

    #[error("end_batch called without a matching begin_batch")]
    BatchUnderflow,

    #[error("reindex requested while a tile mutation is in flight")]
    RegistryBusy,

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
