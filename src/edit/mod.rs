//! Tile editing: placement engine, strokes, area operations and undo

pub mod area;
pub mod command;
pub mod context;
pub mod engine;
pub mod history;

pub use command::{Command, CommandPair, TileCommand, Transaction};
pub use context::{PaintContext, PaintOutcome};
pub use engine::{EngineStats, PlacementEngine};
pub use history::History;
