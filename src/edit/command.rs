//! Reversible tile operations and the transactions grouping them

use crate::core::Result;
use crate::render::InstanceSink;
use crate::tile::{TileKey, TileRecord, UvRect};
use super::engine::PlacementEngine;

/// Something that can be executed against an engine and inverted
pub trait Command {
    /// Execute without recording history
    fn apply<S: InstanceSink>(&self, engine: &mut PlacementEngine<S>) -> Result<()>;

    /// Command that undoes this one
    fn invert(&self) -> Self
    where
        Self: Sized;
}

/// One primitive tile mutation
#[derive(Clone, Debug, PartialEq)]
pub enum TileCommand {
    /// Put a tile where none is
    Place { key: TileKey, record: TileRecord },
    /// Remove a tile; the record is kept so the erase can be undone
    Erase { key: TileKey, record: TileRecord },
    /// Swap one tile for another under the same key
    Replace { key: TileKey, from: TileRecord, to: TileRecord },
    /// Change only the atlas rect
    SetUv { key: TileKey, from: UvRect, to: UvRect },
}

impl TileCommand {
    /// Key the command touches
    pub fn key(&self) -> TileKey {
        match self {
            Self::Place { key, .. }
            | Self::Erase { key, .. }
            | Self::Replace { key, .. }
            | Self::SetUv { key, .. } => *key,
        }
    }
}

impl Command for TileCommand {
    fn apply<S: InstanceSink>(&self, engine: &mut PlacementEngine<S>) -> Result<()> {
        match self {
            // Undoing the erase of a moved tile puts it back under its old key
            Self::Place { key, record } => engine.place_under(*key, record.clone()).map(|_| ()),
            Self::Erase { key, .. } => {
                if !engine.erase(*key) {
                    log::debug!("Erase of {} found nothing", key);
                }
                Ok(())
            }
            Self::Replace { key, to, .. } => engine.replace(*key, to.clone()).map(|_| ()),
            Self::SetUv { key, to, .. } => {
                if engine.set_uv(*key, *to).is_none() {
                    log::debug!("UV update of {} found nothing", key);
                }
                Ok(())
            }
        }
    }

    fn invert(&self) -> Self {
        match self.clone() {
            Self::Place { key, record } => Self::Erase { key, record },
            Self::Erase { key, record } => Self::Place { key, record },
            Self::Replace { key, from, to } => Self::Replace { key, from: to, to: from },
            Self::SetUv { key, from, to } => Self::SetUv { key, from: to, to: from },
        }
    }
}

/// A (do, undo) pair as handed to an undo host
#[derive(Clone, Debug, PartialEq)]
pub struct CommandPair {
    pub redo: TileCommand,
    pub undo: TileCommand,
}

impl CommandPair {
    /// Pair a command with its inverse
    pub fn of(redo: TileCommand) -> Self {
        let undo = redo.invert();
        Self { redo, undo }
    }
}

/// Ordered list of pairs recorded by one stroke or area operation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transaction {
    label: String,
    pairs: Vec<CommandPair>,
}

impl Transaction {
    /// Create an empty transaction
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pairs: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pairs(&self) -> &[CommandPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Append an already executed command
    pub fn push(&mut self, redo: TileCommand) {
        self.pairs.push(CommandPair::of(redo));
    }

    /// Re-execute in recorded order
    pub fn reapply<S: InstanceSink>(&self, engine: &mut PlacementEngine<S>) -> Result<()> {
        self.apply(engine)
    }

    /// Undo in reverse order
    pub fn revert<S: InstanceSink>(&self, engine: &mut PlacementEngine<S>) -> Result<()> {
        self.invert().apply(engine)
    }
}

impl Command for Transaction {
    fn apply<S: InstanceSink>(&self, engine: &mut PlacementEngine<S>) -> Result<()> {
        engine.begin_batch();
        let result = self.pairs.iter().try_for_each(|pair| engine.apply_command(&pair.redo));
        engine.end_batch()?;
        result
    }

    fn invert(&self) -> Self {
        Self {
            label: self.label.clone(),
            pairs: self
                .pairs
                .iter()
                .rev()
                .map(|p| CommandPair {
                    redo: p.undo.clone(),
                    undo: p.redo.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use crate::tile::Orientation;

    fn record(x: f32) -> (TileKey, TileRecord) {
        let r = TileRecord::new(Vec3::new(x, 0.0, 0.0), Orientation::Floor);
        (TileKey::encode(r.position, r.orientation).unwrap(), r)
    }

    #[test]
    fn test_invert_pairs_up() {
        let (key, r) = record(1.0);
        let place = TileCommand::Place { key, record: r.clone() };
        assert_eq!(place.invert(), TileCommand::Erase { key, record: r.clone() });
        assert_eq!(place.invert().invert(), place);

        let moved = r.clone().with_rotation(1);
        let replace = TileCommand::Replace { key, from: r, to: moved.clone() };
        match replace.invert() {
            TileCommand::Replace { to, .. } => assert_eq!(to.rotation, 0),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(replace.key(), key);
    }

    #[test]
    fn test_transaction_invert_reverses_order() {
        let mut tx = Transaction::new("Paint");
        let (a, ra) = record(1.0);
        let (b, rb) = record(2.0);
        tx.push(TileCommand::Place { key: a, record: ra });
        tx.push(TileCommand::Place { key: b, record: rb });

        let inverse = tx.invert();
        assert_eq!(inverse.label(), "Paint");
        assert_eq!(inverse.pairs()[0].redo.key(), b);
        assert!(matches!(inverse.pairs()[1].redo, TileCommand::Erase { .. }));
        assert_eq!(inverse.invert(), tx);
    }
}
