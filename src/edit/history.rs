//! Undo/redo stacks of transactions

use crate::core::Result;
use crate::render::InstanceSink;
use super::command::Transaction;
use super::engine::PlacementEngine;

/// Default number of undo steps kept
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// Linear undo history
#[derive(Debug)]
pub struct History {
    undo_stack: Vec<Transaction>,
    redo_stack: Vec<Transaction>,
    max_depth: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl History {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Record a committed transaction; empty ones are ignored
    pub fn push(&mut self, tx: Transaction) {
        if tx.is_empty() {
            return;
        }
        self.redo_stack.clear();
        self.undo_stack.push(tx);
        if self.undo_stack.len() > self.max_depth {
            let dropped = self.undo_stack.remove(0);
            log::debug!("History full, dropped '{}'", dropped.label());
        }
    }

    /// Undo the latest transaction. Returns false when there is none.
    pub fn undo<S: InstanceSink>(&mut self, engine: &mut PlacementEngine<S>) -> Result<bool> {
        let Some(tx) = self.undo_stack.pop() else {
            return Ok(false);
        };
        tx.revert(engine)?;
        self.redo_stack.push(tx);
        Ok(true)
    }

    /// Redo the latest undone transaction
    pub fn redo<S: InstanceSink>(&mut self, engine: &mut PlacementEngine<S>) -> Result<bool> {
        let Some(tx) = self.redo_stack.pop() else {
            return Ok(false);
        };
        tx.reapply(engine)?;
        self.undo_stack.push(tx);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Label of the next undo step
    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.last().map(Transaction::label)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use crate::core::EngineConfig;
    use crate::edit::PaintContext;

    #[test]
    fn test_undo_redo_stroke() {
        let mut engine = PlacementEngine::new(EngineConfig::default()).unwrap();
        let mut history = History::default();
        let ctx = PaintContext::default();

        engine.start_stroke("Paint").unwrap();
        engine.paint_at(&ctx, Vec3::ZERO);
        engine.paint_at(&ctx, Vec3::X);
        history.push(engine.end_stroke().unwrap());
        assert_eq!(engine.tile_count(), 2);
        assert_eq!(history.undo_label(), Some("Paint"));

        assert!(history.undo(&mut engine).unwrap());
        assert_eq!(engine.tile_count(), 0);
        assert!(engine.validate().is_clean());

        assert!(history.redo(&mut engine).unwrap());
        assert_eq!(engine.tile_count(), 2);
        assert!(!history.redo(&mut engine).unwrap());
    }

    #[test]
    fn test_push_clears_redo_and_caps_depth() {
        let mut engine = PlacementEngine::new(EngineConfig::default()).unwrap();
        let mut history = History::new(2);
        let ctx = PaintContext::default();

        for i in 0..3 {
            history.push(engine.fill_area(&ctx, Vec3::new(i as f32, 0.0, 0.0), Vec3::new(i as f32, 0.0, 0.0)).unwrap());
        }
        assert!(history.undo(&mut engine).unwrap());
        assert!(history.can_redo());

        history.push(engine.fill_area(&ctx, Vec3::new(5.0, 0.0, 0.0), Vec3::new(5.0, 0.0, 0.0)).unwrap());
        assert!(!history.can_redo());

        assert!(history.undo(&mut engine).unwrap());
        assert!(history.undo(&mut engine).unwrap());
        assert!(!history.undo(&mut engine).unwrap());
        // Oldest fill fell off the stack
        assert_eq!(engine.tile_count(), 1);
    }

    #[test]
    fn test_empty_transaction_ignored() {
        let mut history = History::default();
        history.push(Transaction::new("Nothing"));
        assert!(!history.can_undo());
    }
}
