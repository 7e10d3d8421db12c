#![forbid(unsafe_code)]

//! Undo/redo history of user prop edits.
//!
//! Only user writes are recorded; callback outputs are recomputed when an
//! edit is undone or redone, since the engine replays the edit as a new
//! user write.
//!
//! ```text
//! record(e3)     undo: [e1, e2, e3]  redo: []
//! undo() x2      undo: [e1]          redo: [e3, e2]
//! record(e4)     undo: [e1, e4]      redo: []      <- new branch
//! ```
//!
//! # Invariants
//!
//! 1. `undo_depth() <= max_depth` after every operation.
//! 2. Recording a new edit clears the redo stack.

use std::collections::VecDeque;

use plexus_core::ComponentId;
use serde_json::{Map, Value};

/// One user write: the props it replaced and the props it set.
#[derive(Debug, Clone, PartialEq)]
pub struct UserEdit {
    pub id: ComponentId,
    pub before: Map<String, Value>,
    pub after: Map<String, Value>,
}

impl UserEdit {
    /// The edit that reverses this one.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            id: self.id.clone(),
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InteractionHistory {
    undo_stack: VecDeque<UserEdit>,
    redo_stack: VecDeque<UserEdit>,
    max_depth: usize,
}

impl Default for InteractionHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl InteractionHistory {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_depth,
        }
    }

    pub fn record(&mut self, edit: UserEdit) {
        self.redo_stack.clear();
        if self.max_depth == 0 {
            return;
        }
        self.undo_stack.push_back(edit);
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
    }

    /// Pop the newest edit, returning the write that reverses it.
    pub fn undo(&mut self) -> Option<UserEdit> {
        let edit = self.undo_stack.pop_back()?;
        let inverse = edit.inverse();
        self.redo_stack.push_back(edit);
        Some(inverse)
    }

    /// Pop the newest undone edit, returning it for reapplication.
    pub fn redo(&mut self) -> Option<UserEdit> {
        let edit = self.redo_stack.pop_back()?;
        self.undo_stack.push_back(edit.clone());
        Some(edit)
    }

    /// The write [`undo`](Self::undo) would return, without popping it.
    #[must_use]
    pub fn peek_undo(&self) -> Option<UserEdit> {
        self.undo_stack.back().map(UserEdit::inverse)
    }

    /// The write [`redo`](Self::redo) would return, without popping it.
    #[must_use]
    pub fn peek_redo(&self) -> Option<UserEdit> {
        self.redo_stack.back().cloned()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
