//! # Undo/Redo Stack
//!
//! Records the mutator's primitive notifications and replays them backwards
//! or forwards.
//!
//! ## Design
//!
//! - Primitive changes are collected until the trailing `Changed` of an edit;
//!   the collected changes become one [`EditBatch`]
//! - `begin_batch`/`end_batch` group several edits into one undo step
//! - Undo replays the inverse of each change in reverse order
//! - Redo replays the changes in their original order
//! - Replays go through the mutator, so other listeners see them, but they
//!   are not recorded again
//! - New edits clear the redo stack
//! - A replay that fails part way is rolled back from the changes it actually
//!   made, and the step goes back on its stack
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut undo = UndoStack::new();
//! undo.attach(&mut mutator);
//!
//! mutator.insert_text(text, 0, "Hello", true)?;
//!
//! undo.undo(&mut mutator)?;
//! undo.redo(&mut mutator)?;
//! ```

use crate::mutator::{MutationResult, TreeMutator};
use crate::notification::{Notification, NotificationListener};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};
use wedge_tree::Document;

/// The primitive changes of one undo step, in application order
#[derive(Debug, Clone, Default)]
pub struct EditBatch {
    pub notifications: Vec<Notification>,
    pub description: Option<String>,
}

#[derive(Debug)]
struct UndoState {
    undo_stack: Vec<EditBatch>,
    redo_stack: Vec<EditBatch>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    /// Changes seen since the last push
    open: Vec<Notification>,

    /// Explicit batch in progress
    current_batch: Option<EditBatch>,

    replaying: bool,

    /// Changes made by the replay in progress
    replayed: Vec<Notification>,
}

impl UndoState {
    fn push_batch(&mut self, batch: EditBatch) {
        self.undo_stack.push(batch);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        self.redo_stack.clear();
    }

    fn close_edit(&mut self) {
        if self.open.is_empty() || self.current_batch.is_some() {
            return;
        }
        let batch = EditBatch {
            notifications: std::mem::take(&mut self.open),
            description: None,
        };
        self.push_batch(batch);
    }
}

impl NotificationListener for UndoState {
    fn notify(&mut self, _doc: &Document, notification: &Notification) {
        if self.replaying {
            if notification.is_change() {
                self.replayed.push(notification.clone());
            }
            return;
        }
        if notification.is_change() {
            self.open.push(notification.clone());
        } else if matches!(notification, Notification::Changed) {
            self.close_edit();
        }
    }
}

/// Undo/redo history for a [`TreeMutator`]
#[derive(Debug, Clone)]
pub struct UndoStack {
    state: Rc<RefCell<UndoState>>,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(UndoState {
                undo_stack: Vec::new(),
                redo_stack: Vec::new(),
                max_levels,
                open: Vec::new(),
                current_batch: None,
                replaying: false,
                replayed: Vec::new(),
            })),
        }
    }

    /// Starts recording the edits made through `mutator`.
    pub fn attach(&self, mutator: &mut TreeMutator) {
        mutator.subscribe(self.state.clone());
    }

    /// Start a batch of edits (will be undone/redone together)
    pub fn begin_batch(&mut self) {
        let mut state = self.state.borrow_mut();
        state.close_edit();
        state.current_batch = Some(EditBatch::default());
    }

    /// End the current batch and push it to the undo stack
    pub fn end_batch(&mut self) {
        let mut state = self.state.borrow_mut();
        if let Some(mut batch) = state.current_batch.take() {
            batch.notifications.append(&mut state.open);
            if !batch.notifications.is_empty() {
                debug!(
                    changes = batch.notifications.len(),
                    description = batch.description.as_deref(),
                    "Recorded undo batch"
                );
                state.push_batch(batch);
            }
        }
    }

    /// Set description for current batch (if batching)
    pub fn set_batch_description(&mut self, description: impl Into<String>) {
        if let Some(batch) = &mut self.state.borrow_mut().current_batch {
            batch.description = Some(description.into());
        }
    }

    /// Undo the most recent batch. Returns false when there is nothing to undo.
    pub fn undo(&mut self, mutator: &mut TreeMutator) -> MutationResult<bool> {
        let Some(batch) = self.begin_replay(|state| state.undo_stack.pop()) else {
            return Ok(false);
        };

        let result = mutator.batch(|m| {
            let result = batch.notifications.iter().rev().try_for_each(|n| revert(m, n));
            if result.is_err() {
                self.roll_back(m);
            }
            result
        });

        let mut state = self.state.borrow_mut();
        state.replaying = false;
        state.replayed.clear();
        match result {
            Ok(()) => {
                state.redo_stack.push(batch);
                Ok(true)
            }
            Err(e) => {
                state.undo_stack.push(batch);
                Err(e)
            }
        }
    }

    /// Redo the most recently undone batch
    pub fn redo(&mut self, mutator: &mut TreeMutator) -> MutationResult<bool> {
        let Some(batch) = self.begin_replay(|state| state.redo_stack.pop()) else {
            return Ok(false);
        };

        let result = mutator.batch(|m| {
            let result = batch.notifications.iter().try_for_each(|n| replay(m, n));
            if result.is_err() {
                self.roll_back(m);
            }
            result
        });

        let mut state = self.state.borrow_mut();
        state.replaying = false;
        state.replayed.clear();
        match result {
            Ok(()) => {
                state.undo_stack.push(batch);
                Ok(true)
            }
            Err(e) => {
                state.redo_stack.push(batch);
                Err(e)
            }
        }
    }

    fn begin_replay(&self, take: impl FnOnce(&mut UndoState) -> Option<EditBatch>) -> Option<EditBatch> {
        let mut state = self.state.borrow_mut();
        state.close_edit();
        let batch = take(&mut state)?;
        state.replaying = true;
        state.replayed.clear();
        Some(batch)
    }

    /// Reverts what a failed replay already changed.
    fn roll_back(&self, m: &mut TreeMutator) {
        let applied = std::mem::take(&mut self.state.borrow_mut().replayed);
        debug!(changes = applied.len(), "Rolling back failed replay");
        for notification in applied.iter().rev() {
            if let Err(e) = revert(m, notification) {
                warn!(error = %e, "Could not roll back replayed change");
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.state.borrow().undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.state.borrow().redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.state.borrow().undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.state.borrow().redo_stack.len()
    }

    /// Clear all undo/redo history
    pub fn clear(&mut self) {
        let mut state = self.state.borrow_mut();
        state.undo_stack.clear();
        state.redo_stack.clear();
        state.open.clear();
        state.current_batch = None;
    }

    /// Get description of the next undo operation
    pub fn undo_description(&self) -> Option<String> {
        self.state
            .borrow()
            .undo_stack
            .last()
            .and_then(|batch| batch.description.clone())
    }

    /// Get description of the next redo operation
    pub fn redo_description(&self) -> Option<String> {
        self.state
            .borrow()
            .redo_stack
            .last()
            .and_then(|batch| batch.description.clone())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

fn revert(m: &mut TreeMutator, notification: &Notification) -> MutationResult<()> {
    match notification {
        Notification::InsertNodeAt { node, .. } => m.delete_node(*node),
        Notification::DeleteNode {
            node,
            former_parent,
            index,
            ..
        } => m.raw_insert(*former_parent, *index, *node),
        Notification::SetTextNodeValue { node, old_value, .. } => {
            m.set_text_node_value(*node, old_value.clone())
        }
        Notification::SetAttribute {
            node, name, old_value, ..
        } => m.write_attribute(*node, name, old_value.clone()),
        Notification::BeforeInsertNodeAt { .. }
        | Notification::BeforeDeleteNode { .. }
        | Notification::Changed => Ok(()),
    }
}

fn replay(m: &mut TreeMutator, notification: &Notification) -> MutationResult<()> {
    match notification {
        Notification::InsertNodeAt { parent, index, node } => m.raw_insert(*parent, *index, *node),
        Notification::DeleteNode { node, .. } => m.delete_node(*node),
        Notification::SetTextNodeValue { node, new_value, .. } => {
            m.set_text_node_value(*node, new_value.clone())
        }
        Notification::SetAttribute {
            node, name, new_value, ..
        } => m.write_attribute(*node, name, new_value.clone()),
        Notification::BeforeInsertNodeAt { .. }
        | Notification::BeforeDeleteNode { .. }
        | Notification::Changed => Ok(()),
    }
}
