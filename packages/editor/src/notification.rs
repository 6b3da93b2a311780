//! Primitive change notifications emitted by the tree mutator.
//!
//! Every primitive edit is reported as one of the variants below, insertion
//! and deletion as a before/after pair. Once the outermost edit of a call
//! finishes, a single [`Notification::Changed`] closes the batch. Each record
//! carries what is needed to invert it.

use serde::{Deserialize, Serialize};
use wedge_tree::{Document, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Notification {
    /// `node` is about to become child `index` of `parent`
    BeforeInsertNodeAt {
        parent: NodeId,
        index: usize,
        node: NodeId,
    },

    /// `node` is now child `index` of `parent`
    InsertNodeAt {
        parent: NodeId,
        index: usize,
        node: NodeId,
    },

    SetTextNodeValue {
        node: NodeId,
        old_value: String,
        new_value: String,
    },

    /// `node` is about to be detached; it is still in the tree
    BeforeDeleteNode { node: NodeId },

    /// `node` has been detached from `former_parent`
    DeleteNode {
        node: NodeId,
        former_parent: NodeId,
        index: usize,
        previous_sibling: Option<NodeId>,
        next_sibling: Option<NodeId>,
    },

    /// `None` values mean the attribute was absent
    SetAttribute {
        node: NodeId,
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },

    /// Trailing summary of one externally visible edit
    Changed,
}

impl Notification {
    pub fn name(&self) -> &'static str {
        match self {
            Notification::BeforeInsertNodeAt { .. } => "BeforeInsertNodeAt",
            Notification::InsertNodeAt { .. } => "InsertNodeAt",
            Notification::SetTextNodeValue { .. } => "SetTextNodeValue",
            Notification::BeforeDeleteNode { .. } => "BeforeDeleteNode",
            Notification::DeleteNode { .. } => "DeleteNode",
            Notification::SetAttribute { .. } => "SetAttribute",
            Notification::Changed => "Changed",
        }
    }

    /// Whether this record reports a change (as opposed to an announcement
    /// or the summary).
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Notification::InsertNodeAt { .. }
                | Notification::SetTextNodeValue { .. }
                | Notification::DeleteNode { .. }
                | Notification::SetAttribute { .. }
        )
    }
}

/// Receives notifications synchronously, in subscription order.
///
/// `doc` reflects the tree at the moment of the notification: before the
/// change for `Before*` records, after it for the others.
pub trait NotificationListener {
    fn notify(&mut self, doc: &Document, notification: &Notification);
}

/// Listener that keeps every notification it sees
#[derive(Debug, Default)]
pub struct NotificationLog {
    pub notifications: Vec<Notification>,
}

impl NotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.notifications.iter().map(Notification::name).collect()
    }

    pub fn clear(&mut self) {
        self.notifications.clear();
    }
}

impl NotificationListener for NotificationLog {
    fn notify(&mut self, _doc: &Document, notification: &Notification) {
        self.notifications.push(notification.clone());
    }
}
