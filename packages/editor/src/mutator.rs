//! # Tree Mutator
//!
//! The only entry point for structural edits of a marked tree.
//!
//! ## Design
//!
//! Edits come in two layers:
//!
//! - **Primitives** (`raw_insert`, `delete_node`, `set_text_node_value`,
//!   `write_attribute`) change one thing and report it. They do not protect
//!   the "no adjacent text siblings" invariant and stay crate-private.
//! - **Operations** (the public methods) validate every precondition before
//!   touching the tree, compose primitives, and keep the invariant.
//!
//! Every public operation runs inside an edit scope. Scopes nest; when the
//! outermost one closes after at least one primitive change, a single
//! [`Notification::Changed`] is emitted:
//!
//! ```text
//! remove_node(<quote>)        BeforeDeleteNode  <quote>
//!   delete_node                DeleteNode        <quote>
//!   merge_text_nodes           SetTextNodeValue  "ab" -> "abcd"
//!     delete_node              BeforeDeleteNode  "cd"
//!                              DeleteNode        "cd"
//!                              Changed
//! ```
//!
//! Precondition failures are returned before the first primitive runs, so a
//! failed operation leaves the tree untouched.

use crate::location::{Location, LocationError};
use crate::notification::{Notification, NotificationListener};
use crate::root::{LocationRoot, PathError};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, trace};
use wedge_tree::{split_chars, Document, NodeId, NodeKind, NodeRef, TreeError};

pub type MutationResult<T> = Result<T, MutationError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Node {0} is not a text node")]
    NotText(NodeId),

    #[error("Node {0} is not an element")]
    NotElement(NodeId),

    #[error("Fragment {0} does not hold exactly one node")]
    FragmentNotAllowed(NodeId),

    #[error("Node {node} is not inside {top}")]
    NotInside { node: NodeId, top: NodeId },

    #[error("Splitting {0} would leave two adjacent text nodes")]
    WouldDenormalize(NodeId),

    #[error("Nodes are not contiguous siblings")]
    NotContiguous,

    #[error("Node {node} is not a child of {parent}")]
    NotAChild { parent: NodeId, node: NodeId },

    #[error("Node {0} is not in the root")]
    NodeNotInRoot(NodeId),

    #[error("Node {0} is the root and cannot be detached or split")]
    RootNode(NodeId),

    #[error("Node {0} is already attached")]
    AlreadyAttached(NodeId),

    #[error("Node {0} is detached")]
    Detached(NodeId),

    #[error("Index {index} out of bounds for {parent} with {len} children")]
    IndexOutOfBounds {
        parent: NodeId,
        index: usize,
        len: usize,
    },

    #[error("Offset {offset} out of range for {node} of length {len}")]
    OffsetOutOfRange {
        node: NodeId,
        offset: usize,
        len: usize,
    },

    #[error("Range endpoints are not in the same element")]
    IllFormedRange,

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// A listener shared between the mutator and its owner
pub type SharedListener = Rc<RefCell<dyn NotificationListener>>;

/// Result of [`TreeMutator::insert_text`]
#[derive(Debug, Clone, PartialEq)]
pub struct TextInsertion {
    /// The text node holding the inserted text; `None` if nothing was inserted
    pub node: Option<NodeId>,
    /// Whether `node` was created rather than extended
    pub is_new: bool,
    pub caret: Location,
}

/// Content accepted by [`TreeMutator::insert_at`]
#[derive(Debug, Clone, PartialEq)]
pub enum Insertable {
    Text(String),
    Node(NodeId),
    List(Vec<Insertable>),
}

impl From<&str> for Insertable {
    fn from(text: &str) -> Self {
        Insertable::Text(text.to_string())
    }
}

impl From<String> for Insertable {
    fn from(text: String) -> Self {
        Insertable::Text(text)
    }
}

impl From<NodeId> for Insertable {
    fn from(node: NodeId) -> Self {
        Insertable::Node(node)
    }
}

impl From<Vec<Insertable>> for Insertable {
    fn from(items: Vec<Insertable>) -> Self {
        Insertable::List(items)
    }
}

pub struct TreeMutator {
    pub(crate) doc: Document,
    root: LocationRoot,
    listeners: Vec<SharedListener>,
    depth: usize,
    dirty: bool,
    /// Set once the document has been handed back; the root then stays marked
    released: bool,
}

impl fmt::Debug for TreeMutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeMutator")
            .field("root", &self.root)
            .field("listeners", &self.listeners.len())
            .field("depth", &self.depth)
            .finish()
    }
}

/// The document goes away with the mutator, so its root mark does too.
impl Drop for TreeMutator {
    fn drop(&mut self) {
        if !self.released {
            self.root.unmark();
        }
    }
}

impl TreeMutator {
    pub fn new(doc: Document, root: LocationRoot) -> MutationResult<Self> {
        root.check_document(&doc)?;
        Ok(Self {
            doc,
            root,
            listeners: Vec::new(),
            depth: 0,
            dirty: false,
            released: false,
        })
    }

    /// Marks `root` and wraps the document.
    pub fn mark(doc: Document, root: NodeId) -> MutationResult<Self> {
        let root = LocationRoot::mark(&doc, root)?;
        Self::new(doc, root)
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn root(&self) -> LocationRoot {
        self.root
    }

    /// Gives the document back; the root stays marked.
    pub fn into_document(mut self) -> Document {
        self.released = true;
        std::mem::take(&mut self.doc)
    }

    /// Creates a detached element for later insertion.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.doc.create_element(name)
    }

    /// Creates a detached text node for later insertion.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.doc.create_text(text)
    }

    /// Parses `xml` into a detached subtree for later insertion.
    pub fn create_from_xml(&mut self, xml: &str) -> MutationResult<NodeId> {
        Ok(self.doc.parse_xml(xml)?)
    }

    pub fn subscribe(&mut self, listener: SharedListener) {
        debug!(listeners = self.listeners.len() + 1, "Subscribed notification listener");
        self.listeners.push(listener);
    }

    pub fn unsubscribe(&mut self, listener: &SharedListener) {
        let target = Rc::as_ptr(listener).cast::<()>();
        self.listeners.retain(|l| Rc::as_ptr(l).cast::<()>() != target);
    }

    pub fn node_to_path(&self, node: &NodeRef) -> MutationResult<String> {
        Ok(self.root.encode(&self.doc, node)?)
    }

    pub fn path_to_node(&self, path: &str) -> MutationResult<Option<NodeRef>> {
        Ok(self.root.decode(&self.doc, path)?)
    }

    /// Runs `f` as one edit: a single `Changed` follows all of its changes.
    pub fn batch<T>(&mut self, f: impl FnOnce(&mut Self) -> MutationResult<T>) -> MutationResult<T> {
        self.edit("batch", f)
    }

    pub(crate) fn edit<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self) -> MutationResult<T>,
    ) -> MutationResult<T> {
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;

        if self.depth == 0 && self.dirty {
            self.dirty = false;
            debug!(operation, ok = result.is_ok(), "Edit complete");
            self.emit(Notification::Changed);
        }
        result
    }

    fn emit(&mut self, notification: Notification) {
        trace!(notification = notification.name(), "Emitting notification");
        if notification.is_change() {
            self.dirty = true;
        }
        for listener in &self.listeners {
            listener.borrow_mut().notify(&self.doc, &notification);
        }
    }

    pub(crate) fn location(&self, node: impl Into<NodeRef>, offset: usize) -> MutationResult<Location> {
        Ok(Location::new(&self.doc, self.root, node, offset)?)
    }

    pub(crate) fn ensure_in_root(&self, node: NodeId) -> MutationResult<()> {
        if self.root.contains(&self.doc, &NodeRef::Node(node)) {
            Ok(())
        } else {
            Err(MutationError::NodeNotInRoot(node))
        }
    }

    /// Parent and index of a node that may be detached by an edit.
    pub(crate) fn detachable(&self, node: NodeId) -> MutationResult<(NodeId, usize)> {
        self.ensure_in_root(node)?;
        if node == self.root.node() {
            return Err(MutationError::RootNode(node));
        }
        match (self.doc.parent(node), self.doc.index_in_parent(node)) {
            (Some(parent), Some(index)) => Ok((parent, index)),
            _ => Err(MutationError::Detached(node)),
        }
    }

    fn ensure_text(&self, node: NodeId) -> MutationResult<&str> {
        self.doc.text(node).ok_or(MutationError::NotText(node))
    }

    fn ensure_element(&self, node: NodeId) -> MutationResult<()> {
        if self.doc.is_element(node) {
            Ok(())
        } else {
            Err(MutationError::NotElement(node))
        }
    }

    fn char_len(&self, node: NodeId) -> usize {
        self.doc.length(&NodeRef::Node(node)).unwrap_or(0)
    }

    /// Resolves what will actually be inserted: a fragment must carry exactly
    /// one node, which must otherwise be detached.
    fn insertable(&self, node: NodeId) -> MutationResult<NodeId> {
        match self.doc.kind(node) {
            None => Err(TreeError::UnknownNode(node).into()),
            Some(NodeKind::Fragment(children)) => match children.as_slice() {
                [only] => Ok(*only),
                _ => Err(MutationError::FragmentNotAllowed(node)),
            },
            Some(_) => {
                if self.doc.parent(node).is_some() {
                    Err(MutationError::AlreadyAttached(node))
                } else {
                    Ok(node)
                }
            }
        }
    }

    /// Detaches a node from the fragment that carried it.
    fn take_from_fragment(&mut self, node: NodeId) -> MutationResult<()> {
        if let Some(parent) = self.doc.parent(node) {
            if self.doc.is_fragment(parent) {
                self.doc.detach(node)?;
            }
        }
        Ok(())
    }

    fn check_insert(&self, parent: NodeId, index: usize, node: NodeId) -> MutationResult<()> {
        self.ensure_element(parent)?;
        self.ensure_in_root(parent)?;
        let len = self.doc.child_count(parent);
        if index > len {
            return Err(MutationError::IndexOutOfBounds { parent, index, len });
        }
        if self.doc.contains(node, parent) {
            return Err(TreeError::Cycle { parent, node }.into());
        }
        Ok(())
    }

    // ---- primitives ----

    pub(crate) fn raw_insert(&mut self, parent: NodeId, index: usize, node: NodeId) -> MutationResult<()> {
        self.check_insert(parent, index, node)?;
        if self.doc.parent(node).is_some() {
            return Err(MutationError::AlreadyAttached(node));
        }
        self.emit(Notification::BeforeInsertNodeAt { parent, index, node });
        self.doc.insert_child(parent, index, node)?;
        self.emit(Notification::InsertNodeAt { parent, index, node });
        Ok(())
    }

    pub(crate) fn delete_node(&mut self, node: NodeId) -> MutationResult<()> {
        let (former_parent, index) = self.detachable(node)?;
        let previous_sibling = self.doc.previous_sibling(node);
        let next_sibling = self.doc.next_sibling(node);

        self.emit(Notification::BeforeDeleteNode { node });
        self.doc.detach(node)?;
        self.emit(Notification::DeleteNode {
            node,
            former_parent,
            index,
            previous_sibling,
            next_sibling,
        });
        Ok(())
    }

    pub(crate) fn set_text_node_value(&mut self, node: NodeId, value: String) -> MutationResult<()> {
        self.ensure_text(node)?;
        self.ensure_in_root(node)?;
        let old_value = self.doc.replace_text(node, value.clone())?;
        self.emit(Notification::SetTextNodeValue {
            node,
            old_value,
            new_value: value,
        });
        Ok(())
    }

    pub(crate) fn write_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        value: Option<String>,
    ) -> MutationResult<()> {
        self.ensure_element(node)?;
        self.ensure_in_root(node)?;
        let old_value = self.doc.set_attribute(node, name, value.clone())?;
        self.emit(Notification::SetAttribute {
            node,
            name: name.to_string(),
            old_value,
            new_value: value,
        });
        Ok(())
    }

    // ---- operations ----

    /// Inserts `node` as child `index` of `parent` and returns the location
    /// just after the inserted content.
    ///
    /// A fragment carrying a single node inserts that node. A text node is
    /// merged into a neighbouring text node when there is one.
    pub fn insert_node_at(&mut self, parent: NodeId, index: usize, node: NodeId) -> MutationResult<Location> {
        self.edit("insert_node_at", |m| {
            let node = m.insertable(node)?;
            m.check_insert(parent, index, node)?;

            if let Some(text) = m.doc.text(node) {
                if text.is_empty() {
                    return m.location(parent, index);
                }
                let before = index.checked_sub(1).and_then(|i| m.doc.child(parent, i));
                let after = m.doc.child(parent, index);
                let touches_text = before.is_some_and(|n| m.doc.is_text(n))
                    || after.is_some_and(|n| m.doc.is_text(n));
                if touches_text {
                    let text = text.to_string();
                    return Ok(m.insert_text(parent, index, &text, true)?.caret);
                }
            }

            m.take_from_fragment(node)?;
            m.raw_insert(parent, index, node)?;
            m.location(parent, index + 1)
        })
    }

    /// Inserts `text` at `offset` of an element or text node, reusing an
    /// adjacent text node when possible.
    pub fn insert_text(
        &mut self,
        node: NodeId,
        offset: usize,
        text: &str,
        caret_at_end: bool,
    ) -> MutationResult<TextInsertion> {
        self.edit("insert_text", |m| {
            m.ensure_in_root(node)?;
            let len = m.char_len(node);
            match m.doc.kind(node) {
                Some(NodeKind::Element(_)) if offset > len => {
                    return Err(MutationError::IndexOutOfBounds {
                        parent: node,
                        index: offset,
                        len,
                    })
                }
                Some(NodeKind::Text(_)) if offset > len => {
                    return Err(MutationError::OffsetOutOfRange { node, offset, len })
                }
                Some(NodeKind::Element(_)) | Some(NodeKind::Text(_)) => {}
                _ => return Err(MutationError::NotElement(node)),
            }

            if text.is_empty() {
                return Ok(TextInsertion {
                    node: None,
                    is_new: false,
                    caret: m.location(node, offset)?,
                });
            }

            let (target, at) = if m.doc.is_text(node) {
                (node, offset)
            } else if let Some(child) = m.doc.child(node, offset).filter(|&c| m.doc.is_text(c)) {
                (child, 0)
            } else if let Some(prev) = offset
                .checked_sub(1)
                .and_then(|i| m.doc.child(node, i))
                .filter(|&c| m.doc.is_text(c))
            {
                (prev, m.char_len(prev))
            } else {
                let created = m.doc.create_text(text);
                m.raw_insert(node, offset, created)?;
                let caret_offset = if caret_at_end { text.chars().count() } else { 0 };
                return Ok(TextInsertion {
                    node: Some(created),
                    is_new: true,
                    caret: m.location(created, caret_offset)?,
                });
            };

            let current = m.ensure_text(target)?;
            let (pre, post) = split_chars(current, at);
            let value = format!("{}{}{}", pre, text, post);
            m.set_text_node_value(target, value)?;

            let caret_offset = if caret_at_end { at + text.chars().count() } else { at };
            Ok(TextInsertion {
                node: Some(target),
                is_new: false,
                caret: m.location(target, caret_offset)?,
            })
        })
    }

    /// Deletes `length` characters at `offset`; the node goes away if it
    /// becomes empty. Returns the caret where the text was.
    pub fn delete_text(&mut self, node: NodeId, offset: usize, length: usize) -> MutationResult<Location> {
        self.edit("delete_text", |m| {
            let current = m.ensure_text(node)?;
            let len = current.chars().count();
            if offset > len {
                return Err(MutationError::OffsetOutOfRange { node, offset, len });
            }
            m.ensure_in_root(node)?;
            if length == 0 {
                return m.location(node, offset);
            }

            let end = offset.saturating_add(length).min(len);
            let value: String = current
                .chars()
                .take(offset)
                .chain(current.chars().skip(end))
                .collect();
            let (parent, index) = m.detachable(node)?;
            m.set_text_node(node, &value)?;

            if m.doc.parent(node).is_some() {
                m.location(node, offset)
            } else {
                m.location(parent, index)
            }
        })
    }

    /// Inserts an element into a text node, splitting it. Returns the
    /// boundaries before and after the inserted element.
    ///
    /// Offsets outside the text are clamped, which turns the insertion into a
    /// plain insertion before or after the text node.
    pub fn insert_into_text(
        &mut self,
        node: NodeId,
        offset: isize,
        element: NodeId,
    ) -> MutationResult<(Location, Location)> {
        self.edit("insert_into_text", |m| {
            let len = m.ensure_text(node)?.chars().count();
            let (parent, at) = m.detachable(node)?;
            let inserted = m.insertable(element)?;
            m.check_insert(parent, at, inserted)?;
            let offset = usize::try_from(offset).unwrap_or(0).min(len);

            if let Some(text) = m.doc.text(inserted) {
                let text = text.to_string();
                let start = m.location(node, offset)?;
                let result = m.insert_text(node, offset, &text, true)?;
                return Ok((start, result.caret));
            }

            m.take_from_fragment(inserted)?;
            if offset == 0 {
                m.raw_insert(parent, at, inserted)?;
                return Ok((m.location(parent, at)?, m.location(node, 0)?));
            }
            if offset == len {
                m.raw_insert(parent, at + 1, inserted)?;
                return Ok((m.location(node, len)?, m.location(parent, at + 2)?));
            }

            let current = m.ensure_text(node)?;
            let (pre, post) = split_chars(current, offset);
            let (pre, post) = (pre.to_string(), post.to_string());
            let next = m.doc.create_text(post);
            m.set_text_node_value(node, pre)?;
            m.raw_insert(parent, at + 1, inserted)?;
            m.raw_insert(parent, at + 2, next)?;
            Ok((m.location(node, offset)?, m.location(next, 0)?))
        })
    }

    /// Sets (`Some`) or removes (`None`) an attribute.
    pub fn set_attribute(&mut self, element: NodeId, name: &str, value: Option<&str>) -> MutationResult<()> {
        self.edit("set_attribute", |m| {
            m.ensure_element(element)?;
            m.ensure_in_root(element)?;
            if m.doc.attribute(element, name) == value {
                return Ok(());
            }
            m.write_attribute(element, name, value.map(str::to_string))
        })
    }

    /// Replaces the content of a text node; an empty value deletes the node.
    /// Returns the caret at the end of the new content, or where the node was.
    pub fn set_text_node(&mut self, node: NodeId, text: &str) -> MutationResult<Location> {
        self.edit("set_text_node", |m| {
            let current = m.ensure_text(node)?;
            let unchanged = current == text;
            let (parent, index) = m.detachable(node)?;

            if text.is_empty() {
                m.delete_node(node)?;
                return m.location(parent, index);
            }
            if !unchanged {
                m.set_text_node_value(node, text.to_string())?;
            }
            m.location(node, text.chars().count())
        })
    }

    /// Removes `node`, merging text nodes that become adjacent. Returns the
    /// location where the node was.
    pub fn remove_node(&mut self, node: NodeId) -> MutationResult<Location> {
        self.edit("remove_node", |m| {
            let (parent, index) = m.detachable(node)?;
            let prev = m.doc.previous_sibling(node);
            m.delete_node(node)?;
            match prev {
                None => m.location(parent, index),
                Some(prev) => m.merge_text_nodes(prev),
            }
        })
    }

    /// [`remove_node`](Self::remove_node) that ignores an absent node.
    pub fn remove_node_nf(&mut self, node: Option<NodeId>) -> MutationResult<Option<Location>> {
        node.map(|node| self.remove_node(node)).transpose()
    }

    /// Removes contiguous siblings as one edit with a single merge at the end.
    pub fn remove_nodes(&mut self, nodes: &[NodeId]) -> MutationResult<Option<Location>> {
        let Some(&first) = nodes.first() else {
            return Ok(None);
        };
        self.edit("remove_nodes", |m| {
            let (parent, index) = m.detachable(first)?;
            for pair in nodes.windows(2) {
                if m.doc.next_sibling(pair[0]) != Some(pair[1]) {
                    return Err(MutationError::NotContiguous);
                }
            }

            let prev = m.doc.previous_sibling(first);
            for &node in nodes {
                m.delete_node(node)?;
            }
            match prev {
                None => m.location(parent, index).map(Some),
                Some(prev) => m.merge_text_nodes(prev).map(Some),
            }
        })
    }

    /// Merges `node` with its next sibling when both are text. Returns the
    /// location between the merged parts, or just after `node`.
    pub fn merge_text_nodes(&mut self, node: NodeId) -> MutationResult<Location> {
        self.edit("merge_text_nodes", |m| {
            let (parent, index) = m.detachable(node)?;
            let next = m.doc.next_sibling(node);

            if let (Some(text), Some(next)) = (m.doc.text(node), next) {
                if let Some(next_text) = m.doc.text(next) {
                    let offset = text.chars().count();
                    let merged = format!("{}{}", text, next_text);
                    m.set_text_node_value(node, merged)?;
                    m.delete_node(next)?;
                    return m.location(node, offset);
                }
            }
            m.location(parent, index + 1)
        })
    }

    /// [`merge_text_nodes`](Self::merge_text_nodes) that ignores an absent node.
    pub fn merge_text_nodes_nf(&mut self, node: Option<NodeId>) -> MutationResult<Option<Location>> {
        node.map(|node| self.merge_text_nodes(node)).transpose()
    }

    /// Inserts text, nodes or a list of either at `index` of `parent` and
    /// returns the location just after the inserted content.
    ///
    /// Text goes through [`insert_text`](Self::insert_text); elements go into
    /// text nodes through [`insert_into_text`](Self::insert_into_text) and
    /// into elements through [`insert_node_at`](Self::insert_node_at). List
    /// items are inserted one after the other, each where the previous one
    /// ended. Every item is checked before the first one is inserted.
    pub fn insert_at(
        &mut self,
        parent: NodeId,
        index: usize,
        content: impl Into<Insertable>,
    ) -> MutationResult<Location> {
        let content = content.into();
        self.edit("insert_at", |m| {
            m.check_content(parent, index, &content)?;
            m.insert_content(parent, index, content)
        })
    }

    fn check_content(&self, parent: NodeId, index: usize, content: &Insertable) -> MutationResult<()> {
        self.ensure_in_root(parent)?;
        let len = self.char_len(parent);
        match self.doc.kind(parent) {
            Some(NodeKind::Element(_)) if index > len => {
                return Err(MutationError::IndexOutOfBounds { parent, index, len })
            }
            Some(NodeKind::Text(_)) if index > len => {
                return Err(MutationError::OffsetOutOfRange {
                    node: parent,
                    offset: index,
                    len,
                })
            }
            Some(NodeKind::Element(_)) | Some(NodeKind::Text(_)) => {}
            _ => return Err(MutationError::NotElement(parent)),
        }
        self.check_items(parent, content, &mut Vec::new())
    }

    fn check_items(&self, parent: NodeId, content: &Insertable, seen: &mut Vec<NodeId>) -> MutationResult<()> {
        match content {
            Insertable::Text(_) => Ok(()),
            Insertable::List(items) => items
                .iter()
                .try_for_each(|item| self.check_items(parent, item, seen)),
            Insertable::Node(node) => {
                let inserted = self.insertable(*node)?;
                if seen.contains(&inserted) {
                    return Err(MutationError::AlreadyAttached(inserted));
                }
                if !self.doc.is_text(inserted) {
                    let container = if self.doc.is_text(parent) {
                        self.detachable(parent)?.0
                    } else {
                        parent
                    };
                    if self.doc.contains(inserted, container) {
                        return Err(TreeError::Cycle {
                            parent: container,
                            node: inserted,
                        }
                        .into());
                    }
                }
                seen.push(inserted);
                Ok(())
            }
        }
    }

    fn insert_content(&mut self, parent: NodeId, index: usize, content: Insertable) -> MutationResult<Location> {
        match content {
            Insertable::List(items) => {
                let mut caret = self.location(parent, index)?;
                for item in items {
                    let node = caret.node().as_node().ok_or(LocationError::AttributeNode)?;
                    let offset = caret.offset();
                    caret = self.insert_content(node, offset, item)?;
                }
                Ok(caret)
            }
            Insertable::Text(text) => Ok(self.insert_text(parent, index, &text, true)?.caret),
            Insertable::Node(node) => {
                if !self.doc.is_text(parent) {
                    return self.insert_node_at(parent, index, node);
                }
                let inserted = self.insertable(node)?;
                match self.doc.text(inserted) {
                    Some(text) => {
                        let text = text.to_string();
                        Ok(self.insert_text(parent, index, &text, true)?.caret)
                    }
                    None => {
                        let offset = isize::try_from(index).unwrap_or(isize::MAX);
                        Ok(self.insert_into_text(parent, offset, node)?.1)
                    }
                }
            }
        }
    }

    /// Inserts `node` before `before`, or appends when `before` is `None`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        node: NodeId,
        before: Option<NodeId>,
    ) -> MutationResult<Location> {
        let index = match before {
            None => self.doc.child_count(parent),
            Some(before) => {
                if self.doc.parent(before) != Some(parent) {
                    return Err(MutationError::NotAChild { parent, node: before });
                }
                self.doc
                    .index_in_parent(before)
                    .ok_or(MutationError::NotAChild { parent, node: before })?
            }
        };
        self.insert_at(parent, index, node)
    }
}
