//! Multi-node restructuring: splitting a subtree in two and cutting a range.
//!
//! `split_at` works on a detached deep copy of the subtree, so the live tree
//! only sees one removal followed by two insertions:
//!
//! ```text
//! <p>ab<i>c|d</i>ef</p>    split_at(p, "cd", 1)
//!
//! <p>ab<i>c</i></p><p><i>d</i>ef</p>
//! ```

use crate::location::{Location, LocationError};
use crate::mutator::{MutationError, MutationResult, TreeMutator};
use std::cmp::Ordering;
use wedge_tree::{split_chars, Document, NodeId};

/// Result of [`TreeMutator::cut`]
#[derive(Debug, Clone, PartialEq)]
pub struct CutResult {
    /// Where the removed content used to start
    pub caret: Location,
    /// Removed content in document order; all nodes are detached
    pub nodes: Vec<NodeId>,
}

impl TreeMutator {
    /// Splits `top` at `offset` of `node`, replacing it with two copies that
    /// hold the content before and after the split point.
    ///
    /// Every ancestor of `node` up to `top` is split along the way. A text
    /// node split at either end splits its parent before or after it.
    pub fn split_at(&mut self, top: NodeId, node: NodeId, offset: usize) -> MutationResult<(NodeId, NodeId)> {
        self.edit("split_at", |m| {
            if node == top && m.doc.is_text(node) {
                return Err(MutationError::WouldDenormalize(node));
            }
            let (parent, at) = m.detachable(top)?;
            if !m.doc.contains(top, node) {
                return Err(MutationError::NotInside { node, top });
            }
            if let Some(text) = m.doc.text(node) {
                let len = text.chars().count();
                if offset > len {
                    return Err(MutationError::OffsetOutOfRange { node, offset, len });
                }
            }

            let path = m
                .doc
                .index_path(top, node)
                .ok_or(MutationError::NotInside { node, top })?;
            let copy = m.doc.deep_clone(top)?;
            let copied = m
                .doc
                .descend(copy, &path)
                .ok_or(MutationError::NotInside { node, top })?;
            let (first, second) = split_detached(&mut m.doc, copy, copied, offset)?;

            m.delete_node(top)?;
            m.raw_insert(parent, at, first)?;
            m.raw_insert(parent, at + 1, second)?;
            Ok((first, second))
        })
    }

    /// Removes everything between two locations sharing a containing element.
    ///
    /// Partially covered text nodes are trimmed and the covered slices come
    /// back as new detached text nodes. Text left adjacent by the removal is
    /// merged.
    pub fn cut(&mut self, start: &Location, end: &Location) -> MutationResult<CutResult> {
        self.edit("cut", |m| {
            for loc in [start, end] {
                if loc.node().is_attribute() {
                    return Err(LocationError::AttributeNode.into());
                }
                if loc.root() != m.root() {
                    return Err(LocationError::DifferentRoots.into());
                }
                if !loc.is_valid(&m.doc) {
                    return Err(LocationError::InvalidRange.into());
                }
            }
            let (start, end) = match start.compare(&m.doc, end)? {
                Ordering::Equal => {
                    return Ok(CutResult {
                        caret: start.clone(),
                        nodes: Vec::new(),
                    })
                }
                Ordering::Less => (start, end),
                Ordering::Greater => (end, start),
            };

            let (mut start_node, mut start_offset) = (start.node().anchor(), start.offset());
            let (mut end_node, mut end_offset) = (end.node().anchor(), end.offset());
            if m.container(start_node)? != m.container(end_node)? {
                return Err(MutationError::IllFormedRange);
            }

            if m.doc.is_text(start_node) && start_offset == 0 {
                let (parent, at) = m.detachable(start_node)?;
                start_node = parent;
                start_offset = at;
            }

            let mut start_text = None;
            let mut caret = (start_node, start_offset);
            if let Some(text) = m.doc.text(start_node) {
                let (parent, at) = m.detachable(start_node)?;
                let same = start_node == end_node;
                let stop = if same { end_offset } else { text.chars().count() };
                let slice: String = text
                    .chars()
                    .skip(start_offset)
                    .take(stop.saturating_sub(start_offset))
                    .collect();

                if !slice.is_empty() {
                    let removed = slice.chars().count();
                    start_text = Some(m.doc.create_text(slice));
                    m.delete_text(start_node, start_offset, removed)?;
                }
                let survived = m.doc.parent(start_node).is_some();
                if !survived {
                    caret = (parent, at);
                }
                if same {
                    return Ok(CutResult {
                        caret: m.location(caret.0, caret.1)?,
                        nodes: start_text.into_iter().collect(),
                    });
                }
                start_node = parent;
                start_offset = if survived { at + 1 } else { at };
            }

            let mut end_text = None;
            if let Some(text) = m.doc.text(end_node) {
                let slice: String = text.chars().take(end_offset).collect();
                let (parent, at) = m.detachable(end_node)?;
                if !slice.is_empty() {
                    end_text = Some(m.doc.create_text(slice));
                    m.delete_text(end_node, 0, end_offset)?;
                }
                end_node = parent;
                end_offset = at;
            }

            if start_node != end_node {
                return Err(MutationError::IllFormedRange);
            }

            let mut removed = Vec::new();
            for index in (start_offset..end_offset).rev() {
                let child = m.doc.child(end_node, index).ok_or(MutationError::IndexOutOfBounds {
                    parent: end_node,
                    index,
                    len: m.doc.child_count(end_node),
                })?;
                m.delete_node(child)?;
                removed.push(child);
            }
            removed.reverse();

            let before = start_offset.checked_sub(1).and_then(|i| m.doc.child(end_node, i));
            if let Some(before) = before {
                let merges = m.doc.is_text(before)
                    && m.doc.next_sibling(before).is_some_and(|next| m.doc.is_text(next));
                let merged = m.merge_text_nodes(before)?;
                if merges {
                    caret = (before, merged.offset());
                }
            }

            let nodes = start_text
                .into_iter()
                .chain(removed)
                .chain(end_text)
                .collect();
            Ok(CutResult {
                caret: m.location(caret.0, caret.1)?,
                nodes,
            })
        })
    }

    /// The element holding positions of `node`: itself or its parent for text.
    fn container(&self, node: NodeId) -> MutationResult<NodeId> {
        if self.doc.is_text(node) {
            self.doc.parent(node).ok_or(MutationError::Detached(node))
        } else {
            Ok(node)
        }
    }
}

/// Splits a detached subtree in place. Returns `top` holding the content
/// before the split and a new copy of `top` holding the rest.
fn split_detached(doc: &mut Document, top: NodeId, node: NodeId, offset: usize) -> MutationResult<(NodeId, NodeId)> {
    let (mut current, mut index) = match doc.text(node) {
        Some(text) => {
            let parent = doc.parent(node).ok_or(MutationError::Detached(node))?;
            let at = doc.index_in_parent(node).ok_or(MutationError::Detached(node))?;
            let len = text.chars().count();
            if offset == 0 {
                (parent, at)
            } else if offset >= len {
                (parent, at + 1)
            } else {
                let (pre, post) = split_chars(text, offset);
                let (pre, post) = (pre.to_string(), post.to_string());
                doc.replace_text(node, pre)?;
                let rest = doc.create_text(post);
                doc.insert_child(parent, at + 1, rest)?;
                (parent, at + 1)
            }
        }
        None => (node, offset.min(doc.child_count(node))),
    };

    loop {
        let second = doc.shallow_clone(current)?;
        let moved = doc.children(current)[index..].to_vec();
        for child in moved {
            doc.detach(child)?;
            doc.append_child(second, child)?;
        }
        if current == top {
            return Ok((current, second));
        }

        let parent = doc.parent(current).ok_or(MutationError::Detached(current))?;
        let at = doc.index_in_parent(current).ok_or(MutationError::Detached(current))?;
        doc.insert_child(parent, at + 1, second)?;
        current = parent;
        index = at + 1;
    }
}
