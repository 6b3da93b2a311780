//! # Locations
//!
//! Immutable `(root, node, offset)` positions and `(start, end)` ranges over a
//! live tree.
//!
//! ## Offsets
//!
//! | node kind  | valid offsets          |
//! |------------|------------------------|
//! | element    | `0..=child_count`      |
//! | text       | `0..=chars`            |
//! | attribute  | `0..=chars of value`   |
//!
//! A location is checked against the tree when it is built and whenever
//! [`Location::is_valid`] is called. Nothing keeps it valid afterwards: a
//! holder can only trust it as of the latest edit it has observed.
//!
//! ## Ordering
//!
//! [`Location::compare`] is a strict total order over locations sharing a
//! root. Every location maps to a sort key built from its path:
//!
//! ```text
//! element E, offset k     path(E) ++ [Slot(2k)]
//! text T, offset k        path(T) ++ [Slot(k)]
//! attribute E@a, offset k path(E) ++ [Attr(a, k)]
//! path(N)                 [Slot(2i + 1) for each child index i from root to N]
//! ```
//!
//! Boundaries between children take even slots and children odd slots, so a
//! position in a parent sorts before everything inside the child at that
//! index and after everything inside the previous one. Attributes sort after
//! the position just before their owner and before its content, ordered by
//! name.

use crate::root::{LocationRoot, PathError};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use thiserror::Error;
use wedge_tree::{Document, NodeId, NodeRef};

pub type LocationResult<T> = Result<T, LocationError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("Node {0} has not been marked as a root")]
    RootNotMarked(NodeId),

    #[error("Node {0} is not in the root")]
    NodeNotInRoot(NodeRef),

    #[error("Negative offset {0} is not allowed")]
    NegativeOffset(isize),

    #[error("Offset {offset} is greater than {max}, the length of {node}")]
    OffsetOutOfRange {
        node: NodeRef,
        offset: usize,
        max: usize,
    },

    #[error("Called with an absent node")]
    AbsentNode,

    #[error("Node {0} has no parent")]
    NoParent(NodeRef),

    #[error("Cannot make a range from an attribute location")]
    AttributeNode,

    #[error("Locations do not share a root")]
    DifferentRoots,

    #[error("Cannot make a range from an invalid location")]
    InvalidRange,

    #[error(transparent)]
    Path(#[from] PathError),
}

/// A node, offset pair without its root
pub type Caret = (NodeRef, usize);

/// Anything that can name the root of a location
pub trait IntoLocationRoot {
    fn into_location_root(self, doc: &Document) -> LocationResult<LocationRoot>;
}

impl IntoLocationRoot for LocationRoot {
    fn into_location_root(self, doc: &Document) -> LocationResult<LocationRoot> {
        self.check_document(doc)?;
        Ok(self)
    }
}

impl IntoLocationRoot for NodeId {
    fn into_location_root(self, doc: &Document) -> LocationResult<LocationRoot> {
        LocationRoot::get(doc, self).ok_or(LocationError::RootNotMarked(self))
    }
}

impl IntoLocationRoot for &LocationRoot {
    fn into_location_root(self, doc: &Document) -> LocationResult<LocationRoot> {
        (*self).into_location_root(doc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart<'a> {
    Attribute(&'a str, usize),
    Slot(usize),
}

/// An immutable position in a marked tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    root: LocationRoot,
    node: NodeRef,
    offset: usize,
}

impl Location {
    /// Builds a location.
    ///
    /// With `offset` set to `None` the location points at `node` itself: the
    /// node becomes its parent and the offset its index there. An absent
    /// `node` yields `Ok(None)`. With `normalize`, offsets outside the valid
    /// range are clamped instead of rejected.
    pub fn make(
        doc: &Document,
        root: impl IntoLocationRoot,
        node: Option<NodeRef>,
        offset: Option<isize>,
        normalize: bool,
    ) -> LocationResult<Option<Location>> {
        let Some(node) = node else {
            return Ok(None);
        };
        let root = root.into_location_root(doc)?;
        Self::build(doc, root, node, offset, normalize).map(Some)
    }

    /// Like [`make`](Self::make) but an absent node is an error.
    pub fn must_make(
        doc: &Document,
        root: impl IntoLocationRoot,
        node: Option<NodeRef>,
        offset: Option<isize>,
        normalize: bool,
    ) -> LocationResult<Location> {
        Self::make(doc, root, node, offset, normalize)?.ok_or(LocationError::AbsentNode)
    }

    /// Builds a location from a node, offset pair.
    pub fn from_caret(
        doc: &Document,
        root: impl IntoLocationRoot,
        caret: Option<Caret>,
        normalize: bool,
    ) -> LocationResult<Option<Location>> {
        match caret {
            Some((node, offset)) => {
                Self::make(doc, root, Some(node), Some(to_signed(offset)), normalize)
            }
            None => Ok(None),
        }
    }

    /// Strict constructor for a known node and offset.
    pub fn new(
        doc: &Document,
        root: impl IntoLocationRoot,
        node: impl Into<NodeRef>,
        offset: usize,
    ) -> LocationResult<Location> {
        let root = root.into_location_root(doc)?;
        Self::build(doc, root, node.into(), Some(to_signed(offset)), false)
    }

    fn build(
        doc: &Document,
        root: LocationRoot,
        node: NodeRef,
        offset: Option<isize>,
        normalize: bool,
    ) -> LocationResult<Location> {
        let (node, offset) = match offset {
            None => {
                let id = node
                    .as_node()
                    .ok_or_else(|| LocationError::NoParent(node.clone()))?;
                let parent = doc
                    .parent(id)
                    .ok_or_else(|| LocationError::NoParent(node.clone()))?;
                let index = doc
                    .index_in_parent(id)
                    .ok_or_else(|| LocationError::NoParent(node.clone()))?;
                (NodeRef::Node(parent), index)
            }
            Some(offset) if offset < 0 => {
                if normalize {
                    (node, 0)
                } else {
                    return Err(LocationError::NegativeOffset(offset));
                }
            }
            Some(offset) => (node, offset as usize),
        };

        if !root.contains(doc, &node) {
            return Err(LocationError::NodeNotInRoot(node));
        }

        let max = doc
            .length(&node)
            .ok_or_else(|| LocationError::NodeNotInRoot(node.clone()))?;
        let offset = if offset > max {
            if normalize {
                max
            } else {
                return Err(LocationError::OffsetOutOfRange { node, offset, max });
            }
        } else {
            offset
        };

        Ok(Location { root, node, offset })
    }

    pub fn root(&self) -> LocationRoot {
        self.root
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn to_caret(&self) -> Caret {
        (self.node.clone(), self.offset)
    }

    /// A new location in the same root. `None` offset points at `node`.
    pub fn make_at(
        &self,
        doc: &Document,
        node: impl Into<NodeRef>,
        offset: Option<usize>,
    ) -> LocationResult<Location> {
        Self::build(doc, self.root, node.into(), offset.map(to_signed), false)
    }

    /// Same node with another offset; returns `self` when the offset is unchanged.
    pub fn make_with_offset(&self, doc: &Document, offset: usize) -> LocationResult<Cow<'_, Location>> {
        if offset == self.offset {
            return Ok(Cow::Borrowed(self));
        }
        self.make_at(doc, self.node.clone(), Some(offset))
            .map(Cow::Owned)
    }

    /// Clamps the offset to the node's current length; returns `self` when
    /// nothing needs to change.
    pub fn normalize_offset(&self, doc: &Document) -> Cow<'_, Location> {
        match doc.length(&self.node) {
            Some(max) if self.offset > max => Cow::Owned(Location {
                offset: max,
                ..self.clone()
            }),
            _ => Cow::Borrowed(self),
        }
    }

    /// Whether the node is still under the root and the offset within bounds.
    pub fn is_valid(&self, doc: &Document) -> bool {
        self.root.contains(doc, &self.node)
            && doc
                .length(&self.node)
                .is_some_and(|max| self.offset <= max)
    }

    /// The child at the offset for elements, the node itself otherwise.
    pub fn pointed_node(&self, doc: &Document) -> Option<NodeRef> {
        match &self.node {
            NodeRef::Node(id) if doc.is_element(*id) => {
                doc.child(*id, self.offset).map(NodeRef::Node)
            }
            other => Some(other.clone()),
        }
    }

    /// The location just before this location's node, in its parent.
    pub fn location_in_parent(&self, doc: &Document) -> LocationResult<Location> {
        let (parent, index) = self.parent_position(doc)?;
        Self::build(doc, self.root, NodeRef::Node(parent), Some(to_signed(index)), false)
    }

    /// The location just after this location's node, in its parent.
    pub fn location_after_in_parent(&self, doc: &Document) -> LocationResult<Location> {
        let (parent, index) = self.parent_position(doc)?;
        Self::build(
            doc,
            self.root,
            NodeRef::Node(parent),
            Some(to_signed(index + 1)),
            false,
        )
    }

    fn parent_position(&self, doc: &Document) -> LocationResult<(NodeId, usize)> {
        let id = self
            .node
            .as_node()
            .ok_or_else(|| LocationError::NoParent(self.node.clone()))?;
        if id == self.root.node() {
            return Err(LocationError::NodeNotInRoot(self.node.clone()));
        }
        match (doc.parent(id), doc.index_in_parent(id)) {
            (Some(parent), Some(index)) => Ok((parent, index)),
            _ => Err(LocationError::NoParent(self.node.clone())),
        }
    }

    /// Same node and offset. Absent `other` is never equal.
    pub fn equals(&self, other: Option<&Location>) -> bool {
        other.is_some_and(|other| self.node == other.node && self.offset == other.offset)
    }

    /// Document order of two locations sharing a root.
    pub fn compare(&self, doc: &Document, other: &Location) -> LocationResult<Ordering> {
        if self.root != other.root {
            return Err(LocationError::DifferentRoots);
        }
        if self.equals(Some(other)) {
            return Ok(Ordering::Equal);
        }
        Ok(self.sort_key(doc)?.cmp(&other.sort_key(doc)?))
    }

    fn sort_key(&self, doc: &Document) -> LocationResult<Vec<KeyPart<'_>>> {
        let not_in_root = || LocationError::NodeNotInRoot(self.node.clone());
        if !self.root.contains(doc, &self.node) {
            return Err(not_in_root());
        }
        let path = doc
            .index_path(self.root.node(), self.node.anchor())
            .ok_or_else(not_in_root)?;

        let mut key: Vec<KeyPart<'_>> = path.into_iter().map(|i| KeyPart::Slot(2 * i + 1)).collect();
        key.push(match &self.node {
            NodeRef::Attribute { name, .. } => KeyPart::Attribute(name, self.offset),
            NodeRef::Node(id) if doc.is_text(*id) => KeyPart::Slot(self.offset),
            NodeRef::Node(_) => KeyPart::Slot(2 * self.offset),
        });
        Ok(key)
    }

    /// A document-ordered range from this location to `other` (collapsed when
    /// `other` is `None`). `None` if either endpoint is currently invalid.
    pub fn make_range(
        &self,
        doc: &Document,
        other: Option<&Location>,
    ) -> LocationResult<Option<RangeInfo>> {
        let Some(range) = self.make_location_range(doc, other)? else {
            return Ok(None);
        };
        let reversed = range.start.compare(doc, &range.end)? == Ordering::Greater;
        let range = if reversed {
            LocationRange {
                start: range.end,
                end: range.start,
            }
        } else {
            range
        };
        Ok(Some(RangeInfo { range, reversed }))
    }

    pub fn must_make_range(&self, doc: &Document, other: Option<&Location>) -> LocationResult<RangeInfo> {
        self.make_range(doc, other)?
            .ok_or(LocationError::InvalidRange)
    }

    /// A range from this location to `other`, endpoints kept as given.
    pub fn make_location_range(
        &self,
        doc: &Document,
        other: Option<&Location>,
    ) -> LocationResult<Option<LocationRange>> {
        let other = other.unwrap_or(self);
        if self.node.is_attribute() || other.node.is_attribute() {
            return Err(LocationError::AttributeNode);
        }
        if self.root != other.root {
            return Err(LocationError::DifferentRoots);
        }
        if !self.is_valid(doc) || !other.is_valid(doc) {
            return Ok(None);
        }
        Ok(Some(LocationRange {
            start: self.clone(),
            end: other.clone(),
        }))
    }

    pub fn must_make_location_range(
        &self,
        doc: &Document,
        other: Option<&Location>,
    ) -> LocationResult<LocationRange> {
        self.make_location_range(doc, other)?
            .ok_or(LocationError::InvalidRange)
    }
}

fn to_signed(offset: usize) -> isize {
    isize::try_from(offset).unwrap_or(isize::MAX)
}

/// A range in document order plus whether it was built backwards
#[derive(Debug, Clone, PartialEq)]
pub struct RangeInfo {
    pub range: LocationRange,
    pub reversed: bool,
}

/// An immutable pair of locations sharing a root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationRange {
    start: Location,
    end: Location,
}

impl LocationRange {
    pub fn new(start: Location, end: Location) -> LocationResult<Self> {
        if start.root != end.root {
            return Err(LocationError::DifferentRoots);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> &Location {
        &self.start
    }

    pub fn end(&self) -> &Location {
        &self.end
    }

    pub fn collapsed(&self) -> bool {
        self.start.equals(Some(&self.end))
    }

    /// Whether `start <= point <= end`.
    pub fn contains(&self, doc: &Document, point: &Location) -> LocationResult<bool> {
        Ok(self.start.compare(doc, point)? != Ordering::Greater
            && point.compare(doc, &self.end)? != Ordering::Greater)
    }

    pub fn is_valid(&self, doc: &Document) -> bool {
        self.start.is_valid(doc) && self.end.is_valid(doc)
    }

    pub fn equals(&self, other: Option<&LocationRange>) -> bool {
        other.is_some_and(|other| {
            self.start.equals(Some(&other.start)) && self.end.equals(Some(&other.end))
        })
    }

    /// This range in document order; `None` if an endpoint is invalid.
    pub fn range_info(&self, doc: &Document) -> LocationResult<Option<RangeInfo>> {
        self.start.make_range(doc, Some(&self.end))
    }
}
