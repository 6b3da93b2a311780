//! # Node Arena
//!
//! The mutable node tree that the editor core addresses and edits.
//!
//! ## Model
//!
//! ```text
//! Document
//! ├── id: DocumentId          # process-unique identity
//! └── nodes: Vec<NodeData>    # arena, indexed by NodeId
//!     ├── Element { name, attributes (by name), children }
//!     ├── Text(String)
//!     └── Fragment(children)  # detached carrier, never attachable
//! ```
//!
//! Nodes are never freed. Removing a node only detaches it, so anything that
//! still holds its `NodeId` (notifications, cut results, undo records) can keep
//! reading it.
//!
//! Attributes are not arena nodes. They are addressed through
//! [`NodeRef::Attribute`], which names the owning element and the attribute.
//!
//! The mutating methods here are raw: they keep parent/child links consistent
//! but know nothing about notifications or text normalization. They exist to
//! build the initial tree and as the backend of the editor's mutation surface.

use crate::error::{TreeError, TreeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a node stored in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-unique identity of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc{}", self.0)
    }
}

/// Anything a location can point into: an arena node or an attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Node(NodeId),
    Attribute { owner: NodeId, name: String },
}

impl NodeRef {
    pub fn attribute(owner: NodeId, name: impl Into<String>) -> Self {
        NodeRef::Attribute {
            owner,
            name: name.into(),
        }
    }

    /// The arena node, if this is not an attribute
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            NodeRef::Node(id) => Some(*id),
            NodeRef::Attribute { .. } => None,
        }
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, NodeRef::Attribute { .. })
    }

    /// The node that anchors this reference in the tree: the node itself, or
    /// the owner element of an attribute.
    pub fn anchor(&self) -> NodeId {
        match self {
            NodeRef::Node(id) => *id,
            NodeRef::Attribute { owner, .. } => *owner,
        }
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Node(id)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Node(id) => write!(f, "{}", id),
            NodeRef::Attribute { owner, name } => write!(f, "{}@{}", owner, name),
        }
    }
}

/// Discriminant of what a [`NodeRef`] addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Element,
    Text,
    Attribute,
    Fragment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element(Element),
    Text(String),
    Fragment(Vec<NodeId>),
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    kind: NodeKind,
}

/// Arena-backed node tree
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    nodes: Vec<NodeData>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            id: DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed)),
            nodes: Vec::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Number of nodes ever created in this document (attached or not)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData { parent: None, kind });
        id
    }

    fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.index())
    }

    fn data_mut(&mut self, id: NodeId) -> TreeResult<&mut NodeData> {
        self.nodes.get_mut(id.index()).ok_or(TreeError::UnknownNode(id))
    }

    // ---- construction ----

    pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element(Element {
            name: name.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    /// Creates a fragment holding `children`, which must all be detached.
    pub fn create_fragment(&mut self, children: &[NodeId]) -> TreeResult<NodeId> {
        for &child in children {
            if self.data(child).is_none() {
                return Err(TreeError::UnknownNode(child));
            }
            if self.parent(child).is_some() {
                return Err(TreeError::AlreadyAttached(child));
            }
        }
        let id = self.alloc(NodeKind::Fragment(children.to_vec()));
        for &child in children {
            self.data_mut(child)?.parent = Some(id);
        }
        Ok(id)
    }

    /// Builder helper: creates an element with attributes and appends it.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        attributes: &[(&str, &str)],
    ) -> TreeResult<NodeId> {
        let el = self.create_element(name);
        for (attr, value) in attributes {
            self.set_attribute(el, attr, Some(value.to_string()))?;
        }
        self.append_child(parent, el)?;
        Ok(el)
    }

    /// Builder helper: creates a text node and appends it.
    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> TreeResult<NodeId> {
        let node = self.create_text(text);
        self.append_child(parent, node)?;
        Ok(node)
    }

    // ---- node access ----

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.data(id).map(|d| &d.kind)
    }

    /// What `node` addresses, or `None` for unknown nodes and missing attributes.
    pub fn node_type(&self, node: &NodeRef) -> Option<NodeType> {
        match node {
            NodeRef::Node(id) => self.data(*id).map(|d| match d.kind {
                NodeKind::Element(_) => NodeType::Element,
                NodeKind::Text(_) => NodeType::Text,
                NodeKind::Fragment(_) => NodeType::Fragment,
            }),
            NodeRef::Attribute { owner, name } => self
                .attribute(*owner, name)
                .map(|_| NodeType::Attribute),
        }
    }

    pub fn exists(&self, node: &NodeRef) -> bool {
        self.node_type(node).is_some()
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Element(_)))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Text(_)))
    }

    pub fn is_fragment(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Fragment(_)))
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.kind(id) {
            Some(NodeKind::Element(el)) => Some(el),
            _ => None,
        }
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.name.as_str())
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)
            .and_then(|el| el.attributes.get(name))
            .map(String::as_str)
    }

    /// Attribute names and values, ordered by name
    pub fn attributes(&self, id: NodeId) -> impl Iterator<Item = (&str, &str)> {
        self.element(id)
            .into_iter()
            .flat_map(|el| el.attributes.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whitespace-separated tokens of the `class` attribute
    pub fn classes(&self, id: NodeId) -> impl Iterator<Item = &str> {
        self.attribute(id, "class")
            .into_iter()
            .flat_map(str::split_whitespace)
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.classes(id).any(|c| c == class)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).and_then(|d| d.parent)
    }

    /// Children of an element or fragment; empty for anything else.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.kind(id) {
            Some(NodeKind::Element(el)) => &el.children,
            Some(NodeKind::Fragment(children)) => children,
            _ => &[],
        }
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index.checked_sub(1).and_then(|i| self.child(parent, i))
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.child(parent, index + 1)
    }

    /// Length used to bound offsets: child count for elements, characters for
    /// text, characters of the value for attributes.
    pub fn length(&self, node: &NodeRef) -> Option<usize> {
        match node {
            NodeRef::Node(id) => match self.kind(*id)? {
                NodeKind::Element(el) => Some(el.children.len()),
                NodeKind::Text(text) => Some(text.chars().count()),
                NodeKind::Fragment(children) => Some(children.len()),
            },
            NodeRef::Attribute { owner, name } => {
                self.attribute(*owner, name).map(|v| v.chars().count())
            }
        }
    }

    /// Whether `node` is `ancestor` or one of its descendants.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Ancestors of `id`, nearest first, not including `id`.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// Descendants of `id` in document order, not including `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Concatenated text of `id` and its descendants
    pub fn text_content(&self, id: NodeId) -> String {
        match self.kind(id) {
            Some(NodeKind::Text(text)) => text.clone(),
            Some(_) => self
                .descendants(id)
                .into_iter()
                .filter_map(|d| self.text(d))
                .collect(),
            None => String::new(),
        }
    }

    // ---- raw mutation ----

    /// Inserts detached `node` as child `index` of `parent`.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, node: NodeId) -> TreeResult<()> {
        if self.data(node).is_none() {
            return Err(TreeError::UnknownNode(node));
        }
        if self.parent(node).is_some() {
            return Err(TreeError::AlreadyAttached(node));
        }
        if self.contains(node, parent) {
            return Err(TreeError::Cycle { parent, node });
        }
        match &mut self.data_mut(parent)?.kind {
            NodeKind::Element(Element { children, .. }) | NodeKind::Fragment(children) => {
                if index > children.len() {
                    return Err(TreeError::IndexOutOfBounds {
                        parent,
                        index,
                        len: children.len(),
                    });
                }
                children.insert(index, node);
            }
            NodeKind::Text(_) => return Err(TreeError::NotElement(parent)),
        }
        self.data_mut(node)?.parent = Some(parent);
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, node: NodeId) -> TreeResult<()> {
        let index = self.child_count(parent);
        self.insert_child(parent, index, node)
    }

    /// Detaches `node` from its parent, returning the former parent and index.
    pub fn detach(&mut self, node: NodeId) -> TreeResult<(NodeId, usize)> {
        let parent = self.parent(node).ok_or(TreeError::Detached(node))?;
        let index = self.index_in_parent(node).ok_or(TreeError::Detached(node))?;
        match &mut self.data_mut(parent)?.kind {
            NodeKind::Element(Element { children, .. }) | NodeKind::Fragment(children) => {
                children.remove(index);
            }
            NodeKind::Text(_) => return Err(TreeError::NotElement(parent)),
        }
        self.data_mut(node)?.parent = None;
        Ok((parent, index))
    }

    /// Replaces the content of a text node, returning the previous content.
    pub fn replace_text(&mut self, node: NodeId, text: impl Into<String>) -> TreeResult<String> {
        match &mut self.data_mut(node)?.kind {
            NodeKind::Text(current) => Ok(std::mem::replace(current, text.into())),
            _ => Err(TreeError::NotText(node)),
        }
    }

    /// Sets (`Some`) or removes (`None`) an attribute, returning the previous value.
    pub fn set_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        value: Option<String>,
    ) -> TreeResult<Option<String>> {
        match &mut self.data_mut(node)?.kind {
            NodeKind::Element(el) => Ok(match value {
                Some(value) => el.attributes.insert(name.to_string(), value),
                None => el.attributes.remove(name),
            }),
            _ => Err(TreeError::NotElement(node)),
        }
    }

    /// Copies `node` without its children; the copy is detached.
    pub fn shallow_clone(&mut self, node: NodeId) -> TreeResult<NodeId> {
        let kind = match self.kind(node).ok_or(TreeError::UnknownNode(node))? {
            NodeKind::Element(el) => NodeKind::Element(Element {
                name: el.name.clone(),
                attributes: el.attributes.clone(),
                children: Vec::new(),
            }),
            NodeKind::Text(text) => NodeKind::Text(text.clone()),
            NodeKind::Fragment(_) => NodeKind::Fragment(Vec::new()),
        };
        Ok(self.alloc(kind))
    }

    /// Copies `node` and its subtree; the copy is detached.
    pub fn deep_clone(&mut self, node: NodeId) -> TreeResult<NodeId> {
        let copy = self.shallow_clone(node)?;
        for child in self.children(node).to_vec() {
            let child_copy = self.deep_clone(child)?;
            self.append_child(copy, child_copy)?;
        }
        Ok(copy)
    }

    /// Follows the child indices of `path` from `from`.
    pub fn descend(&self, from: NodeId, path: &[usize]) -> Option<NodeId> {
        path.iter()
            .try_fold(from, |node, &index| self.child(node, index))
    }

    /// Child indices leading from `ancestor` down to `node`.
    pub fn index_path(&self, ancestor: NodeId, node: NodeId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = node;
        while current != ancestor {
            path.push(self.index_in_parent(current)?);
            current = self.parent(current)?;
        }
        path.reverse();
        Some(path)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte index of the `offset`-th character of `text`, clamped to its end.
pub fn byte_index(text: &str, offset: usize) -> usize {
    text.char_indices()
        .nth(offset)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Splits `text` at a character offset.
pub fn split_chars(text: &str, offset: usize) -> (&str, &str) {
    text.split_at(byte_index(text, offset))
}
