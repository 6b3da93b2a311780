//! # Location Roots
//!
//! A [`LocationRoot`] marks one node of a document as the origin that paths
//! and locations are relative to.
//!
//! ## Design
//!
//! Marks are kept out of band in a process-wide registry keyed by
//! `(DocumentId, NodeId)`, so the tree's own node representation carries no
//! editor state. A node can be marked once; marking it again fails.
//!
//! Paths are `/`-separated child indices from the root, with an optional
//! trailing `@name` segment addressing an attribute:
//!
//! ```text
//! <doc>                 ""
//!   <p>                 "0"
//!     "hello"           "0/0"
//!     <b type="x"/>     "0/1"
//!                       "0/1/@type"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock};
use thiserror::Error;
use tracing::debug;
use wedge_tree::{Document, DocumentId, NodeId, NodeRef};

pub type PathResult<T> = Result<T, PathError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("Node {0} is already marked as a root")]
    AlreadyMarked(NodeId),

    #[error("Invalid node {0}: absent or not a descendant of the root")]
    InvalidNode(NodeRef),

    #[error("Malformed path {path:?}: bad segment {segment:?}")]
    MalformedPath { path: String, segment: String },

    #[error("No marked root above {0}")]
    NoRoot(NodeRef),

    #[error("Root belongs to {expected}, not {found}")]
    ForeignDocument {
        expected: DocumentId,
        found: DocumentId,
    },
}

type Registry = HashMap<(DocumentId, NodeId), LocationRoot>;

fn registry() -> MutexGuard<'static, Registry> {
    static ROOTS: OnceLock<Mutex<Registry>> = OnceLock::new();
    ROOTS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The marked origin of a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationRoot {
    document: DocumentId,
    node: NodeId,
}

impl LocationRoot {
    /// Marks `node` as a root.
    pub fn mark(doc: &Document, node: NodeId) -> PathResult<LocationRoot> {
        if !doc.exists(&NodeRef::Node(node)) {
            return Err(PathError::InvalidNode(NodeRef::Node(node)));
        }

        let root = LocationRoot {
            document: doc.id(),
            node,
        };
        let mut roots = registry();
        if roots.contains_key(&(root.document, node)) {
            return Err(PathError::AlreadyMarked(node));
        }
        roots.insert((root.document, node), root);

        debug!(document = %root.document, node = %node, "Marked location root");
        Ok(root)
    }

    /// Removes the mark so the node may be marked again.
    pub fn unmark(self) {
        registry().remove(&(self.document, self.node));
        debug!(document = %self.document, node = %self.node, "Unmarked location root");
    }

    pub fn is_marked(&self) -> bool {
        registry().contains_key(&(self.document, self.node))
    }

    /// The root marked exactly at `node`, if any.
    pub fn get(doc: &Document, node: NodeId) -> Option<LocationRoot> {
        registry().get(&(doc.id(), node)).copied()
    }

    /// Nearest marked root at or above `node`.
    pub fn lookup(doc: &Document, node: &NodeRef) -> Option<LocationRoot> {
        let roots = registry();
        let start = node.anchor();
        std::iter::once(start)
            .chain(doc.ancestors(start))
            .find_map(|candidate| roots.get(&(doc.id(), candidate)).copied())
    }

    /// Like [`lookup`](Self::lookup) but fails when no root is found.
    pub fn get_root(doc: &Document, node: &NodeRef) -> PathResult<LocationRoot> {
        Self::lookup(doc, node).ok_or_else(|| PathError::NoRoot(node.clone()))
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub(crate) fn check_document(&self, doc: &Document) -> PathResult<()> {
        if doc.id() == self.document {
            Ok(())
        } else {
            Err(PathError::ForeignDocument {
                expected: self.document,
                found: doc.id(),
            })
        }
    }

    /// Whether `node` (or the owner of an attribute) is under this root.
    pub fn contains(&self, doc: &Document, node: &NodeRef) -> bool {
        doc.id() == self.document && doc.exists(node) && doc.contains(self.node, node.anchor())
    }

    /// Encodes `node` as a path relative to this root.
    pub fn encode(&self, doc: &Document, node: &NodeRef) -> PathResult<String> {
        self.check_document(doc)?;
        if !self.contains(doc, node) {
            return Err(PathError::InvalidNode(node.clone()));
        }

        let anchor = node.anchor();
        let indices = doc
            .index_path(self.node, anchor)
            .ok_or_else(|| PathError::InvalidNode(node.clone()))?;

        let mut segments: Vec<String> = indices.iter().map(usize::to_string).collect();
        if let NodeRef::Attribute { name, .. } = node {
            segments.push(format!("@{}", name));
        }
        Ok(segments.join("/"))
    }

    /// Decodes a path produced by [`encode`](Self::encode).
    ///
    /// Returns `Ok(None)` when the path is well formed but nothing lives
    /// there anymore.
    pub fn decode(&self, doc: &Document, path: &str) -> PathResult<Option<NodeRef>> {
        self.check_document(doc)?;
        if path.is_empty() {
            return Ok(Some(NodeRef::Node(self.node)));
        }

        let mut segments: Vec<&str> = path.split('/').collect();
        let attribute = match segments.last() {
            Some(last) if last.starts_with('@') => segments.pop().map(|s| &s[1..]),
            _ => None,
        };

        let mut current = self.node;
        let mut missing = false;
        for segment in segments {
            let index = parse_index(segment).ok_or_else(|| PathError::MalformedPath {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
            // Keep validating the remaining segments even once the node is gone.
            if missing {
                continue;
            }
            match doc.child(current, index) {
                Some(child) => current = child,
                None => missing = true,
            }
        }
        if missing {
            return Ok(None);
        }

        match attribute {
            None => Ok(Some(NodeRef::Node(current))),
            Some("") => Err(PathError::MalformedPath {
                path: path.to_string(),
                segment: "@".to_string(),
            }),
            Some(name) => {
                if !doc.is_element(current) {
                    return Err(PathError::MalformedPath {
                        path: path.to_string(),
                        segment: format!("@{}", name),
                    });
                }
                let attr = NodeRef::attribute(current, name);
                Ok(doc.exists(&attr).then_some(attr))
            }
        }
    }
}

fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}
