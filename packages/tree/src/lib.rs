//! # Wedge Tree
//!
//! The mutable node tree edited by `wedge-editor`.
//!
//! ```text
//! Document (arena)
//!   NodeId ──► Element { name, attributes, children }
//!          ──► Text
//!          ──► Fragment (detached carrier)
//!   NodeRef::Attribute { owner, name } addresses attribute values
//! ```
//!
//! The raw mutating methods build initial trees and back the editor's
//! mutation surface. Once a tree is handed to the editor, structural edits
//! should go through its mutator so that listeners see them.

pub mod document;
pub mod error;
mod xml;

pub use document::{
    byte_index, split_chars, Document, DocumentId, Element, NodeId, NodeKind, NodeRef, NodeType,
};
pub use error::{TreeError, TreeResult};
