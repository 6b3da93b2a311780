use crate::document::NodeId;
use thiserror::Error;

pub type TreeResult<T> = Result<T, TreeError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node {0} is not an element")]
    NotElement(NodeId),

    #[error("Node {0} is not a text node")]
    NotText(NodeId),

    #[error("Node {0} is already attached to a parent")]
    AlreadyAttached(NodeId),

    #[error("Node {0} is detached")]
    Detached(NodeId),

    #[error("Inserting {node} under {parent} would create a cycle")]
    Cycle { parent: NodeId, node: NodeId },

    #[error("Index {index} out of bounds for {parent} with {len} children")]
    IndexOutOfBounds {
        parent: NodeId,
        index: usize,
        len: usize,
    },

    #[error("XML parse error: {0}")]
    Xml(String),
}

impl From<roxmltree::Error> for TreeError {
    fn from(e: roxmltree::Error) -> Self {
        TreeError::Xml(e.to_string())
    }
}
