//! Error types for the editor

use thiserror::Error;

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Tree error: {0}")]
    Tree(#[from] wedge_tree::TreeError),

    #[error("Path error: {0}")]
    Path(#[from] crate::root::PathError),

    #[error("Location error: {0}")]
    Location(#[from] crate::location::LocationError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] crate::mutator::MutationError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] crate::dispatcher::DispatchError),

    #[error("Selector error: {0}")]
    Selector(#[from] crate::selector::SelectorError),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}
