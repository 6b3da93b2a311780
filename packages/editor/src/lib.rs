//! # Wedge Editor
//!
//! Editing core for structured (XML-like) documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ wedge-tree: arena Document, XML load/dump   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ root + location: marked roots, paths,       │
//! │ positions and ranges                        │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ mutator: the only way to edit a marked tree │
//! │  - validated operations                     │
//! │  - primitive notification stream            │
//! └─────────────────────────────────────────────┘
//!           ↓                       ↓
//! ┌──────────────────────┐ ┌─────────────────────┐
//! │ dispatcher: semantic │ │ undo_stack: replay  │
//! │ events + triggers    │ │ of recorded batches │
//! └──────────────────────┘ └─────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **One writer**: after marking, only `TreeMutator` changes the tree
//! 2. **Check, then edit**: a failed operation leaves the tree untouched
//! 3. **No adjacent text**: no element ever has two consecutive text children
//! 4. **Locations are snapshots**: valid as of the last observed edit only
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wedge_editor::{ChangeDispatcher, DispatcherConfig, EventKind, TreeMutator};
//! use wedge_tree::Document;
//!
//! let (doc, root) = Document::from_xml("<doc><p>abcd</p></doc>")?;
//! let mut mutator = TreeMutator::mark(doc, root)?;
//!
//! let dispatcher = ChangeDispatcher::attach(&mut mutator, DispatcherConfig::default());
//! dispatcher.borrow_mut().add_handler(EventKind::TextChanged, "p", |cx, event| {
//!     cx.trigger("revalidate");
//! })?;
//! dispatcher.borrow_mut().start_listening();
//!
//! let text = mutator.path_to_node("0/0")?.and_then(|n| n.as_node()).unwrap();
//! let caret = mutator.insert_text(text, 2, "Q", true)?.caret;
//! ```

mod config;
mod dispatcher;
mod errors;
mod location;
mod mutator;
mod notification;
mod restructure;
mod root;
mod selector;
mod undo_stack;

pub use config::{DispatcherConfig, DrainPolicy, DEFAULT_CONFIG_NAME};
pub use dispatcher::{
    AttributeChange, ChangeDispatcher, ChangeEvent, ChildrenChange, DispatchError,
    DispatchResult, ElementChange, EventKind, HandlerContext, SubtreeChange, TextChange,
    TriggerQueue,
};
pub use errors::{EditorError, EditorResult};
pub use location::{
    Caret, IntoLocationRoot, Location, LocationError, LocationRange, LocationResult, RangeInfo,
};
pub use mutator::{
    Insertable, MutationError, MutationResult, SharedListener, TextInsertion, TreeMutator,
};
pub use notification::{Notification, NotificationListener, NotificationLog};
pub use restructure::CutResult;
pub use root::{LocationRoot, PathError, PathResult};
pub use selector::{MatchAll, Matcher, Selector, SelectorError};
pub use undo_stack::{EditBatch, UndoStack};

// Re-export the tree types for convenience
pub use wedge_tree::{Document, DocumentId, NodeId, NodeRef, NodeType};
