//! # Change Dispatcher
//!
//! Turns the mutator's primitive notifications into semantic events and
//! delivers them to handlers filtered by selector.
//!
//! ## Events
//!
//! ```text
//! InsertNodeAt      children-changed   (parent)
//!                   added-element      (node)
//!                   included-element   (node and its descendants, top-down)
//! BeforeDeleteNode  children-changing  (parent)
//!                   removing-element   (node)
//!                   excluding-element  (node and its descendants, bottom-up)
//! DeleteNode        children-changed   (former parent)
//!                   removed-element    (node)
//!                   excluded-element   (node and its descendants, bottom-up)
//! SetTextNodeValue  text-changed       (parent of the text node)
//! SetAttribute      attribute-changed  (element)
//! ```
//!
//! The name in parentheses is what the handler's selector is matched against.
//!
//! ## Triggers
//!
//! Handlers can schedule named triggers. Scheduling the same name twice
//! before a drain runs its handlers once. Handlers run during a drain may
//! schedule more triggers; the drain keeps going until the queue is empty.
//! Handlers only see the document read-only, so a drain can never re-enter
//! itself.

use crate::config::{DispatcherConfig, DrainPolicy};
use crate::mutator::TreeMutator;
use crate::notification::{Notification, NotificationListener};
use crate::root::LocationRoot;
use crate::selector::{Matcher, Selector, SelectorError};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace, warn};
use wedge_tree::{Document, NodeId};

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Unknown event kind: {0}")]
    UnknownEvent(String),

    #[error(transparent)]
    Selector(#[from] SelectorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    IncludedElement,
    AddedElement,
    ExcludedElement,
    ExcludingElement,
    RemovedElement,
    RemovingElement,
    ChildrenChanged,
    ChildrenChanging,
    TextChanged,
    AttributeChanged,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::IncludedElement,
        EventKind::AddedElement,
        EventKind::ExcludedElement,
        EventKind::ExcludingElement,
        EventKind::RemovedElement,
        EventKind::RemovingElement,
        EventKind::ChildrenChanged,
        EventKind::ChildrenChanging,
        EventKind::TextChanged,
        EventKind::AttributeChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::IncludedElement => "included-element",
            EventKind::AddedElement => "added-element",
            EventKind::ExcludedElement => "excluded-element",
            EventKind::ExcludingElement => "excluding-element",
            EventKind::RemovedElement => "removed-element",
            EventKind::RemovingElement => "removing-element",
            EventKind::ChildrenChanged => "children-changed",
            EventKind::ChildrenChanging => "children-changing",
            EventKind::TextChanged => "text-changed",
            EventKind::AttributeChanged => "attribute-changed",
        }
    }
}

impl FromStr for EventKind {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DispatchError::UnknownEvent(s.to_string()))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subtree entering or leaving the tree, reported once per matching element
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtreeChange {
    /// Top of the inserted or removed subtree
    pub tree: NodeId,
    pub parent: NodeId,
    pub previous_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    /// The matching element, `tree` itself or one of its descendants
    pub element: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementChange {
    pub parent: NodeId,
    pub previous_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub element: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildrenChange {
    pub parent: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub previous_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChange {
    pub node: NodeId,
    pub old_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeChange {
    pub element: NodeId,
    pub name: String,
    pub old_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ChangeEvent {
    IncludedElement(SubtreeChange),
    AddedElement(ElementChange),
    ExcludedElement(SubtreeChange),
    ExcludingElement(SubtreeChange),
    RemovedElement(ElementChange),
    RemovingElement(ElementChange),
    ChildrenChanged(ChildrenChange),
    ChildrenChanging(ChildrenChange),
    TextChanged(TextChange),
    AttributeChanged(AttributeChange),
}

impl ChangeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::IncludedElement(_) => EventKind::IncludedElement,
            ChangeEvent::AddedElement(_) => EventKind::AddedElement,
            ChangeEvent::ExcludedElement(_) => EventKind::ExcludedElement,
            ChangeEvent::ExcludingElement(_) => EventKind::ExcludingElement,
            ChangeEvent::RemovedElement(_) => EventKind::RemovedElement,
            ChangeEvent::RemovingElement(_) => EventKind::RemovingElement,
            ChangeEvent::ChildrenChanged(_) => EventKind::ChildrenChanged,
            ChangeEvent::ChildrenChanging(_) => EventKind::ChildrenChanging,
            ChangeEvent::TextChanged(_) => EventKind::TextChanged,
            ChangeEvent::AttributeChanged(_) => EventKind::AttributeChanged,
        }
    }

    /// The element the handler's selector matched.
    pub fn element(&self) -> Option<NodeId> {
        match self {
            ChangeEvent::IncludedElement(c)
            | ChangeEvent::ExcludedElement(c)
            | ChangeEvent::ExcludingElement(c) => Some(c.element),
            ChangeEvent::AddedElement(c)
            | ChangeEvent::RemovedElement(c)
            | ChangeEvent::RemovingElement(c) => Some(c.element),
            ChangeEvent::ChildrenChanged(c) | ChangeEvent::ChildrenChanging(c) => Some(c.parent),
            ChangeEvent::AttributeChanged(c) => Some(c.element),
            ChangeEvent::TextChanged(_) => None,
        }
    }
}

/// Pending trigger names in scheduling order, without duplicates
#[derive(Debug, Default)]
pub struct TriggerQueue {
    pending: IndexSet<String>,
}

impl TriggerQueue {
    /// Returns false when `name` was already pending.
    pub fn push(&mut self, name: &str) -> bool {
        let added = self.pending.insert(name.to_string());
        if !added {
            trace!(trigger = name, "Trigger already pending");
        }
        added
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pending.contains(name)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn take(&mut self) -> Vec<String> {
        self.pending.drain(..).collect()
    }
}

/// What a handler gets to work with
pub struct HandlerContext<'a> {
    pub doc: &'a Document,
    pub root: LocationRoot,
    queue: &'a mut TriggerQueue,
}

impl HandlerContext<'_> {
    pub fn trigger(&mut self, name: &str) {
        self.queue.push(name);
    }
}

type EventHandler = Box<dyn FnMut(&mut HandlerContext<'_>, &ChangeEvent)>;
type TriggerHandler = Box<dyn FnMut(&mut HandlerContext<'_>)>;

struct HandlerEntry {
    matcher: Box<dyn Matcher>,
    callback: EventHandler,
}

#[derive(Clone, Copy)]
enum Scope {
    Node,
    TopDown,
    BottomUp,
}

pub struct ChangeDispatcher {
    root: LocationRoot,
    config: DispatcherConfig,
    listening: bool,
    handlers: IndexMap<EventKind, Vec<HandlerEntry>>,
    trigger_handlers: IndexMap<String, Vec<TriggerHandler>>,
    queue: TriggerQueue,
}

impl fmt::Debug for ChangeDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeDispatcher")
            .field("root", &self.root)
            .field("listening", &self.listening)
            .field("handlers", &self.handlers.values().map(Vec::len).sum::<usize>())
            .field("triggers", &self.trigger_handlers.keys().collect::<Vec<_>>())
            .field("pending", &self.queue)
            .finish()
    }
}

impl ChangeDispatcher {
    pub fn new(root: LocationRoot, config: DispatcherConfig) -> Self {
        Self {
            root,
            listening: config.start_listening,
            config,
            handlers: IndexMap::new(),
            trigger_handlers: IndexMap::new(),
            queue: TriggerQueue::default(),
        }
    }

    /// Creates a dispatcher for the mutator's root and subscribes it.
    pub fn attach(mutator: &mut TreeMutator, config: DispatcherConfig) -> Rc<RefCell<Self>> {
        let dispatcher = Rc::new(RefCell::new(Self::new(mutator.root(), config)));
        mutator.subscribe(dispatcher.clone());
        dispatcher
    }

    pub fn root(&self) -> LocationRoot {
        self.root
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Registers a handler for elements matching `selector`.
    pub fn add_handler(
        &mut self,
        kind: EventKind,
        selector: &str,
        handler: impl FnMut(&mut HandlerContext<'_>, &ChangeEvent) + 'static,
    ) -> DispatchResult<()> {
        let selector = Selector::parse(selector)?;
        debug!(event = %kind, selector = %selector, "Added handler");
        self.add_matcher_handler(kind, selector, handler);
        Ok(())
    }

    pub fn add_matcher_handler(
        &mut self,
        kind: EventKind,
        matcher: impl Matcher + 'static,
        handler: impl FnMut(&mut HandlerContext<'_>, &ChangeEvent) + 'static,
    ) {
        self.handlers.entry(kind).or_default().push(HandlerEntry {
            matcher: Box::new(matcher),
            callback: Box::new(handler),
        });
    }

    pub fn add_trigger_handler(&mut self, name: &str, handler: impl FnMut(&mut HandlerContext<'_>) + 'static) {
        debug!(trigger = name, "Added trigger handler");
        self.trigger_handlers
            .entry(name.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    pub fn start_listening(&mut self) {
        debug!(root = %self.root.node(), "Dispatcher listening");
        self.listening = true;
    }

    pub fn stop_listening(&mut self) {
        debug!(root = %self.root.node(), "Dispatcher stopped");
        self.listening = false;
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Schedules `name`; a name already pending is not scheduled twice.
    pub fn trigger(&mut self, name: &str) {
        if self.queue.push(name) {
            trace!(trigger = name, "Scheduled trigger");
        }
    }

    pub fn pending(&self) -> &TriggerQueue {
        &self.queue
    }

    /// Runs pending triggers, and the triggers they schedule, right away.
    pub fn process_immediately(&mut self, doc: &Document) {
        self.drain(doc);
    }

    /// Drops pending triggers without running them.
    pub fn clear_pending(&mut self) {
        if !self.queue.is_empty() {
            debug!(count = self.queue.len(), "Cleared pending triggers");
        }
        self.queue.clear();
    }

    fn drain(&mut self, doc: &Document) {
        let mut rounds = 0;
        while !self.queue.is_empty() {
            if rounds == self.config.max_drain_rounds {
                warn!(
                    rounds,
                    pending = self.queue.len(),
                    "Trigger cascade did not settle, dropping pending triggers"
                );
                self.queue.clear();
                return;
            }
            rounds += 1;
            trace!(round = rounds, pending = self.queue.len(), "Drain round");

            for name in self.queue.take() {
                let Some(handlers) = self.trigger_handlers.get_mut(&name) else {
                    continue;
                };
                trace!(trigger = %name, handlers = handlers.len(), "Firing trigger");
                for handler in handlers.iter_mut() {
                    let mut cx = HandlerContext {
                        doc,
                        root: self.root,
                        queue: &mut self.queue,
                    };
                    handler(&mut cx);
                }
            }
        }
    }

    fn dispatch(
        &mut self,
        doc: &Document,
        kind: EventKind,
        subject: NodeId,
        scope: Scope,
        make: impl Fn(NodeId) -> ChangeEvent,
    ) {
        let Some(entries) = self.handlers.get_mut(&kind) else {
            return;
        };
        let candidates: Vec<NodeId> = match scope {
            Scope::Node => vec![subject],
            Scope::TopDown => std::iter::once(subject).chain(doc.descendants(subject)).collect(),
            Scope::BottomUp => {
                let mut nodes: Vec<NodeId> =
                    std::iter::once(subject).chain(doc.descendants(subject)).collect();
                nodes.reverse();
                nodes
            }
        };

        for entry in entries.iter_mut() {
            let targets: Vec<NodeId> = candidates
                .iter()
                .copied()
                .filter(|&node| doc.is_element(node) && entry.matcher.matches(doc, node))
                .collect();
            for target in targets {
                let event = make(target);
                trace!(event = %kind, element = %target, "Dispatching");
                let mut cx = HandlerContext {
                    doc,
                    root: self.root,
                    queue: &mut self.queue,
                };
                (entry.callback)(&mut cx, &event);
            }
        }
    }

    fn on_insert(&mut self, doc: &Document, parent: NodeId, node: NodeId) {
        let previous_sibling = doc.previous_sibling(node);
        let next_sibling = doc.next_sibling(node);

        self.dispatch(doc, EventKind::ChildrenChanged, parent, Scope::Node, |parent| {
            ChangeEvent::ChildrenChanged(ChildrenChange {
                parent,
                added: vec![node],
                removed: Vec::new(),
                previous_sibling,
                next_sibling,
            })
        });
        if !doc.is_element(node) {
            return;
        }
        self.dispatch(doc, EventKind::AddedElement, node, Scope::Node, |element| {
            ChangeEvent::AddedElement(ElementChange {
                parent,
                previous_sibling,
                next_sibling,
                element,
            })
        });
        self.dispatch(doc, EventKind::IncludedElement, node, Scope::TopDown, |element| {
            ChangeEvent::IncludedElement(SubtreeChange {
                tree: node,
                parent,
                previous_sibling,
                next_sibling,
                element,
            })
        });
    }

    fn on_before_delete(&mut self, doc: &Document, node: NodeId) {
        let Some(parent) = doc.parent(node) else {
            return;
        };
        let previous_sibling = doc.previous_sibling(node);
        let next_sibling = doc.next_sibling(node);

        self.dispatch(doc, EventKind::ChildrenChanging, parent, Scope::Node, |parent| {
            ChangeEvent::ChildrenChanging(ChildrenChange {
                parent,
                added: Vec::new(),
                removed: vec![node],
                previous_sibling,
                next_sibling,
            })
        });
        if !doc.is_element(node) {
            return;
        }
        self.dispatch(doc, EventKind::RemovingElement, node, Scope::Node, |element| {
            ChangeEvent::RemovingElement(ElementChange {
                parent,
                previous_sibling,
                next_sibling,
                element,
            })
        });
        self.dispatch(doc, EventKind::ExcludingElement, node, Scope::BottomUp, |element| {
            ChangeEvent::ExcludingElement(SubtreeChange {
                tree: node,
                parent,
                previous_sibling,
                next_sibling,
                element,
            })
        });
    }

    fn on_delete(
        &mut self,
        doc: &Document,
        node: NodeId,
        parent: NodeId,
        previous_sibling: Option<NodeId>,
        next_sibling: Option<NodeId>,
    ) {
        self.dispatch(doc, EventKind::ChildrenChanged, parent, Scope::Node, |parent| {
            ChangeEvent::ChildrenChanged(ChildrenChange {
                parent,
                added: Vec::new(),
                removed: vec![node],
                previous_sibling,
                next_sibling,
            })
        });
        if !doc.is_element(node) {
            return;
        }
        self.dispatch(doc, EventKind::RemovedElement, node, Scope::Node, |element| {
            ChangeEvent::RemovedElement(ElementChange {
                parent,
                previous_sibling,
                next_sibling,
                element,
            })
        });
        self.dispatch(doc, EventKind::ExcludedElement, node, Scope::BottomUp, |element| {
            ChangeEvent::ExcludedElement(SubtreeChange {
                tree: node,
                parent,
                previous_sibling,
                next_sibling,
                element,
            })
        });
    }
}

impl NotificationListener for ChangeDispatcher {
    fn notify(&mut self, doc: &Document, notification: &Notification) {
        if !self.listening {
            return;
        }
        match notification {
            Notification::InsertNodeAt { parent, node, .. } => self.on_insert(doc, *parent, *node),
            Notification::BeforeDeleteNode { node } => self.on_before_delete(doc, *node),
            Notification::DeleteNode {
                node,
                former_parent,
                previous_sibling,
                next_sibling,
                ..
            } => self.on_delete(doc, *node, *former_parent, *previous_sibling, *next_sibling),
            Notification::SetTextNodeValue { node, old_value, .. } => {
                if let Some(parent) = doc.parent(*node) {
                    let node = *node;
                    self.dispatch(doc, EventKind::TextChanged, parent, Scope::Node, |_| {
                        ChangeEvent::TextChanged(TextChange {
                            node,
                            old_value: old_value.clone(),
                        })
                    });
                }
            }
            Notification::SetAttribute {
                node, name, old_value, ..
            } => {
                self.dispatch(doc, EventKind::AttributeChanged, *node, Scope::Node, |element| {
                    ChangeEvent::AttributeChanged(AttributeChange {
                        element,
                        name: name.clone(),
                        old_value: old_value.clone(),
                    })
                });
            }
            Notification::Changed => {
                if self.config.drain_policy == DrainPolicy::AfterEdit {
                    self.drain(doc);
                }
            }
            Notification::BeforeInsertNodeAt { .. } => {}
        }
    }
}
