//! Semantic events derived from mutator notifications

use std::cell::RefCell;
use std::rc::Rc;
use wedge_editor::{
    ChangeDispatcher, ChangeEvent, DispatcherConfig, Document, DrainPolicy, EventKind, MatchAll,
    NodeId, TreeMutator,
};

type Seen = Rc<RefCell<Vec<String>>>;

fn setup(xml: &str, config: DispatcherConfig) -> (TreeMutator, Rc<RefCell<ChangeDispatcher>>) {
    let (doc, root) = Document::from_xml(xml).unwrap();
    let mut mutator = TreeMutator::mark(doc, root).unwrap();
    let dispatcher = ChangeDispatcher::attach(&mut mutator, config);
    dispatcher.borrow_mut().start_listening();
    (mutator, dispatcher)
}

fn node(m: &TreeMutator, path: &str) -> NodeId {
    m.path_to_node(path).unwrap().and_then(|n| n.as_node()).unwrap()
}

fn record(dispatcher: &Rc<RefCell<ChangeDispatcher>>, kind: EventKind, selector: &str) -> Rc<RefCell<Vec<ChangeEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    dispatcher
        .borrow_mut()
        .add_handler(kind, selector, move |_, event| sink.borrow_mut().push(event.clone()))
        .unwrap();
    events
}

#[test]
fn test_included_fires_once_per_matching_descendant() {
    let (mut m, dispatcher) = setup("<doc><p/></doc>", DispatcherConfig::default());
    let included = record(&dispatcher, EventKind::IncludedElement, ".li");
    let p = node(&m, "0");
    let list = m
        .create_from_xml(r#"<ul><li class="li">a</li><li class="li">b</li></ul>"#)
        .unwrap();

    m.insert_node_at(p, 0, list).unwrap();

    let included = included.borrow();
    assert_eq!(included.len(), 2);
    for event in included.iter() {
        match event {
            ChangeEvent::IncludedElement(change) => {
                assert_eq!(change.tree, list);
                assert_eq!(change.parent, p);
                assert_ne!(change.element, list);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}

#[test]
fn test_insert_fires_children_added_then_included() {
    let (mut m, dispatcher) = setup("<doc><a/><c/></doc>", DispatcherConfig::default());
    let order: Seen = Rc::new(RefCell::new(Vec::new()));
    for kind in [
        EventKind::IncludedElement,
        EventKind::AddedElement,
        EventKind::ChildrenChanged,
    ] {
        let order = order.clone();
        dispatcher
            .borrow_mut()
            .add_handler(kind, "*", move |_, event| {
                order.borrow_mut().push(event.kind().to_string())
            })
            .unwrap();
    }
    let root = m.root().node();
    let (a, c) = (node(&m, "0"), node(&m, "1"));
    let b = m.create_from_xml("<b><i/></b>").unwrap();
    let added = record(&dispatcher, EventKind::AddedElement, "b");

    m.insert_node_at(root, 1, b).unwrap();

    assert_eq!(
        *order.borrow(),
        vec![
            "children-changed",
            "added-element",
            "included-element",
            "included-element"
        ]
    );
    match &added.borrow()[0] {
        ChangeEvent::AddedElement(change) => {
            assert_eq!(change.previous_sibling, Some(a));
            assert_eq!(change.next_sibling, Some(c));
            assert_eq!(change.element, b);
        }
        other => panic!("unexpected event {:?}", other),
    };
}

#[test]
fn test_removal_mirrors_insertion() {
    let (mut m, dispatcher) = setup("<doc><a/><b><i/></b><c/></doc>", DispatcherConfig::default());
    let order: Seen = Rc::new(RefCell::new(Vec::new()));
    for kind in [
        EventKind::ChildrenChanging,
        EventKind::RemovingElement,
        EventKind::ExcludingElement,
        EventKind::ChildrenChanged,
        EventKind::RemovedElement,
        EventKind::ExcludedElement,
    ] {
        let order = order.clone();
        dispatcher
            .borrow_mut()
            .add_matcher_handler(kind, MatchAll, move |cx, event| {
                let name = event
                    .element()
                    .and_then(|e| cx.doc.name(e))
                    .unwrap_or_default()
                    .to_string();
                order.borrow_mut().push(format!("{}:{}", event.kind(), name));
            });
    }
    let excluded = record(&dispatcher, EventKind::ExcludedElement, "b");
    let (a, b, c) = (node(&m, "0"), node(&m, "1"), node(&m, "2"));

    m.remove_node(b).unwrap();

    assert_eq!(
        *order.borrow(),
        vec![
            "children-changing:doc",
            "removing-element:b",
            "excluding-element:i",
            "excluding-element:b",
            "children-changed:doc",
            "removed-element:b",
            "excluded-element:i",
            "excluded-element:b",
        ]
    );
    match &excluded.borrow()[0] {
        ChangeEvent::ExcludedElement(change) => {
            assert_eq!(change.tree, b);
            assert_eq!(change.previous_sibling, Some(a));
            assert_eq!(change.next_sibling, Some(c));
        }
        other => panic!("unexpected event {:?}", other),
    };
}

#[test]
fn test_text_and_attribute_changes() {
    let (mut m, dispatcher) = setup(r#"<doc><p k="1">ab</p></doc>"#, DispatcherConfig::default());
    let texts = record(&dispatcher, EventKind::TextChanged, "p");
    let attrs = record(&dispatcher, EventKind::AttributeChanged, "p[k]");
    let p = node(&m, "0");
    let text = node(&m, "0/0");

    m.insert_text(text, 2, "c", true).unwrap();
    m.set_attribute(p, "k", Some("2")).unwrap();
    m.set_attribute(p, "k", None).unwrap();

    match &texts.borrow()[..] {
        [ChangeEvent::TextChanged(change)] => {
            assert_eq!(change.node, text);
            assert_eq!(change.old_value, "ab");
        }
        other => panic!("unexpected events {:?}", other),
    };
    // The selector is matched after the change, so removing `k` is not seen.
    match &attrs.borrow()[..] {
        [ChangeEvent::AttributeChanged(change)] => {
            assert_eq!(change.name, "k");
            assert_eq!(change.old_value.as_deref(), Some("1"));
        }
        other => panic!("unexpected events {:?}", other),
    };
}

#[test]
fn test_stopped_dispatcher_fires_nothing() {
    let (mut m, dispatcher) = setup("<doc/>", DispatcherConfig::default());
    let added = record(&dispatcher, EventKind::AddedElement, "*");
    dispatcher.borrow_mut().stop_listening();

    let root = m.root().node();
    let x = m.create_element("x");
    m.insert_node_at(root, 0, x).unwrap();
    assert!(added.borrow().is_empty());

    dispatcher.borrow_mut().start_listening();
    let y = m.create_element("y");
    m.insert_node_at(root, 1, y).unwrap();
    assert_eq!(added.borrow().len(), 1);
}

#[test]
fn test_duplicate_triggers_collapse() {
    let (m, dispatcher) = setup("<doc/>", DispatcherConfig::default());
    let runs = Rc::new(RefCell::new(0));
    let counter = runs.clone();
    dispatcher
        .borrow_mut()
        .add_trigger_handler("x", move |_| *counter.borrow_mut() += 1);

    dispatcher.borrow_mut().trigger("x");
    dispatcher.borrow_mut().trigger("x");
    dispatcher.borrow_mut().process_immediately(m.doc());

    assert_eq!(*runs.borrow(), 1);
}

#[test]
fn test_cascade_drains_before_flush_returns() {
    let (m, dispatcher) = setup("<doc/>", DispatcherConfig::default());
    let order: Seen = Rc::new(RefCell::new(Vec::new()));
    {
        let mut d = dispatcher.borrow_mut();
        let seen = order.clone();
        d.add_trigger_handler("x", move |cx| {
            seen.borrow_mut().push("x".to_string());
            cx.trigger("y");
        });
        let seen = order.clone();
        d.add_trigger_handler("y", move |_| seen.borrow_mut().push("y".to_string()));
    }

    dispatcher.borrow_mut().trigger("x");
    dispatcher.borrow_mut().process_immediately(m.doc());

    assert_eq!(*order.borrow(), vec!["x", "y"]);
    assert!(dispatcher.borrow().pending().is_empty());
}

#[test]
fn test_triggers_from_handlers_drain_after_edit() {
    let (mut m, dispatcher) = setup("<doc/>", DispatcherConfig::default());
    let runs = Rc::new(RefCell::new(0));
    {
        let mut d = dispatcher.borrow_mut();
        d.add_handler(EventKind::AddedElement, "*", |cx, _| cx.trigger("refresh"))
            .unwrap();
        let counter = runs.clone();
        d.add_trigger_handler("refresh", move |_| *counter.borrow_mut() += 1);
    }
    let root = m.root().node();
    let x = m.create_from_xml("<x><y/></x>").unwrap();
    let z = m.create_element("z");

    m.batch(|m| {
        m.insert_node_at(root, 0, x)?;
        m.insert_node_at(root, 1, z)
    })
    .unwrap();

    assert_eq!(*runs.borrow(), 1);
}

#[test]
fn test_deferred_policy_waits_for_process_immediately() {
    let config = DispatcherConfig {
        drain_policy: DrainPolicy::Deferred,
        ..DispatcherConfig::default()
    };
    let (mut m, dispatcher) = setup("<doc/>", config);
    let runs = Rc::new(RefCell::new(0));
    {
        let mut d = dispatcher.borrow_mut();
        d.add_handler(EventKind::AddedElement, "*", |cx, _| cx.trigger("t"))
            .unwrap();
        let counter = runs.clone();
        d.add_trigger_handler("t", move |_| *counter.borrow_mut() += 1);
    }
    let root = m.root().node();
    let x = m.create_element("x");
    m.insert_node_at(root, 0, x).unwrap();
    assert_eq!(*runs.borrow(), 0);
    assert!(dispatcher.borrow().pending().contains("t"));

    dispatcher.borrow_mut().process_immediately(m.doc());
    assert_eq!(*runs.borrow(), 1);
}

#[test]
fn test_clear_pending_discards() {
    let (m, dispatcher) = setup("<doc/>", DispatcherConfig::default());
    let runs = Rc::new(RefCell::new(0));
    let counter = runs.clone();
    dispatcher
        .borrow_mut()
        .add_trigger_handler("x", move |_| *counter.borrow_mut() += 1);

    dispatcher.borrow_mut().trigger("x");
    dispatcher.borrow_mut().clear_pending();
    dispatcher.borrow_mut().process_immediately(m.doc());

    assert_eq!(*runs.borrow(), 0);
}
