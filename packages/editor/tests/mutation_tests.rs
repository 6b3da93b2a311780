//! Mutator behaviour through the public API

use std::cell::RefCell;
use std::rc::Rc;
use wedge_editor::{
    Document, Insertable, Location, LocationRoot, MutationError, NodeId, NodeRef, Notification,
    NotificationLog, TreeMutator,
};

fn setup(xml: &str) -> (TreeMutator, Rc<RefCell<NotificationLog>>) {
    let (doc, root) = Document::from_xml(xml).unwrap();
    let mut mutator = TreeMutator::mark(doc, root).unwrap();
    let log = Rc::new(RefCell::new(NotificationLog::new()));
    mutator.subscribe(log.clone());
    (mutator, log)
}

fn node(m: &TreeMutator, path: &str) -> NodeId {
    m.path_to_node(path)
        .unwrap()
        .and_then(|n| n.as_node())
        .unwrap_or_else(|| panic!("nothing at {}", path))
}

fn xml(m: &TreeMutator) -> String {
    m.doc().to_xml(m.root().node())
}

fn assert_no_adjacent_text(doc: &Document, root: NodeId) {
    for element in std::iter::once(root).chain(doc.descendants(root)) {
        for pair in doc.children(element).windows(2) {
            assert!(
                !(doc.is_text(pair[0]) && doc.is_text(pair[1])),
                "adjacent text under {}",
                element
            );
        }
    }
}

#[test]
fn test_insert_text_emits_one_change_and_summary() {
    let (mut m, log) = setup("<p>abcd</p>");
    let text = node(&m, "0");

    m.insert_text(text, 2, "Q", true).unwrap();

    assert_eq!(m.doc().text(text), Some("abQcd"));
    let log = log.borrow();
    assert_eq!(log.names(), vec!["SetTextNodeValue", "Changed"]);
    assert_eq!(
        log.notifications[0],
        Notification::SetTextNodeValue {
            node: text,
            old_value: "abcd".to_string(),
            new_value: "abQcd".to_string(),
        }
    );
}

#[test]
fn test_removing_quote_merges_surrounding_text() {
    let (mut m, log) = setup("<p>ab<quote>x</quote>cd</p>");
    let quote = node(&m, "1");

    m.remove_node(quote).unwrap();

    assert_eq!(xml(&m), "<p>abcd</p>");
    let changes: Vec<&str> = log
        .borrow()
        .notifications
        .iter()
        .filter(|n| n.is_change())
        .map(Notification::name)
        .collect();
    assert_eq!(changes, vec!["DeleteNode", "SetTextNodeValue", "DeleteNode"]);
}

#[test]
fn test_delete_node_reports_former_siblings() {
    let (mut m, log) = setup("<p><a/><b/><c/></p>");
    let (a, b, c) = (node(&m, "0"), node(&m, "1"), node(&m, "2"));

    m.remove_node(b).unwrap();

    let log = log.borrow();
    assert!(log.notifications.contains(&Notification::DeleteNode {
        node: b,
        former_parent: m.root().node(),
        index: 1,
        previous_sibling: Some(a),
        next_sibling: Some(c),
    }));
}

#[test]
fn test_failed_operation_leaves_tree_untouched() {
    let (mut m, log) = setup("<p>ab<b/>cd</p>");
    let b = node(&m, "1");
    let ab = node(&m, "0");
    let p = m.root().node();

    assert_eq!(m.delete_text(b, 0, 1), Err(MutationError::NotText(b)));
    assert_eq!(m.set_attribute(ab, "x", Some("y")), Err(MutationError::NotElement(ab)));
    assert!(matches!(
        m.insert_text(ab, 10, "x", true),
        Err(MutationError::OffsetOutOfRange { .. })
    ));
    assert!(matches!(
        m.insert_node_at(p, 9, b),
        Err(MutationError::IndexOutOfBounds { .. }) | Err(MutationError::AlreadyAttached(_))
    ));

    assert_eq!(xml(&m), "<p>ab<b/>cd</p>");
    assert!(log.borrow().notifications.is_empty());
}

#[test]
fn test_nodes_outside_root_are_rejected() {
    let (doc, top) = Document::from_xml("<doc><p>ab</p><q>cd</q></doc>").unwrap();
    let p = doc.child(top, 0).unwrap();
    let q_text = doc.child(doc.child(top, 1).unwrap(), 0).unwrap();
    let mut m = TreeMutator::mark(doc, p).unwrap();

    assert_eq!(
        m.insert_text(q_text, 0, "x", true),
        Err(MutationError::NodeNotInRoot(q_text))
    );
}

#[test]
fn test_returned_locations_are_valid() {
    let (mut m, _) = setup("<p>ab<b>cd</b>ef</p>");
    let p = m.root().node();
    let cd = node(&m, "1/0");
    let ef = node(&m, "2");

    let caret = m.insert_text(cd, 1, "-", true).unwrap().caret;
    assert!(caret.is_valid(m.doc()));
    let caret = m.delete_text(ef, 0, 1).unwrap();
    assert!(caret.is_valid(m.doc()));
    let i = m.create_element("i");
    let caret = m.insert_node_at(p, 1, i).unwrap();
    assert!(caret.is_valid(m.doc()));
    let b = node(&m, "2");
    let caret = m.remove_node(b).unwrap();
    assert!(caret.is_valid(m.doc()));
    assert_eq!((caret.node().clone(), caret.offset()), (NodeRef::Node(p), 2));

    assert_eq!(xml(&m), "<p>ab<i/>f</p>");
    assert_no_adjacent_text(m.doc(), p);
}

#[test]
fn test_insert_at_and_insert_before() {
    let (mut m, _) = setup("<p>abcd<x/></p>");
    let p = m.root().node();
    let text = node(&m, "0");
    let x = node(&m, "1");

    let b = m.create_element("b");
    m.insert_at(text, 2, b).unwrap();
    assert_eq!(xml(&m), "<p>ab<b/>cd<x/></p>");

    m.insert_at(p, 4, "tail").unwrap();
    assert_eq!(xml(&m), "<p>ab<b/>cd<x/>tail</p>");

    let y = m.create_element("y");
    m.insert_before(p, y, Some(x)).unwrap();
    assert_eq!(xml(&m), "<p>ab<b/>cd<y/><x/>tail</p>");

    let z = m.create_element("z");
    m.insert_at(p, 0, Insertable::List(vec![z.into(), "lead".into()]))
        .unwrap();
    assert_eq!(xml(&m), "<p><z/>leadab<b/>cd<y/><x/>tail</p>");
    assert_no_adjacent_text(m.doc(), p);
}

#[test]
fn test_insert_at_list_follows_the_caret() {
    let (mut m, _) = setup("<p>ab</p>");
    let p = m.root().node();
    let i = m.create_element("i");

    let caret = m
        .insert_at(p, 1, Insertable::List(vec!["cd".into(), i.into()]))
        .unwrap();
    assert_eq!(xml(&m), "<p>abcd<i/></p>");
    assert!(caret.is_valid(m.doc()));
    assert_no_adjacent_text(m.doc(), p);
}

#[test]
fn test_insert_at_list_is_checked_before_editing() {
    let (mut m, log) = setup("<p>ab<x/></p>");
    let p = m.root().node();
    let x = node(&m, "1");

    let result = m.insert_at(p, 1, Insertable::List(vec!["cd".into(), x.into()]));
    assert_eq!(result.map(|_| ()), Err(MutationError::AlreadyAttached(x)));

    let y = m.create_element("y");
    let result = m.insert_at(p, 0, Insertable::List(vec![y.into(), y.into()]));
    assert_eq!(result.map(|_| ()), Err(MutationError::AlreadyAttached(y)));

    assert_eq!(xml(&m), "<p>ab<x/></p>");
    assert!(log.borrow().notifications.is_empty());
}

#[test]
fn test_insert_subtree_from_xml() {
    let (mut m, _) = setup("<doc><p/></doc>");
    let p = node(&m, "0");
    let list = m.create_from_xml(r#"<ul><li class="li">a</li><li class="li">b</li></ul>"#).unwrap();

    m.insert_node_at(p, 0, list).unwrap();

    assert_eq!(
        xml(&m),
        r#"<doc><p><ul><li class="li">a</li><li class="li">b</li></ul></p></doc>"#
    );
    assert_eq!(m.node_to_path(&NodeRef::Node(list)).unwrap(), "0/0");
}

#[test]
fn test_split_and_cut_round() {
    let (mut m, _) = setup("<doc><p>one <b>two</b> three</p></doc>");
    let p = node(&m, "0");
    let two = node(&m, "0/1/0");

    let (first, second) = m.split_at(p, two, 1).unwrap();
    assert_eq!(
        xml(&m),
        "<doc><p>one <b>t</b></p><p><b>wo</b> three</p></doc>"
    );

    let start = Location::new(m.doc(), m.root(), NodeRef::Node(first), 1).unwrap();
    let end = Location::new(m.doc(), m.root(), NodeRef::Node(second), 1).unwrap();
    let result = m.cut(&start, &end);
    assert_eq!(result, Err(MutationError::IllFormedRange));

    let doc_root = m.root().node();
    let start = Location::new(m.doc(), m.root(), doc_root, 1).unwrap();
    let end = Location::new(m.doc(), m.root(), doc_root, 2).unwrap();
    let result = m.cut(&start, &end).unwrap();
    assert_eq!(result.nodes, vec![second]);
    assert_eq!(xml(&m), "<doc><p>one <b>t</b></p></doc>");
}

#[test]
fn test_paths_round_trip_for_every_node() {
    let (m, _) = setup(r#"<doc><p n="1">a<b>c</b></p><p/><q k="v">d</q></doc>"#);
    let root = m.root().node();

    for id in std::iter::once(root).chain(m.doc().descendants(root)) {
        let mut refs = vec![NodeRef::Node(id)];
        refs.extend(
            m.doc()
                .attributes(id)
                .map(|(name, _)| NodeRef::attribute(id, name)),
        );
        for r in refs {
            let path = m.node_to_path(&r).unwrap();
            let decoded = m.path_to_node(&path).unwrap();
            assert_eq!(decoded.as_ref(), Some(&r), "path {:?}", path);
            assert_eq!(m.node_to_path(&r).unwrap(), path);
        }
    }
}

#[test]
fn test_decode_past_end_is_none() {
    let (m, _) = setup("<doc><p/><p/></doc>");
    assert_eq!(m.path_to_node("0/10").unwrap(), None);
    assert_eq!(m.path_to_node("5").unwrap(), None);
}

#[test]
fn test_marked_root_is_found_again() {
    let (m, _) = setup("<doc><p>ab</p></doc>");
    let text = node(&m, "0/0");
    assert_eq!(
        LocationRoot::lookup(m.doc(), &NodeRef::Node(text)),
        Some(m.root())
    );
}
