//! Mutator invariants under random edit sequences
//!
//! Every edit either fails without touching the tree or leaves a tree with no
//! adjacent text nodes, paths that resolve back to their nodes and locations
//! that order consistently, attribute locations included.

use proptest::{prelude::*, prop_oneof};
use proptest::test_runner::Config as ProptestConfig;
use std::cmp::Ordering;
use wedge_editor::{Document, Insertable, Location, NodeId, NodeRef, TreeMutator};

const SEED: &str =
    r#"<doc><p k="ab">seed</p><p/><p>x<b class="c">y</b>z</p><q><r k="">deep</r></q></doc>"#;

#[derive(Debug, Clone)]
enum Operation {
    InsertText { pick: usize, pos: usize, text: String },
    DeleteText { pick: usize, pos: usize, len: usize },
    InsertElement { pick: usize, pos: usize },
    InsertTextNode { pick: usize, pos: usize, text: String },
    InsertIntoText { pick: usize, pos: isize },
    Remove { pick: usize },
    SetAttribute { pick: usize, value: Option<String> },
    Split { pick: usize, pos: usize },
    Cut { start: usize, end: usize },
    RemoveRun { pick: usize, len: usize },
    InsertList { pick: usize, pos: usize, text: String, element_first: bool },
    InsertBefore { pick: usize, before: usize, append: bool },
    MergeText { pick: usize },
    SetTextNode { pick: usize, text: String },
}

fn short_text() -> impl Strategy<Value = String> {
    "[a-cé ]{0,4}"
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    let insert_text = (any::<usize>(), 0usize..8, short_text())
        .prop_map(|(pick, pos, text)| Operation::InsertText { pick, pos, text });
    let delete_text = (any::<usize>(), 0usize..8, 0usize..4)
        .prop_map(|(pick, pos, len)| Operation::DeleteText { pick, pos, len });
    let insert_element = (any::<usize>(), 0usize..8)
        .prop_map(|(pick, pos)| Operation::InsertElement { pick, pos });
    let insert_text_node = (any::<usize>(), 0usize..8, short_text())
        .prop_map(|(pick, pos, text)| Operation::InsertTextNode { pick, pos, text });
    let insert_into_text = (any::<usize>(), -2isize..8)
        .prop_map(|(pick, pos)| Operation::InsertIntoText { pick, pos });
    let remove = any::<usize>().prop_map(|pick| Operation::Remove { pick });
    let set_attribute = (any::<usize>(), proptest::option::of("[a-c]{0,2}"))
        .prop_map(|(pick, value)| Operation::SetAttribute { pick, value });
    let split = (any::<usize>(), 0usize..8).prop_map(|(pick, pos)| Operation::Split { pick, pos });
    let cut = (any::<usize>(), any::<usize>()).prop_map(|(start, end)| Operation::Cut { start, end });
    let remove_run =
        (any::<usize>(), 1usize..4).prop_map(|(pick, len)| Operation::RemoveRun { pick, len });
    let insert_list = (any::<usize>(), 0usize..8, short_text(), any::<bool>()).prop_map(
        |(pick, pos, text, element_first)| Operation::InsertList {
            pick,
            pos,
            text,
            element_first,
        },
    );
    let insert_before = (any::<usize>(), any::<usize>(), any::<bool>())
        .prop_map(|(pick, before, append)| Operation::InsertBefore { pick, before, append });
    let merge_text = any::<usize>().prop_map(|pick| Operation::MergeText { pick });
    let set_text_node = (any::<usize>(), short_text())
        .prop_map(|(pick, text)| Operation::SetTextNode { pick, text });

    prop_oneof![
        insert_text,
        delete_text,
        insert_element,
        insert_text_node,
        insert_into_text,
        remove,
        set_attribute,
        split,
        cut,
        remove_run,
        insert_list,
        insert_before,
        merge_text,
        set_text_node
    ]
}

fn all_nodes(m: &TreeMutator) -> Vec<NodeId> {
    let root = m.root().node();
    std::iter::once(root).chain(m.doc().descendants(root)).collect()
}

fn pick(nodes: &[NodeId], n: usize, keep: impl Fn(NodeId) -> bool) -> Option<NodeId> {
    let candidates: Vec<NodeId> = nodes.iter().copied().filter(|&id| keep(id)).collect();
    if candidates.is_empty() {
        None
    } else {
        Some(candidates[n % candidates.len()])
    }
}

fn length(doc: &Document, node: NodeId) -> usize {
    doc.length(&NodeRef::Node(node)).unwrap_or(0)
}

/// Topmost ancestor of `node` below the root, or `node` itself.
fn top_below_root(doc: &Document, root: NodeId, node: NodeId) -> NodeId {
    let mut current = node;
    while let Some(parent) = doc.parent(current) {
        if parent == root {
            break;
        }
        current = parent;
    }
    current
}

/// Applies `op`; returns false when it was skipped or failed.
fn apply(m: &mut TreeMutator, op: &Operation) -> bool {
    let nodes = all_nodes(m);
    let root = m.root().node();
    let doc = m.doc();

    match op {
        Operation::InsertText { pick: n, pos, text } => {
            let Some(node) = pick(&nodes, *n, |_| true) else { return false };
            let offset = pos % (length(doc, node) + 1);
            m.insert_text(node, offset, text, true).is_ok()
        }
        Operation::DeleteText { pick: n, pos, len } => {
            let Some(node) = pick(&nodes, *n, |id| doc.is_text(id)) else { return false };
            let offset = pos % (length(doc, node) + 1);
            m.delete_text(node, offset, *len).is_ok()
        }
        Operation::InsertElement { pick: n, pos } => {
            let Some(parent) = pick(&nodes, *n, |id| doc.is_element(id)) else { return false };
            let index = pos % (length(doc, parent) + 1);
            let element = m.create_element("e");
            m.insert_node_at(parent, index, element).is_ok()
        }
        Operation::InsertTextNode { pick: n, pos, text } => {
            let Some(parent) = pick(&nodes, *n, |id| doc.is_element(id)) else { return false };
            let index = pos % (length(doc, parent) + 1);
            let created = m.create_text(text);
            m.insert_node_at(parent, index, created).is_ok()
        }
        Operation::InsertIntoText { pick: n, pos } => {
            let Some(node) = pick(&nodes, *n, |id| doc.is_text(id)) else { return false };
            let element = m.create_element("i");
            m.insert_into_text(node, *pos, element).is_ok()
        }
        Operation::Remove { pick: n } => {
            let Some(node) = pick(&nodes, *n, |id| id != root) else { return false };
            m.remove_node(node).is_ok()
        }
        Operation::SetAttribute { pick: n, value } => {
            let Some(element) = pick(&nodes, *n, |id| doc.is_element(id)) else { return false };
            m.set_attribute(element, "k", value.as_deref()).is_ok()
        }
        Operation::Split { pick: n, pos } => {
            let Some(node) = pick(&nodes, *n, |id| id != root) else { return false };
            let top = top_below_root(doc, root, node);
            if node == top && doc.is_text(top) {
                return false;
            }
            let offset = pos % (length(doc, node) + 1);
            m.split_at(top, node, offset).is_ok()
        }
        Operation::Cut { start, end } => {
            let all = locations(m, false);
            let start = all[start % all.len()].clone();
            let end = all[end % all.len()].clone();
            m.cut(&start, &end).is_ok()
        }
        Operation::RemoveRun { pick: n, len } => {
            let Some(first) = pick(&nodes, *n, |id| id != root) else { return false };
            let Some(parent) = doc.parent(first) else { return false };
            let run: Vec<NodeId> = doc
                .children(parent)
                .iter()
                .copied()
                .skip_while(|&id| id != first)
                .take(*len)
                .collect();
            m.remove_nodes(&run).is_ok()
        }
        Operation::InsertList {
            pick: n,
            pos,
            text,
            element_first,
        } => {
            let Some(parent) = pick(&nodes, *n, |_| true) else { return false };
            let index = pos % (length(doc, parent) + 1);
            let element = m.create_element("l");
            let mut items: Vec<Insertable> = vec![text.as_str().into(), element.into()];
            if *element_first {
                items.reverse();
            }
            m.insert_at(parent, index, Insertable::List(items)).is_ok()
        }
        Operation::InsertBefore {
            pick: n,
            before,
            append,
        } => {
            let Some(parent) = pick(&nodes, *n, |id| doc.is_element(id)) else { return false };
            let children = doc.children(parent).to_vec();
            let before = if *append || children.is_empty() {
                None
            } else {
                Some(children[before % children.len()])
            };
            let element = m.create_element("v");
            m.insert_before(parent, element, before).is_ok()
        }
        Operation::MergeText { pick: n } => {
            let Some(node) = pick(&nodes, *n, |id| id != root) else { return false };
            m.merge_text_nodes(node).is_ok()
        }
        Operation::SetTextNode { pick: n, text } => {
            let Some(node) = pick(&nodes, *n, |id| doc.is_text(id)) else { return false };
            m.set_text_node(node, text).is_ok()
        }
    }
}

fn assert_no_adjacent_text(m: &TreeMutator) -> Result<(), TestCaseError> {
    let doc = m.doc();
    for id in all_nodes(m) {
        for pair in doc.children(id).windows(2) {
            prop_assert!(
                !(doc.is_text(pair[0]) && doc.is_text(pair[1])),
                "adjacent text under {} in {}",
                id,
                doc.to_xml(m.root().node())
            );
        }
    }
    Ok(())
}

/// Every location under the root, optionally with the attribute locations.
fn locations(m: &TreeMutator, with_attributes: bool) -> Vec<Location> {
    let doc = m.doc();
    let mut refs = Vec::new();
    for id in all_nodes(m) {
        refs.push(NodeRef::Node(id));
        if with_attributes {
            refs.extend(
                doc.attributes(id)
                    .map(|(name, _)| NodeRef::attribute(id, name)),
            );
        }
    }
    refs.into_iter()
        .flat_map(|node| {
            let len = doc.length(&node).unwrap_or(0);
            (0..=len).map(move |offset| (node.clone(), offset))
        })
        .map(|(node, offset)| Location::new(doc, m.root(), node, offset).unwrap())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn edits_keep_tree_normalized(ops in proptest::collection::vec(operation_strategy(), 0..24)) {
        let (doc, root) = Document::from_xml(SEED).unwrap();
        let mut m = TreeMutator::mark(doc, root).unwrap();

        for op in &ops {
            let before = m.doc().to_xml(root);
            if !apply(&mut m, op) {
                prop_assert_eq!(m.doc().to_xml(root), before, "failed {:?} changed the tree", op);
            }
            assert_no_adjacent_text(&m)?;
        }
    }

    #[test]
    fn paths_resolve_after_edits(ops in proptest::collection::vec(operation_strategy(), 0..16)) {
        let (doc, root) = Document::from_xml(SEED).unwrap();
        let mut m = TreeMutator::mark(doc, root).unwrap();
        for op in &ops {
            apply(&mut m, op);
        }

        for id in all_nodes(&m) {
            let node = NodeRef::Node(id);
            let path = m.node_to_path(&node).unwrap();
            prop_assert_eq!(m.path_to_node(&path).unwrap(), Some(node));
        }
    }

    #[test]
    fn location_order_is_consistent(
        ops in proptest::collection::vec(operation_strategy(), 0..8),
        picks in proptest::collection::vec(any::<usize>(), 3),
    ) {
        let (doc, root) = Document::from_xml(SEED).unwrap();
        let mut m = TreeMutator::mark(doc, root).unwrap();
        for op in &ops {
            apply(&mut m, op);
        }

        let all = locations(&m, true);
        let a = &all[picks[0] % all.len()];
        let b = &all[picks[1] % all.len()];
        let c = &all[picks[2] % all.len()];
        let doc = m.doc();

        prop_assert_eq!(a.compare(doc, a).unwrap(), Ordering::Equal);
        prop_assert_eq!(a.compare(doc, b).unwrap(), b.compare(doc, a).unwrap().reverse());
        if a.compare(doc, b).unwrap() != Ordering::Greater
            && b.compare(doc, c).unwrap() != Ordering::Greater
        {
            prop_assert_ne!(a.compare(doc, c).unwrap(), Ordering::Greater);
        }
    }
}
