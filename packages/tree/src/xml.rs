//! XML loading and serialization for [`Document`].
//!
//! Loading keeps elements, attributes and text. Comments and processing
//! instructions are dropped, and text separated only by a dropped node is
//! merged so the loaded tree never holds adjacent text siblings.
//!
//! Serialization is compact outer XML without added whitespace, which makes
//! it convenient for asserting on tree shape.

use crate::document::{Document, NodeId, NodeKind};
use crate::error::TreeResult;
use std::fmt::Write;

impl Document {
    /// Parses `source` into a new document, returning it with its root element.
    pub fn from_xml(source: &str) -> TreeResult<(Document, NodeId)> {
        let parsed = roxmltree::Document::parse(source)?;
        let mut doc = Document::new();
        let root = doc.load_element(parsed.root_element())?;
        Ok((doc, root))
    }

    /// Parses `source` into a detached subtree and returns its root element.
    pub fn parse_xml(&mut self, source: &str) -> TreeResult<NodeId> {
        let parsed = roxmltree::Document::parse(source)?;
        self.load_element(parsed.root_element())
    }

    /// Parses `source` and appends its root element under `parent`.
    pub fn append_xml(&mut self, parent: NodeId, source: &str) -> TreeResult<NodeId> {
        let node = self.parse_xml(source)?;
        self.append_child(parent, node)?;
        Ok(node)
    }

    fn load_element(&mut self, source: roxmltree::Node<'_, '_>) -> TreeResult<NodeId> {
        let el = self.create_element(source.tag_name().name());
        for attr in source.attributes() {
            self.set_attribute(el, attr.name(), Some(attr.value().to_string()))?;
        }

        let mut pending_text = String::new();
        for child in source.children() {
            if child.is_element() {
                self.flush_text(el, &mut pending_text)?;
                let child_el = self.load_element(child)?;
                self.append_child(el, child_el)?;
            } else if child.is_text() {
                pending_text.push_str(child.text().unwrap_or_default());
            }
        }
        self.flush_text(el, &mut pending_text)?;

        Ok(el)
    }

    fn flush_text(&mut self, parent: NodeId, pending: &mut String) -> TreeResult<()> {
        if !pending.is_empty() {
            self.append_text(parent, std::mem::take(pending))?;
        }
        Ok(())
    }

    /// Outer XML of `node`. Fragments serialize as their concatenated children.
    pub fn to_xml(&self, node: NodeId) -> String {
        let mut output = String::new();
        self.write_xml(node, &mut output);
        output
    }

    /// Inner XML of `node`
    pub fn inner_xml(&self, node: NodeId) -> String {
        let mut output = String::new();
        for &child in self.children(node) {
            self.write_xml(child, &mut output);
        }
        output
    }

    fn write_xml(&self, node: NodeId, output: &mut String) {
        match self.kind(node) {
            Some(NodeKind::Element(el)) => {
                let _ = write!(output, "<{}", el.name);
                for (name, value) in &el.attributes {
                    let _ = write!(output, " {}=\"{}\"", name, escape(value));
                }
                if el.children.is_empty() {
                    output.push_str("/>");
                } else {
                    output.push('>');
                    for &child in &el.children {
                        self.write_xml(child, output);
                    }
                    let _ = write!(output, "</{}>", el.name);
                }
            }
            Some(NodeKind::Text(text)) => output.push_str(&escape(text)),
            Some(NodeKind::Fragment(children)) => {
                for &child in children {
                    self.write_xml(child, output);
                }
            }
            None => {}
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
