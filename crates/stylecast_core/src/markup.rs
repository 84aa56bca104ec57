//! The handoff model from the external markup/style parser.
//!
//! Tokenizing, selector matching and the style cascade all happen outside
//! this crate; what arrives here is a tagged tree where every element
//! carries its attribute map and its already-resolved property map. The
//! tree is serde-deserializable so the parser can hand it over as JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Tag,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attribs: BTreeMap<String, String>,
    /// Declared properties resolved for this element by the external
    /// cascade, property name to raw value string.
    #[serde(default)]
    pub props: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<Node>,
    #[serde(default)]
    pub text: String,
}

impl Node {
    pub fn tag(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Tag,
            name: name.into(),
            attribs: BTreeMap::new(),
            props: BTreeMap::new(),
            children: Vec::new(),
            text: String::new(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Text,
            name: String::new(),
            attribs: BTreeMap::new(),
            props: BTreeMap::new(),
            children: Vec::new(),
            text: content.into(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attribs.insert(key.into(), value.into());
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_tag(&self, name: &str) -> bool {
        self.kind == NodeKind::Tag && self.name == name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attribs.get(key).map(String::as_str)
    }

    pub fn prop(&self, key: &str) -> &str {
        self.props.get(key).map(String::as_str).unwrap_or("")
    }

    /// First direct child with the given tag name.
    pub fn find(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.is_tag(name))
    }

    /// All direct children with the given tag name, in document order.
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children.iter().filter(move |c| c.is_tag(name))
    }

    /// First tag with the given name anywhere below (or at) this node.
    pub fn descendant(&self, name: &str) -> Option<&Node> {
        if self.is_tag(name) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.descendant(name))
    }

    /// Concatenated text of this node and everything below it.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if self.kind == NodeKind::Text {
            out.push_str(&self.text);
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Re-renders this node's children as an HTML snippet. Used to carry
    /// container markup over to the rasterizer verbatim.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_html(&mut out);
        }
        out
    }

    fn write_html(&self, out: &mut String) {
        match self.kind {
            NodeKind::Text => out.push_str(&self.text),
            NodeKind::Tag => {
                let _ = write!(out, "<{}", self.name);
                for (key, value) in &self.attribs {
                    let _ = write!(out, " {}=\"{}\"", key, value);
                }
                out.push('>');
                for child in &self.children {
                    child.write_html(out);
                }
                let _ = write!(out, "</{}>", self.name);
            }
        }
    }
}

/// Deserializes a parser-produced document tree from JSON.
pub fn from_json(json: &str) -> serde_json::Result<Node> {
    serde_json::from_str(json)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
