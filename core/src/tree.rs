//! Parsed response trees and key-path normalization.
//!
//! # Design
//! The XML the service returns cannot tell "one child element" apart from "a
//! list with one child": one `<story>` decodes to a mapping, three decode to
//! a list. `Node::expand` is the single place that resolves this. Anything
//! that expects a collection goes through it and always gets a `Vec`.
//!
//! Shape rules:
//! - a leaf element without attributes is a `Scalar` of its trimmed text
//! - an element with attributes or children is a `Mapping`; attributes sit
//!   under `"@"`, non-blank text under `"#"`
//! - repeated sibling names collapse into a `List`, in document order

use std::collections::BTreeMap;

use serde::Serialize;

pub const ATTRIBUTES_KEY: &str = "@";
pub const TEXT_KEY: &str = "#";

/// A node of a decoded XML document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Scalar(String),
    List(Vec<Node>),
    Mapping(BTreeMap<String, Node>),
}

impl Node {
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Text content, whether or not the element carried attributes.
    ///
    /// `<id type="integer">7</id>` and `<id>7</id>` both yield `"7"`.
    pub fn text(&self) -> Option<&str> {
        match self {
            Node::Scalar(s) => Some(s),
            Node::Mapping(map) => map.get(TEXT_KEY).and_then(Node::as_str),
            Node::List(_) => None,
        }
    }

    /// Text of a direct child, e.g. `story.field("name")`.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::text)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.get(ATTRIBUTES_KEY)
            .and_then(|attrs| attrs.get(name))
            .and_then(Node::as_str)
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// Walk `key_path` (dot separated) and return the node found there as a
    /// list. `None` when any segment is missing.
    pub fn expand(&self, key_path: &str) -> Option<Vec<Node>> {
        let mut node = self;
        for segment in key_path.split('.') {
            node = node.get(segment)?;
        }
        Some(match node {
            Node::List(items) => items.clone(),
            single => vec![single.clone()],
        })
    }

    /// Owned variant of [`Node::expand`].
    pub fn into_expanded(self, key_path: &str) -> Option<Vec<Node>> {
        let mut node = self;
        for segment in key_path.split('.') {
            node = match node {
                Node::Mapping(mut map) => map.remove(segment)?,
                _ => return None,
            };
        }
        Some(match node {
            Node::List(items) => items,
            single => vec![single],
        })
    }
}

/// A decoded response: the root element's name and its content.
///
/// Key paths start below the root, so `<stories><story/></stories>` is
/// walked with `"story"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub root: String,
    pub body: Node,
}

/// Collects children while an element is open, collapsing repeats.
#[derive(Debug, Default)]
pub(crate) struct ElementBuilder {
    pub(crate) name: String,
    attributes: BTreeMap<String, Node>,
    children: BTreeMap<String, Node>,
    text: String,
}

impl ElementBuilder {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    pub(crate) fn attribute(&mut self, name: String, value: String) {
        self.attributes.insert(name, Node::Scalar(value));
    }

    pub(crate) fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// `finish` never yields a `List`, so a list already stored under `name`
    /// can only hold earlier repeats.
    pub(crate) fn child(&mut self, name: String, node: Node) {
        let merged = match self.children.remove(&name) {
            None => node,
            Some(Node::List(mut items)) => {
                items.push(node);
                Node::List(items)
            }
            Some(existing) => Node::List(vec![existing, node]),
        };
        self.children.insert(name, merged);
    }

    pub(crate) fn finish(self) -> Node {
        let text = self.text.trim();
        if self.attributes.is_empty() && self.children.is_empty() {
            return Node::Scalar(text.to_string());
        }
        let mut map = self.children;
        if !self.attributes.is_empty() {
            map.insert(ATTRIBUTES_KEY.to_string(), Node::Mapping(self.attributes));
        }
        if !text.is_empty() {
            map.insert(TEXT_KEY.to_string(), Node::Scalar(text.to_string()));
        }
        Node::Mapping(map)
    }
}
