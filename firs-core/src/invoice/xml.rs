//! Owned XML tree used for canonicalization, signature checks and projection.
pub mod c14n;
pub mod constants;
pub mod parse;

use std::collections::BTreeMap;
use thiserror::Error;

pub use parse::parse_document;

/// Errors raised while reading XML into an [`XmlDocument`].
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },
    #[error("invalid attribute at byte {position}: {message}")]
    Attribute { position: u64, message: String },
    #[error("unresolved entity or character reference: {0}")]
    Escape(String),
    #[error("document is not valid UTF-8")]
    Utf8,
    #[error("document has no root element")]
    MissingRoot,
    #[error("document has more than one root element")]
    MultipleRoots,
    #[error("character data outside the root element")]
    TextOutsideRoot,
    #[error("unclosed element <{0}>")]
    Unclosed(String),
}

/// A parsed document: the root element plus processing instructions and
/// comments that appear before or after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub(crate) prolog: Vec<Node>,
    pub(crate) root: Element,
    pub(crate) epilog: Vec<Node>,
}

impl XmlDocument {
    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    pub fn prolog(&self) -> &[Node] {
        &self.prolog
    }

    pub fn epilog(&self) -> &[Node] {
        &self.epilog
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// `Some(prefix)` when the attribute is a namespace declaration; the
    /// default namespace is reported as the empty prefix.
    pub fn declared_prefix(&self) -> Option<&str> {
        if self.name == "xmlns" {
            Some("")
        } else {
            self.name.strip_prefix("xmlns:")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub(crate) name: String,
    pub(crate) attributes: Vec<Attribute>,
    pub(crate) children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Qualified name as written, e.g. `cbc:Name`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    /// Attribute value by local name, ignoring any prefix.
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .filter(|attr| attr.declared_prefix().is_none())
            .find(|attr| attr.local_name() == local_name)
            .map(|attr| attr.value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First child element with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.child_elements()
            .find(|element| element.local_name() == local_name)
    }

    /// Follows a chain of local names, e.g. `["Party", "PartyName", "Name"]`.
    pub fn find_path(&self, path: &[&str]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |element, local_name| element.child(local_name))
    }

    /// Concatenated character data of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Namespace declarations made on this element as `(prefix, uri)`.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|attr| {
            attr.declared_prefix()
                .map(|prefix| (prefix, attr.value.as_str()))
        })
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for node in &element.children {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(child) => collect_text(child, out),
            _ => {}
        }
    }
}

pub(crate) fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// In-scope namespace bindings and inheritable `xml:*` attributes at a
/// point in the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceScope {
    bindings: BTreeMap<String, String>,
    xml_attributes: BTreeMap<String, String>,
}

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope seen by the children of `element`.
    pub fn enter(&self, element: &Element) -> NamespaceScope {
        let mut scope = self.clone();
        for attr in &element.attributes {
            if let Some(prefix) = attr.declared_prefix() {
                scope
                    .bindings
                    .insert(prefix.to_string(), attr.value.clone());
            } else if attr.prefix() == Some("xml") {
                scope
                    .xml_attributes
                    .insert(attr.name.clone(), attr.value.clone());
            }
        }
        scope
    }

    /// Namespace bound to `prefix`; the empty prefix resolves the default
    /// namespace and `xml` is always bound.
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(constants::XML_NS);
        }
        self.bindings.get(prefix).map(String::as_str)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()))
    }

    pub(crate) fn xml_attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.xml_attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Namespace of `element` itself, resolved in this (parent) scope plus
    /// the element's own declarations.
    pub fn namespace_of(&self, element: &Element) -> Option<String> {
        let scope = self.enter(element);
        scope
            .resolve(element.prefix().unwrap_or(""))
            .filter(|uri| !uri.is_empty())
            .map(str::to_string)
    }
}
