#![forbid(unsafe_code)]

//! Owned, mutable XML tree built from a `roxmltree` parse.
//!
//! `roxmltree` gives a read-only view that forgets qualified-name prefixes.
//! Canonical XML needs both mutability (fragments are reparented into fresh
//! documents, enveloped signatures are removed) and the original prefixes,
//! so the parsed tree is copied into an arena of [`NodeData`] records. The
//! prefixes are recovered by re-reading each start tag from the source text.

use crate::writer;
use hagalund_core::{ns, Error};

/// Index of a node inside its [`XmlDocument`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A qualified name as written in the source (`prefix:local` or `local`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(prefix: Option<&str>, local: &str) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_owned),
            local: local.to_owned(),
        }
    }

    /// Split a raw `prefix:local` string.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) => Self::new(Some(prefix), local),
            None => Self::new(None, raw),
        }
    }

    /// The prefix, or `""` when unprefixed.
    pub fn prefix_str(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }

    /// The name as it is serialized.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local),
            None => self.local.clone(),
        }
    }
}

/// An attribute, including namespace declarations (`xmlns`, `xmlns:p`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    /// Resolved namespace URI. `xmlns` declarations carry [`ns::XMLNS`],
    /// `xml:*` attributes carry [`ns::XML`].
    pub namespace: Option<String>,
    pub value: String,
    /// Set on declarations copied onto a fragment root from the ancestors of
    /// its original position.
    pub propagated: bool,
}

impl Attribute {
    /// Build an ordinary attribute.
    pub fn new(name: QName, namespace: Option<&str>, value: &str) -> Self {
        Self {
            name,
            namespace: namespace.filter(|n| !n.is_empty()).map(str::to_owned),
            value: value.to_owned(),
            propagated: false,
        }
    }

    /// Build a namespace declaration. An empty prefix declares the default
    /// namespace.
    pub fn namespace_decl(prefix: &str, uri: &str) -> Self {
        let name = if prefix.is_empty() {
            QName::new(None, "xmlns")
        } else {
            QName::new(Some("xmlns"), prefix)
        };
        Self::new(name, Some(ns::XMLNS), uri)
    }

    /// `true` for `xmlns` and `xmlns:*`.
    pub fn is_namespace_decl(&self) -> bool {
        match self.name.prefix.as_deref() {
            Some("xmlns") => true,
            None => self.name.local == "xmlns",
            _ => false,
        }
    }

    /// For a namespace declaration, the prefix it binds (`""` for the
    /// default namespace).
    pub fn declared_prefix(&self) -> Option<&str> {
        if !self.is_namespace_decl() {
            return None;
        }
        match self.name.prefix.as_deref() {
            Some(_) => Some(self.name.local.as_str()),
            None => Some(""),
        }
    }

    /// `true` for `xml:lang`, `xml:space` and the other `xml:` attributes.
    pub fn is_xml_attr(&self) -> bool {
        self.name.prefix.as_deref() == Some("xml")
    }
}

/// An element's name and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    /// Resolved namespace URI of the element name.
    pub namespace: Option<String>,
    /// Attributes in document order, namespace declarations included.
    pub attributes: Vec<Attribute>,
}

impl Element {
    pub fn new(name: QName, namespace: Option<&str>) -> Self {
        Self {
            name,
            namespace: namespace.filter(|n| !n.is_empty()).map(str::to_owned),
            attributes: Vec::new(),
        }
    }

    pub fn namespace_str(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }

    /// Value of an attribute that has no namespace.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.prefix.is_none() && a.name.local == local && !a.is_namespace_decl())
            .map(|a| a.value.as_str())
    }

    /// Value of an attribute by its qualified name as written.
    pub fn attribute_qualified(&self, qname: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.qualified() == qname)
            .map(|a| a.value.as_str())
    }

    /// Local namespace declaration for `prefix`, if any.
    pub fn declaration(&self, prefix: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.declared_prefix() == Some(prefix))
    }
}

/// The kind and payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    CData(String),
    /// Whitespace-only character data inside an element.
    Whitespace(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned XML document.
///
/// Node `0` is always the document node. Detached nodes stay in the arena
/// but are no longer reachable from the document node.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<NodeData>,
    /// Additional ID attribute names to register (beyond `Id`, `ID`, `id`).
    extra_id_attrs: Vec<String>,
}

const DEFAULT_ID_ATTRS: [&str; 3] = ["Id", "ID", "id"];

impl Default for XmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlDocument {
    /// Create an empty document holding only the document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            extra_id_attrs: Vec::new(),
        }
    }

    /// Parse XML text.
    pub fn parse(text: &str) -> Result<Self, Error> {
        Self::parse_with_limit(text, usize::MAX)
    }

    /// Parse XML text, refusing inputs longer than `max_chars` characters.
    pub fn parse_with_limit(text: &str, max_chars: usize) -> Result<Self, Error> {
        if text.len() > max_chars && text.chars().count() > max_chars {
            return Err(Error::ResourceLimitExceeded(format!(
                "document exceeds {max_chars} characters"
            )));
        }
        let parsed = roxmltree::Document::parse_with_options(text, crate::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))?;
        let mut doc = Self::new();
        doc.copy_children(&parsed, parsed.root(), doc.root());
        Ok(doc)
    }

    /// Parse XML from bytes (UTF-8 only).
    pub fn parse_bytes(data: &[u8]) -> Result<Self, Error> {
        Self::parse_bytes_with_limit(data, usize::MAX)
    }

    pub fn parse_bytes_with_limit(data: &[u8], max_chars: usize) -> Result<Self, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self::parse_with_limit(text, max_chars)
    }

    fn copy_children(
        &mut self,
        parsed: &roxmltree::Document<'_>,
        from: roxmltree::Node<'_, '_>,
        to: NodeId,
    ) {
        let input = parsed.input_text();
        let mut stack = vec![(from, to)];
        while let Some((source, target)) = stack.pop() {
            for child in source.children() {
                let kind = match child.node_type() {
                    roxmltree::NodeType::Element => NodeKind::Element(convert_element(input, child)),
                    roxmltree::NodeType::Text => {
                        let text = child.text().unwrap_or_default();
                        if is_xml_whitespace(text) {
                            NodeKind::Whitespace(text.to_owned())
                        } else {
                            NodeKind::Text(text.to_owned())
                        }
                    }
                    roxmltree::NodeType::Comment => {
                        NodeKind::Comment(child.text().unwrap_or_default().to_owned())
                    }
                    roxmltree::NodeType::PI => match child.pi() {
                        Some(pi) => NodeKind::ProcessingInstruction {
                            target: pi.target.to_owned(),
                            data: pi.value.unwrap_or_default().to_owned(),
                        },
                        None => continue,
                    },
                    roxmltree::NodeType::Root => continue,
                };
                let is_element = matches!(kind, NodeKind::Element(_));
                let id = self.push_node(kind, target);
                if is_element {
                    stack.push((child, id));
                }
            }
        }
    }

    fn push_node(&mut self, kind: NodeKind, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    // ── Navigation ───────────────────────────────────────────────────

    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single top-level element, if present.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&c| self.is_element(c))
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element(_))
    }

    pub fn is_comment(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Comment(_))
    }

    /// `true` if the element has the given namespace URI and local name.
    pub fn is_element_named(&self, id: NodeId, namespace: &str, local: &str) -> bool {
        self.element(id)
            .is_some_and(|e| e.name.local == local && e.namespace_str() == namespace)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Nearest ancestor that is an element.
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|&p| self.is_element(p))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Child elements in document order.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| self.is_element(c))
    }

    /// Ancestors from the parent up to the document node.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            doc: self,
            next: self.parent(id),
        }
    }

    /// `id` and all its descendants in document order.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: vec![id],
        }
    }

    /// `true` if `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Number of element ancestors.
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).filter(|&a| self.is_element(a)).count()
    }

    /// First descendant element (document order) with the given name.
    pub fn find_element(&self, namespace: &str, local: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .find(|&n| self.is_element_named(n, namespace, local))
    }

    /// All descendant elements of `id` (excluding `id`) with the given name.
    pub fn find_descendants(&self, id: NodeId, namespace: &str, local: &str) -> Vec<NodeId> {
        self.descendants(id)
            .skip(1)
            .filter(|&n| self.is_element_named(n, namespace, local))
            .collect()
    }

    /// First child element with the given name.
    pub fn find_child_element(&self, id: NodeId, namespace: &str, local: &str) -> Option<NodeId> {
        self.child_elements(id)
            .find(|&c| self.is_element_named(c, namespace, local))
    }

    /// Value of an unqualified attribute on an element.
    pub fn attribute(&self, id: NodeId, local: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attribute(local))
    }

    /// Concatenated character data of `id` and its descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for n in self.descendants(id) {
            match self.kind(n) {
                NodeKind::Text(t) | NodeKind::CData(t) | NodeKind::Whitespace(t) => out.push_str(t),
                _ => {}
            }
        }
        out
    }

    /// Resolve `prefix` against the declarations in scope at `id`.
    /// `""` looks up the default namespace; an empty URI means "no namespace".
    pub fn lookup_namespace(&self, id: NodeId, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(ns::XML.to_owned());
        }
        if prefix == "xmlns" {
            return Some(ns::XMLNS.to_owned());
        }
        std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|n| self.element(n))
            .find_map(|e| e.declaration(prefix))
            .map(|a| a.value.clone())
            .filter(|v| !v.is_empty())
    }

    // ── ID lookup ────────────────────────────────────────────────────

    /// Register an additional ID attribute name (e.g., `"wsu:Id"`).
    pub fn add_id_attr(&mut self, name: &str) {
        if !self.extra_id_attrs.iter().any(|a| a == name) {
            self.extra_id_attrs.push(name.to_owned());
        }
    }

    /// Every attached element carrying `value` in one of the ID attributes.
    pub fn elements_with_id(&self, value: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .filter(|&n| {
                self.element(n).is_some_and(|e| {
                    DEFAULT_ID_ATTRS.iter().any(|a| e.attribute(a) == Some(value))
                        || self
                            .extra_id_attrs
                            .iter()
                            .any(|a| e.attribute_qualified(a) == Some(value))
                })
            })
            .collect()
    }

    /// The element with the given ID, only if exactly one element carries it.
    pub fn find_by_id(&self, value: &str) -> Option<NodeId> {
        match self.elements_with_id(value).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    // ── Construction and mutation ────────────────────────────────────

    /// Append a new element under `parent`.
    pub fn append_element(
        &mut self,
        parent: NodeId,
        name: QName,
        namespace: Option<&str>,
    ) -> NodeId {
        self.push_node(NodeKind::Element(Element::new(name, namespace)), parent)
    }

    /// Append a text node under `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let kind = if !text.is_empty() && is_xml_whitespace(text) {
            NodeKind::Whitespace(text.to_owned())
        } else {
            NodeKind::Text(text.to_owned())
        };
        self.push_node(kind, parent)
    }

    pub fn append_comment(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push_node(NodeKind::Comment(text.to_owned()), parent)
    }

    /// Set (or replace) an attribute on an element.
    pub fn set_attribute(&mut self, id: NodeId, attribute: Attribute) {
        if let Some(e) = self.element_mut(id) {
            match e.attributes.iter_mut().find(|a| a.name == attribute.name) {
                Some(existing) => *existing = attribute,
                None => e.attributes.push(attribute),
            }
        }
    }

    /// Set an unqualified attribute.
    pub fn set_attr(&mut self, id: NodeId, local: &str, value: &str) {
        self.set_attribute(id, Attribute::new(QName::new(None, local), None, value));
    }

    /// Remove `id` from its parent. The node stays in the arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    /// Move `node` into the sibling slot held by `old`, detaching `old`.
    /// Does nothing if `old` has no parent.
    pub fn replace_with(&mut self, old: NodeId, node: NodeId) {
        let Some(parent) = self.nodes[old.0].parent else {
            return;
        };
        self.detach(node);
        if let Some(slot) = self.nodes[parent.0].children.iter_mut().find(|c| **c == old) {
            *slot = node;
        }
        self.nodes[node.0].parent = Some(parent);
        self.nodes[old.0].parent = None;
    }

    /// Detach every comment node.
    pub fn remove_comments(&mut self) {
        let comments: Vec<NodeId> = self
            .descendants(self.root())
            .filter(|&n| self.is_comment(n))
            .collect();
        for c in comments {
            self.detach(c);
        }
    }

    /// Deep-copy `source`'s subtree rooted at `from` under `parent`.
    pub fn import_subtree(&mut self, source: &XmlDocument, from: NodeId, parent: NodeId) -> NodeId {
        let top = self.push_node(source.kind(from).clone(), parent);
        let mut stack = vec![(from, top)];
        while let Some((src, dst)) = stack.pop() {
            for &child in source.children(src) {
                let id = self.push_node(source.kind(child).clone(), dst);
                stack.push((child, id));
            }
        }
        top
    }

    /// A new document whose document element is a deep copy of `element`.
    pub fn extract_fragment(&self, element: NodeId) -> XmlDocument {
        let mut fragment = XmlDocument::new();
        fragment.extra_id_attrs = self.extra_id_attrs.clone();
        let root = fragment.root();
        fragment.import_subtree(self, element, root);
        fragment
    }

    // ── Serialization ────────────────────────────────────────────────

    /// Serialize the whole document (no XML declaration).
    pub fn to_xml_string(&self) -> String {
        writer::write_node(self, self.root())
    }

    /// Serialize one node and its subtree as written.
    pub fn node_to_string(&self, id: NodeId) -> String {
        writer::write_node(self, id)
    }
}

/// Iterator over the ancestors of a node.
pub struct Ancestors<'a> {
    doc: &'a XmlDocument,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.doc.parent(current);
        Some(current)
    }
}

/// Pre-order iterator over a subtree.
pub struct Descendants<'a> {
    doc: &'a XmlDocument,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(current).iter().rev().copied());
        Some(current)
    }
}

pub(crate) fn is_xml_whitespace(s: &str) -> bool {
    s.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
}

// ── roxmltree conversion ─────────────────────────────────────────────

/// Start tag as written: the raw qualified name and the raw attribute names.
struct RawStartTag<'a> {
    name: &'a str,
    attributes: Vec<&'a str>,
}

/// Re-read the start tag at `start` to recover prefixes.
fn lex_start_tag(input: &str, start: usize) -> Option<RawStartTag<'_>> {
    let s = input.get(start..)?;
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'<') {
        return None;
    }
    let is_space = |b: u8| matches!(b, b' ' | b'\t' | b'\n' | b'\r');
    let mut i = 1;
    while i < bytes.len() && !is_space(bytes[i]) && bytes[i] != b'/' && bytes[i] != b'>' {
        i += 1;
    }
    let name = &s[1..i];
    let mut attributes = Vec::new();
    loop {
        while i < bytes.len() && is_space(bytes[i]) {
            i += 1;
        }
        match bytes.get(i)? {
            b'>' | b'/' => break,
            _ => {}
        }
        let name_start = i;
        while i < bytes.len() && !is_space(bytes[i]) && bytes[i] != b'=' {
            i += 1;
        }
        attributes.push(&s[name_start..i]);
        while i < bytes.len() && is_space(bytes[i]) {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            return None;
        }
        i += 1;
        while i < bytes.len() && is_space(bytes[i]) {
            i += 1;
        }
        let quote = *bytes.get(i)?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        i += 1;
        while i < bytes.len() && bytes[i] != quote {
            i += 1;
        }
        i += 1;
    }
    Some(RawStartTag { name, attributes })
}

fn convert_element(input: &str, node: roxmltree::Node<'_, '_>) -> Element {
    let tag = node.tag_name();
    let raw = lex_start_tag(input, node.range().start)
        .filter(|r| QName::parse(r.name).local == tag.name());

    let name = match &raw {
        Some(r) => QName::parse(r.name),
        None => QName::new(
            tag.namespace().and_then(|uri| node.lookup_prefix(uri)),
            tag.name(),
        ),
    };
    let mut element = Element::new(name, tag.namespace());

    // Namespace declarations
    match &raw {
        Some(r) => {
            for raw_name in r.attributes.iter().filter(|a| is_xmlns_name(a)) {
                let prefix = raw_name.strip_prefix("xmlns:").unwrap_or("");
                let lookup = if prefix.is_empty() { None } else { Some(prefix) };
                let uri = node.lookup_namespace_uri(lookup).unwrap_or_default();
                element.attributes.push(Attribute::namespace_decl(prefix, uri));
            }
        }
        None => {
            for (prefix, uri) in declarations_by_diff(node) {
                element.attributes.push(Attribute::namespace_decl(&prefix, &uri));
            }
        }
    }

    // Ordinary attributes, in document order
    let raw_names: Vec<&str> = raw
        .as_ref()
        .map(|r| r.attributes.iter().copied().filter(|a| !is_xmlns_name(a)).collect())
        .unwrap_or_default();
    let parsed: Vec<roxmltree::Attribute<'_, '_>> = node.attributes().collect();
    let use_raw = raw_names.len() == parsed.len();
    for (i, attr) in parsed.iter().enumerate() {
        let name = if use_raw {
            QName::parse(raw_names[i])
        } else {
            let prefix = match attr.namespace() {
                Some(ns::XML) => Some("xml"),
                Some(uri) => node.lookup_prefix(uri),
                None => None,
            };
            QName::new(prefix, attr.name())
        };
        element
            .attributes
            .push(Attribute::new(name, attr.namespace(), attr.value()));
    }
    element
}

fn is_xmlns_name(raw: &str) -> bool {
    raw == "xmlns" || raw.starts_with("xmlns:")
}

/// Declarations that differ from the parent's in-scope set.
fn declarations_by_diff(node: roxmltree::Node<'_, '_>) -> Vec<(String, String)> {
    let parent = node.parent().filter(|p| p.is_element());
    let scope = |n: roxmltree::Node<'_, '_>| -> Vec<(String, String)> {
        n.namespaces()
            .filter(|ns| ns.name() != Some("xml"))
            .map(|ns| (ns.name().unwrap_or_default().to_owned(), ns.uri().to_owned()))
            .collect()
    };
    let own = scope(node);
    let inherited = parent.map(scope).unwrap_or_default();
    let mut decls: Vec<(String, String)> = own
        .iter()
        .filter(|d| !inherited.contains(d))
        .cloned()
        .collect();
    let had_default = inherited.iter().any(|(p, u)| p.is_empty() && !u.is_empty());
    let has_default = own.iter().any(|(p, _)| p.is_empty());
    if had_default && !has_default {
        decls.push((String::new(), String::new()));
    }
    decls
}
