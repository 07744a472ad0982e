#![forbid(unsafe_code)]

//! The canonicalization walker.
//!
//! Traverses a document depth-first with an explicit work stack, keeps one
//! namespace frame per open element, and writes canonical bytes to any
//! `io::Write`. Writing into a `Vec<u8>` materializes the output; writing into
//! a hashing writer digests it without buffering.

use crate::context::{track_declaration, DeclKey, Declaration, LocalDeclarations, NamespaceContext};
use crate::render::{Attr, NsDecl};
use crate::escape::Escape;
use crate::{exclusive, inclusive, C14nMode};
use hagalund_core::{Error, Limits};
use hagalund_xml::{Attribute, Element, NodeId, NodeKind, NodeSet, XmlDocument};
use std::collections::BTreeSet;
use std::io::Write;

/// Where the walk is relative to the document element.
///
/// Comments and processing instructions at document level get a line feed
/// after them before the root and before them after it. Whitespace text is
/// only written inside the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocPosition {
    BeforeRoot,
    InRoot,
    AfterRoot,
}

enum Step {
    Enter(NodeId),
    Exit(NodeId),
}

/// Canonicalizes one document.
pub struct Canonicalizer<'a> {
    doc: &'a XmlDocument,
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
    max_depth: usize,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(doc: &'a XmlDocument, mode: C14nMode) -> Self {
        Self {
            doc,
            mode,
            inclusive_prefixes: Vec::new(),
            max_depth: Limits::default().max_element_depth,
        }
    }

    /// InclusiveNamespaces PrefixList for the exclusive modes. Checked when
    /// canonicalization starts.
    pub fn with_inclusive_prefixes<S: AsRef<str>>(mut self, prefixes: &[S]) -> Self {
        self.inclusive_prefixes = prefixes.iter().map(|p| p.as_ref().to_owned()).collect();
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Canonicalize the nodes of `node_set` into a byte vector.
    pub fn canonicalize(&self, node_set: &NodeSet) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.canonicalize_into(node_set, &mut out)?;
        Ok(out)
    }

    /// Canonicalize the nodes of `node_set` into `out`.
    pub fn canonicalize_into<W: Write>(&self, node_set: &NodeSet, out: &mut W) -> Result<(), Error> {
        let inclusive_prefixes = exclusive::parse_prefix_list(&self.inclusive_prefixes)?;
        let mut walk = Walk {
            doc: self.doc,
            node_set,
            mode: self.mode,
            inclusive_prefixes: &inclusive_prefixes,
            ctx: NamespaceContext::new(),
            position: DocPosition::BeforeRoot,
        };
        let mut stack = vec![Step::Enter(self.doc.root())];
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(id) => match self.doc.kind(id) {
                    NodeKind::Document => {
                        stack.extend(self.doc.children(id).iter().rev().map(|&c| Step::Enter(c)));
                    }
                    NodeKind::Element(element) => {
                        if walk.ctx.depth() >= self.max_depth {
                            return Err(Error::ResourceLimitExceeded(format!(
                                "element nesting deeper than {}",
                                self.max_depth
                            )));
                        }
                        walk.enter_element(id, element, out)?;
                        stack.push(Step::Exit(id));
                        stack.extend(self.doc.children(id).iter().rev().map(|&c| Step::Enter(c)));
                    }
                    other => walk.leaf(id, other, out)?,
                },
                Step::Exit(id) => walk.exit_element(id, out)?,
            }
        }
        debug_assert_eq!(walk.ctx.depth(), 0);
        Ok(())
    }
}

struct Walk<'a, 'n> {
    doc: &'a XmlDocument,
    node_set: &'n NodeSet,
    mode: C14nMode,
    inclusive_prefixes: &'n BTreeSet<String>,
    ctx: NamespaceContext,
    position: DocPosition,
}

impl Walk<'_, '_> {
    fn included(&self, id: NodeId) -> bool {
        self.node_set.contains(self.doc, id)
    }

    fn is_document_element(&self, id: NodeId) -> bool {
        self.doc.parent(id) == Some(self.doc.root())
    }

    fn enter_element<W: Write>(
        &mut self,
        id: NodeId,
        element: &Element,
        out: &mut W,
    ) -> Result<(), Error> {
        if self.is_document_element(id) {
            self.position = DocPosition::InRoot;
        }
        let included = self.included(id);
        let exclusive = self.mode.is_exclusive();
        self.ctx.enter_element();

        let mut local = LocalDeclarations::new();
        let mut attrs: Vec<Attr> = Vec::new();
        for attr in &element.attributes {
            if attr.declared_prefix() == Some("xml") {
                continue;
            }
            if attr.is_xml_attr() && exclusive {
                if included && !attr.propagated {
                    attrs.push(Attr::from_attribute(attr));
                }
                continue;
            }
            match Declaration::from_attribute(attr) {
                Some(decl) => {
                    require_absolute_namespace(attr)?;
                    track_declaration(&mut local, decl)
                }
                None if included => attrs.push(Attr::from_attribute(attr)),
                None => {}
            }
        }

        // The element's own binding, when it is not declared right here.
        let prefix = element.name.prefix_str();
        let own_key = DeclKey::Namespace(prefix.to_owned());
        if !local.contains_key(&own_key) {
            track_declaration(
                &mut local,
                Declaration::namespace(prefix, element.namespace_str()),
            );
        }

        if included {
            let to_render = if exclusive {
                let mut used: Vec<&str> = vec![prefix];
                used.extend(attrs.iter().map(Attr::prefix).filter(|p| !p.is_empty()));
                exclusive::namespaces_to_render(&self.ctx, &mut local, &used, self.inclusive_prefixes)
            } else {
                inclusive::namespaces_to_render(&self.ctx, &mut local)
            };

            let mut ns_decls: Vec<NsDecl> =
                to_render.namespaces.iter().filter_map(Declaration::to_ns_decl).collect();
            ns_decls.sort();
            attrs.extend(to_render.xml_attributes.iter().filter_map(Declaration::to_attr));
            attrs.sort();

            write!(out, "<{}", element.name.qualified())?;
            for decl in &ns_decls {
                decl.write_to(out)?;
            }
            for attr in &attrs {
                attr.write_to(out)?;
            }
            out.write_all(b">")?;

            for decl in to_render.namespaces.into_iter().chain(to_render.xml_attributes) {
                self.ctx.record_rendered(decl);
            }
        }
        for (_, decl) in local {
            self.ctx.record_unrendered(decl);
        }
        Ok(())
    }

    fn exit_element<W: Write>(&mut self, id: NodeId, out: &mut W) -> Result<(), Error> {
        if self.included(id) {
            if let Some(element) = self.doc.element(id) {
                write!(out, "</{}>", element.name.qualified())?;
            }
        }
        self.ctx.exit_element();
        if self.is_document_element(id) {
            self.position = DocPosition::AfterRoot;
        }
        Ok(())
    }

    fn leaf<W: Write>(&mut self, id: NodeId, kind: &NodeKind, out: &mut W) -> Result<(), Error> {
        if !self.included(id) {
            return Ok(());
        }
        match kind {
            NodeKind::Text(text) | NodeKind::CData(text) => {
                Escape::Text.write(out, text)?;
            }
            NodeKind::Whitespace(text) => {
                if self.position == DocPosition::InRoot {
                    Escape::Text.write(out, text)?;
                }
            }
            NodeKind::Comment(text) => {
                if self.mode.with_comments() {
                    self.document_level(out, |out| write!(out, "<!--{text}-->"))?;
                }
            }
            NodeKind::ProcessingInstruction { target, data } => {
                self.document_level(out, |out| {
                    if data.is_empty() {
                        write!(out, "<?{target}?>")
                    } else {
                        write!(out, "<?{target} ")?;
                        Escape::ProcessingInstruction.write(out, data)?;
                        out.write_all(b"?>")
                    }
                })?;
            }
            NodeKind::Document | NodeKind::Element(_) => {}
        }
        Ok(())
    }

    /// Write a comment or PI with the line feed its position calls for.
    fn document_level<W: Write>(
        &self,
        out: &mut W,
        body: impl FnOnce(&mut W) -> std::io::Result<()>,
    ) -> std::io::Result<()> {
        if self.position == DocPosition::AfterRoot {
            out.write_all(b"\n")?;
        }
        body(out)?;
        if self.position == DocPosition::BeforeRoot {
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Canonical XML 1.0 has no canonical form for a namespace declared with a
/// relative URI reference.
fn require_absolute_namespace(attr: &Attribute) -> Result<(), Error> {
    if attr.declared_prefix().is_none() || attr.value.is_empty() || has_scheme(&attr.value) {
        return Ok(());
    }
    Err(Error::Canonicalization(format!(
        "namespace URI {:?} is relative",
        attr.value
    )))
}

fn has_scheme(uri: &str) -> bool {
    let Some((scheme, _)) = uri.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
