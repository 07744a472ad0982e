#![forbid(unsafe_code)]

//! Ancestor namespace bookkeeping for canonicalization.
//!
//! One [`NamespaceFrame`] is pushed for every element the walker enters and
//! popped when it leaves, so at any point the stack mirrors the chain of open
//! elements. Each frame remembers which declarations were written out
//! (`rendered`) and which were seen but held back (`unrendered`). The
//! inclusive and exclusive policies both decide what an element must emit by
//! searching this stack from the innermost frame outwards.

use crate::render::{Attr, NsDecl};
use hagalund_core::ns;
use hagalund_xml::Attribute;
use std::collections::{BTreeMap, HashMap};

/// What a declaration binds. `xml:` attributes live in their own key space
/// so that `xmlns:lang` and `xml:lang` never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclKey {
    /// A namespace prefix; `""` is the default namespace.
    Namespace(String),
    /// The local name of an `xml:` attribute.
    Xml(String),
}

/// A namespace declaration or an inheritable `xml:` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub key: DeclKey,
    pub value: String,
    /// Copied onto a fragment root from the original ancestors.
    pub propagated: bool,
}

impl Declaration {
    pub fn namespace(prefix: &str, uri: &str) -> Self {
        Self {
            key: DeclKey::Namespace(prefix.to_owned()),
            value: uri.to_owned(),
            propagated: false,
        }
    }

    /// Classify an attribute; `None` for ordinary attributes.
    pub fn from_attribute(attr: &Attribute) -> Option<Self> {
        let key = if let Some(prefix) = attr.declared_prefix() {
            DeclKey::Namespace(prefix.to_owned())
        } else if attr.is_xml_attr() {
            DeclKey::Xml(attr.name.local.clone())
        } else {
            return None;
        };
        Some(Self {
            key,
            value: attr.value.clone(),
            propagated: attr.propagated,
        })
    }

    pub fn is_namespace(&self) -> bool {
        matches!(self.key, DeclKey::Namespace(_))
    }

    /// `xmlns=""`: undeclares the default namespace.
    pub fn is_empty_default(&self) -> bool {
        matches!(&self.key, DeclKey::Namespace(p) if p.is_empty()) && self.value.is_empty()
    }

    pub fn to_ns_decl(&self) -> Option<NsDecl> {
        match &self.key {
            DeclKey::Namespace(prefix) => Some(NsDecl {
                prefix: prefix.clone(),
                uri: self.value.clone(),
            }),
            DeclKey::Xml(_) => None,
        }
    }

    pub fn to_attr(&self) -> Option<Attr> {
        match &self.key {
            DeclKey::Xml(local) => Some(Attr {
                ns_uri: ns::XML.to_owned(),
                local_name: local.clone(),
                qualified_name: format!("xml:{local}"),
                value: self.value.clone(),
            }),
            DeclKey::Namespace(_) => None,
        }
    }
}

/// Redundancy rule shared by both policies.
///
/// With no rendered ancestor declaration, everything except `xmlns=""` is
/// needed. Otherwise a declaration is needed only when its value differs.
pub fn is_non_redundant(decl: &Declaration, nearest_rendered: Option<&Declaration>) -> bool {
    match nearest_rendered {
        None => !decl.is_empty_default(),
        Some(rendered) => rendered.value != decl.value,
    }
}

/// Declarations found on the element being processed, keyed and ordered.
pub type LocalDeclarations = BTreeMap<DeclKey, Declaration>;

/// Record `decl` as locally declared on the current element.
pub fn track_declaration(local: &mut LocalDeclarations, decl: Declaration) {
    local.entry(decl.key.clone()).or_insert(decl);
}

#[derive(Debug, Default)]
pub struct NamespaceFrame {
    rendered: HashMap<DeclKey, Declaration>,
    unrendered: HashMap<DeclKey, Declaration>,
}

/// The frame stack.
#[derive(Debug, Default)]
pub struct NamespaceContext {
    frames: Vec<NamespaceFrame>,
}

impl NamespaceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_element(&mut self) {
        self.frames.push(NamespaceFrame::default());
    }

    pub fn exit_element(&mut self) {
        self.frames.pop();
    }

    /// Number of open frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Innermost rendered declaration for `key` and the index of its frame.
    pub fn nearest_rendered(&self, key: &DeclKey) -> Option<(&Declaration, usize)> {
        self.frames
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, f)| f.rendered.get(key).map(|d| (d, depth)))
    }

    /// Innermost unrendered declaration for `key` and the index of its frame.
    pub fn nearest_unrendered(&self, key: &DeclKey) -> Option<(&Declaration, usize)> {
        self.frames
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, f)| f.unrendered.get(key).map(|d| (d, depth)))
    }

    /// Keys held back by any open ancestor, innermost first, without repeats.
    pub fn unrendered_keys(&self) -> Vec<DeclKey> {
        let mut keys: Vec<DeclKey> = Vec::new();
        for frame in self.frames.iter().rev() {
            let mut frame_keys: Vec<&DeclKey> = frame.unrendered.keys().collect();
            frame_keys.sort();
            for k in frame_keys {
                if !keys.contains(k) {
                    keys.push(k.clone());
                }
            }
        }
        keys
    }

    /// An ancestor's held-back declaration that a newly rendered element must
    /// now emit: it sits deeper than any rendered one for the same key and
    /// differs from it.
    pub fn inherited_to_render(&self, key: &DeclKey) -> Option<Declaration> {
        let (unrendered, u_depth) = self.nearest_unrendered(key)?;
        let rendered = self.nearest_rendered(key);
        let deeper = rendered.map_or(true, |(_, r_depth)| u_depth > r_depth);
        (deeper && is_non_redundant(unrendered, rendered.map(|(d, _)| d)))
            .then(|| unrendered.clone())
    }

    pub fn record_rendered(&mut self, decl: Declaration) {
        if let Some(frame) = self.frames.last_mut() {
            frame.rendered.insert(decl.key.clone(), decl);
        }
    }

    pub fn record_unrendered(&mut self, decl: Declaration) {
        if let Some(frame) = self.frames.last_mut() {
            frame.unrendered.insert(decl.key.clone(), decl);
        }
    }
}

/// Output of a policy for one element.
#[derive(Debug, Default)]
pub struct ToRender {
    /// Namespace declarations, written before the attributes.
    pub namespaces: Vec<Declaration>,
    /// Inherited or local `xml:` attributes, written among the attributes.
    pub xml_attributes: Vec<Declaration>,
}

impl ToRender {
    pub fn push(&mut self, decl: Declaration) {
        if decl.is_namespace() {
            self.namespaces.push(decl);
        } else {
            self.xml_attributes.push(decl);
        }
    }

    pub fn renders(&self, key: &DeclKey) -> bool {
        self.namespaces
            .iter()
            .chain(&self.xml_attributes)
            .any(|d| &d.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redundancy_rule() {
        let a_x = Declaration::namespace("a", "urn:x");
        let a_y = Declaration::namespace("a", "urn:y");
        assert!(is_non_redundant(&a_x, None));
        assert!(!is_non_redundant(&a_x, Some(&a_x.clone())));
        assert!(is_non_redundant(&a_y, Some(&a_x)));

        let undeclare = Declaration::namespace("", "");
        assert!(!is_non_redundant(&undeclare, None));
        assert!(is_non_redundant(
            &undeclare,
            Some(&Declaration::namespace("", "urn:d"))
        ));
    }

    #[test]
    fn test_frames_search_innermost_first() {
        let mut ctx = NamespaceContext::new();
        ctx.enter_element();
        ctx.record_rendered(Declaration::namespace("a", "urn:outer"));
        ctx.enter_element();
        ctx.record_unrendered(Declaration::namespace("a", "urn:inner"));
        ctx.enter_element();

        let key = DeclKey::Namespace("a".into());
        let (r, r_depth) = ctx.nearest_rendered(&key).unwrap();
        assert_eq!((r.value.as_str(), r_depth), ("urn:outer", 0));
        let (u, u_depth) = ctx.nearest_unrendered(&key).unwrap();
        assert_eq!((u.value.as_str(), u_depth), ("urn:inner", 1));
        assert_eq!(
            ctx.inherited_to_render(&key).map(|d| d.value),
            Some("urn:inner".to_owned())
        );

        ctx.exit_element();
        ctx.exit_element();
        assert!(ctx.nearest_unrendered(&key).is_none());
        ctx.exit_element();
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_inherited_suppressed_by_deeper_rendered() {
        let mut ctx = NamespaceContext::new();
        ctx.enter_element();
        ctx.record_unrendered(Declaration::namespace("p", "urn:p"));
        ctx.enter_element();
        ctx.record_rendered(Declaration::namespace("p", "urn:p"));
        ctx.enter_element();
        assert!(ctx
            .inherited_to_render(&DeclKey::Namespace("p".into()))
            .is_none());
    }
}
