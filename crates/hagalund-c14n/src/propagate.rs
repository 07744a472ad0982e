#![forbid(unsafe_code)]

//! Carrying ancestor context onto a detached fragment.
//!
//! A subtree that is canonicalized on its own (a referenced element, or
//! SignedInfo) must still see the namespace bindings and `xml:` attributes
//! that were in scope at its original position. These helpers collect them
//! from the ancestors and attach them to the fragment root, flagged as
//! propagated.

use hagalund_xml::{Attribute, NodeId, XmlDocument};

/// `true` when `element` itself declares `prefix` as `uri`.
fn is_committed(doc: &XmlDocument, element: NodeId, prefix: &str, uri: &str) -> bool {
    doc.element(element)
        .and_then(|e| e.declaration(prefix))
        .is_some_and(|d| d.value == uri)
}

/// `true` when an ancestor of `element` already declares `prefix` as `uri`.
fn is_redundant(doc: &XmlDocument, element: NodeId, prefix: &str, uri: &str) -> bool {
    doc.ancestors(element)
        .any(|a| is_committed(doc, a, prefix, uri))
}

fn synthesize(
    doc: &XmlDocument,
    element: NodeId,
    prefix: &str,
    uri: &str,
    out: &mut Vec<Attribute>,
) {
    if !is_committed(doc, element, prefix, uri) && !is_redundant(doc, element, prefix, uri) {
        out.push(Attribute::namespace_decl(prefix, uri));
    }
}

/// Declarations and `xml:` attributes in scope at `from` and its ancestors,
/// innermost first. Duplicates are kept; the first occurrence of a name wins
/// when they are attached.
pub fn propagated_declarations(doc: &XmlDocument, from: Option<NodeId>) -> Vec<Attribute> {
    let mut out = Vec::new();
    let Some(from) = from else {
        return out;
    };
    let mut default_pending = true;
    for id in std::iter::once(from).chain(doc.ancestors(from)) {
        let Some(element) = doc.element(id) else {
            continue;
        };
        synthesize(
            doc,
            id,
            element.name.prefix_str(),
            element.namespace_str(),
            &mut out,
        );
        for attr in &element.attributes {
            if attr.declared_prefix() == Some("") {
                if default_pending {
                    out.push(attr.clone());
                    default_pending = false;
                }
                continue;
            }
            if attr.is_namespace_decl() || attr.is_xml_attr() {
                out.push(attr.clone());
                continue;
            }
            if let (Some(prefix), Some(uri)) = (attr.name.prefix.as_deref(), attr.namespace.as_deref()) {
                synthesize(doc, id, prefix, uri, &mut out);
            }
        }
    }
    out
}

/// Attach `decls` to `root`, skipping names the element already carries and
/// the default namespace on an unprefixed root.
pub fn add_declarations(fragment: &mut XmlDocument, root: NodeId, decls: &[Attribute]) {
    for decl in decls {
        let name = decl.name.qualified();
        let Some(element) = fragment.element(root) else {
            return;
        };
        let unprefixed_root = element.name.prefix.is_none();
        if element.attribute_qualified(&name).is_some() || (name == "xmlns" && unprefixed_root) {
            continue;
        }
        let mut decl = decl.clone();
        decl.propagated = true;
        fragment.set_attribute(root, decl);
    }
}

/// A copy of `element` as a standalone document, carrying the context of its
/// original position.
pub fn fragment_with_context(doc: &XmlDocument, element: NodeId) -> XmlDocument {
    let mut fragment = doc.extract_fragment(element);
    if let Some(root) = fragment.document_element() {
        let decls = propagated_declarations(doc, doc.parent_element(element));
        add_declarations(&mut fragment, root, &decls);
    }
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{canonicalize_doc, C14nMode};
    use hagalund_xml::NodeSet;

    fn c14n(doc: &XmlDocument, mode: C14nMode) -> String {
        String::from_utf8(canonicalize_doc(doc, mode, Some(&NodeSet::all()), &[]).unwrap()).unwrap()
    }

    #[test]
    fn test_fragment_inherits_bindings() {
        let doc = XmlDocument::parse(
            r#"<p:root xmlns:p="urn:p" xmlns:q="urn:q" xml:lang="en"><p:mid><p:leaf q:a="1"/></p:mid></p:root>"#,
        )
        .unwrap();
        let leaf = doc.descendants(doc.root()).find(|&n| {
            doc.element(n).is_some_and(|e| e.name.local == "leaf")
        }).unwrap();
        let fragment = fragment_with_context(&doc, leaf);
        assert_eq!(
            c14n(&fragment, C14nMode::Inclusive),
            r#"<p:leaf xmlns:p="urn:p" xmlns:q="urn:q" xml:lang="en" q:a="1"></p:leaf>"#
        );
        assert_eq!(
            c14n(&fragment, C14nMode::Exclusive),
            r#"<p:leaf xmlns:p="urn:p" xmlns:q="urn:q" q:a="1"></p:leaf>"#
        );
    }

    #[test]
    fn test_innermost_declaration_wins() {
        let doc = XmlDocument::parse(
            r#"<r xmlns:a="urn:outer"><m xmlns:a="urn:inner"><a:t/></m></r>"#,
        )
        .unwrap();
        let m = doc.document_element().and_then(|r| doc.child_elements(r).next()).unwrap();
        let t = doc.child_elements(m).next().unwrap();
        let fragment = fragment_with_context(&doc, t);
        assert_eq!(
            c14n(&fragment, C14nMode::Inclusive),
            r#"<a:t xmlns:a="urn:inner"></a:t>"#
        );
    }

    #[test]
    fn test_default_not_added_to_unprefixed_root() {
        let doc = XmlDocument::parse(r#"<r xmlns="urn:d"><s/></r>"#).unwrap();
        let s = doc.document_element().and_then(|r| doc.child_elements(r).next()).unwrap();
        let fragment = fragment_with_context(&doc, s);
        let root = fragment.document_element().unwrap();
        let element = fragment.element(root).unwrap();
        assert!(element.declaration("").is_none());
        assert_eq!(element.namespace_str(), "urn:d");
        assert_eq!(c14n(&fragment, C14nMode::Inclusive), r#"<s xmlns="urn:d"></s>"#);
    }

    #[test]
    fn test_existing_attribute_kept() {
        let doc = XmlDocument::parse(r#"<r xml:lang="en"><s xml:lang="fr"/></r>"#).unwrap();
        let s = doc.document_element().and_then(|r| doc.child_elements(r).next()).unwrap();
        let fragment = fragment_with_context(&doc, s);
        assert_eq!(c14n(&fragment, C14nMode::Inclusive), r#"<s xml:lang="fr"></s>"#);
    }

    #[test]
    fn test_propagated_flag_set() {
        let doc = XmlDocument::parse(r#"<r xmlns:p="urn:p"><s/></r>"#).unwrap();
        let s = doc.document_element().and_then(|r| doc.child_elements(r).next()).unwrap();
        let fragment = fragment_with_context(&doc, s);
        let root = fragment.document_element().unwrap();
        let decl = fragment.element(root).and_then(|e| e.declaration("p")).unwrap();
        assert!(decl.propagated);
    }
}
