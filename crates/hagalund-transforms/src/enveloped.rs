#![forbid(unsafe_code)]

//! Enveloped signature transform and the XPath filter that expresses the
//! same thing.
//!
//! The enveloped transform removes exactly one `<Signature>` subtree: the
//! one whose 1-based position among all `ds:Signature` elements of the
//! document (in document order) matches the position recorded when the
//! transform was bound to its signature. Nested or sibling signatures are
//! left alone.

use hagalund_core::{algorithm, ns, Error};
use hagalund_xml::{NodeId, NodeSet, XmlDocument};

/// All `ds:Signature` elements of `doc` in document order.
pub fn signature_elements(doc: &XmlDocument) -> Vec<NodeId> {
    doc.descendants(doc.root())
        .filter(|&n| doc.is_element_named(n, ns::DSIG, ns::node::SIGNATURE))
        .collect()
}

/// 1-based position of `signature` among the document's signatures.
pub fn signature_position(doc: &XmlDocument, signature: NodeId) -> Option<usize> {
    signature_elements(doc)
        .iter()
        .position(|&n| n == signature)
        .map(|i| i + 1)
}

/// Remove the `position`-th signature subtree. An out-of-range position
/// removes nothing.
pub fn remove_signature(doc: &XmlDocument, nodes: NodeSet, position: usize) -> NodeSet {
    let target = position
        .checked_sub(1)
        .and_then(|i| signature_elements(doc).get(i).copied());
    match target {
        Some(sig) => nodes.without_subtree(doc, sig),
        None => {
            tracing::debug!(position, "no signature at enveloped position, input unchanged");
            nodes
        }
    }
}

/// Remove every `ds:Signature` subtree.
pub fn remove_all_signatures(doc: &XmlDocument, nodes: NodeSet) -> NodeSet {
    signature_elements(doc)
        .into_iter()
        .fold(nodes, |set, sig| set.without_subtree(doc, sig))
}

/// Accept only `not(ancestor-or-self::P:Signature)` with `P` bound to the
/// signature namespace. General XPath is not evaluated.
pub fn check_xpath_filter(expression: &str, namespaces: &[(String, String)]) -> Result<(), Error> {
    let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
    let prefix = compact
        .strip_prefix("not(ancestor-or-self::")
        .and_then(|rest| rest.strip_suffix(":Signature)"));
    let bound = prefix.is_some_and(|p| {
        namespaces
            .iter()
            .any(|(prefix, uri)| prefix == p && uri == ns::DSIG)
    });
    if bound {
        Ok(())
    } else {
        Err(Error::UnknownAlgorithm(format!(
            "{}: unsupported expression {expression:?}",
            algorithm::XPATH
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hagalund_c14n::{C14nMode, Canonicalizer};

    const NESTED: &str = r#"<r xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:Signature Id="outer"><ds:Object><ds:Signature Id="inner"/></ds:Object></ds:Signature><ds:Signature Id="sibling"/></r>"#;

    fn render(doc: &XmlDocument, nodes: &NodeSet) -> String {
        let out = Canonicalizer::new(doc, C14nMode::Exclusive).canonicalize(nodes).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_positions_follow_document_order() {
        let doc = XmlDocument::parse(NESTED).unwrap();
        let sigs = signature_elements(&doc);
        assert_eq!(sigs.len(), 3);
        assert_eq!(doc.attribute(sigs[1], "Id"), Some("inner"));
        assert_eq!(signature_position(&doc, sigs[2]), Some(3));
    }

    #[test]
    fn test_removes_only_the_selected_signature() {
        let doc = XmlDocument::parse(NESTED).unwrap();
        let nodes = remove_signature(&doc, NodeSet::all(), 3);
        let out = render(&doc, &nodes);
        assert!(out.contains(r#"Id="outer""#));
        assert!(out.contains(r#"Id="inner""#));
        assert!(!out.contains(r#"Id="sibling""#));

        let nodes = remove_signature(&doc, NodeSet::all(), 2);
        let out = render(&doc, &nodes);
        assert!(out.contains(r#"Id="outer""#));
        assert!(!out.contains(r#"Id="inner""#));
    }

    #[test]
    fn test_missing_position_passes_through() {
        let doc = XmlDocument::parse(NESTED).unwrap();
        let all = render(&doc, &NodeSet::all());
        assert_eq!(render(&doc, &remove_signature(&doc, NodeSet::all(), 9)), all);
        assert_eq!(render(&doc, &remove_signature(&doc, NodeSet::all(), 0)), all);
    }

    #[test]
    fn test_xpath_filter_idiom() {
        let bound = vec![("dsig".to_owned(), ns::DSIG.to_owned())];
        assert!(check_xpath_filter("not(ancestor-or-self::dsig:Signature)", &bound).is_ok());
        assert!(check_xpath_filter(" not( ancestor-or-self::dsig:Signature )\n", &bound).is_ok());
        assert!(check_xpath_filter("not(ancestor-or-self::other:Signature)", &bound).is_err());
        assert!(check_xpath_filter("//*", &bound).is_err());
        let wrong = vec![("dsig".to_owned(), "urn:x".to_owned())];
        assert!(check_xpath_filter("not(ancestor-or-self::dsig:Signature)", &wrong).is_err());
    }

    #[test]
    fn test_remove_all() {
        let doc = XmlDocument::parse(NESTED).unwrap();
        let nodes = remove_all_signatures(&doc, NodeSet::all());
        assert_eq!(render(&doc, &nodes), "<r></r>");
    }
}
