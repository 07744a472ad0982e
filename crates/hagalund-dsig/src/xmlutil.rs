#![forbid(unsafe_code)]

//! Helpers shared by the element readers and writers.

use base64::Engine;
use hagalund_core::{ns, Error};
use hagalund_xml::{NodeId, QName, XmlDocument};

/// Fail unless every attribute of `node` is in `allowed`, a namespace
/// declaration or an `xml:` attribute.
pub(crate) fn check_attributes(doc: &XmlDocument, node: NodeId, allowed: &[&str]) -> Result<(), Error> {
    let Some(element) = doc.element(node) else {
        return Ok(());
    };
    for attr in &element.attributes {
        if attr.is_namespace_decl() || attr.is_xml_attr() {
            continue;
        }
        if attr.name.prefix.is_some() || !allowed.contains(&attr.name.local.as_str()) {
            return Err(Error::MalformedSignature(format!(
                "unexpected attribute {} on {}",
                attr.name.qualified(),
                element.name.local
            )));
        }
    }
    Ok(())
}

/// Element children of `node`, all of which must be in the signature
/// namespace.
pub(crate) fn dsig_children(doc: &XmlDocument, node: NodeId) -> Result<Vec<NodeId>, Error> {
    let children: Vec<NodeId> = doc.child_elements(node).collect();
    if let Some(&foreign) = children
        .iter()
        .find(|&&c| doc.element(c).is_some_and(|e| e.namespace_str() != ns::DSIG))
    {
        return Err(Error::MalformedSignature(format!(
            "unexpected element {}",
            local_name(doc, foreign)
        )));
    }
    Ok(children)
}

pub(crate) fn expect_named(doc: &XmlDocument, node: NodeId, local: &str) -> Result<(), Error> {
    if doc.is_element_named(node, ns::DSIG, local) {
        Ok(())
    } else {
        Err(Error::MalformedSignature(format!(
            "expected {local}, found {}",
            local_name(doc, node)
        )))
    }
}

fn local_name(doc: &XmlDocument, node: NodeId) -> String {
    doc.element(node)
        .map(|e| e.name.qualified())
        .unwrap_or_default()
}

/// The `Algorithm` attribute of `node`.
pub(crate) fn algorithm_attr<'d>(doc: &'d XmlDocument, node: NodeId) -> Result<&'d str, Error> {
    doc.attribute(node, ns::attr::ALGORITHM).ok_or_else(|| {
        Error::MalformedSignature(format!("{} without Algorithm", local_name(doc, node)))
    })
}

pub(crate) fn decode_base64(text: &str, what: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| Error::Base64(format!("{what}: {e}")))
}

pub(crate) fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Append an empty signature-namespace element.
pub(crate) fn dsig_element(doc: &mut XmlDocument, parent: NodeId, prefix: Option<&str>, local: &str) -> NodeId {
    doc.append_element(parent, QName::new(prefix, local), Some(ns::DSIG))
}

/// Append a signature-namespace element holding `text`.
pub(crate) fn dsig_text_element(
    doc: &mut XmlDocument,
    parent: NodeId,
    prefix: Option<&str>,
    local: &str,
    text: &str,
) -> NodeId {
    let node = dsig_element(doc, parent, prefix, local);
    if !text.is_empty() {
        doc.append_text(node, text);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_whitelist() {
        let doc = XmlDocument::parse(
            r#"<Reference xmlns="http://www.w3.org/2000/09/xmldsig#" xml:lang="en" URI="" Id="r"/>"#,
        )
        .unwrap();
        let node = doc.document_element().unwrap();
        assert!(check_attributes(&doc, node, &["Id", "URI"]).is_ok());
        assert!(check_attributes(&doc, node, &["URI"]).is_err());
    }

    #[test]
    fn test_foreign_child_rejected() {
        let doc = XmlDocument::parse(
            r#"<ds:SignedInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:x="urn:x"><x:Evil/></ds:SignedInfo>"#,
        )
        .unwrap();
        let err = dsig_children(&doc, doc.document_element().unwrap()).unwrap_err();
        assert!(matches!(err, Error::MalformedSignature(_)));
    }

    #[test]
    fn test_base64_wrapped_lines() {
        assert_eq!(decode_base64("aGVs\r\n bG8=", "value").unwrap(), b"hello");
        assert!(matches!(decode_base64("%%", "value"), Err(Error::Base64(_))));
    }
}
