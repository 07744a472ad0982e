#![forbid(unsafe_code)]

//! MPEG-21 REL license transform.
//!
//! Narrows the input to its first `r:license` element and drops the
//! `ds:Signature` carried by each of the license's `r:issuer` children, so
//! an issuer's signature can cover the license it sits in. Encrypted grants
//! are never decrypted: a license holding one fails the transform.

use hagalund_core::{algorithm, ns, Error};
use hagalund_xml::{NodeSet, XmlDocument};

pub fn strip_issuer_signatures(doc: &XmlDocument, nodes: NodeSet) -> Result<NodeSet, Error> {
    let license = doc
        .descendants(doc.root())
        .find(|&n| nodes.contains(doc, n) && doc.is_element_named(n, ns::REL, ns::node::LICENSE))
        .ok_or_else(|| {
            Error::MalformedSignature(format!("{}: input has no r:license element", algorithm::LICENSE))
        })?;
    if !doc
        .find_descendants(license, ns::REL, ns::node::ENCRYPTED_GRANT)
        .is_empty()
    {
        return Err(Error::Crypto(format!(
            "{}: encrypted grants are not supported",
            algorithm::LICENSE
        )));
    }

    let mut selected = NodeSet::subset(doc.descendants(license).filter(|&n| nodes.contains(doc, n)));
    if !nodes.includes_comments() {
        selected = selected.without_comments();
    }
    let issuers = doc
        .child_elements(license)
        .filter(|&c| doc.is_element_named(c, ns::REL, ns::node::ISSUER));
    for issuer in issuers {
        let signature = doc
            .descendants(issuer)
            .find(|&n| doc.is_element_named(n, ns::DSIG, ns::node::SIGNATURE));
        if let Some(signature) = signature {
            tracing::trace!("dropping issuer signature from license");
            selected = selected.without_subtree(doc, signature);
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hagalund_c14n::{C14nMode, Canonicalizer};

    const LICENSE: &str = r#"<wrap xmlns:r="urn:mpeg:mpeg21:2003:01-REL-R-NS" xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><other/><r:license><r:grant>play</r:grant><r:issuer><ds:Signature Id="s1"/><r:details>d</r:details></r:issuer><ds:Signature Id="kept"/></r:license></wrap>"#;

    fn render(doc: &XmlDocument, nodes: &NodeSet) -> String {
        let out = Canonicalizer::new(doc, C14nMode::Exclusive).canonicalize(nodes).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_issuer_signature_is_removed() {
        let doc = XmlDocument::parse(LICENSE).unwrap();
        let out = render(&doc, &strip_issuer_signatures(&doc, NodeSet::all()).unwrap());
        assert!(out.starts_with(r#"<r:license xmlns:r="urn:mpeg:mpeg21:2003:01-REL-R-NS">"#));
        assert!(out.contains("<r:grant>play</r:grant>"));
        assert!(out.contains("<r:issuer><r:details>d</r:details></r:issuer>"));
        assert!(!out.contains(r#"Id="s1""#));
        assert!(out.contains(r#"Id="kept""#));
        assert!(!out.contains("other"));
    }

    #[test]
    fn test_encrypted_grant_fails() {
        let doc = XmlDocument::parse(
            r#"<r:license xmlns:r="urn:mpeg:mpeg21:2003:01-REL-R-NS"><r:encryptedGrant/></r:license>"#,
        )
        .unwrap();
        let err = strip_issuer_signatures(&doc, NodeSet::all()).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_input_without_license() {
        let doc = XmlDocument::parse("<r/>").unwrap();
        let err = strip_issuer_signatures(&doc, NodeSet::all()).unwrap_err();
        assert!(matches!(err, Error::MalformedSignature(_)));
    }
}
