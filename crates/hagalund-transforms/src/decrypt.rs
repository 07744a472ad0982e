#![forbid(unsafe_code)]

//! Decryption transform (`http://www.w3.org/2002/07/decrypt#XML`).
//!
//! `EncryptedData` elements named by an `Except` URI stay as they are.
//! Decryption itself is not supported, so any other `EncryptedData` left in
//! the input fails the transform. Input without such elements passes
//! through unchanged.

use hagalund_core::{algorithm, ns, Error};
use hagalund_xml::{NodeSet, XmlDocument};

/// Id named by an `Except` URI. Only same-document `#id` references are
/// allowed.
pub fn except_id(uri: &str) -> Result<&str, Error> {
    uri.strip_prefix('#')
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            Error::MalformedSignature(format!(
                "{}: Except URI {uri:?} is not a same-document reference",
                algorithm::DECRYPT_XML
            ))
        })
}

pub fn pass_through_unencrypted(doc: &XmlDocument, nodes: NodeSet, except: &[String]) -> Result<NodeSet, Error> {
    let pending = doc
        .descendants(doc.root())
        .filter(|&n| nodes.contains(doc, n) && doc.is_element_named(n, ns::XMLENC, ns::node::ENCRYPTED_DATA))
        .filter(|&n| {
            !doc.attribute(n, ns::attr::ID)
                .is_some_and(|id| except.iter().any(|e| e == id))
        })
        .count();
    if pending > 0 {
        return Err(Error::Crypto(format!(
            "{}: {pending} EncryptedData element(s) would need decrypting",
            algorithm::DECRYPT_XML
        )));
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<r xmlns:xenc="http://www.w3.org/2001/04/xmlenc#"><a>1</a><xenc:EncryptedData Id="e1"/></r>"#;

    #[test]
    fn test_plain_input_passes_through() {
        let doc = XmlDocument::parse("<r><a>1</a></r>").unwrap();
        let nodes = pass_through_unencrypted(&doc, NodeSet::all(), &[]).unwrap();
        assert_eq!(nodes, NodeSet::all());
    }

    #[test]
    fn test_excepted_encrypted_data_is_kept() {
        let doc = XmlDocument::parse(DOC).unwrap();
        assert!(pass_through_unencrypted(&doc, NodeSet::all(), &["e1".to_owned()]).is_ok());
        let err = pass_through_unencrypted(&doc, NodeSet::all(), &["e2".to_owned()]).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_except_uri_forms() {
        assert_eq!(except_id("#e1").unwrap(), "e1");
        assert!(except_id("#").is_err());
        assert!(except_id("http://example.com/doc#e1").is_err());
    }
}
