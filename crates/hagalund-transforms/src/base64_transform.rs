#![forbid(unsafe_code)]

//! Base64 decode transform.

use crate::pipeline::TransformData;
use base64::Engine;
use hagalund_core::Error;
use hagalund_xml::{NodeKind, NodeSet, XmlDocument};

/// Decode the base64 text carried by `input`.
///
/// A stream is decoded as text. For XML input the text nodes in the set are
/// concatenated in document order; markup itself is ignored. Whitespace is
/// stripped before decoding.
pub fn decode(input: TransformData) -> Result<Vec<u8>, Error> {
    let text = match input {
        TransformData::Stream(bytes) => String::from_utf8(bytes)
            .map_err(|e| Error::Base64(format!("input is not UTF-8: {e}")))?,
        TransformData::Document(doc) => included_text(&doc, &NodeSet::all()),
        TransformData::NodeSet { doc, nodes } => included_text(&doc, &nodes),
    };
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(&cleaned)
        .map_err(|e| Error::Base64(format!("decode error: {e}")))
}

fn included_text(doc: &XmlDocument, nodes: &NodeSet) -> String {
    let mut out = String::new();
    for id in doc.descendants(doc.root()) {
        if !nodes.contains(doc, id) {
            continue;
        }
        if let NodeKind::Text(t) | NodeKind::CData(t) | NodeKind::Whitespace(t) = doc.kind(id) {
            out.push_str(t);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_stream() {
        let out = decode(TransformData::Stream(b"aGVs\n  bG8=\n".to_vec())).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_only_included_text_counts() {
        let doc = XmlDocument::parse("<r><a>aGVs</a><b>junk</b><c>bG8=</c></r>").unwrap();
        let root = doc.document_element().unwrap();
        let skip = doc.child_elements(root).nth(1).unwrap();
        let nodes = NodeSet::all().without_subtree(&doc, skip);
        let out = decode(TransformData::NodeSet { doc, nodes }).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_invalid_input() {
        let err = decode(TransformData::Stream(b"not base64!".to_vec())).unwrap_err();
        assert!(matches!(err, Error::Base64(_)));
    }
}
