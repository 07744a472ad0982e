#![forbid(unsafe_code)]

//! Plain XML serialization of an [`XmlDocument`] subtree.
//!
//! This is the ordinary, non-canonical form used when a signature element is
//! emitted: attributes keep their stored order, empty elements are written
//! self-closing and no XML declaration is produced.

use crate::document::{NodeId, NodeKind, XmlDocument};

/// Serialize `id` and everything below it.
pub fn write_node(doc: &XmlDocument, id: NodeId) -> String {
    let mut out = String::new();
    let mut stack = vec![Step::Enter(id)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(node) => match doc.kind(node) {
                NodeKind::Document => {
                    stack.extend(doc.children(node).iter().rev().map(|&c| Step::Enter(c)));
                }
                NodeKind::Element(e) => {
                    out.push('<');
                    out.push_str(&e.name.qualified());
                    for a in &e.attributes {
                        out.push(' ');
                        out.push_str(&a.name.qualified());
                        out.push_str("=\"");
                        out.push_str(&escape_attr(&a.value));
                        out.push('"');
                    }
                    let children = doc.children(node);
                    if children.is_empty() {
                        out.push_str("/>");
                    } else {
                        out.push('>');
                        stack.push(Step::Exit(node));
                        stack.extend(children.iter().rev().map(|&c| Step::Enter(c)));
                    }
                }
                NodeKind::Text(t) | NodeKind::Whitespace(t) => out.push_str(&escape_text(t)),
                NodeKind::CData(t) => {
                    out.push_str("<![CDATA[");
                    out.push_str(t);
                    out.push_str("]]>");
                }
                NodeKind::Comment(t) => {
                    out.push_str("<!--");
                    out.push_str(t);
                    out.push_str("-->");
                }
                NodeKind::ProcessingInstruction { target, data } => {
                    out.push_str("<?");
                    out.push_str(target);
                    if !data.is_empty() {
                        out.push(' ');
                        out.push_str(data);
                    }
                    out.push_str("?>");
                }
            },
            Step::Exit(node) => {
                if let Some(e) = doc.element(node) {
                    out.push_str("</");
                    out.push_str(&e.name.qualified());
                    out.push('>');
                }
            }
        }
    }
    out
}

enum Step {
    Enter(NodeId),
    Exit(NodeId),
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::document::{QName, XmlDocument};

    #[test]
    fn test_build_and_write() {
        let mut doc = XmlDocument::new();
        let root = doc.root();
        let sig = doc.append_element(root, QName::new(None, "Signature"), Some("urn:s"));
        doc.set_attribute(
            sig,
            crate::document::Attribute::namespace_decl("", "urn:s"),
        );
        let v = doc.append_element(sig, QName::new(None, "Value"), Some("urn:s"));
        doc.set_attr(v, "Note", "a\"b\n");
        doc.append_text(v, "x<y&z");
        doc.append_element(sig, QName::new(None, "Empty"), Some("urn:s"));
        assert_eq!(
            doc.to_xml_string(),
            "<Signature xmlns=\"urn:s\"><Value Note=\"a&quot;b&#xA;\">x&lt;y&amp;z</Value><Empty/></Signature>"
        );
    }

    #[test]
    fn test_reparse_is_stable() {
        let src = "<?pi data?><!--c--><r a=\"1\">t<![CDATA[<raw>]]></r>";
        let doc = XmlDocument::parse(src).unwrap();
        let written = doc.to_xml_string();
        assert_eq!(written, "<?pi data?><!--c--><r a=\"1\">t&lt;raw&gt;</r>");
        let again = XmlDocument::parse(&written).unwrap();
        assert_eq!(again.to_xml_string(), written);
    }
}
