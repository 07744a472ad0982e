#![forbid(unsafe_code)]

//! `<Object>`: data carried inside an enveloping signature.

use crate::xmlutil::{check_attributes, dsig_element};
use hagalund_c14n::fragment_with_context;
use hagalund_core::{ns, Error};
use hagalund_xml::{NodeId, XmlDocument};

#[derive(Debug, Clone, Default)]
pub struct DataObject {
    pub id: Option<String>,
    pub mime_type: Option<String>,
    pub encoding: Option<String>,
    /// Children of the document node are the Object's content.
    content: XmlDocument,
}

impl DataObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Append character data to the content.
    pub fn with_text(mut self, text: &str) -> Self {
        let root = self.content.root();
        self.content.append_text(root, text);
        self
    }

    /// Append a parsed XML element to the content.
    pub fn with_xml(mut self, xml: &str) -> Result<Self, Error> {
        let parsed = XmlDocument::parse(xml)?;
        if let Some(element) = parsed.document_element() {
            let root = self.content.root();
            self.content.import_subtree(&parsed, element, root);
        }
        Ok(self)
    }

    /// Read an `<Object>` element. Element content keeps the namespace
    /// bindings it had in the source document.
    pub fn from_xml(doc: &XmlDocument, node: NodeId) -> Result<Self, Error> {
        check_attributes(doc, node, &[ns::attr::ID, ns::attr::MIME_TYPE, ns::attr::ENCODING])?;
        let mut content = XmlDocument::new();
        let root = content.root();
        for &child in doc.children(node) {
            if doc.is_element(child) {
                let fragment = fragment_with_context(doc, child);
                if let Some(element) = fragment.document_element() {
                    content.import_subtree(&fragment, element, root);
                }
            } else {
                content.import_subtree(doc, child, root);
            }
        }
        Ok(Self {
            id: doc.attribute(node, ns::attr::ID).map(str::to_owned),
            mime_type: doc.attribute(node, ns::attr::MIME_TYPE).map(str::to_owned),
            encoding: doc.attribute(node, ns::attr::ENCODING).map(str::to_owned),
            content,
        })
    }

    pub fn append_to(&self, doc: &mut XmlDocument, parent: NodeId, prefix: Option<&str>) -> NodeId {
        let node = dsig_element(doc, parent, prefix, ns::node::OBJECT);
        for (name, value) in [
            (ns::attr::ID, &self.id),
            (ns::attr::MIME_TYPE, &self.mime_type),
            (ns::attr::ENCODING, &self.encoding),
        ] {
            if let Some(value) = value {
                doc.set_attr(node, name, value);
            }
        }
        for &child in self.content.children(self.content.root()) {
            doc.import_subtree(&self.content, child, node);
        }
        node
    }

    /// The content serialized as written.
    pub fn content_xml(&self) -> String {
        self.content.to_xml_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_keeps_context_bindings() {
        let doc = XmlDocument::parse(
            r#"<ds:Object xmlns:ds="http://www.w3.org/2000/09/xmldsig#" xmlns:p="urn:p" Id="obj" MimeType="text/xml">text<p:data/></ds:Object>"#,
        )
        .unwrap();
        let object = DataObject::from_xml(&doc, doc.document_element().unwrap()).unwrap();
        assert_eq!(object.id.as_deref(), Some("obj"));
        assert_eq!(object.mime_type.as_deref(), Some("text/xml"));
        assert!(object.content_xml().starts_with("text<p:data"));
        assert!(object.content_xml().contains(r#"xmlns:p="urn:p""#));
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let doc = XmlDocument::parse(
            r#"<ds:Object xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Target="x"/>"#,
        )
        .unwrap();
        let err = DataObject::from_xml(&doc, doc.document_element().unwrap()).unwrap_err();
        assert!(matches!(err, Error::MalformedSignature(_)));
    }

    #[test]
    fn test_written_object() {
        let object = DataObject::new()
            .with_id("o")
            .with_xml(r#"<data xmlns="urn:d">42</data>"#)
            .unwrap();
        let mut doc = XmlDocument::parse(r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"/>"#).unwrap();
        let sig = doc.document_element().unwrap();
        object.append_to(&mut doc, sig, Some("ds"));
        assert_eq!(
            doc.to_xml_string(),
            r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:Object Id="o"><data xmlns="urn:d">42</data></ds:Object></ds:Signature>"#
        );
    }
}
