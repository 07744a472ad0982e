#![forbid(unsafe_code)]

//! Reading and writing `<Transform>` elements.

use crate::decrypt;
use crate::pipeline::Transform;
use hagalund_c14n::{fragment_with_context, C14nMode};
use hagalund_core::{algorithm, ns, Error};
use hagalund_xml::{Attribute, NodeId, QName, XmlDocument};

const EXC_C14N_PREFIX: &str = "ec";
const DECRYPT_PREFIX: &str = "dcrpt";

impl Transform {
    /// Parse a `<Transform Algorithm="...">` element.
    ///
    /// Algorithms outside the supported set fail with `UnknownAlgorithm`.
    pub fn from_xml(doc: &XmlDocument, node: NodeId) -> Result<Self, Error> {
        let uri = doc.attribute(node, ns::attr::ALGORITHM).ok_or_else(|| {
            Error::MalformedSignature("Transform without Algorithm attribute".into())
        })?;
        if let Some(mode) = C14nMode::from_uri(uri) {
            let inclusive_prefixes = if mode.is_exclusive() {
                read_inclusive_prefixes(doc, node)
            } else {
                Vec::new()
            };
            return Ok(Self::Canonicalize {
                mode,
                inclusive_prefixes,
            });
        }
        match uri {
            algorithm::BASE64 => Ok(Self::Base64Decode),
            algorithm::ENVELOPED_SIGNATURE => Ok(Self::enveloped()),
            algorithm::XPATH => {
                let xpath = doc
                    .find_child_element(node, ns::DSIG, ns::node::XPATH)
                    .ok_or_else(|| Error::MalformedSignature("XPath transform without <XPath>".into()))?;
                Ok(Self::XPath {
                    expression: doc.text_content(xpath),
                    namespaces: in_scope_declarations(doc, xpath),
                })
            }
            algorithm::XSLT => {
                let sheet = doc.child_elements(node).next().ok_or_else(|| {
                    Error::MalformedSignature("XSLT transform without a stylesheet".into())
                })?;
                Ok(Self::Xslt {
                    stylesheet: fragment_with_context(doc, sheet).to_xml_string(),
                })
            }
            algorithm::LICENSE => Ok(Self::License),
            algorithm::DECRYPT_XML => {
                let except = doc
                    .child_elements(node)
                    .filter(|&c| doc.is_element_named(c, ns::DECRYPT, ns::node::EXCEPT))
                    .map(|c| {
                        let uri = doc.attribute(c, ns::attr::URI).ok_or_else(|| {
                            Error::MalformedSignature("Except without URI attribute".into())
                        })?;
                        decrypt::except_id(uri).map(str::to_owned)
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok(Self::DecryptXml { except })
            }
            other => Err(Error::UnknownAlgorithm(format!("transform: {other}"))),
        }
    }

    /// Append this transform as a `<Transform>` element under `parent`.
    pub fn append_to(
        &self,
        doc: &mut XmlDocument,
        parent: NodeId,
        prefix: Option<&str>,
    ) -> Result<NodeId, Error> {
        let node = doc.append_element(parent, QName::new(prefix, ns::node::TRANSFORM), Some(ns::DSIG));
        doc.set_attr(node, ns::attr::ALGORITHM, self.uri());
        match self {
            Self::Canonicalize {
                mode,
                inclusive_prefixes,
            } if mode.is_exclusive() && !inclusive_prefixes.is_empty() => {
                let inc = doc.append_element(
                    node,
                    QName::new(Some(EXC_C14N_PREFIX), ns::node::INCLUSIVE_NAMESPACES),
                    Some(ns::EXC_C14N),
                );
                doc.set_attribute(inc, Attribute::namespace_decl(EXC_C14N_PREFIX, ns::EXC_C14N));
                doc.set_attr(inc, ns::attr::PREFIX_LIST, &inclusive_prefixes.join(" "));
            }
            Self::XPath {
                expression,
                namespaces,
            } => {
                let xpath = doc.append_element(node, QName::new(prefix, ns::node::XPATH), Some(ns::DSIG));
                for (p, uri) in namespaces {
                    if doc.lookup_namespace(xpath, p).as_deref() != Some(uri.as_str()) {
                        doc.set_attribute(xpath, Attribute::namespace_decl(p, uri));
                    }
                }
                doc.append_text(xpath, expression);
            }
            Self::Xslt { stylesheet } => {
                let sheet = XmlDocument::parse(stylesheet)?;
                if let Some(root) = sheet.document_element() {
                    doc.import_subtree(&sheet, root, node);
                }
            }
            Self::DecryptXml { except } => {
                for id in except {
                    let item = doc.append_element(
                        node,
                        QName::new(Some(DECRYPT_PREFIX), ns::node::EXCEPT),
                        Some(ns::DECRYPT),
                    );
                    doc.set_attribute(item, Attribute::namespace_decl(DECRYPT_PREFIX, ns::DECRYPT));
                    doc.set_attr(item, ns::attr::URI, &format!("#{id}"));
                }
            }
            _ => {}
        }
        Ok(node)
    }
}

/// Prefixes from `<ec:InclusiveNamespaces PrefixList="...">`.
fn read_inclusive_prefixes(doc: &XmlDocument, node: NodeId) -> Vec<String> {
    doc.find_child_element(node, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES)
        .and_then(|inc| doc.attribute(inc, ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

/// Prefixed namespace bindings visible at `node`, nearest declaration first.
fn in_scope_declarations(doc: &XmlDocument, node: NodeId) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for id in std::iter::once(node).chain(doc.ancestors(node)) {
        let Some(element) = doc.element(id) else {
            continue;
        };
        for attr in &element.attributes {
            let Some(prefix) = attr.declared_prefix() else {
                continue;
            };
            if !prefix.is_empty() && !out.iter().any(|(p, _)| p == prefix) {
                out.push((prefix.to_owned(), attr.value.clone()));
            }
        }
    }
    out
}
