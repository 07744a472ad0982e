#![forbid(unsafe_code)]

//! `<Reference>`: locating a target, running its transforms and digesting
//! the result.

use crate::context::DsigContext;
use crate::xmlutil::{
    algorithm_attr, check_attributes, decode_base64, dsig_children, dsig_element, dsig_text_element,
    encode_base64, expect_named,
};
use hagalund_c14n::fragment_with_context;
use hagalund_core::{algorithm, ns, Error, Limits};
use hagalund_crypto::{constant_time_eq, digest, DigestWriter};
use hagalund_transforms::{Transform, TransformChain, TransformData};
use hagalund_xml::xpath::{self, FragmentRef};
use hagalund_xml::{NodeId, NodeSet, XmlDocument};

/// The document a signature lives in, as seen while resolving references.
#[derive(Debug, Clone, Copy)]
pub struct DocumentScope<'a> {
    pub document: &'a XmlDocument,
    /// The `<Signature>` element the references belong to.
    pub signature: Option<NodeId>,
    /// Elements that may be referenced by Id when the document lookup finds
    /// nothing: the signature's Objects and digested References.
    pub known: &'a [(String, NodeId)],
}

/// A single `<Reference>`.
#[derive(Debug, Clone)]
pub struct Reference {
    pub id: Option<String>,
    /// `None` means the URI attribute is absent.
    pub uri: Option<String>,
    pub type_uri: Option<String>,
    pub digest_method: String,
    /// Present after loading or after [`Reference::update_digest`].
    pub digest_value: Option<Vec<u8>>,
    pub transforms: TransformChain,
    data: Option<Vec<u8>>,
}

impl Reference {
    /// A reference to `uri` digested with SHA-256.
    pub fn new(uri: Option<&str>) -> Self {
        Self {
            id: None,
            uri: uri.map(str::to_owned),
            type_uri: None,
            digest_method: algorithm::SHA256.to_owned(),
            digest_value: None,
            transforms: TransformChain::new(),
            data: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, type_uri: impl Into<String>) -> Self {
        self.type_uri = Some(type_uri.into());
        self
    }

    pub fn with_digest_method(mut self, uri: impl Into<String>) -> Self {
        self.digest_method = uri.into();
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Octets to digest when the reference has no URI.
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Short description for logs and errors.
    pub fn describe(&self) -> String {
        match &self.uri {
            Some(uri) => format!("URI={uri:?}"),
            None => "(no URI)".to_owned(),
        }
    }

    /// The Id named by a `#id` or `#xpointer(id('x'))` URI.
    pub fn target_id(&self) -> Option<&str> {
        match xpath::parse_same_document_ref(self.uri.as_deref()?)? {
            FragmentRef::Id(id) | FragmentRef::XPointerId(id) => Some(id),
            FragmentRef::WholeDocument => None,
        }
    }

    /// Read a `<Reference>` element.
    pub fn from_xml(doc: &XmlDocument, node: NodeId, limits: &Limits) -> Result<Self, Error> {
        check_attributes(doc, node, &[ns::attr::ID, ns::attr::URI, ns::attr::TYPE])?;
        let children = dsig_children(doc, node)?;
        let (transforms_node, digest_method, digest_value) = match children.as_slice() {
            [t, m, v] => (Some(*t), *m, *v),
            [m, v] => (None, *m, *v),
            other => {
                return Err(Error::MalformedSignature(format!(
                    "Reference has {} child elements",
                    other.len()
                )))
            }
        };

        let mut transforms = TransformChain::new();
        if let Some(t) = transforms_node {
            expect_named(doc, t, ns::node::TRANSFORMS)?;
            check_attributes(doc, t, &[])?;
            let items = dsig_children(doc, t)?;
            if items.len() > limits.max_transforms_per_reference {
                return Err(Error::ResourceLimitExceeded(format!(
                    "{} transforms in one reference (limit {})",
                    items.len(),
                    limits.max_transforms_per_reference
                )));
            }
            for item in items {
                expect_named(doc, item, ns::node::TRANSFORM)?;
                check_attributes(doc, item, &[ns::attr::ALGORITHM])?;
                transforms.push(Transform::from_xml(doc, item)?);
            }
        }

        expect_named(doc, digest_method, ns::node::DIGEST_METHOD)?;
        check_attributes(doc, digest_method, &[ns::attr::ALGORITHM])?;
        let method = algorithm_attr(doc, digest_method)?;
        digest::from_uri(method)?;

        expect_named(doc, digest_value, ns::node::DIGEST_VALUE)?;
        check_attributes(doc, digest_value, &[])?;
        let value = decode_base64(&doc.text_content(digest_value), "DigestValue")?;

        Ok(Self {
            id: doc.attribute(node, ns::attr::ID).map(str::to_owned),
            uri: doc.attribute(node, ns::attr::URI).map(str::to_owned),
            type_uri: doc.attribute(node, ns::attr::TYPE).map(str::to_owned),
            digest_method: method.to_owned(),
            digest_value: Some(value),
            transforms,
            data: None,
        })
    }

    /// Append this reference as a `<Reference>` element under `parent`.
    pub fn append_to(&self, doc: &mut XmlDocument, parent: NodeId, prefix: Option<&str>) -> Result<NodeId, Error> {
        let node = dsig_element(doc, parent, prefix, ns::node::REFERENCE);
        if let Some(id) = &self.id {
            doc.set_attr(node, ns::attr::ID, id);
        }
        if let Some(uri) = &self.uri {
            doc.set_attr(node, ns::attr::URI, uri);
        }
        if let Some(type_uri) = &self.type_uri {
            doc.set_attr(node, ns::attr::TYPE, type_uri);
        }
        if !self.transforms.is_empty() {
            let transforms = dsig_element(doc, node, prefix, ns::node::TRANSFORMS);
            for transform in self.transforms.transforms() {
                transform.append_to(doc, transforms, prefix)?;
            }
        }
        let method = dsig_element(doc, node, prefix, ns::node::DIGEST_METHOD);
        doc.set_attr(method, ns::attr::ALGORITHM, &self.digest_method);
        let value = self.digest_value.as_deref().map(encode_base64).unwrap_or_default();
        dsig_text_element(doc, node, prefix, ns::node::DIGEST_VALUE, &value);
        Ok(node)
    }

    /// The element a same-document Id reference points at.
    ///
    /// An Id carried by more than one element resolves to nothing, so a
    /// wrapped copy of the signed element cannot be substituted.
    pub fn target_element(&self, scope: &DocumentScope<'_>) -> Result<Option<NodeId>, Error> {
        let Some(id) = self.target_id() else {
            return Ok(None);
        };
        match scope.document.elements_with_id(id).as_slice() {
            [only] => Ok(Some(*only)),
            [] => scope
                .known
                .iter()
                .find(|(known, _)| known == id)
                .map(|(_, node)| Some(*node))
                .ok_or_else(|| Error::ReferenceNotResolved(format!("no element with Id {id:?}"))),
            many => Err(Error::ReferenceNotResolved(format!(
                "Id {id:?} is carried by {} elements",
                many.len()
            ))),
        }
    }

    /// Dereference the URI. Returns the initial pipeline value and the
    /// 1-based position of the enclosing signature inside the target (0 if
    /// the target does not contain it).
    fn resolve(&self, scope: &DocumentScope<'_>, ctx: &DsigContext) -> Result<(Option<TransformData>, usize), Error> {
        let doc = scope.document;
        let uri = match (self.uri.as_deref(), &self.data) {
            (None, Some(data)) => return Ok((Some(TransformData::Stream(data.clone())), 0)),
            (None, None) | (Some(""), _) => {
                let position = enveloped_position(doc, doc.root(), scope.signature);
                let nodes = NodeSet::all_without_comments();
                return Ok((Some(TransformData::NodeSet { doc: doc.clone(), nodes }), position));
            }
            (Some(uri), _) => uri,
        };
        match xpath::parse_same_document_ref(uri) {
            Some(FragmentRef::WholeDocument) => {
                let position = enveloped_position(doc, doc.root(), scope.signature);
                Ok((Some(TransformData::Document(doc.clone())), position))
            }
            Some(fragment) => {
                let target = self
                    .target_element(scope)?
                    .ok_or_else(|| Error::ReferenceNotResolved(uri.to_owned()))?;
                let position = enveloped_position(doc, target, scope.signature);
                let copy = fragment_with_context(doc, target);
                let nodes = if fragment.discards_comments() {
                    NodeSet::all_without_comments()
                } else {
                    NodeSet::all()
                };
                Ok((Some(TransformData::NodeSet { doc: copy, nodes }), position))
            }
            None => {
                let data = ctx.resolver.resolve(uri, ctx.base_uri.as_deref())?;
                Ok((Some(TransformData::Stream(data)), 0))
            }
        }
    }

    /// The transform chain with enveloped transforms bound to `position`.
    fn bound_chain(&self, position: usize) -> TransformChain {
        let mut chain = self.transforms.clone();
        for transform in chain.transforms_mut() {
            if let Transform::EnvelopedSignature { position: p } = transform {
                *p = position;
            }
        }
        chain
    }

    /// Resolve, transform and digest the target.
    pub fn calculate_digest(&self, scope: &DocumentScope<'_>, ctx: &DsigContext) -> Result<Vec<u8>, Error> {
        self.transforms.check_limits(&ctx.limits)?;
        let (input, position) = self.resolve(scope, ctx)?;
        let mut hasher = DigestWriter::new(&self.digest_method)?;
        self.bound_chain(position).run_into(input, &ctx.limits, &mut hasher)?;
        let octets = hasher.written();
        let value = hasher.finalize();
        tracing::debug!(
            reference = %self.describe(),
            octets,
            digest = %encode_base64(&value),
            "reference digested"
        );
        Ok(value)
    }

    /// Compute and store the digest (signing).
    pub fn update_digest(&mut self, scope: &DocumentScope<'_>, ctx: &DsigContext) -> Result<(), Error> {
        self.digest_value = Some(self.calculate_digest(scope, ctx)?);
        Ok(())
    }

    /// Recompute the digest and compare it with the stored value.
    pub fn check_digest(&self, scope: &DocumentScope<'_>, ctx: &DsigContext) -> Result<(), Error> {
        let expected = self
            .digest_value
            .as_deref()
            .ok_or_else(|| Error::MalformedSignature(format!("{} has no DigestValue", self.describe())))?;
        let computed = self.calculate_digest(scope, ctx)?;
        if constant_time_eq(&computed, expected) {
            Ok(())
        } else {
            Err(Error::DigestMismatch(self.describe()))
        }
    }
}

/// 1-based position of `signature` among the `ds:Signature` elements under
/// `root` (inclusive), in document order.
fn enveloped_position(doc: &XmlDocument, root: NodeId, signature: Option<NodeId>) -> usize {
    let Some(signature) = signature else {
        return 0;
    };
    doc.descendants(root)
        .filter(|&n| doc.is_element_named(n, ns::DSIG, ns::node::SIGNATURE))
        .position(|n| n == signature)
        .map_or(0, |i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hagalund_c14n::C14nMode;
    use hagalund_transforms::MemoryResolver;

    const DOC: &str = r#"<r xmlns:p="urn:p"><!--top--><p:data Id="d"><!--inner-->text</p:data><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Id="sig"><ds:SignedInfo/></ds:Signature></r>"#;

    fn octets(reference: &Reference, doc: &XmlDocument, ctx: &DsigContext) -> Result<String, Error> {
        let scope = DocumentScope {
            document: doc,
            signature: doc.find_element(ns::DSIG, ns::node::SIGNATURE),
            known: &[],
        };
        let (input, position) = reference.resolve(&scope, ctx)?;
        let bytes = reference.bound_chain(position).run(input, &ctx.limits)?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn test_id_reference_is_reparented_without_comments() {
        let doc = XmlDocument::parse(DOC).unwrap();
        let out = octets(&Reference::new(Some("#d")), &doc, &DsigContext::new()).unwrap();
        assert_eq!(out, r#"<p:data xmlns:p="urn:p" Id="d">text</p:data>"#);
    }

    #[test]
    fn test_xpointer_id_keeps_comments() {
        let doc = XmlDocument::parse(DOC).unwrap();
        let reference = Reference::new(Some("#xpointer(id('d'))"))
            .with_transform(Transform::canonicalize(C14nMode::ExclusiveWithComments));
        let out = octets(&reference, &doc, &DsigContext::new()).unwrap();
        assert_eq!(out, r#"<p:data xmlns:p="urn:p" Id="d"><!--inner-->text</p:data>"#);
    }

    #[test]
    fn test_empty_uri_with_enveloped_transform() {
        let doc = XmlDocument::parse(DOC).unwrap();
        let reference = Reference::new(Some("")).with_transform(Transform::enveloped());
        let out = octets(&reference, &doc, &DsigContext::new()).unwrap();
        assert_eq!(
            out,
            r#"<r xmlns:p="urn:p"><p:data Id="d">text</p:data></r>"#
        );
    }

    #[test]
    fn test_duplicate_id_is_not_resolved() {
        let doc = XmlDocument::parse(r#"<r><a Id="x"/><b Id="x"/></r>"#).unwrap();
        let err = octets(&Reference::new(Some("#x")), &doc, &DsigContext::new()).unwrap_err();
        assert!(matches!(err, Error::ReferenceNotResolved(_)));
    }

    #[test]
    fn test_known_element_fallback() {
        let doc = XmlDocument::parse(r#"<r><a Name="x">v</a></r>"#).unwrap();
        let a = doc.document_element().and_then(|r| doc.child_elements(r).next()).unwrap();
        let known = vec![("x".to_owned(), a)];
        let scope = DocumentScope { document: &doc, signature: None, known: &known };
        let reference = Reference::new(Some("#x"));
        assert_eq!(reference.target_element(&scope).unwrap(), Some(a));
    }

    #[test]
    fn test_external_uri_goes_to_resolver() {
        let doc = XmlDocument::parse("<r/>").unwrap();
        let reference = Reference::new(Some("data.txt"));
        let err = octets(&reference, &doc, &DsigContext::new()).unwrap_err();
        assert!(matches!(err, Error::ReferenceNotResolved(_)));

        let ctx = DsigContext::new()
            .with_base_uri("http://example.com/dir/doc.xml")
            .with_resolver(MemoryResolver::new().with_entry("http://example.com/dir/data.txt", b"payload".to_vec()));
        assert_eq!(octets(&reference, &doc, &ctx).unwrap(), "payload");
    }

    #[test]
    fn test_absent_uri_is_whole_document() {
        let doc = XmlDocument::parse("<r><a>1</a><!--c--></r>").unwrap();
        let ctx = DsigContext::new();
        let scope = DocumentScope { document: &doc, signature: None, known: &[] };
        let absent = Reference::new(None).calculate_digest(&scope, &ctx).unwrap();
        let empty = Reference::new(Some("")).calculate_digest(&scope, &ctx).unwrap();
        assert_eq!(absent, empty);
        assert_eq!(octets(&Reference::new(None), &doc, &ctx).unwrap(), "<r><a>1</a></r>");
    }

    #[test]
    fn test_absent_uri_uses_attached_data() {
        let doc = XmlDocument::parse("<r/>").unwrap();
        let reference = Reference::new(None).with_data(b"detached".to_vec());
        assert_eq!(octets(&reference, &doc, &DsigContext::new()).unwrap(), "detached");
    }

    #[test]
    fn test_streamed_digest_matches_buffered_octets() {
        let doc = XmlDocument::parse(DOC).unwrap();
        let ctx = DsigContext::new();
        let scope = DocumentScope {
            document: &doc,
            signature: doc.find_element(ns::DSIG, ns::node::SIGNATURE),
            known: &[],
        };
        for reference in [
            Reference::new(Some("")).with_transform(Transform::enveloped()),
            Reference::new(Some("#d")).with_transform(Transform::canonicalize(C14nMode::Exclusive)),
            Reference::new(Some("#xpointer(/)")).with_digest_method(algorithm::SHA1),
        ] {
            let octets = octets(&reference, &doc, &ctx).unwrap();
            let expected = digest::digest(&reference.digest_method, octets.as_bytes()).unwrap();
            assert_eq!(reference.calculate_digest(&scope, &ctx).unwrap(), expected);
        }
    }

    #[test]
    fn test_digest_mismatch() {
        let doc = XmlDocument::parse(DOC).unwrap();
        let ctx = DsigContext::new();
        let scope = DocumentScope { document: &doc, signature: None, known: &[] };
        let mut reference = Reference::new(Some("#d"));
        reference.update_digest(&scope, &ctx).unwrap();
        assert!(reference.check_digest(&scope, &ctx).is_ok());
        if let Some(value) = reference.digest_value.as_mut() {
            value[0] ^= 1;
        }
        assert!(matches!(
            reference.check_digest(&scope, &ctx),
            Err(Error::DigestMismatch(_))
        ));
    }

    #[test]
    fn test_reference_element_shape() {
        let xml = |inner: &str| {
            format!(r#"<ds:Reference xmlns:ds="http://www.w3.org/2000/09/xmldsig#" URI="">{inner}</ds:Reference>"#)
        };
        let method = r#"<ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>"#;
        let value = "<ds:DigestValue>AAAA</ds:DigestValue>";

        let ok = XmlDocument::parse(&xml(&format!("{method}{value}"))).unwrap();
        let reference = Reference::from_xml(&ok, ok.document_element().unwrap(), &Limits::default()).unwrap();
        assert_eq!(reference.uri.as_deref(), Some(""));
        assert_eq!(reference.digest_value.as_deref(), Some(&[0u8, 0, 0][..]));

        let swapped = XmlDocument::parse(&xml(&format!("{value}{method}"))).unwrap();
        assert!(matches!(
            Reference::from_xml(&swapped, swapped.document_element().unwrap(), &Limits::default()),
            Err(Error::MalformedSignature(_))
        ));

        let md5 = XmlDocument::parse(&xml(&format!(
            r#"<ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#md5"/>{value}"#
        )))
        .unwrap();
        assert!(matches!(
            Reference::from_xml(&md5, md5.document_element().unwrap(), &Limits::default()),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_too_many_transforms_at_load() {
        let transform = r#"<ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#base64"/>"#.repeat(3);
        let xml = format!(
            r#"<ds:Reference xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:Transforms>{transform}</ds:Transforms><ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/><ds:DigestValue/></ds:Reference>"#
        );
        let doc = XmlDocument::parse(&xml).unwrap();
        let limits = Limits { max_transforms_per_reference: 2, ..Limits::default() };
        assert!(matches!(
            Reference::from_xml(&doc, doc.document_element().unwrap(), &limits),
            Err(Error::ResourceLimitExceeded(_))
        ));
    }
}
