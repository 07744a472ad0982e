#![forbid(unsafe_code)]

//! Transform pipeline: typed values, the closed set of transforms and the
//! driver that chains them.

use crate::{base64_transform, decrypt, enveloped, license};
use hagalund_c14n::{C14nMode, Canonicalizer};
use hagalund_core::{algorithm, Error, Limits};
use hagalund_xml::{NodeSet, XmlDocument};
use std::io::Write;

/// The type of a value flowing between transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// An octet stream.
    Stream,
    /// A document together with a subset of its nodes.
    NodeSet,
    /// A whole document.
    Document,
}

/// Data flowing through the transform pipeline.
#[derive(Debug, Clone)]
pub enum TransformData {
    Stream(Vec<u8>),
    NodeSet { doc: XmlDocument, nodes: NodeSet },
    Document(XmlDocument),
}

impl TransformData {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Stream(_) => DataType::Stream,
            Self::NodeSet { .. } => DataType::NodeSet,
            Self::Document(_) => DataType::Document,
        }
    }

    /// The document and node set of an XML-typed value.
    pub fn into_node_set(self) -> Result<(XmlDocument, NodeSet), Error> {
        match self {
            Self::Document(doc) => Ok((doc, NodeSet::all())),
            Self::NodeSet { doc, nodes } => Ok((doc, nodes)),
            Self::Stream(_) => Err(Error::TransformTypeMismatch(
                "an octet stream is not a node set".into(),
            )),
        }
    }

    /// Serialize to octets. XML values are canonicalized with the given mode;
    /// a stream is parsed first.
    pub fn canonicalize(
        self,
        mode: C14nMode,
        inclusive_prefixes: &[String],
        limits: &Limits,
    ) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.canonicalize_into(mode, inclusive_prefixes, limits, &mut out)?;
        Ok(out)
    }

    /// Like [`TransformData::canonicalize`], writing into `out`.
    pub fn canonicalize_into<W: Write>(
        self,
        mode: C14nMode,
        inclusive_prefixes: &[String],
        limits: &Limits,
        out: &mut W,
    ) -> Result<(), Error> {
        match self {
            Self::Stream(bytes) => {
                let doc = XmlDocument::parse_bytes_with_limit(&bytes, limits.max_document_chars)?;
                canonicalize_whole(&doc, mode, inclusive_prefixes, limits, out)
            }
            Self::Document(doc) => canonicalize_whole(&doc, mode, inclusive_prefixes, limits, out),
            Self::NodeSet { doc, nodes } => Canonicalizer::new(&doc, mode)
                .with_inclusive_prefixes(inclusive_prefixes)
                .with_max_depth(limits.max_element_depth)
                .canonicalize_into(&nodes, out),
        }
    }

    /// Octets of a stream, or the default canonical form of an XML value.
    pub fn into_bytes(self, limits: &Limits) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.write_into(limits, &mut out)?;
        Ok(out)
    }

    /// Like [`TransformData::into_bytes`], writing into `out`.
    pub fn write_into<W: Write>(self, limits: &Limits, out: &mut W) -> Result<(), Error> {
        match self {
            Self::Stream(bytes) => Ok(out.write_all(&bytes)?),
            xml => xml.canonicalize_into(C14nMode::Inclusive, &[], limits, out),
        }
    }
}

fn canonicalize_whole<W: Write>(
    doc: &XmlDocument,
    mode: C14nMode,
    inclusive_prefixes: &[String],
    limits: &Limits,
    out: &mut W,
) -> Result<(), Error> {
    let nodes = if mode.with_comments() {
        NodeSet::all()
    } else {
        NodeSet::all_without_comments()
    };
    Canonicalizer::new(doc, mode)
        .with_inclusive_prefixes(inclusive_prefixes)
        .with_max_depth(limits.max_element_depth)
        .canonicalize_into(&nodes, out)
}

/// A single transform. The set is closed: anything else fails to parse with
/// `UnknownAlgorithm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    Canonicalize {
        mode: C14nMode,
        inclusive_prefixes: Vec<String>,
    },
    Base64Decode,
    /// Removes the subtree of the `position`-th `ds:Signature` (1-based,
    /// document order).
    EnvelopedSignature { position: usize },
    /// Only the enveloped idiom `not(ancestor-or-self::P:Signature)` runs.
    XPath {
        expression: String,
        namespaces: Vec<(String, String)>,
    },
    /// Parsed and carried, never executed.
    Xslt { stylesheet: String },
    /// MPEG-21 license: keeps the first `r:license` minus its issuers'
    /// signatures.
    License,
    /// Decryption transform. Holds the Ids of its `Except` URIs.
    DecryptXml { except: Vec<String> },
}

impl Transform {
    /// The algorithm URI for this transform.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Canonicalize { mode, .. } => mode.uri(),
            Self::Base64Decode => algorithm::BASE64,
            Self::EnvelopedSignature { .. } => algorithm::ENVELOPED_SIGNATURE,
            Self::XPath { .. } => algorithm::XPATH,
            Self::Xslt { .. } => algorithm::XSLT,
            Self::License => algorithm::LICENSE,
            Self::DecryptXml { .. } => algorithm::DECRYPT_XML,
        }
    }

    pub fn enveloped() -> Self {
        Self::EnvelopedSignature { position: 1 }
    }

    pub fn canonicalize(mode: C14nMode) -> Self {
        Self::Canonicalize {
            mode,
            inclusive_prefixes: Vec::new(),
        }
    }

    pub fn accepts(&self, input: DataType) -> bool {
        match self {
            Self::Canonicalize { .. } | Self::Base64Decode | Self::Xslt { .. } => true,
            Self::EnvelopedSignature { .. }
            | Self::XPath { .. }
            | Self::License
            | Self::DecryptXml { .. } => input != DataType::Stream,
        }
    }

    pub fn output(&self) -> DataType {
        match self {
            Self::Canonicalize { .. } | Self::Base64Decode | Self::Xslt { .. } => DataType::Stream,
            Self::EnvelopedSignature { .. }
            | Self::XPath { .. }
            | Self::License
            | Self::DecryptXml { .. } => DataType::NodeSet,
        }
    }

    /// Run this transform on a value it accepts.
    pub fn execute(&self, input: TransformData, limits: &Limits) -> Result<TransformData, Error> {
        match self {
            Self::Canonicalize {
                mode,
                inclusive_prefixes,
            } => Ok(TransformData::Stream(input.canonicalize(
                *mode,
                inclusive_prefixes,
                limits,
            )?)),
            Self::Base64Decode => base64_transform::decode(input).map(TransformData::Stream),
            Self::EnvelopedSignature { position } => {
                let (doc, nodes) = input.into_node_set()?;
                let nodes = enveloped::remove_signature(&doc, nodes, *position);
                Ok(TransformData::NodeSet { doc, nodes })
            }
            Self::XPath {
                expression,
                namespaces,
            } => {
                enveloped::check_xpath_filter(expression, namespaces)?;
                let (doc, nodes) = input.into_node_set()?;
                let nodes = enveloped::remove_all_signatures(&doc, nodes);
                Ok(TransformData::NodeSet { doc, nodes })
            }
            Self::License => {
                let (doc, nodes) = input.into_node_set()?;
                let nodes = license::strip_issuer_signatures(&doc, nodes)?;
                Ok(TransformData::NodeSet { doc, nodes })
            }
            Self::DecryptXml { except } => {
                let (doc, nodes) = input.into_node_set()?;
                let nodes = decrypt::pass_through_unencrypted(&doc, nodes, except)?;
                Ok(TransformData::NodeSet { doc, nodes })
            }
            Self::Xslt { .. } => Err(Error::UnknownAlgorithm(format!(
                "{} cannot be executed",
                algorithm::XSLT
            ))),
        }
    }
}

/// An ordered list of transforms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformChain {
    transforms: Vec<Transform>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Transform) {
        self.transforms.push(transform);
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn transforms_mut(&mut self) -> &mut [Transform] {
        &mut self.transforms
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Fail with `ResourceLimitExceeded` when the chain is too long.
    pub fn check_limits(&self, limits: &Limits) -> Result<(), Error> {
        if self.transforms.len() > limits.max_transforms_per_reference {
            return Err(Error::ResourceLimitExceeded(format!(
                "{} transforms in one reference (limit {})",
                self.transforms.len(),
                limits.max_transforms_per_reference
            )));
        }
        Ok(())
    }

    /// Run every transform in order and return the final octets.
    pub fn run(&self, initial: Option<TransformData>, limits: &Limits) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        self.run_into(initial, limits, &mut out)?;
        Ok(out)
    }

    /// Run every transform in order and write the final octets to `out`.
    ///
    /// A final canonicalization, or an XML value left at the end, is
    /// written straight into `out` without an intermediate buffer.
    ///
    /// `None` as input means the reference had nothing to dereference; the
    /// chain then has no value to start from.
    pub fn run_into<W: Write>(
        &self,
        initial: Option<TransformData>,
        limits: &Limits,
        out: &mut W,
    ) -> Result<(), Error> {
        self.check_limits(limits)?;
        let mut data = initial
            .ok_or_else(|| Error::ReferenceNotResolved("reference has nothing to dereference".into()))?;
        let count = self.transforms.len();
        for (i, transform) in self.transforms.iter().enumerate() {
            let current = data.data_type();
            if !transform.accepts(current) {
                if transform.accepts(DataType::Stream) && current != DataType::Stream {
                    data = TransformData::Stream(data.into_bytes(limits)?);
                } else {
                    return Err(Error::TransformTypeMismatch(format!(
                        "{} does not accept {current:?} input",
                        transform.uri()
                    )));
                }
            }
            tracing::trace!(transform = transform.uri(), input = ?current, "applying transform");
            if let Transform::Canonicalize {
                mode,
                inclusive_prefixes,
            } = transform
            {
                if i + 1 == count {
                    return data.canonicalize_into(*mode, inclusive_prefixes, limits, out);
                }
            }
            data = transform.execute(data, limits)?;
        }
        data.write_into(limits, out)
    }
}

impl From<Vec<Transform>> for TransformChain {
    fn from(transforms: Vec<Transform>) -> Self {
        Self { transforms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNED: &str = r#"<doc xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><!--c--><a>text</a><ds:Signature><ds:SignatureValue>x</ds:SignatureValue></ds:Signature></doc>"#;

    fn doc(xml: &str) -> TransformData {
        TransformData::Document(XmlDocument::parse(xml).unwrap())
    }

    fn run(chain: Vec<Transform>, input: TransformData) -> Result<String, Error> {
        TransformChain::from(chain)
            .run(Some(input), &Limits::default())
            .map(|b| String::from_utf8(b).unwrap())
    }

    #[test]
    fn test_empty_chain_canonicalizes_xml() {
        assert_eq!(
            run(vec![], doc(r#"<r b="2" a="1"/>"#)).unwrap(),
            r#"<r a="1" b="2"></r>"#
        );
    }

    #[test]
    fn test_enveloped_then_exclusive() {
        let out = run(
            vec![
                Transform::enveloped(),
                Transform::canonicalize(C14nMode::ExclusiveWithComments),
            ],
            doc(SIGNED),
        )
        .unwrap();
        assert_eq!(out, "<doc><!--c--><a>text</a></doc>");
    }

    #[test]
    fn test_stream_then_enveloped_is_a_type_mismatch() {
        let err = run(
            vec![Transform::canonicalize(C14nMode::Inclusive), Transform::enveloped()],
            doc(SIGNED),
        )
        .unwrap_err();
        assert!(matches!(err, Error::TransformTypeMismatch(_)));
    }

    #[test]
    fn test_canonicalize_parses_stream_input() {
        let out = run(
            vec![Transform::canonicalize(C14nMode::Inclusive)],
            TransformData::Stream(b"<r><!--x--><e/></r>".to_vec()),
        )
        .unwrap();
        assert_eq!(out, "<r><e></e></r>");
    }

    #[test]
    fn test_base64_of_node_set_text() {
        let out = run(vec![Transform::Base64Decode], doc("<r>aGVs<x>bG8=</x></r>")).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_xslt_never_runs() {
        let err = run(
            vec![Transform::Xslt { stylesheet: "<xsl:stylesheet/>".into() }],
            doc("<r/>"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownAlgorithm(_)));
    }

    #[test]
    fn test_missing_input() {
        let err = TransformChain::new().run(None, &Limits::default()).unwrap_err();
        assert!(matches!(err, Error::ReferenceNotResolved(_)));
    }

    #[test]
    fn test_transform_limit() {
        let chain = TransformChain::from(vec![Transform::Base64Decode; 3]);
        let limits = Limits {
            max_transforms_per_reference: 2,
            ..Limits::default()
        };
        let err = chain.run(Some(TransformData::Stream(vec![])), &limits).unwrap_err();
        assert!(matches!(err, Error::ResourceLimitExceeded(_)));
    }

    #[test]
    fn test_type_table() {
        assert!(!Transform::enveloped().accepts(DataType::Stream));
        assert!(Transform::enveloped().accepts(DataType::Document));
        assert_eq!(Transform::enveloped().output(), DataType::NodeSet);
        assert!(Transform::Base64Decode.accepts(DataType::NodeSet));
        assert_eq!(Transform::Base64Decode.output(), DataType::Stream);
    }
}
