#![forbid(unsafe_code)]

//! XML Canonicalization for the Hagalund XML signature library.
//!
//! Implements the four W3C canonicalization variants used by XML-DSig:
//! - Canonical XML 1.0 (with and without comments)
//! - Exclusive Canonical XML 1.0 (with and without comments)

pub mod canonicalizer;
pub mod context;
pub mod escape;
pub mod exclusive;
pub mod inclusive;
pub mod propagate;
pub mod render;

pub use canonicalizer::Canonicalizer;
pub use propagate::fragment_with_context;

use hagalund_core::{algorithm, Error};
use hagalund_xml::{NodeSet, XmlDocument};
use std::io::Write;

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum C14nMode {
    /// Canonical XML 1.0
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    /// Get the algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::InclusiveWithComments | Self::ExclusiveWithComments)
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }

    /// The default node set for a whole document in this mode.
    fn whole_document(&self) -> NodeSet {
        if self.with_comments() {
            NodeSet::all()
        } else {
            NodeSet::all_without_comments()
        }
    }
}

/// Canonicalize an XML document.
///
/// - `xml`: the raw XML text
/// - `mode`: which C14N variant to use
/// - `node_set`: optional node set (for document-subset canonicalization)
/// - `inclusive_prefixes`: for exclusive C14N, the InclusiveNamespaces PrefixList
pub fn canonicalize(
    xml: &str,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let doc = XmlDocument::parse(xml)?;
    canonicalize_doc(&doc, mode, node_set, inclusive_prefixes)
}

/// Convenience: canonicalize a parsed document.
pub fn canonicalize_doc(
    doc: &XmlDocument,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    canonicalize_into(doc, mode, node_set, inclusive_prefixes, &mut out)?;
    Ok(out)
}

/// Canonicalize straight into a writer, e.g. a digest.
pub fn canonicalize_into<W: Write>(
    doc: &XmlDocument,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
    out: &mut W,
) -> Result<(), Error> {
    let whole;
    let node_set = match node_set {
        Some(set) => set,
        None => {
            whole = mode.whole_document();
            &whole
        }
    };
    tracing::trace!(mode = mode.uri(), "canonicalizing");
    Canonicalizer::new(doc, mode)
        .with_inclusive_prefixes(inclusive_prefixes)
        .canonicalize_into(node_set, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_uris() {
        for mode in [
            C14nMode::Inclusive,
            C14nMode::InclusiveWithComments,
            C14nMode::Exclusive,
            C14nMode::ExclusiveWithComments,
        ] {
            assert_eq!(C14nMode::from_uri(mode.uri()), Some(mode));
        }
        assert_eq!(C14nMode::from_uri("http://www.w3.org/2006/12/xml-c14n11"), None);
    }

    #[test]
    fn test_comments_follow_mode() {
        let xml = "<r><!--x-->t</r>";
        let plain = canonicalize(xml, C14nMode::Inclusive, None, &[]).unwrap();
        let commented = canonicalize(xml, C14nMode::InclusiveWithComments, None, &[]).unwrap();
        assert_eq!(plain, b"<r>t</r>");
        assert_eq!(commented, b"<r><!--x-->t</r>");
    }

    #[test]
    fn test_explicit_node_set_overrides_comment_default() {
        let doc = XmlDocument::parse("<r><!--x--></r>").unwrap();
        let out = canonicalize_doc(
            &doc,
            C14nMode::InclusiveWithComments,
            Some(&NodeSet::all_without_comments()),
            &[],
        )
        .unwrap();
        assert_eq!(out, b"<r></r>");
    }

    #[test]
    fn test_empty_elements_expanded() {
        let out = canonicalize(r#"<r><e a="1"/></r>"#, C14nMode::Exclusive, None, &[]).unwrap();
        assert_eq!(out, br#"<r><e a="1"></e></r>"#);
    }

    #[test]
    fn test_parse_error_reported() {
        let err = canonicalize("<r>", C14nMode::Inclusive, None, &[]).unwrap_err();
        assert!(matches!(err, Error::XmlParse(_)));
    }
}
