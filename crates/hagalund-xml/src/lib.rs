#![forbid(unsafe_code)]

//! XML document model for the Hagalund XML Signature library.
//!
//! Provides an owned, mutable tree built on top of `roxmltree`, plus the
//! `NodeSet` and fragment-reference helpers needed for canonicalization and
//! signature transforms.

pub mod document;
pub mod nodeset;
pub mod writer;
pub mod xpath;

pub use document::{Attribute, Element, NodeId, NodeKind, QName, XmlDocument};
pub use nodeset::NodeSet;

/// Return roxmltree parsing options that allow DTD.
///
/// roxmltree never fetches external entities; internal entities are expanded
/// with its own nesting and size guards.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}
