#![forbid(unsafe_code)]

//! Hard resource ceilings. Exceeding any of them fails closed.

/// Resource limits applied while loading, transforming and verifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of `<Transform>` elements in one reference.
    pub max_transforms_per_reference: usize,
    /// Maximum number of `<Reference>` elements in one `<SignedInfo>`.
    pub max_references_per_signed_info: usize,
    /// Maximum depth of reference-to-reference and nested-signature chains.
    pub max_recursion_depth: usize,
    /// Maximum size of a parsed document, in characters.
    pub max_document_chars: usize,
    /// Maximum element nesting depth during canonicalization.
    pub max_element_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_transforms_per_reference: 10,
            max_references_per_signed_info: 100,
            max_recursion_depth: 20,
            max_document_chars: 10_000_000,
            max_element_depth: 1024,
        }
    }
}
