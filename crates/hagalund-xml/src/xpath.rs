#![forbid(unsafe_code)]

//! Same-document URI reference parsing for XML-DSig.
//!
//! Only the shapes XML-DSig actually uses are recognised:
//! - `#id-value`
//! - `#xpointer(/)`
//! - `#xpointer(id('id-value'))` (single or double quotes)

/// What a `#...` fragment points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentRef<'a> {
    /// `#xpointer(/)`: the whole document, comments kept.
    WholeDocument,
    /// `#id`: comments are discarded.
    Id(&'a str),
    /// `#xpointer(id('id'))`: comments are kept.
    XPointerId(&'a str),
}

impl FragmentRef<'_> {
    /// Whether comment nodes are removed from the resolved target.
    pub fn discards_comments(&self) -> bool {
        matches!(self, Self::Id(_))
    }
}

/// Parse a same-document reference (e.g., `#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<FragmentRef<'_>> {
    let fragment = uri.strip_prefix('#')?;
    if fragment == "xpointer(/)" {
        return Some(FragmentRef::WholeDocument);
    }
    if let Some(id) = parse_xpointer_id(fragment) {
        return Some(FragmentRef::XPointerId(id));
    }
    Some(FragmentRef::Id(fragment))
}

/// Parse an `xpointer(id('...'))` expression and return the ID value.
pub fn parse_xpointer_id(expr: &str) -> Option<&str> {
    let inner = expr.strip_prefix("xpointer(id(")?.strip_suffix("))")?;
    let unquoted = inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))?;
    Some(unquoted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fragment_shapes() {
        assert_eq!(parse_same_document_ref("#abc"), Some(FragmentRef::Id("abc")));
        assert_eq!(
            parse_same_document_ref("#xpointer(/)"),
            Some(FragmentRef::WholeDocument)
        );
        assert_eq!(
            parse_same_document_ref("#xpointer(id('x1'))"),
            Some(FragmentRef::XPointerId("x1"))
        );
        assert_eq!(
            parse_same_document_ref("#xpointer(id(\"x2\"))"),
            Some(FragmentRef::XPointerId("x2"))
        );
        assert_eq!(parse_same_document_ref("http://example.com/"), None);
    }

    #[test]
    fn test_comment_semantics() {
        assert!(FragmentRef::Id("a").discards_comments());
        assert!(!FragmentRef::XPointerId("a").discards_comments());
        assert!(!FragmentRef::WholeDocument.discards_comments());
    }
}
