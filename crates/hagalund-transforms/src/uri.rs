#![forbid(unsafe_code)]

//! Resolution of references that point outside the signed document.
//!
//! Same-document references (`""`, `#id`, `#xpointer(...)`) never reach a
//! resolver. Everything else is handed to the [`UriResolver`] configured on
//! the signature context, and the octets it returns enter the transform
//! chain as a stream.

use hagalund_core::Error;
use std::collections::HashMap;

/// Fetches the octets behind an external URI.
pub trait UriResolver: Send + Sync {
    fn resolve(&self, uri: &str, base_uri: Option<&str>) -> Result<Vec<u8>, Error>;
}

/// Refuses every external URI. This is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyResolver;

impl UriResolver for DenyResolver {
    fn resolve(&self, uri: &str, _base_uri: Option<&str>) -> Result<Vec<u8>, Error> {
        Err(Error::ReferenceNotResolved(format!(
            "external URI {uri:?} not allowed"
        )))
    }
}

/// Serves a fixed set of URIs from memory.
///
/// Relative URIs are looked up as given first, then joined to the base URI.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, uri: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.insert(uri, data);
        self
    }

    pub fn insert(&mut self, uri: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.entries.insert(uri.into(), data.into());
    }
}

impl UriResolver for MemoryResolver {
    fn resolve(&self, uri: &str, base_uri: Option<&str>) -> Result<Vec<u8>, Error> {
        if let Some(data) = self.entries.get(uri) {
            return Ok(data.clone());
        }
        base_uri
            .map(|base| join(base, uri))
            .and_then(|full| self.entries.get(&full))
            .cloned()
            .ok_or_else(|| Error::ReferenceNotResolved(format!("no data for {uri:?}")))
    }
}

/// Join a relative reference onto the directory part of `base`.
fn join(base: &str, relative: &str) -> String {
    if relative.contains("://") {
        return relative.to_owned();
    }
    match base.rfind('/') {
        Some(i) => format!("{}{}", &base[..=i], relative),
        None => relative.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_resolver() {
        let err = DenyResolver.resolve("http://example.com/x", None).unwrap_err();
        assert!(matches!(err, Error::ReferenceNotResolved(_)));
    }

    #[test]
    fn test_memory_resolver_with_base() {
        let resolver = MemoryResolver::new().with_entry("http://example.com/docs/a.xml", b"<a/>".to_vec());
        assert_eq!(
            resolver.resolve("a.xml", Some("http://example.com/docs/index.xml")).unwrap(),
            b"<a/>"
        );
        assert_eq!(resolver.resolve("http://example.com/docs/a.xml", None).unwrap(), b"<a/>");
        assert!(resolver.resolve("b.xml", Some("http://example.com/docs/")).is_err());
    }
}
