#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order:
//! 1. Parse the document, register ID attributes, load the first `<Signature>`
//! 2. Format check against the context's policy
//! 3. Canonicalize `<SignedInfo>` and check `<SignatureValue>`
//! 4. For each `<Reference>`: resolve URI, run transforms, compute digest, compare

use crate::context::DsigContext;
use crate::signature::Signature;
use hagalund_core::{ns, Error};
use hagalund_keys::Key;
use hagalund_xml::XmlDocument;

/// Result of signature verification.
#[derive(Debug)]
pub enum VerifyResult {
    /// Signature is valid.
    Valid,
    /// Signature must not be trusted.
    Invalid { reason: Error },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid)
    }

    pub fn reason(&self) -> Option<&Error> {
        match self {
            VerifyResult::Valid => None,
            VerifyResult::Invalid { reason } => Some(reason),
        }
    }
}

/// Verify the first signature of `xml` with `key`.
pub fn verify(ctx: &DsigContext, xml: &str, key: &Key) -> Result<VerifyResult, Error> {
    let mut signature = load(ctx, xml)?;
    signature.verify(ctx, key)
}

/// Verify the first signature of `xml` with a key taken from its KeyInfo.
///
/// Only useful when the caller trusts the embedded key by other means.
pub fn verify_with_key_info(ctx: &DsigContext, xml: &str) -> Result<VerifyResult, Error> {
    let mut signature = load(ctx, xml)?;
    let key = signature.key_from_key_info()?;
    signature.verify(ctx, &key)
}

/// Parse `xml` and load its first `<Signature>` in document order.
pub fn load(ctx: &DsigContext, xml: &str) -> Result<Signature, Error> {
    let doc = XmlDocument::parse_with_limit(xml, ctx.limits.max_document_chars)?;
    let node = doc
        .find_element(ns::DSIG, ns::node::SIGNATURE)
        .ok_or_else(|| Error::MalformedSignature("no Signature element".into()))?;
    let mut signature = Signature::new();
    signature.load_xml(ctx, &doc, node)?;
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_without_signature() {
        let err = verify(&DsigContext::new(), "<doc/>", &Key::hmac(b"k".to_vec())).unwrap_err();
        assert!(matches!(err, Error::MalformedSignature(_)));
    }

    #[test]
    fn test_document_size_limit() {
        let ctx = DsigContext::new().with_limits(hagalund_core::Limits {
            max_document_chars: 8,
            ..Default::default()
        });
        let err = verify(&ctx, "<doc>0123456789</doc>", &Key::hmac(b"k".to_vec())).unwrap_err();
        assert!(matches!(err, Error::ResourceLimitExceeded(_)));
    }

    #[test]
    fn test_result_reason() {
        let result = VerifyResult::Invalid {
            reason: Error::DigestMismatch("#a".into()),
        };
        assert!(!result.is_valid());
        assert!(matches!(result.reason(), Some(Error::DigestMismatch(_))));
        assert!(VerifyResult::Valid.reason().is_none());
    }
}
