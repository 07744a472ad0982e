#![forbid(unsafe_code)]

//! Safe-algorithm policy.
//!
//! The allow-lists are configuration owned by the verifier. Nothing in a
//! signed document can widen them.

use crate::reference::Reference;
use crate::signature::Signature;
use hagalund_core::{algorithm, Error};
use hagalund_crypto::sign;
use std::fmt;
use std::sync::Arc;

/// Structural checks run on a parsed signature before any digest is
/// computed.
pub trait FormatValidator: Send + Sync {
    fn validate(&self, signature: &Signature, policy: &SignaturePolicy) -> Result<(), Error>;
}

/// Rejects truncated HMACs, canonicalization methods outside the allow-list
/// and reference transforms outside the transform allow-list.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatValidator;

impl FormatValidator for DefaultFormatValidator {
    fn validate(&self, signature: &Signature, policy: &SignaturePolicy) -> Result<(), Error> {
        let signed_info = signature.signed_info();
        if let (Some(bits), Some(method)) = (
            signed_info.hmac_output_length,
            signed_info.signature_method.as_deref(),
        ) {
            let native = sign::from_uri(method)?.mac_output_bits();
            if native != Some(bits) {
                return Err(Error::SignatureMismatch(format!(
                    "HMAC output truncated to {bits} bits"
                )));
            }
        }
        policy.check_canonicalization(&signed_info.canonicalization_method)?;
        for reference in &signed_info.references {
            policy.check_reference(reference)?;
        }
        Ok(())
    }
}

/// Allow-lists for canonicalization methods and reference transforms, plus
/// the format validator that enforces them.
#[derive(Clone)]
pub struct SignaturePolicy {
    canonicalization: Vec<String>,
    transforms: Vec<String>,
    validator: Arc<dyn FormatValidator>,
}

impl SignaturePolicy {
    pub fn new() -> Self {
        Self {
            canonicalization: to_strings(algorithm::DEFAULT_SAFE_CANONICALIZATION),
            transforms: to_strings(algorithm::DEFAULT_SAFE_TRANSFORMS),
            validator: Arc::new(DefaultFormatValidator),
        }
    }

    /// Replace the canonicalization allow-list. Canonicalization transforms
    /// inside references follow the same list.
    pub fn with_canonicalization<S: AsRef<str>>(mut self, uris: &[S]) -> Self {
        self.canonicalization = uris.iter().map(|u| u.as_ref().to_owned()).collect();
        self
    }

    /// Replace the list of non-canonicalization transforms.
    pub fn with_transforms<S: AsRef<str>>(mut self, uris: &[S]) -> Self {
        self.transforms = uris.iter().map(|u| u.as_ref().to_owned()).collect();
        self
    }

    pub fn allow_transform(mut self, uri: impl Into<String>) -> Self {
        self.transforms.push(uri.into());
        self
    }

    pub fn with_validator(mut self, validator: impl FormatValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn is_safe_canonicalization(&self, uri: &str) -> bool {
        self.canonicalization.iter().any(|u| u == uri)
    }

    pub fn is_safe_transform(&self, uri: &str) -> bool {
        self.is_safe_canonicalization(uri) || self.transforms.iter().any(|u| u == uri)
    }

    pub fn check_canonicalization(&self, uri: &str) -> Result<(), Error> {
        if self.is_safe_canonicalization(uri) {
            Ok(())
        } else {
            Err(Error::UnsafeCanonicalization(uri.to_owned()))
        }
    }

    /// Every transform of `reference` must be on the transform allow-list.
    pub fn check_reference(&self, reference: &Reference) -> Result<(), Error> {
        match reference
            .transforms
            .transforms()
            .iter()
            .find(|t| !self.is_safe_transform(t.uri()))
        {
            Some(unsafe_transform) => Err(Error::UnsafeTransform(format!(
                "{} in reference {}",
                unsafe_transform.uri(),
                reference.describe()
            ))),
            None => Ok(()),
        }
    }

    /// Run the format validator.
    pub fn validate(&self, signature: &Signature) -> Result<(), Error> {
        self.validator.validate(signature, self)
    }
}

impl Default for SignaturePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SignaturePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignaturePolicy")
            .field("canonicalization", &self.canonicalization)
            .field("transforms", &self.transforms)
            .finish_non_exhaustive()
    }
}

fn to_strings(uris: &[&str]) -> Vec<String> {
    uris.iter().map(|u| (*u).to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hagalund_c14n::C14nMode;
    use hagalund_transforms::Transform;

    #[test]
    fn test_default_lists() {
        let policy = SignaturePolicy::default();
        for uri in algorithm::DEFAULT_SAFE_CANONICALIZATION {
            assert!(policy.is_safe_canonicalization(uri));
            assert!(policy.is_safe_transform(uri));
        }
        assert!(policy.is_safe_transform(algorithm::ENVELOPED_SIGNATURE));
        assert!(policy.is_safe_transform(algorithm::DECRYPT_XML));
        assert!(!policy.is_safe_transform(algorithm::XPATH));
        assert!(!policy.is_safe_transform(algorithm::XSLT));
        assert!(!policy.is_safe_canonicalization(algorithm::BASE64));
    }

    #[test]
    fn test_reference_with_xslt_is_unsafe() {
        let reference = Reference::new(Some("#x"))
            .with_transform(Transform::Xslt { stylesheet: "<s/>".into() });
        let err = SignaturePolicy::default().check_reference(&reference).unwrap_err();
        assert!(matches!(err, Error::UnsafeTransform(_)));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_narrowed_canonicalization_list() {
        let policy = SignaturePolicy::new().with_canonicalization(&[algorithm::EXC_C14N]);
        assert!(policy.check_canonicalization(algorithm::EXC_C14N).is_ok());
        assert!(matches!(
            policy.check_canonicalization(algorithm::C14N),
            Err(Error::UnsafeCanonicalization(_))
        ));
        let reference = Reference::new(Some("")).with_transform(Transform::canonicalize(C14nMode::Inclusive));
        assert!(policy.check_reference(&reference).is_err());
    }

    #[test]
    fn test_allow_xpath() {
        let policy = SignaturePolicy::new().allow_transform(algorithm::XPATH);
        assert!(policy.is_safe_transform(algorithm::XPATH));
    }
}
