#![forbid(unsafe_code)]

/// Errors produced by the Hagalund XML Signature library.
///
/// The first group is the signature-protocol taxonomy; every one of them is
/// terminal for the call that raised it. The second group wraps failures of
/// the XML parser, the encoders and the crypto primitives.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("transform is not on the safe list: {0}")]
    UnsafeTransform(String),

    #[error("canonicalization method is not on the safe list: {0}")]
    UnsafeCanonicalization(String),

    #[error("reference could not be resolved: {0}")]
    ReferenceNotResolved(String),

    #[error("recursion limit of {0} exceeded")]
    RecursionLimitExceeded(usize),

    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    #[error("key does not match signature algorithm: {0}")]
    KeyAlgorithmMismatch(String),

    #[error("digest mismatch for reference: {0}")]
    DigestMismatch(String),

    #[error("signature verification failed: {0}")]
    SignatureMismatch(String),

    #[error("transform input type mismatch: {0}")]
    TransformTypeMismatch(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a verification outcome (the signature is
    /// well-formed but must not be trusted) rather than a structural failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnsafeTransform(_)
                | Self::UnsafeCanonicalization(_)
                | Self::RecursionLimitExceeded(_)
                | Self::DigestMismatch(_)
                | Self::SignatureMismatch(_)
                | Self::ReferenceNotResolved(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
