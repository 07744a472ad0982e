#![forbid(unsafe_code)]

//! Cryptographic primitives for the Hagalund XML signature library.
//!
//! Digests and signature/MAC algorithms are looked up by their XML-DSig
//! algorithm URIs.

pub mod digest;
pub mod sign;

pub use digest::{DigestAlgorithm, DigestWriter};
pub use sign::{constant_time_eq, SignatureAlgorithm, SigningKey};
