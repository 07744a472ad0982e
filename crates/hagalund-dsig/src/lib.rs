#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) implementation.
//!
//! Provides signature verification and creation per the W3C XML-DSig
//! recommendation, restricted by a [`SignaturePolicy`] of safe
//! canonicalization methods and transforms.

pub mod context;
pub mod object;
pub mod policy;
pub mod reference;
pub mod sign;
pub mod signature;
pub mod signed_info;
pub mod verify;
mod xmlutil;

pub use context::DsigContext;
pub use object::DataObject;
pub use policy::{DefaultFormatValidator, FormatValidator, SignaturePolicy};
pub use reference::{DocumentScope, Reference};
pub use signature::{Phase, Signature};
pub use signed_info::SignedInfo;
pub use verify::VerifyResult;
