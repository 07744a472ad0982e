#![forbid(unsafe_code)]

//! Hagalund: XML canonicalization and XML-Signature with safe-algorithm
//! policies.
//!
//! The individual crates are re-exported under short names; the most used
//! types are also available at the top level.

pub use hagalund_c14n as c14n;
pub use hagalund_core as core;
pub use hagalund_crypto as crypto;
pub use hagalund_dsig as dsig;
pub use hagalund_keys as keys;
pub use hagalund_transforms as transforms;
pub use hagalund_xml as xml;

pub use hagalund_c14n::{C14nMode, Canonicalizer};
pub use hagalund_core::{Error, Limits};
pub use hagalund_dsig::{DsigContext, Reference, Signature, SignaturePolicy, VerifyResult};
pub use hagalund_keys::{Key, KeyInfo};
pub use hagalund_xml::{NodeSet, XmlDocument};
