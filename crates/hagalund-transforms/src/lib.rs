#![forbid(unsafe_code)]

//! Transform chains for XML-DSig references.
//!
//! A reference dereferences to a [`TransformData`] value, which then passes
//! through its [`TransformChain`] in order. Whatever comes out the end is
//! turned into octets and digested.

pub mod base64_transform;
pub mod decrypt;
pub mod enveloped;
pub mod license;
pub mod parse;
pub mod pipeline;
pub mod uri;

pub use pipeline::{DataType, Transform, TransformChain, TransformData};
pub use uri::{DenyResolver, MemoryResolver, UriResolver};
