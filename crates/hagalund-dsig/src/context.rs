#![forbid(unsafe_code)]

//! DSig context: configuration shared by every signature operation in a
//! session.

use crate::policy::SignaturePolicy;
use hagalund_core::Limits;
use hagalund_transforms::{DenyResolver, UriResolver};
use std::fmt;

/// Context for XML-DSig operations.
///
/// Nothing in here is mutated while a signature is processed, so one context
/// can serve verifications running on several threads.
pub struct DsigContext {
    /// Allow-lists and the format validator.
    pub policy: SignaturePolicy,
    pub limits: Limits,
    /// Additional ID attribute names to register.
    pub id_attrs: Vec<String>,
    /// Fetches external reference targets.
    pub resolver: Box<dyn UriResolver>,
    /// Base for relative external references.
    pub base_uri: Option<String>,
    /// Minimum HMAC output length in bits (0 = no minimum beyond the format
    /// checks).
    pub hmac_min_output_bits: usize,
    /// Also digest-check signatures that a reference points at.
    pub verify_nested_signatures: bool,
}

impl DsigContext {
    pub fn new() -> Self {
        Self {
            policy: SignaturePolicy::default(),
            limits: Limits::default(),
            id_attrs: Vec::new(),
            resolver: Box::new(DenyResolver),
            base_uri: None,
            hmac_min_output_bits: 0,
            verify_nested_signatures: false,
        }
    }

    pub fn with_policy(mut self, policy: SignaturePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Add an ID attribute name to register during processing.
    pub fn with_id_attr(mut self, name: impl Into<String>) -> Self {
        self.id_attrs.push(name.into());
        self
    }

    pub fn with_resolver(mut self, resolver: impl UriResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn with_hmac_min_output_bits(mut self, bits: usize) -> Self {
        self.hmac_min_output_bits = bits;
        self
    }

    pub fn with_nested_signatures(mut self, enabled: bool) -> Self {
        self.verify_nested_signatures = enabled;
        self
    }
}

impl Default for DsigContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DsigContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DsigContext")
            .field("policy", &self.policy)
            .field("limits", &self.limits)
            .field("id_attrs", &self.id_attrs)
            .field("base_uri", &self.base_uri)
            .field("hmac_min_output_bits", &self.hmac_min_output_bits)
            .field("verify_nested_signatures", &self.verify_nested_signatures)
            .finish_non_exhaustive()
    }
}
