#![forbid(unsafe_code)]

//! The `<Signature>` element and its processing state.
//!
//! Verification runs as a sequence of phases (format check, SignedInfo check,
//! reference check); each phase may only start once the previous one has
//! passed. A signature built in memory is placed into its document after
//! every change, so digests and the SignedInfo canonical form are always
//! computed over the same serialized tree a verifier will see.

use crate::context::DsigContext;
use crate::object::DataObject;
use crate::reference::{DocumentScope, Reference};
use crate::signed_info::{check_hmac_length, digest_order, reference_levels, SignedInfo};
use crate::verify::VerifyResult;
use crate::xmlutil::{
    check_attributes, decode_base64, dsig_children, dsig_element, dsig_text_element, encode_base64,
    expect_named,
};
use hagalund_c14n::{fragment_with_context, Canonicalizer};
use hagalund_core::{ns, Error};
use hagalund_crypto::{constant_time_eq, sign, DigestWriter};
use hagalund_keys::{Key, KeyInfo};
use hagalund_xml::{Attribute, NodeId, NodeSet, XmlDocument};
use std::io::Write;

/// Where a signature stands in its processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created but neither loaded nor computed.
    Unparsed,
    Parsed,
    FormatChecked,
    SignedInfoChecked,
    ReferencesChecked,
    Verified,
    Rejected,
}

#[derive(Debug)]
pub struct Signature {
    id: Option<String>,
    signed_info: SignedInfo,
    signature_value: Option<Vec<u8>>,
    signature_value_id: Option<String>,
    key_info: Option<KeyInfo>,
    objects: Vec<DataObject>,
    prefix: Option<String>,
    /// The document the signature lives in.
    document: XmlDocument,
    /// The `<Signature>` element inside `document`, once placed.
    node: Option<NodeId>,
    /// Where an unplaced signature goes.
    parent: Option<NodeId>,
    /// In-memory changes not yet written to `document`.
    dirty: bool,
    /// Nesting level when checked as the target of another signature.
    depth: usize,
    phase: Phase,
    /// Hash of the canonical SignedInfo with the URI of the digest that
    /// produced it. Never held for MAC methods.
    signed_info_digest: Option<(String, Vec<u8>)>,
}

impl Default for Signature {
    fn default() -> Self {
        Self::new()
    }
}

impl Signature {
    /// An empty signature written with the `ds` prefix.
    pub fn new() -> Self {
        Self {
            id: None,
            signed_info: SignedInfo::new(),
            signature_value: None,
            signature_value_id: None,
            key_info: None,
            objects: Vec::new(),
            prefix: Some("ds".to_owned()),
            document: XmlDocument::new(),
            node: None,
            parent: None,
            dirty: true,
            depth: 0,
            phase: Phase::Unparsed,
            signed_info_digest: None,
        }
    }

    /// Use `prefix` for the signature elements (`None` for the default
    /// namespace).
    pub fn with_prefix(mut self, prefix: Option<&str>) -> Self {
        self.prefix = prefix.map(str::to_owned);
        self.invalidate();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self.invalidate();
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn signed_info(&self) -> &SignedInfo {
        &self.signed_info
    }

    /// Mutable access to SignedInfo. Any earlier check result is discarded.
    pub fn signed_info_mut(&mut self) -> &mut SignedInfo {
        self.invalidate();
        &mut self.signed_info
    }

    pub fn references(&self) -> &[Reference] {
        &self.signed_info.references
    }

    pub fn signature_value(&self) -> Option<&[u8]> {
        self.signature_value.as_deref()
    }

    pub fn key_info(&self) -> Option<&KeyInfo> {
        self.key_info.as_ref()
    }

    pub fn objects(&self) -> &[DataObject] {
        &self.objects
    }

    /// The document the signature has been loaded from or placed into.
    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// The `<Signature>` element inside [`Self::document`].
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn add_reference(&mut self, reference: Reference) {
        self.signed_info.references.push(reference);
        self.invalidate();
    }

    pub fn add_object(&mut self, object: DataObject) {
        self.objects.push(object);
        self.invalidate();
    }

    pub fn set_key_info(&mut self, key_info: KeyInfo) {
        self.key_info = Some(key_info);
        self.invalidate();
    }

    /// Sign into `document`: the signature becomes the last child of
    /// `parent` when it is computed.
    pub fn attach(&mut self, document: XmlDocument, parent: NodeId) {
        self.document = document;
        self.parent = Some(parent);
        self.node = None;
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.dirty = true;
        self.signed_info_digest = None;
        if self.phase != Phase::Unparsed {
            self.phase = Phase::Parsed;
        }
    }

    // ── Reading ──────────────────────────────────────────────────────

    /// Load the `<Signature>` element `element` of `document`.
    ///
    /// The signature keeps its own copy of the document; later checks see
    /// that copy with the context's ID attributes registered.
    pub fn load_xml(&mut self, ctx: &DsigContext, document: &XmlDocument, element: NodeId) -> Result<(), Error> {
        expect_named(document, element, ns::node::SIGNATURE)?;
        check_attributes(document, element, &[ns::attr::ID])?;

        let mut children = dsig_children(document, element)?.into_iter().peekable();
        let signed_info_node = children
            .next()
            .ok_or_else(|| Error::MalformedSignature("Signature has no SignedInfo".into()))?;
        expect_named(document, signed_info_node, ns::node::SIGNED_INFO)?;
        let signed_info = SignedInfo::from_xml(document, signed_info_node, &ctx.limits)?;

        let value_node = children
            .next()
            .ok_or_else(|| Error::MalformedSignature("Signature has no SignatureValue".into()))?;
        expect_named(document, value_node, ns::node::SIGNATURE_VALUE)?;
        check_attributes(document, value_node, &[ns::attr::ID])?;
        if document.child_elements(value_node).next().is_some() {
            return Err(Error::MalformedSignature("SignatureValue has element content".into()));
        }
        let signature_value = decode_base64(&document.text_content(value_node), "SignatureValue")?;

        let key_info = match children.next_if(|&n| document.is_element_named(n, ns::DSIG, ns::node::KEY_INFO)) {
            Some(node) => Some(KeyInfo::from_xml(document, node)?),
            None => None,
        };
        let objects = children
            .map(|n| {
                expect_named(document, n, ns::node::OBJECT)?;
                DataObject::from_xml(document, n)
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let mut copy = document.clone();
        for attr in &ctx.id_attrs {
            copy.add_id_attr(attr);
        }

        self.id = document.attribute(element, ns::attr::ID).map(str::to_owned);
        self.prefix = document.element(element).and_then(|e| e.name.prefix.clone());
        self.signed_info = signed_info;
        self.signature_value = Some(signature_value);
        self.signature_value_id = document.attribute(value_node, ns::attr::ID).map(str::to_owned);
        self.key_info = key_info;
        self.objects = objects;
        self.parent = document.parent(element);
        self.node = Some(element);
        self.document = copy;
        self.dirty = false;
        self.signed_info_digest = None;
        self.phase = Phase::Parsed;
        tracing::debug!(
            references = self.signed_info.references.len(),
            objects = self.objects.len(),
            "signature loaded"
        );
        Ok(())
    }

    // ── Writing ──────────────────────────────────────────────────────

    /// Append the signature element under `parent` in `doc`, declaring the
    /// signature namespace when `parent` does not already bind the prefix
    /// to it.
    pub fn append_to(&self, doc: &mut XmlDocument, parent: NodeId) -> Result<NodeId, Error> {
        let prefix = self.prefix.as_deref();
        let node = dsig_element(doc, parent, prefix, ns::node::SIGNATURE);
        let declared = prefix.unwrap_or("");
        if doc.lookup_namespace(parent, declared).as_deref() != Some(ns::DSIG) {
            doc.set_attribute(node, Attribute::namespace_decl(declared, ns::DSIG));
        }
        if let Some(id) = &self.id {
            doc.set_attr(node, ns::attr::ID, id);
        }
        self.signed_info.append_to(doc, node, prefix)?;
        let value = self.signature_value.as_deref().map(encode_base64).unwrap_or_default();
        let value_node = dsig_text_element(doc, node, prefix, ns::node::SIGNATURE_VALUE, &value);
        if let Some(id) = &self.signature_value_id {
            doc.set_attr(value_node, ns::attr::ID, id);
        }
        if let Some(key_info) = self.key_info.as_ref().filter(|k| !k.is_empty()) {
            key_info.append_to(doc, node, prefix);
        }
        for object in &self.objects {
            object.append_to(doc, node, prefix);
        }
        Ok(node)
    }

    /// The signature as a standalone document. A loaded, unmodified
    /// signature comes back exactly as read, with its inherited namespace
    /// context.
    pub fn get_xml(&self) -> Result<XmlDocument, Error> {
        if let (false, Some(node)) = (self.dirty, self.node) {
            return Ok(fragment_with_context(&self.document, node));
        }
        let mut doc = XmlDocument::new();
        let root = doc.root();
        self.append_to(&mut doc, root)?;
        Ok(doc)
    }

    /// Write the in-memory state into the document, replacing the element
    /// written last time.
    fn place(&mut self) -> Result<(), Error> {
        let parent = match self.node {
            Some(node) => self.document.parent(node),
            None => self.parent,
        };
        let mut document = std::mem::take(&mut self.document);
        let parent = match parent {
            Some(parent) => parent,
            None => {
                document = XmlDocument::new();
                document.root()
            }
        };
        let written = self.append_to(&mut document, parent);
        let placed = match written {
            Ok(node) => node,
            Err(err) => {
                self.document = document;
                return Err(err);
            }
        };
        if let Some(old) = self.node {
            document.replace_with(old, placed);
        }
        self.document = document;
        self.node = Some(placed);
        self.dirty = false;
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), Error> {
        if self.dirty {
            self.place()?;
        }
        Ok(())
    }

    // ── Signing ──────────────────────────────────────────────────────

    /// Digest every reference and compute the SignatureValue with `key`.
    ///
    /// References that point at other references are digested after their
    /// targets. Without a signature method one is chosen from the key.
    pub fn compute_signature(&mut self, ctx: &DsigContext, key: &Key) -> Result<(), Error> {
        let signing_key = key.to_signing_key();
        if !signing_key.can_sign() {
            return Err(Error::Key(format!("{} key has no private part", signing_key.family())));
        }
        let method = self
            .signed_info
            .signature_method
            .get_or_insert_with(|| signing_key.default_signature_uri().to_owned())
            .clone();
        let alg = sign::from_uri(&method)?;
        if !alg.accepts(&signing_key) {
            return Err(Error::KeyAlgorithmMismatch(format!(
                "{} key for {method}",
                signing_key.family()
            )));
        }
        let mac_len = if alg.is_keyed() {
            let native = alg.mac_output_bits().unwrap_or_default();
            let bits = self.signed_info.hmac_output_length.unwrap_or(native);
            check_hmac_length(Some(native), bits)?;
            if bits < ctx.hmac_min_output_bits {
                return Err(Error::Crypto(format!(
                    "HMAC output of {bits} bits is below the minimum of {}",
                    ctx.hmac_min_output_bits
                )));
            }
            Some(bits / 8)
        } else {
            if self.signed_info.hmac_output_length.is_some() {
                return Err(Error::MalformedSignature(
                    "HMACOutputLength on a non-HMAC signature method".into(),
                ));
            }
            None
        };

        let count = self.signed_info.references.len();
        if count == 0 {
            return Err(Error::MalformedSignature("signature has no references".into()));
        }
        if count > ctx.limits.max_references_per_signed_info {
            return Err(Error::ResourceLimitExceeded(format!(
                "{count} references in SignedInfo (limit {})",
                ctx.limits.max_references_per_signed_info
            )));
        }
        let levels = reference_levels(
            &self.signed_info.references,
            self.depth,
            ctx.limits.max_recursion_depth,
        )?;

        self.signature_value = None;
        self.signed_info_digest = None;
        self.place()?;
        for i in digest_order(&levels) {
            let value = {
                let known = self.known_elements();
                let scope = self.scope(&known);
                self.signed_info.references[i].calculate_digest(&scope, ctx)?
            };
            self.signed_info.references[i].digest_value = Some(value);
            self.place()?;
        }

        let value = match mac_len {
            Some(len) => {
                let canonical = self.canonicalize_signed_info(ctx)?;
                let mut mac = alg.mac(&signing_key, &canonical)?;
                mac.truncate(len);
                mac
            }
            None => {
                let hash = self.digest_signed_info(ctx, alg.digest_uri())?;
                alg.sign(&signing_key, &hash)?
            }
        };
        self.signature_value = Some(value);
        self.place()?;
        self.phase = Phase::Parsed;
        tracing::debug!(method = %method, references = count, "signature computed");
        Ok(())
    }

    // ── Verification ─────────────────────────────────────────────────

    /// Phase 1: run the policy's format validator.
    pub fn check_signature_format(&mut self, ctx: &DsigContext) -> Result<(), Error> {
        self.require_phase(Phase::Parsed)?;
        self.refresh()?;
        ctx.policy.validate(self)?;
        self.phase = Phase::FormatChecked;
        Ok(())
    }

    /// Phase 2: check the SignatureValue over the canonical SignedInfo.
    pub fn check_signed_info(&mut self, ctx: &DsigContext, key: &Key) -> Result<(), Error> {
        self.require_phase(Phase::FormatChecked)?;
        let method = self
            .signed_info
            .signature_method
            .clone()
            .ok_or_else(|| Error::MalformedSignature("no SignatureMethod".into()))?;
        let alg = sign::from_uri(&method)?;
        let signing_key = key.to_signing_key();
        if !alg.accepts(&signing_key) {
            return Err(Error::KeyAlgorithmMismatch(format!(
                "{} key for {method}",
                signing_key.family()
            )));
        }
        let value = self
            .signature_value
            .clone()
            .ok_or_else(|| Error::MalformedSignature("no SignatureValue".into()))?;

        if alg.is_keyed() {
            let native = alg.mac_output_bits().unwrap_or_default();
            let bits = self.signed_info.hmac_output_length.unwrap_or(native);
            if bits < ctx.hmac_min_output_bits {
                return Err(Error::SignatureMismatch(format!(
                    "HMAC output of {bits} bits is below the minimum of {}",
                    ctx.hmac_min_output_bits
                )));
            }
            let len = bits / 8;
            self.signed_info_digest = None;
            let canonical = self.canonicalize_signed_info(ctx)?;
            let mac = alg.mac(&signing_key, &canonical)?;
            if value.len() != len || mac.len() < len || !constant_time_eq(&mac[..len], &value) {
                return Err(Error::SignatureMismatch("HMAC value does not match".into()));
            }
        } else {
            let digest_uri = alg.digest_uri();
            let hash = match self.signed_info_digest.take() {
                Some((uri, hash)) if uri == digest_uri => hash,
                _ => self.digest_signed_info(ctx, digest_uri)?,
            };
            let matches = alg.verify(&signing_key, &hash, &value)?;
            self.signed_info_digest = Some((digest_uri.to_owned(), hash));
            if !matches {
                return Err(Error::SignatureMismatch(format!("{method} value does not match")));
            }
        }
        self.phase = Phase::SignedInfoChecked;
        Ok(())
    }

    /// Phase 3: recompute every reference digest.
    pub fn check_digested_references(&mut self, ctx: &DsigContext) -> Result<(), Error> {
        self.require_phase(Phase::SignedInfoChecked)?;
        self.check_references(ctx)?;
        self.phase = Phase::ReferencesChecked;
        Ok(())
    }

    /// Run every phase with `key`.
    ///
    /// `Ok(false)` means the signature must not be trusted; errors are
    /// reserved for signatures that cannot be processed at all.
    pub fn check_signature(&mut self, ctx: &DsigContext, key: &Key) -> Result<bool, Error> {
        self.verify(ctx, key).map(|result| result.is_valid())
    }

    /// Like [`Self::check_signature`], keeping the rejection reason.
    pub fn verify(&mut self, ctx: &DsigContext, key: &Key) -> Result<VerifyResult, Error> {
        match self.run_checks(ctx, key) {
            Ok(()) => {
                self.phase = Phase::Verified;
                tracing::debug!("signature verified");
                Ok(VerifyResult::Valid)
            }
            Err(reason) if reason.is_rejection() => {
                self.phase = Phase::Rejected;
                tracing::warn!(%reason, "signature rejected");
                Ok(VerifyResult::Invalid { reason })
            }
            Err(err) => Err(err),
        }
    }

    /// Check with the first key in KeyInfo the signature method accepts.
    pub fn check_signature_from_key_info(&mut self, ctx: &DsigContext) -> Result<bool, Error> {
        let key = self.key_from_key_info()?;
        self.check_signature(ctx, &key)
    }

    /// The first KeyInfo key usable with the signature method.
    pub fn key_from_key_info(&self) -> Result<Key, Error> {
        let method = self
            .signed_info
            .signature_method
            .as_deref()
            .ok_or_else(|| Error::MalformedSignature("no SignatureMethod".into()))?;
        let alg = sign::from_uri(method)?;
        self.key_info
            .as_ref()
            .map(KeyInfo::public_keys)
            .unwrap_or_default()
            .into_iter()
            .find(|k| alg.accepts(&k.to_signing_key()))
            .ok_or_else(|| Error::Key(format!("KeyInfo has no key usable with {method}")))
    }

    fn run_checks(&mut self, ctx: &DsigContext, key: &Key) -> Result<(), Error> {
        match self.phase {
            Phase::Unparsed => {
                return Err(Error::MalformedSignature("signature was neither loaded nor computed".into()))
            }
            Phase::Parsed => {}
            Phase::FormatChecked | Phase::SignedInfoChecked | Phase::ReferencesChecked | Phase::Verified => {
                self.phase = Phase::FormatChecked;
            }
            Phase::Rejected => {
                self.phase = Phase::Parsed;
                self.signed_info_digest = None;
            }
        }
        if self.dirty {
            self.invalidate();
        }
        if self.phase == Phase::Parsed {
            self.check_signature_format(ctx)?;
        }
        self.check_signed_info(ctx, key)?;
        self.check_digested_references(ctx)
    }

    fn require_phase(&self, expected: Phase) -> Result<(), Error> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(Error::MalformedSignature(format!(
                "signature is {:?}, expected {expected:?}",
                self.phase
            )))
        }
    }

    fn canonicalize_signed_info(&self, ctx: &DsigContext) -> Result<Vec<u8>, Error> {
        let mut canonical = Vec::new();
        self.write_signed_info(ctx, &mut canonical)?;
        tracing::trace!(canonical = %String::from_utf8_lossy(&canonical), "canonical SignedInfo");
        Ok(canonical)
    }

    /// Hash the canonical SignedInfo while it is being written.
    fn digest_signed_info(&self, ctx: &DsigContext, digest_uri: &str) -> Result<Vec<u8>, Error> {
        let mut hasher = DigestWriter::new(digest_uri)?;
        self.write_signed_info(ctx, &mut hasher)?;
        tracing::trace!(octets = hasher.written(), "SignedInfo digested");
        Ok(hasher.finalize())
    }

    fn write_signed_info<W: Write>(&self, ctx: &DsigContext, out: &mut W) -> Result<(), Error> {
        let node = self
            .node
            .and_then(|n| self.document.find_child_element(n, ns::DSIG, ns::node::SIGNED_INFO))
            .ok_or_else(|| Error::MalformedSignature("signature has no SignedInfo element".into()))?;
        let mode = self.signed_info.canonicalization_mode()?;
        let fragment = fragment_with_context(&self.document, node);
        Canonicalizer::new(&fragment, mode)
            .with_inclusive_prefixes(&self.signed_info.inclusive_prefixes)
            .with_max_depth(ctx.limits.max_element_depth)
            .canonicalize_into(&NodeSet::all(), out)
    }

    /// Objects and References inside this signature that carry an Id.
    fn known_elements(&self) -> Vec<(String, NodeId)> {
        let Some(node) = self.node else {
            return Vec::new();
        };
        let doc = &self.document;
        doc.descendants(node)
            .filter(|&n| {
                doc.is_element_named(n, ns::DSIG, ns::node::OBJECT)
                    || doc.is_element_named(n, ns::DSIG, ns::node::REFERENCE)
            })
            .filter_map(|n| doc.attribute(n, ns::attr::ID).map(|id| (id.to_owned(), n)))
            .collect()
    }

    fn scope<'a>(&'a self, known: &'a [(String, NodeId)]) -> DocumentScope<'a> {
        DocumentScope {
            document: &self.document,
            signature: self.node,
            known,
        }
    }

    fn check_references(&self, ctx: &DsigContext) -> Result<(), Error> {
        if self.depth > ctx.limits.max_recursion_depth {
            return Err(Error::RecursionLimitExceeded(ctx.limits.max_recursion_depth));
        }
        let references = &self.signed_info.references;
        let levels = reference_levels(references, self.depth, ctx.limits.max_recursion_depth)?;
        let known = self.known_elements();
        let scope = self.scope(&known);
        for i in digest_order(&levels) {
            let reference = &references[i];
            ctx.policy.check_reference(reference)?;
            reference.check_digest(&scope, ctx)?;
            if ctx.verify_nested_signatures {
                self.check_nested(reference, &scope, ctx)?;
            }
        }
        Ok(())
    }

    /// When `reference` points at another `<Signature>`, check that
    /// signature's references one level deeper.
    fn check_nested(&self, reference: &Reference, scope: &DocumentScope<'_>, ctx: &DsigContext) -> Result<(), Error> {
        let Some(target) = reference.target_element(scope)? else {
            return Ok(());
        };
        if Some(target) == self.node
            || !self.document.is_element_named(target, ns::DSIG, ns::node::SIGNATURE)
        {
            return Ok(());
        }
        let mut nested = Signature::new();
        nested.depth = self.depth + 1;
        nested.load_xml(ctx, &self.document, target)?;
        tracing::debug!(depth = nested.depth, "checking nested signature references");
        nested.check_references(ctx)
    }
}
