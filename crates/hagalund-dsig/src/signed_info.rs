#![forbid(unsafe_code)]

//! `<SignedInfo>` and the dependency order of its references.

use crate::reference::Reference;
use crate::xmlutil::{
    algorithm_attr, check_attributes, dsig_children, dsig_element, dsig_text_element, expect_named,
};
use hagalund_c14n::C14nMode;
use hagalund_core::{algorithm, ns, Error, Limits};
use hagalund_crypto::sign;
use hagalund_xml::{Attribute, NodeId, QName, XmlDocument};
use std::collections::HashMap;

/// The signed part of a signature.
#[derive(Debug, Clone)]
pub struct SignedInfo {
    pub id: Option<String>,
    /// Kept as a URI so that unsupported methods can be refused by policy
    /// rather than at parse time.
    pub canonicalization_method: String,
    /// InclusiveNamespaces PrefixList of an exclusive canonicalization method.
    pub inclusive_prefixes: Vec<String>,
    /// `None` until the signer picks one (or it is defaulted from the key).
    pub signature_method: Option<String>,
    /// `HMACOutputLength` in bits.
    pub hmac_output_length: Option<usize>,
    pub references: Vec<Reference>,
}

impl Default for SignedInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl SignedInfo {
    /// Exclusive canonicalization, no signature method yet, no references.
    pub fn new() -> Self {
        Self {
            id: None,
            canonicalization_method: algorithm::EXC_C14N.to_owned(),
            inclusive_prefixes: Vec::new(),
            signature_method: None,
            hmac_output_length: None,
            references: Vec::new(),
        }
    }

    pub fn canonicalization_mode(&self) -> Result<C14nMode, Error> {
        C14nMode::from_uri(&self.canonicalization_method).ok_or_else(|| {
            Error::UnknownAlgorithm(format!("canonicalization: {}", self.canonicalization_method))
        })
    }

    /// Read a `<SignedInfo>` element.
    pub fn from_xml(doc: &XmlDocument, node: NodeId, limits: &Limits) -> Result<Self, Error> {
        check_attributes(doc, node, &[ns::attr::ID])?;
        let children = dsig_children(doc, node)?;
        let [c14n, method, references @ ..] = children.as_slice() else {
            return Err(Error::MalformedSignature(
                "SignedInfo needs CanonicalizationMethod and SignatureMethod".into(),
            ));
        };

        expect_named(doc, *c14n, ns::node::CANONICALIZATION_METHOD)?;
        check_attributes(doc, *c14n, &[ns::attr::ALGORITHM])?;
        let canonicalization_method = algorithm_attr(doc, *c14n)?.to_owned();
        let mut inclusive_prefixes = Vec::new();
        for child in doc.child_elements(*c14n) {
            if !doc.is_element_named(child, ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES) {
                return Err(Error::MalformedSignature(
                    "unexpected child of CanonicalizationMethod".into(),
                ));
            }
            if let Some(list) = doc.attribute(child, ns::attr::PREFIX_LIST) {
                inclusive_prefixes.extend(list.split_whitespace().map(str::to_owned));
            }
        }

        expect_named(doc, *method, ns::node::SIGNATURE_METHOD)?;
        check_attributes(doc, *method, &[ns::attr::ALGORITHM])?;
        let signature_method = algorithm_attr(doc, *method)?.to_owned();
        let alg = sign::from_uri(&signature_method)?;
        let mut hmac_output_length = None;
        for child in dsig_children(doc, *method)? {
            expect_named(doc, child, ns::node::HMAC_OUTPUT_LENGTH)?;
            let text = doc.text_content(child);
            let bits: usize = text.trim().parse().map_err(|_| {
                Error::MalformedSignature(format!("HMACOutputLength {:?} is not a number", text.trim()))
            })?;
            check_hmac_length(alg.mac_output_bits(), bits)?;
            hmac_output_length = Some(bits);
        }

        if references.is_empty() {
            return Err(Error::MalformedSignature("SignedInfo has no Reference".into()));
        }
        if references.len() > limits.max_references_per_signed_info {
            return Err(Error::ResourceLimitExceeded(format!(
                "{} references in SignedInfo (limit {})",
                references.len(),
                limits.max_references_per_signed_info
            )));
        }
        let references = references
            .iter()
            .map(|&r| {
                expect_named(doc, r, ns::node::REFERENCE)?;
                Reference::from_xml(doc, r, limits)
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Self {
            id: doc.attribute(node, ns::attr::ID).map(str::to_owned),
            canonicalization_method,
            inclusive_prefixes,
            signature_method: Some(signature_method),
            hmac_output_length,
            references,
        })
    }

    /// Append this SignedInfo under `parent`.
    pub fn append_to(&self, doc: &mut XmlDocument, parent: NodeId, prefix: Option<&str>) -> Result<NodeId, Error> {
        let method_uri = self
            .signature_method
            .as_deref()
            .ok_or_else(|| Error::MalformedSignature("no signature method".into()))?;
        let node = dsig_element(doc, parent, prefix, ns::node::SIGNED_INFO);
        if let Some(id) = &self.id {
            doc.set_attr(node, ns::attr::ID, id);
        }

        let c14n = dsig_element(doc, node, prefix, ns::node::CANONICALIZATION_METHOD);
        doc.set_attr(c14n, ns::attr::ALGORITHM, &self.canonicalization_method);
        if !self.inclusive_prefixes.is_empty() {
            let inc = doc.append_element(
                c14n,
                QName::new(Some("ec"), ns::node::INCLUSIVE_NAMESPACES),
                Some(ns::EXC_C14N),
            );
            doc.set_attribute(inc, Attribute::namespace_decl("ec", ns::EXC_C14N));
            doc.set_attr(inc, ns::attr::PREFIX_LIST, &self.inclusive_prefixes.join(" "));
        }

        let method = dsig_element(doc, node, prefix, ns::node::SIGNATURE_METHOD);
        doc.set_attr(method, ns::attr::ALGORITHM, method_uri);
        if let Some(bits) = self.hmac_output_length {
            dsig_text_element(doc, method, prefix, ns::node::HMAC_OUTPUT_LENGTH, &bits.to_string());
        }

        for reference in &self.references {
            reference.append_to(doc, node, prefix)?;
        }
        Ok(node)
    }
}

/// An HMAC output length must be a whole number of bytes no longer than the
/// MAC itself.
pub(crate) fn check_hmac_length(native_bits: Option<usize>, bits: usize) -> Result<(), Error> {
    let Some(native) = native_bits else {
        return Err(Error::MalformedSignature(
            "HMACOutputLength on a non-HMAC signature method".into(),
        ));
    };
    if bits > native || bits % 8 != 0 {
        return Err(Error::MalformedSignature(format!(
            "invalid HMAC output length {bits} (MAC is {native} bits)"
        )));
    }
    Ok(())
}

/// Dependency level of every reference: 0 for a reference whose target is
/// not another reference in the list, otherwise one more than its target.
///
/// Chains longer than `max_depth - start_depth` (cycles included) fail with
/// `RecursionLimitExceeded`.
pub fn reference_levels(references: &[Reference], start_depth: usize, max_depth: usize) -> Result<Vec<usize>, Error> {
    let by_id: HashMap<&str, usize> = references
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.id.as_deref().map(|id| (id, i)))
        .collect();
    let mut levels = Vec::with_capacity(references.len());
    for start in 0..references.len() {
        let mut level = 0;
        let mut current = start;
        while let Some(&next) = references[current].target_id().and_then(|id| by_id.get(id)) {
            level += 1;
            if start_depth + level > max_depth {
                return Err(Error::RecursionLimitExceeded(max_depth));
            }
            current = next;
        }
        levels.push(level);
    }
    Ok(levels)
}

/// Reference indices ordered lowest level first, stable within a level.
pub fn digest_order(levels: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..levels.len()).collect();
    order.sort_by_key(|&i| levels[i]);
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEAD: &str = r#"<ds:SignedInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">"#;
    const C14N: &str = r#"<ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/>"#;
    const REF: &str = r#"<ds:Reference URI=""><ds:DigestMethod Algorithm="http://www.w3.org/2000/09/xmldsig#sha1"/><ds:DigestValue>AAAA</ds:DigestValue></ds:Reference>"#;

    fn parse(method: &str, tail: &str) -> Result<SignedInfo, Error> {
        let xml = format!("{HEAD}{C14N}{method}{tail}</ds:SignedInfo>");
        let doc = XmlDocument::parse(&xml).unwrap();
        SignedInfo::from_xml(&doc, doc.document_element().unwrap(), &Limits::default())
    }

    fn hmac_method(bits: &str) -> String {
        format!(
            r#"<ds:SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#hmac-sha1"><ds:HMACOutputLength>{bits}</ds:HMACOutputLength></ds:SignatureMethod>"#
        )
    }

    #[test]
    fn test_parse_minimal() {
        let si = parse(
            r#"<ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/>"#,
            REF,
        )
        .unwrap();
        assert_eq!(si.canonicalization_mode().unwrap(), C14nMode::Exclusive);
        assert_eq!(si.signature_method.as_deref(), Some(algorithm::RSA_SHA256));
        assert_eq!(si.references.len(), 1);
        assert_eq!(si.hmac_output_length, None);
    }

    #[test]
    fn test_hmac_output_length_rules() {
        assert_eq!(parse(&hmac_method("160"), REF).unwrap().hmac_output_length, Some(160));
        assert_eq!(parse(&hmac_method("80"), REF).unwrap().hmac_output_length, Some(80));
        for bad in ["161", "81", "abc"] {
            assert!(
                matches!(parse(&hmac_method(bad), REF), Err(Error::MalformedSignature(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_unknown_signature_method() {
        let err = parse(
            r#"<ds:SignatureMethod Algorithm="http://example.com/none"/>"#,
            REF,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownAlgorithm(_)));
    }

    #[test]
    fn test_missing_reference_and_reference_limit() {
        let method = r#"<ds:SignatureMethod Algorithm="http://www.w3.org/2000/09/xmldsig#rsa-sha1"/>"#;
        assert!(matches!(parse(method, ""), Err(Error::MalformedSignature(_))));

        let xml = format!("{HEAD}{C14N}{method}{}</ds:SignedInfo>", REF.repeat(3));
        let doc = XmlDocument::parse(&xml).unwrap();
        let limits = Limits { max_references_per_signed_info: 2, ..Limits::default() };
        let err = SignedInfo::from_xml(&doc, doc.document_element().unwrap(), &limits).unwrap_err();
        assert!(matches!(err, Error::ResourceLimitExceeded(_)));
    }

    #[test]
    fn test_levels_follow_reference_chain() {
        let refs = vec![
            Reference::new(Some("#b")).with_id("a"),
            Reference::new(Some("#c")).with_id("b"),
            Reference::new(Some("#data")).with_id("c"),
        ];
        let levels = reference_levels(&refs, 0, 20).unwrap();
        assert_eq!(levels, vec![2, 1, 0]);
        assert_eq!(digest_order(&levels), vec![2, 1, 0]);
    }

    #[test]
    fn test_cycle_hits_recursion_limit() {
        let refs = vec![
            Reference::new(Some("#b")).with_id("a"),
            Reference::new(Some("#a")).with_id("b"),
        ];
        assert!(matches!(
            reference_levels(&refs, 0, 20),
            Err(Error::RecursionLimitExceeded(20))
        ));
    }

    #[test]
    fn test_written_form_reads_back() {
        let mut si = SignedInfo::new();
        si.signature_method = Some(algorithm::HMAC_SHA256.to_owned());
        si.hmac_output_length = Some(256);
        si.inclusive_prefixes = vec!["p".into()];
        let mut reference = Reference::new(Some(""));
        reference.digest_value = Some(vec![1, 2, 3]);
        si.references.push(reference);

        let mut doc = XmlDocument::parse(r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"/>"#).unwrap();
        let sig = doc.document_element().unwrap();
        let node = si.append_to(&mut doc, sig, Some("ds")).unwrap();
        let back = SignedInfo::from_xml(&doc, node, &Limits::default()).unwrap();
        assert_eq!(back.signature_method, si.signature_method);
        assert_eq!(back.hmac_output_length, Some(256));
        assert_eq!(back.inclusive_prefixes, vec!["p".to_owned()]);
        assert_eq!(back.references[0].digest_value.as_deref(), Some(&[1u8, 2, 3][..]));
    }
}
