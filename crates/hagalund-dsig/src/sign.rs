#![forbid(unsafe_code)]

//! XML-DSig signature creation.

use crate::context::DsigContext;
use crate::object::DataObject;
use crate::reference::Reference;
use crate::signature::Signature;
use crate::verify;
use hagalund_c14n::C14nMode;
use hagalund_core::Error;
use hagalund_keys::{Key, KeyInfo};
use hagalund_transforms::Transform;
use hagalund_xml::XmlDocument;

/// Sign an XML template document.
///
/// The template must contain a `<Signature>` element; its DigestValue and
/// SignatureValue elements may be empty. Every reference is digested and
/// the signature value computed with `key`.
///
/// Returns the signed XML document as a string.
pub fn sign(ctx: &DsigContext, template_xml: &str, key: &Key) -> Result<String, Error> {
    let mut signature = verify::load(ctx, template_xml)?;
    signature.compute_signature(ctx, key)?;
    Ok(signature.document().to_xml_string())
}

/// Sign the whole of `xml` with a signature appended to its document
/// element.
///
/// The reference uses the enveloped-signature transform followed by
/// exclusive canonicalization; the key's public value goes into KeyInfo
/// when it has an XML form.
pub fn sign_enveloped(ctx: &DsigContext, xml: &str, key: &Key) -> Result<String, Error> {
    let mut doc = XmlDocument::parse_with_limit(xml, ctx.limits.max_document_chars)?;
    for attr in &ctx.id_attrs {
        doc.add_id_attr(attr);
    }
    let root = doc
        .document_element()
        .ok_or_else(|| Error::XmlParse("document has no element".into()))?;

    let mut signature = Signature::new();
    signature.attach(doc, root);
    signature.add_reference(
        Reference::new(Some(""))
            .with_transform(Transform::enveloped())
            .with_transform(Transform::canonicalize(C14nMode::Exclusive)),
    );
    add_key_info(&mut signature, key);
    signature.compute_signature(ctx, key)?;
    tracing::info!("enveloped signature created");
    Ok(signature.document().to_xml_string())
}

/// Sign `content_xml` by carrying it inside the signature in an `<Object>`.
pub fn sign_enveloping(ctx: &DsigContext, content_xml: &str, key: &Key) -> Result<String, Error> {
    const OBJECT_ID: &str = "object";

    let mut signature = Signature::new();
    signature.add_object(DataObject::new().with_id(OBJECT_ID).with_xml(content_xml)?);
    signature.add_reference(
        Reference::new(Some(&format!("#{OBJECT_ID}")))
            .with_transform(Transform::canonicalize(C14nMode::Exclusive)),
    );
    add_key_info(&mut signature, key);
    signature.compute_signature(ctx, key)?;
    tracing::info!("enveloping signature created");
    Ok(signature.document().to_xml_string())
}

fn add_key_info(signature: &mut Signature, key: &Key) {
    let key_info = KeyInfo::for_key(key);
    if !key_info.is_empty() {
        signature.set_key_info(key_info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::verify;

    fn key() -> Key {
        Key::hmac(b"0123456789abcdef0123456789abcdef".to_vec())
    }

    #[test]
    fn test_enveloped_output_shape() {
        let signed = sign_enveloped(&DsigContext::new(), "<doc><a>1</a></doc>", &key()).unwrap();
        assert!(signed.starts_with(r#"<doc><a>1</a><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#">"#));
        assert!(signed.ends_with("</ds:Signature></doc>"));
        assert!(verify(&DsigContext::new(), &signed, &key()).unwrap().is_valid());
    }

    #[test]
    fn test_enveloping_round_trip() {
        let signed = sign_enveloping(&DsigContext::new(), r#"<p:msg xmlns:p="urn:p">hi</p:msg>"#, &key()).unwrap();
        assert!(signed.contains(r#"<ds:Object Id="object"><p:msg xmlns:p="urn:p">hi</p:msg></ds:Object>"#));
        assert!(verify(&DsigContext::new(), &signed, &key()).unwrap().is_valid());
    }

    #[test]
    fn test_template_is_filled_in() {
        let template = r#"<doc Id="d"><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#hmac-sha256"/><ds:Reference URI=""><ds:Transforms><ds:Transform Algorithm="http://www.w3.org/2000/09/xmldsig#enveloped-signature"/></ds:Transforms><ds:DigestMethod Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/><ds:DigestValue/></ds:Reference></ds:SignedInfo><ds:SignatureValue/></ds:Signature></doc>"#;
        let signed = sign(&DsigContext::new(), template, &key()).unwrap();
        assert!(!signed.contains("<ds:DigestValue/>"));
        assert!(!signed.contains("<ds:SignatureValue/>"));
        assert!(verify(&DsigContext::new(), &signed, &key()).unwrap().is_valid());
    }
}
