#![forbid(unsafe_code)]

//! `<ds:KeyInfo>` reading and writing.
//!
//! Understood children are `KeyName` and `KeyValue` holding an `RSAKeyValue`
//! or a `DSAKeyValue`. Anything else is carried as an opaque subtree so that
//! a loaded signature serializes back unchanged.

use crate::key::{Key, KeyData};
use base64::Engine;
use hagalund_core::{ns, Error};
use hagalund_xml::{NodeId, QName, XmlDocument};
use rsa::traits::PublicKeyParts;

/// One child of `<KeyInfo>`.
#[derive(Debug)]
pub enum KeyInfoClause {
    KeyName(String),
    RsaKeyValue(rsa::RsaPublicKey),
    DsaKeyValue(dsa::VerifyingKey),
    /// A child this library does not interpret, kept as a one-element
    /// document.
    Other(XmlDocument),
}

/// The parsed content of a `<KeyInfo>` element.
#[derive(Debug, Default)]
pub struct KeyInfo {
    pub id: Option<String>,
    pub clauses: Vec<KeyInfoClause>,
}

/// Decode a CryptoBinary value (base64, possibly wrapped over lines).
fn decode_crypto_binary(text: &str, name: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if clean.is_empty() {
        return Err(Error::Key(format!("{name}: empty value")));
    }
    base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| Error::Base64(format!("{name}: {e}")))
}

fn encode_crypto_binary(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Text of the DSig-namespace child `local` of `parent`.
fn child_text(doc: &XmlDocument, parent: NodeId, local: &str) -> Result<String, Error> {
    doc.find_child_element(parent, ns::DSIG, local)
        .map(|n| doc.text_content(n))
        .ok_or_else(|| Error::MalformedSignature(format!("missing {local}")))
}

fn parse_rsa_key_value(doc: &XmlDocument, node: NodeId) -> Result<rsa::RsaPublicKey, Error> {
    let modulus = decode_crypto_binary(&child_text(doc, node, ns::node::RSA_MODULUS)?, "Modulus")?;
    let exponent =
        decode_crypto_binary(&child_text(doc, node, ns::node::RSA_EXPONENT)?, "Exponent")?;
    rsa::RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&modulus),
        rsa::BigUint::from_bytes_be(&exponent),
    )
    .map_err(|err| Error::Key(format!("invalid RSA public key: {err}")))
}

fn parse_dsa_key_value(doc: &XmlDocument, node: NodeId) -> Result<dsa::VerifyingKey, Error> {
    let decode = |name: &str| -> Result<dsa::BigUint, Error> {
        let bytes = decode_crypto_binary(&child_text(doc, node, name)?, name)?;
        Ok(dsa::BigUint::from_bytes_be(&bytes))
    };
    let components = dsa::Components::from_components(
        decode(ns::node::DSA_P)?,
        decode(ns::node::DSA_Q)?,
        decode(ns::node::DSA_G)?,
    )
    .map_err(|e| Error::Key(format!("invalid DSA components: {e}")))?;
    dsa::VerifyingKey::from_components(components, decode(ns::node::DSA_Y)?)
        .map_err(|e| Error::Key(format!("invalid DSA public key: {e}")))
}

impl KeyInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// KeyInfo advertising `key`: its name and its public value, when the key
    /// family has an XML form.
    pub fn for_key(key: &Key) -> Self {
        let mut info = Self::new();
        if let Some(name) = &key.name {
            info.clauses.push(KeyInfoClause::KeyName(name.clone()));
        }
        match &key.data {
            KeyData::Rsa { public, .. } => {
                info.clauses.push(KeyInfoClause::RsaKeyValue(public.clone()));
            }
            KeyData::Dsa { public, .. } => {
                info.clauses.push(KeyInfoClause::DsaKeyValue(public.clone()));
            }
            KeyData::EcP256 { .. } | KeyData::EcP384 { .. } | KeyData::Hmac(_) => {}
        }
        info
    }

    /// Read a `<KeyInfo>` element.
    ///
    /// A `KeyValue` whose content cannot be turned into a key fails with
    /// `Key` or `Base64`; unknown children are kept verbatim.
    pub fn from_xml(doc: &XmlDocument, node: NodeId) -> Result<Self, Error> {
        let mut info = Self {
            id: doc.attribute(node, ns::attr::ID).map(str::to_owned),
            clauses: Vec::new(),
        };
        for child in doc.child_elements(node) {
            let Some(element) = doc.element(child) else {
                continue;
            };
            let in_dsig = element.namespace_str() == ns::DSIG;
            let clause = match element.name.local.as_str() {
                ns::node::KEY_NAME if in_dsig => {
                    KeyInfoClause::KeyName(doc.text_content(child).trim().to_owned())
                }
                ns::node::KEY_VALUE if in_dsig => {
                    if let Some(rsa) = doc.find_child_element(child, ns::DSIG, ns::node::RSA_KEY_VALUE) {
                        KeyInfoClause::RsaKeyValue(parse_rsa_key_value(doc, rsa)?)
                    } else if let Some(dsa) =
                        doc.find_child_element(child, ns::DSIG, ns::node::DSA_KEY_VALUE)
                    {
                        KeyInfoClause::DsaKeyValue(parse_dsa_key_value(doc, dsa)?)
                    } else {
                        KeyInfoClause::Other(doc.extract_fragment(child))
                    }
                }
                _ => KeyInfoClause::Other(doc.extract_fragment(child)),
            };
            info.clauses.push(clause);
        }
        Ok(info)
    }

    /// The first key name, if any.
    pub fn key_name(&self) -> Option<&str> {
        self.clauses.iter().find_map(|c| match c {
            KeyInfoClause::KeyName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Public keys carried inline, in document order. Each key takes the
    /// first KeyName as its name.
    pub fn public_keys(&self) -> Vec<Key> {
        let name = self.key_name();
        self.clauses
            .iter()
            .filter_map(|c| match c {
                KeyInfoClause::RsaKeyValue(public) => Some(Key::rsa_public(public.clone())),
                KeyInfoClause::DsaKeyValue(public) => Some(Key::new(KeyData::Dsa {
                    private: None,
                    public: public.clone(),
                })),
                _ => None,
            })
            .map(|k| match name {
                Some(n) => k.with_name(n),
                None => k,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Append this KeyInfo under `parent`, with element names using `prefix`.
    pub fn append_to(&self, doc: &mut XmlDocument, parent: NodeId, prefix: Option<&str>) -> NodeId {
        let ds = |local: &str| QName::new(prefix, local);
        let key_info = doc.append_element(parent, ds(ns::node::KEY_INFO), Some(ns::DSIG));
        if let Some(id) = &self.id {
            doc.set_attr(key_info, ns::attr::ID, id);
        }
        let text_child = |doc: &mut XmlDocument, parent: NodeId, local: &str, text: &str| {
            let n = doc.append_element(parent, ds(local), Some(ns::DSIG));
            doc.append_text(n, text);
        };
        for clause in &self.clauses {
            match clause {
                KeyInfoClause::KeyName(name) => {
                    text_child(doc, key_info, ns::node::KEY_NAME, name);
                }
                KeyInfoClause::RsaKeyValue(public) => {
                    let kv = doc.append_element(key_info, ds(ns::node::KEY_VALUE), Some(ns::DSIG));
                    let rsa = doc.append_element(kv, ds(ns::node::RSA_KEY_VALUE), Some(ns::DSIG));
                    text_child(doc, rsa, ns::node::RSA_MODULUS, &encode_crypto_binary(&public.n().to_bytes_be()));
                    text_child(doc, rsa, ns::node::RSA_EXPONENT, &encode_crypto_binary(&public.e().to_bytes_be()));
                }
                KeyInfoClause::DsaKeyValue(public) => {
                    let kv = doc.append_element(key_info, ds(ns::node::KEY_VALUE), Some(ns::DSIG));
                    let dsa = doc.append_element(kv, ds(ns::node::DSA_KEY_VALUE), Some(ns::DSIG));
                    let components = public.components();
                    for (local, value) in [
                        (ns::node::DSA_P, components.p()),
                        (ns::node::DSA_Q, components.q()),
                        (ns::node::DSA_G, components.g()),
                        (ns::node::DSA_Y, public.y()),
                    ] {
                        text_child(doc, dsa, local, &encode_crypto_binary(&value.to_bytes_be()));
                    }
                }
                KeyInfoClause::Other(fragment) => {
                    if let Some(root) = fragment.document_element() {
                        doc.import_subtree(fragment, root, key_info);
                    }
                }
            }
        }
        key_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_key() -> rsa::RsaPrivateKey {
        rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
    }

    #[test]
    fn test_rsa_key_value_emitted_and_read_back() {
        let key = Key::rsa(rsa_key()).with_name("alice");
        let info = KeyInfo::for_key(&key);

        let mut doc = XmlDocument::parse(r#"<ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"/>"#).unwrap();
        let sig = doc.document_element().unwrap();
        let node = info.append_to(&mut doc, sig, Some("ds"));
        let xml = doc.to_xml_string();
        assert!(xml.contains("<ds:KeyName>alice</ds:KeyName>"));
        assert!(xml.contains("<ds:Exponent>AQAB</ds:Exponent>"));

        let parsed = KeyInfo::from_xml(&doc, node).unwrap();
        assert_eq!(parsed.key_name(), Some("alice"));
        let keys = parsed.public_keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].rsa_public_key(), key.rsa_public_key());
        assert_eq!(keys[0].name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_unknown_children_preserved() {
        let xml = r#"<KeyInfo xmlns="http://www.w3.org/2000/09/xmldsig#" Id="ki"><X509Data><X509SubjectName>CN=x</X509SubjectName></X509Data></KeyInfo>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let info = KeyInfo::from_xml(&doc, doc.document_element().unwrap()).unwrap();
        assert_eq!(info.id.as_deref(), Some("ki"));
        assert!(info.public_keys().is_empty());

        let mut out = XmlDocument::new();
        let root = out.root();
        info.append_to(&mut out, root, None);
        assert!(out
            .to_xml_string()
            .contains("<X509Data><X509SubjectName>CN=x</X509SubjectName></X509Data>"));
    }

    #[test]
    fn test_bad_modulus_is_an_error() {
        let xml = r#"<KeyInfo xmlns="http://www.w3.org/2000/09/xmldsig#"><KeyValue><RSAKeyValue><Modulus>!!</Modulus><Exponent>AQAB</Exponent></RSAKeyValue></KeyValue></KeyInfo>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let err = KeyInfo::from_xml(&doc, doc.document_element().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Base64(_)));
    }
}
