#![forbid(unsafe_code)]

//! XML namespace constants and XML-DSig element/attribute names.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Exclusive C14N namespace (hosts `InclusiveNamespaces`)
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML namespace, bound to the `xml` prefix
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace, bound to the `xmlns` prefix
pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";

/// XML Encryption namespace
pub const XMLENC: &str = "http://www.w3.org/2001/04/xmlenc#";

/// Decryption transform namespace (hosts `Except`)
pub const DECRYPT: &str = "http://www.w3.org/2002/07/decrypt#";

/// MPEG-21 rights expression language namespace
pub const REL: &str = "urn:mpeg:mpeg21:2003:01-REL-R-NS";

/// Sentinel for the default namespace in an InclusiveNamespaces PrefixList
pub const DEFAULT_PREFIX_TOKEN: &str = "#default";

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // DSig elements
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const OBJECT: &str = "Object";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const HMAC_OUTPUT_LENGTH: &str = "HMACOutputLength";

    // KeyInfo elements
    pub const KEY_INFO: &str = "KeyInfo";
    pub const KEY_NAME: &str = "KeyName";
    pub const KEY_VALUE: &str = "KeyValue";

    // RSA elements
    pub const RSA_KEY_VALUE: &str = "RSAKeyValue";
    pub const RSA_MODULUS: &str = "Modulus";
    pub const RSA_EXPONENT: &str = "Exponent";

    // DSA elements
    pub const DSA_KEY_VALUE: &str = "DSAKeyValue";
    pub const DSA_P: &str = "P";
    pub const DSA_Q: &str = "Q";
    pub const DSA_G: &str = "G";
    pub const DSA_Y: &str = "Y";

    // XPath / Exc C14N / XSLT
    pub const XPATH: &str = "XPath";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

    // Decryption transform
    pub const EXCEPT: &str = "Except";
    pub const ENCRYPTED_DATA: &str = "EncryptedData";

    // License transform
    pub const LICENSE: &str = "license";
    pub const ISSUER: &str = "issuer";
    pub const ENCRYPTED_GRANT: &str = "encryptedGrant";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const MIME_TYPE: &str = "MimeType";
    pub const ENCODING: &str = "Encoding";
    pub const ALGORITHM: &str = "Algorithm";
    pub const PREFIX_LIST: &str = "PrefixList";
}
