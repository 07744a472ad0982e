#![forbid(unsafe_code)]

//! Signature and MAC algorithms keyed by their XML-DSig URIs.
//!
//! Asymmetric algorithms work on a digest the caller has already computed
//! with [`SignatureAlgorithm::digest_uri`], so canonical SignedInfo can be
//! streamed into the hash. Keyed algorithms (HMAC) go through
//! [`SignatureAlgorithm::mac`] over the full data instead.

use hagalund_core::{algorithm, Error};
use rsa::Pkcs1v15Sign;
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use std::fmt;
use subtle::ConstantTimeEq;

/// Key material for signature operations.
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    Dsa(dsa::SigningKey),
    DsaPublic(dsa::VerifyingKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::SigningKey),
    EcP384Public(p384::ecdsa::VerifyingKey),
    Hmac(Vec<u8>),
}

impl SigningKey {
    /// Short name of the key family, for error messages.
    pub fn family(&self) -> &'static str {
        match self {
            Self::Rsa(_) | Self::RsaPublic(_) => "RSA",
            Self::Dsa(_) | Self::DsaPublic(_) => "DSA",
            Self::EcP256(_) | Self::EcP256Public(_) => "EC P-256",
            Self::EcP384(_) | Self::EcP384Public(_) => "EC P-384",
            Self::Hmac(_) => "HMAC",
        }
    }

    /// Whether this key can produce signatures.
    pub fn can_sign(&self) -> bool {
        matches!(
            self,
            Self::Rsa(_) | Self::Dsa(_) | Self::EcP256(_) | Self::EcP384(_) | Self::Hmac(_)
        )
    }

    /// Signature method used when the caller does not pick one.
    pub fn default_signature_uri(&self) -> &'static str {
        match self {
            Self::Rsa(_) | Self::RsaPublic(_) => algorithm::RSA_SHA256,
            Self::Dsa(_) | Self::DsaPublic(_) => algorithm::DSA_SHA1,
            Self::EcP256(_) | Self::EcP256Public(_) => algorithm::ECDSA_SHA256,
            Self::EcP384(_) | Self::EcP384Public(_) => algorithm::ECDSA_SHA384,
            Self::Hmac(_) => algorithm::HMAC_SHA256,
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visibility = if self.can_sign() { "private" } else { "public" };
        write!(f, "SigningKey({} {visibility})", self.family())
    }
}

/// A signature or MAC algorithm.
pub trait SignatureAlgorithm: Send + Sync {
    fn uri(&self) -> &'static str;

    /// The digest the input is hashed with.
    fn digest_uri(&self) -> &'static str;

    /// Whether `key` belongs to the family this algorithm needs.
    fn accepts(&self, key: &SigningKey) -> bool;

    /// `true` for MAC algorithms, which use [`Self::mac`] instead of
    /// `sign`/`verify`.
    fn is_keyed(&self) -> bool {
        false
    }

    /// Native MAC size in bits, for keyed algorithms.
    fn mac_output_bits(&self) -> Option<usize> {
        None
    }

    /// Sign a precomputed digest.
    fn sign(&self, key: &SigningKey, digest: &[u8]) -> Result<Vec<u8>, Error>;

    /// Verify a signature over a precomputed digest. A well-formed signature
    /// that does not match yields `Ok(false)`.
    fn verify(&self, key: &SigningKey, digest: &[u8], signature: &[u8]) -> Result<bool, Error>;

    /// Compute the full MAC of `data`.
    fn mac(&self, _key: &SigningKey, _data: &[u8]) -> Result<Vec<u8>, Error> {
        Err(Error::UnknownAlgorithm(format!(
            "{} is not a keyed algorithm",
            self.uri()
        )))
    }
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    let alg: Box<dyn SignatureAlgorithm> = match uri {
        algorithm::RSA_SHA1 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA1, hash: HashType::Sha1 }),
        algorithm::RSA_SHA224 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA224, hash: HashType::Sha224 }),
        algorithm::RSA_SHA256 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA256, hash: HashType::Sha256 }),
        algorithm::RSA_SHA384 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA384, hash: HashType::Sha384 }),
        algorithm::RSA_SHA512 => Box::new(RsaPkcs1v15 { uri: algorithm::RSA_SHA512, hash: HashType::Sha512 }),

        algorithm::DSA_SHA1 => Box::new(Dsa { uri: algorithm::DSA_SHA1, hash: HashType::Sha1 }),
        algorithm::DSA_SHA256 => Box::new(Dsa { uri: algorithm::DSA_SHA256, hash: HashType::Sha256 }),

        algorithm::ECDSA_SHA1 => Box::new(Ecdsa { uri: algorithm::ECDSA_SHA1, hash: HashType::Sha1 }),
        algorithm::ECDSA_SHA256 => Box::new(Ecdsa { uri: algorithm::ECDSA_SHA256, hash: HashType::Sha256 }),
        algorithm::ECDSA_SHA384 => Box::new(Ecdsa { uri: algorithm::ECDSA_SHA384, hash: HashType::Sha384 }),
        algorithm::ECDSA_SHA512 => Box::new(Ecdsa { uri: algorithm::ECDSA_SHA512, hash: HashType::Sha512 }),

        algorithm::HMAC_SHA1 => Box::new(HmacSign { uri: algorithm::HMAC_SHA1, hash: HashType::Sha1 }),
        algorithm::HMAC_SHA224 => Box::new(HmacSign { uri: algorithm::HMAC_SHA224, hash: HashType::Sha224 }),
        algorithm::HMAC_SHA256 => Box::new(HmacSign { uri: algorithm::HMAC_SHA256, hash: HashType::Sha256 }),
        algorithm::HMAC_SHA384 => Box::new(HmacSign { uri: algorithm::HMAC_SHA384, hash: HashType::Sha384 }),
        algorithm::HMAC_SHA512 => Box::new(HmacSign { uri: algorithm::HMAC_SHA512, hash: HashType::Sha512 }),

        _ => return Err(Error::UnknownAlgorithm(format!("signature algorithm: {uri}"))),
    };
    Ok(alg)
}

/// Equality that does not stop at the first differing byte. Slices of
/// different length are unequal.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    bool::from(a.ct_eq(b))
}

#[derive(Debug, Clone, Copy)]
enum HashType { Sha1, Sha224, Sha256, Sha384, Sha512 }

impl HashType {
    fn uri(self) -> &'static str {
        match self {
            Self::Sha1 => algorithm::SHA1,
            Self::Sha224 => algorithm::SHA224,
            Self::Sha256 => algorithm::SHA256,
            Self::Sha384 => algorithm::SHA384,
            Self::Sha512 => algorithm::SHA512,
        }
    }

    fn bits(self) -> usize {
        match self {
            Self::Sha1 => 160,
            Self::Sha224 => 224,
            Self::Sha256 => 256,
            Self::Sha384 => 384,
            Self::Sha512 => 512,
        }
    }

    fn pkcs1v15(self) -> Pkcs1v15Sign {
        match self {
            Self::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
            Self::Sha224 => Pkcs1v15Sign::new::<sha2::Sha224>(),
            Self::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
            Self::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
            Self::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
        }
    }
}

fn mismatch(alg: &dyn SignatureAlgorithm, key: &SigningKey) -> Error {
    Error::KeyAlgorithmMismatch(format!("{} key used with {}", key.family(), alg.uri()))
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 { uri: &'static str, hash: HashType }

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str { self.uri }

    fn digest_uri(&self) -> &'static str { self.hash.uri() }

    fn accepts(&self, key: &SigningKey) -> bool {
        matches!(key, SigningKey::Rsa(_) | SigningKey::RsaPublic(_))
    }

    fn sign(&self, key: &SigningKey, digest: &[u8]) -> Result<Vec<u8>, Error> {
        let SigningKey::Rsa(private_key) = key else {
            return Err(mismatch(self, key));
        };
        private_key
            .sign(self.hash.pkcs1v15(), digest)
            .map_err(|e| Error::Crypto(format!("RSA signing failed: {e}")))
    }

    fn verify(&self, key: &SigningKey, digest: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let public_key = match key {
            SigningKey::Rsa(pk) => pk.to_public_key(),
            SigningKey::RsaPublic(pk) => pk.clone(),
            _ => return Err(mismatch(self, key)),
        };
        Ok(public_key.verify(self.hash.pkcs1v15(), digest, sig_bytes).is_ok())
    }
}

// ── DSA ──────────────────────────────────────────────────────────────

struct Dsa { uri: &'static str, hash: HashType }

/// Byte length of one of r or s: the size of the subgroup order q.
fn dsa_component_len(vk: &dsa::VerifyingKey) -> usize {
    vk.components().q().bits().div_ceil(8)
}

/// Convert a DSA signature to the XML-DSig r||s form.
pub fn dsa_to_xmldsig(sig: &dsa::Signature, component_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(component_len * 2);
    for part in [sig.r(), sig.s()] {
        let bytes = part.to_bytes_be();
        out.resize(out.len() + component_len.saturating_sub(bytes.len()), 0);
        out.extend_from_slice(&bytes);
    }
    out
}

/// Parse an XML-DSig r||s DSA signature.
pub fn xmldsig_to_dsa(rs: &[u8], component_len: usize) -> Result<dsa::Signature, Error> {
    if rs.len() != component_len * 2 {
        return Err(Error::Crypto(format!(
            "DSA signature must be {} bytes, got {}",
            component_len * 2,
            rs.len()
        )));
    }
    let (r, s) = rs.split_at(component_len);
    dsa::Signature::from_components(dsa::BigUint::from_bytes_be(r), dsa::BigUint::from_bytes_be(s))
        .map_err(|e| Error::Crypto(format!("invalid DSA signature: {e}")))
}

impl SignatureAlgorithm for Dsa {
    fn uri(&self) -> &'static str { self.uri }

    fn digest_uri(&self) -> &'static str { self.hash.uri() }

    fn accepts(&self, key: &SigningKey) -> bool {
        matches!(key, SigningKey::Dsa(_) | SigningKey::DsaPublic(_))
    }

    fn sign(&self, key: &SigningKey, digest: &[u8]) -> Result<Vec<u8>, Error> {
        let SigningKey::Dsa(sk) = key else {
            return Err(mismatch(self, key));
        };
        let sig: dsa::Signature = sk
            .sign_prehash(digest)
            .map_err(|e| Error::Crypto(format!("DSA signing failed: {e}")))?;
        Ok(dsa_to_xmldsig(&sig, dsa_component_len(sk.verifying_key())))
    }

    fn verify(&self, key: &SigningKey, digest: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        let vk = match key {
            SigningKey::Dsa(sk) => sk.verifying_key(),
            SigningKey::DsaPublic(vk) => vk,
            _ => return Err(mismatch(self, key)),
        };
        let Ok(sig) = xmldsig_to_dsa(sig_bytes, dsa_component_len(vk)) else {
            return Ok(false);
        };
        Ok(vk.verify_prehash(digest, &sig).is_ok())
    }
}

// ── ECDSA ────────────────────────────────────────────────────────────

/// ECDSA over P-256 or P-384; the curve comes from the key.
struct Ecdsa { uri: &'static str, hash: HashType }

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-256.
pub fn xmldsig_to_p256(rs: &[u8]) -> Result<p256::ecdsa::Signature, Error> {
    if rs.len() != 64 {
        return Err(Error::Crypto(format!("P-256 signature must be 64 bytes, got {}", rs.len())));
    }
    let r = p256::FieldBytes::from_slice(&rs[..32]);
    let s = p256::FieldBytes::from_slice(&rs[32..]);
    p256::ecdsa::Signature::from_scalars(*r, *s)
        .map_err(|e| Error::Crypto(format!("invalid P-256 signature: {e}")))
}

/// Convert XML-DSig ECDSA r||s to a typed Signature for P-384.
pub fn xmldsig_to_p384(rs: &[u8]) -> Result<p384::ecdsa::Signature, Error> {
    if rs.len() != 96 {
        return Err(Error::Crypto(format!("P-384 signature must be 96 bytes, got {}", rs.len())));
    }
    let r = p384::FieldBytes::from_slice(&rs[..48]);
    let s = p384::FieldBytes::from_slice(&rs[48..]);
    p384::ecdsa::Signature::from_scalars(*r, *s)
        .map_err(|e| Error::Crypto(format!("invalid P-384 signature: {e}")))
}

impl SignatureAlgorithm for Ecdsa {
    fn uri(&self) -> &'static str { self.uri }

    fn digest_uri(&self) -> &'static str { self.hash.uri() }

    fn accepts(&self, key: &SigningKey) -> bool {
        matches!(
            key,
            SigningKey::EcP256(_)
                | SigningKey::EcP256Public(_)
                | SigningKey::EcP384(_)
                | SigningKey::EcP384Public(_)
        )
    }

    fn sign(&self, key: &SigningKey, digest: &[u8]) -> Result<Vec<u8>, Error> {
        let failed = |e: signature::Error| Error::Crypto(format!("ECDSA signing failed: {e}"));
        match key {
            SigningKey::EcP256(sk) => {
                let sig: p256::ecdsa::Signature = sk.sign_prehash(digest).map_err(failed)?;
                Ok(sig.to_bytes().to_vec())
            }
            SigningKey::EcP384(sk) => {
                let sig: p384::ecdsa::Signature = sk.sign_prehash(digest).map_err(failed)?;
                Ok(sig.to_bytes().to_vec())
            }
            _ => Err(mismatch(self, key)),
        }
    }

    fn verify(&self, key: &SigningKey, digest: &[u8], sig_bytes: &[u8]) -> Result<bool, Error> {
        match key {
            SigningKey::EcP256(_) | SigningKey::EcP256Public(_) => {
                let vk = match key {
                    SigningKey::EcP256(sk) => *sk.verifying_key(),
                    SigningKey::EcP256Public(vk) => *vk,
                    _ => return Err(mismatch(self, key)),
                };
                let Ok(sig) = xmldsig_to_p256(sig_bytes) else {
                    return Ok(false);
                };
                Ok(vk.verify_prehash(digest, &sig).is_ok())
            }
            SigningKey::EcP384(_) | SigningKey::EcP384Public(_) => {
                let vk = match key {
                    SigningKey::EcP384(sk) => *sk.verifying_key(),
                    SigningKey::EcP384Public(vk) => *vk,
                    _ => return Err(mismatch(self, key)),
                };
                let Ok(sig) = xmldsig_to_p384(sig_bytes) else {
                    return Ok(false);
                };
                Ok(vk.verify_prehash(digest, &sig).is_ok())
            }
            _ => Err(mismatch(self, key)),
        }
    }
}

// ── HMAC ─────────────────────────────────────────────────────────────

struct HmacSign { uri: &'static str, hash: HashType }

impl SignatureAlgorithm for HmacSign {
    fn uri(&self) -> &'static str { self.uri }

    fn digest_uri(&self) -> &'static str { self.hash.uri() }

    fn accepts(&self, key: &SigningKey) -> bool {
        matches!(key, SigningKey::Hmac(_))
    }

    fn is_keyed(&self) -> bool {
        true
    }

    fn mac_output_bits(&self) -> Option<usize> {
        Some(self.hash.bits())
    }

    fn sign(&self, key: &SigningKey, _digest: &[u8]) -> Result<Vec<u8>, Error> {
        Err(Error::Crypto(format!("{} signs through mac(), not over a digest", key.family())))
    }

    fn verify(&self, key: &SigningKey, _digest: &[u8], _signature: &[u8]) -> Result<bool, Error> {
        Err(Error::Crypto(format!("{} verifies through mac(), not over a digest", key.family())))
    }

    fn mac(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        let SigningKey::Hmac(key_bytes) = key else {
            return Err(mismatch(self, key));
        };
        compute_hmac(self.hash, key_bytes, data)
    }
}

fn compute_hmac(hash: HashType, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    use hmac::{Hmac, Mac};
    macro_rules! hmac_compute {
        ($hasher:ty) => {{
            let mut mac = <Hmac<$hasher>>::new_from_slice(key)
                .map_err(|e| Error::Key(format!("HMAC key: {e}")))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }};
    }
    match hash {
        HashType::Sha1 => hmac_compute!(sha1::Sha1),
        HashType::Sha224 => hmac_compute!(sha2::Sha224),
        HashType::Sha256 => hmac_compute!(sha2::Sha256),
        HashType::Sha384 => hmac_compute!(sha2::Sha384),
        HashType::Sha512 => hmac_compute!(sha2::Sha512),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest;

    fn rsa_key() -> rsa::RsaPrivateKey {
        rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
    }

    #[test]
    fn test_rsa_sign_verify() {
        let key = SigningKey::Rsa(rsa_key());
        let alg = from_uri(algorithm::RSA_SHA256).unwrap();
        let digest = digest::digest(alg.digest_uri(), b"signed info").unwrap();
        let sig = alg.sign(&key, &digest).unwrap();
        assert_eq!(sig.len(), 128);
        assert!(alg.verify(&key, &digest, &sig).unwrap());

        let other = digest::digest(alg.digest_uri(), b"signed inf0").unwrap();
        assert!(!alg.verify(&key, &other, &sig).unwrap());
    }

    #[test]
    fn test_rsa_public_key_cannot_sign() {
        let public = SigningKey::RsaPublic(rsa_key().to_public_key());
        let alg = from_uri(algorithm::RSA_SHA1).unwrap();
        let err = alg.sign(&public, &[0u8; 20]).unwrap_err();
        assert!(matches!(err, Error::KeyAlgorithmMismatch(_)));
    }

    #[test]
    fn test_ecdsa_p256_sign_verify() {
        let sk = p256::ecdsa::SigningKey::from_slice(&[7u8; 32]).unwrap();
        let public = SigningKey::EcP256Public(*sk.verifying_key());
        let key = SigningKey::EcP256(sk);
        let alg = from_uri(algorithm::ECDSA_SHA256).unwrap();
        let digest = digest::digest(alg.digest_uri(), b"data").unwrap();
        let sig = alg.sign(&key, &digest).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(alg.verify(&public, &digest, &sig).unwrap());
        assert!(!alg.verify(&public, &digest, &sig[..63]).unwrap());
    }

    #[test]
    fn test_ecdsa_p384_sign_verify() {
        let sk = p384::ecdsa::SigningKey::from_slice(&[9u8; 48]).unwrap();
        let key = SigningKey::EcP384(sk);
        let alg = from_uri(algorithm::ECDSA_SHA384).unwrap();
        let digest = digest::digest(alg.digest_uri(), b"data").unwrap();
        let sig = alg.sign(&key, &digest).unwrap();
        assert_eq!(sig.len(), 96);
        assert!(alg.verify(&key, &digest, &sig).unwrap());
    }

    #[test]
    fn test_hmac_known_answer() {
        // RFC 4231 test case 2.
        let key = SigningKey::Hmac(b"Jefe".to_vec());
        let alg = from_uri(algorithm::HMAC_SHA256).unwrap();
        let mac = alg.mac(&key, b"what do ya want for nothing?").unwrap();
        let hex: String = mac.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(
            hex,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert!(alg.is_keyed());
        assert_eq!(alg.mac_output_bits(), Some(256));
    }

    #[test]
    fn test_key_family_mismatch() {
        let alg = from_uri(algorithm::HMAC_SHA1).unwrap();
        let key = SigningKey::RsaPublic(rsa_key().to_public_key());
        assert!(!alg.accepts(&key));
        assert!(matches!(alg.mac(&key, b"x"), Err(Error::KeyAlgorithmMismatch(_))));
    }

    #[test]
    fn test_default_signature_uris() {
        assert_eq!(SigningKey::Hmac(vec![1]).default_signature_uri(), algorithm::HMAC_SHA256);
        let sk = p384::ecdsa::SigningKey::from_slice(&[9u8; 48]).unwrap();
        assert_eq!(SigningKey::EcP384(sk).default_signature_uri(), algorithm::ECDSA_SHA384);
    }

    #[test]
    fn test_dsa_signature_encoding_pads_components() {
        let sig = dsa::Signature::from_components(
            dsa::BigUint::from_bytes_be(&[1, 2]),
            dsa::BigUint::from_bytes_be(&[3]),
        )
        .unwrap();
        let encoded = dsa_to_xmldsig(&sig, 20);
        assert_eq!(encoded.len(), 40);
        assert_eq!(&encoded[18..20], &[1, 2]);
        assert_eq!(encoded[39], 3);
        let decoded = xmldsig_to_dsa(&encoded, 20).unwrap();
        assert_eq!(decoded.r(), sig.r());
        assert_eq!(decoded.s(), sig.s());
        assert!(xmldsig_to_dsa(&encoded[1..], 20).is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_unknown_uri() {
        assert!(matches!(
            from_uri("http://www.w3.org/2001/04/xmldsig-more#rsa-md5"),
            Err(Error::UnknownAlgorithm(_))
        ));
    }
}
