#![forbid(unsafe_code)]

//! Key types and data structures.

use hagalund_crypto::SigningKey;

/// The underlying key data.
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    Dsa {
        private: Option<dsa::SigningKey>,
        public: dsa::VerifyingKey,
    },
    EcP256 {
        private: Option<p256::ecdsa::SigningKey>,
        public: p256::ecdsa::VerifyingKey,
    },
    EcP384 {
        private: Option<p384::ecdsa::SigningKey>,
        public: p384::ecdsa::VerifyingKey,
    },
    Hmac(Vec<u8>),
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (family, private) = match self {
            Self::Rsa { private, .. } => ("RSA", private.is_some()),
            Self::Dsa { private, .. } => ("DSA", private.is_some()),
            Self::EcP256 { private, .. } => ("EC P-256", private.is_some()),
            Self::EcP384 { private, .. } => ("EC P-384", private.is_some()),
            Self::Hmac(k) => return write!(f, "HMAC key ({} bytes)", k.len()),
        };
        if private {
            write!(f, "{family} private+public key")
        } else {
            write!(f, "{family} public key")
        }
    }
}

/// A named key with associated data.
#[derive(Debug)]
pub struct Key {
    /// Optional name, emitted as `<KeyName>`.
    pub name: Option<String>,
    /// The key data.
    pub data: KeyData,
}

impl Key {
    /// Create a new key.
    pub fn new(data: KeyData) -> Self {
        Self { name: None, data }
    }

    /// Set the key name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn rsa(private: rsa::RsaPrivateKey) -> Self {
        let public = private.to_public_key();
        Self::new(KeyData::Rsa {
            private: Some(private),
            public,
        })
    }

    pub fn rsa_public(public: rsa::RsaPublicKey) -> Self {
        Self::new(KeyData::Rsa {
            private: None,
            public,
        })
    }

    pub fn dsa(private: dsa::SigningKey) -> Self {
        let public = private.verifying_key().clone();
        Self::new(KeyData::Dsa {
            private: Some(private),
            public,
        })
    }

    pub fn ec_p256(private: p256::ecdsa::SigningKey) -> Self {
        let public = *private.verifying_key();
        Self::new(KeyData::EcP256 {
            private: Some(private),
            public,
        })
    }

    pub fn ec_p384(private: p384::ecdsa::SigningKey) -> Self {
        let public = *private.verifying_key();
        Self::new(KeyData::EcP384 {
            private: Some(private),
            public,
        })
    }

    pub fn hmac(secret: impl Into<Vec<u8>>) -> Self {
        Self::new(KeyData::Hmac(secret.into()))
    }

    /// Whether the key holds private (or secret) material.
    pub fn has_private(&self) -> bool {
        match &self.data {
            KeyData::Rsa { private, .. } => private.is_some(),
            KeyData::Dsa { private, .. } => private.is_some(),
            KeyData::EcP256 { private, .. } => private.is_some(),
            KeyData::EcP384 { private, .. } => private.is_some(),
            KeyData::Hmac(_) => true,
        }
    }

    /// Convert to a `SigningKey` for use with crypto algorithms. Private
    /// material is preferred when present.
    pub fn to_signing_key(&self) -> SigningKey {
        match &self.data {
            KeyData::Rsa { private: Some(pk), .. } => SigningKey::Rsa(pk.clone()),
            KeyData::Rsa { public, .. } => SigningKey::RsaPublic(public.clone()),
            KeyData::Dsa { private: Some(sk), .. } => SigningKey::Dsa(sk.clone()),
            KeyData::Dsa { public, .. } => SigningKey::DsaPublic(public.clone()),
            KeyData::EcP256 { private: Some(sk), .. } => SigningKey::EcP256(sk.clone()),
            KeyData::EcP256 { public, .. } => SigningKey::EcP256Public(*public),
            KeyData::EcP384 { private: Some(sk), .. } => SigningKey::EcP384(sk.clone()),
            KeyData::EcP384 { public, .. } => SigningKey::EcP384Public(*public),
            KeyData::Hmac(k) => SigningKey::Hmac(k.clone()),
        }
    }

    /// Get the RSA public key if available.
    pub fn rsa_public_key(&self) -> Option<&rsa::RsaPublicKey> {
        match &self.data {
            KeyData::Rsa { public, .. } => Some(public),
            _ => None,
        }
    }

    /// Get the DSA public key if available.
    pub fn dsa_public_key(&self) -> Option<&dsa::VerifyingKey> {
        match &self.data {
            KeyData::Dsa { public, .. } => Some(public),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_key_prefers_private() {
        let sk = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let key = Key::rsa(sk).with_name("signer");
        assert!(key.has_private());
        assert!(matches!(key.to_signing_key(), SigningKey::Rsa(_)));
        assert_eq!(key.name.as_deref(), Some("signer"));

        let public = Key::rsa_public(key.rsa_public_key().unwrap().clone());
        assert!(!public.has_private());
        assert!(matches!(public.to_signing_key(), SigningKey::RsaPublic(_)));
    }

    #[test]
    fn test_debug_hides_material() {
        let key = Key::hmac(b"secret".to_vec());
        assert_eq!(format!("{:?}", key.data), "HMAC key (6 bytes)");
        let ec = Key::ec_p256(p256::ecdsa::SigningKey::from_slice(&[3u8; 32]).unwrap());
        assert_eq!(format!("{:?}", ec.data), "EC P-256 private+public key");
    }
}
