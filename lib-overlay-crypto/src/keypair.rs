//! Ed25519 public/private key newtypes and persistence.
//!
//! Grounded on `lib-crypto::classical::ed25519` (keypair generation over
//! `ed25519_dalek::SigningKey`) and the private-key-file permission pattern
//! used throughout the teacher workspace (`std::fs::set_permissions(...,
//! Permissions::from_mode(0o600))` on unix, skipped on other platforms).

use super::CryptoError;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::Path;
use zeroize::Zeroize;

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PublicKey(#[serde(with = "serde_pk")] [u8; 32]);

mod serde_pk {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&bytes[..], s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let v: Vec<u8> = serde::Deserialize::deserialize(d)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::Malformed("public key"))?;
        Ok(PublicKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from_bytes(&self.0).expect("validated at construction")
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

/// A 32-byte Ed25519 private (signing) key. Zeroized on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PrivateKey(bytes)
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.0)
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.signing_key().verifying_key().to_bytes())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// A generated or loaded Ed25519 identity.
#[derive(Debug, Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let private = PrivateKey(seed);
        let public = private.public();
        KeyPair { private, public }
    }

    pub fn private(&self) -> &PrivateKey {
        &self.private
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Load the local identity from a 32-byte private key file, per spec
    /// §6 ("local private key file (32 bytes, `USER_READ` permission)").
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let bytes = std::fs::read(path).map_err(|_| CryptoError::Malformed("key file unreadable"))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::Malformed("key file must be exactly 32 bytes"))?;
        Ok(Self::from_seed(seed))
    }

    /// Persist the private key, creating parent directories and restricting
    /// permissions to owner-read/write where the platform supports it.
    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|_| CryptoError::Malformed("key directory"))?;
        }
        std::fs::write(path, self.private.0).map_err(|_| CryptoError::Malformed("key file write"))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|_| CryptoError::Malformed("key file permissions"))?;
        }
        Ok(())
    }
}

pub(crate) fn verifying_key_of(pk: &PublicKey) -> VerifyingKey {
    pk.verifying_key()
}

pub(crate) fn signing_key_of(sk: &PrivateKey) -> SigningKey {
    sk.signing_key()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn public_key_derives_from_private() {
        let kp = KeyPair::generate();
        assert_eq!(kp.public().as_bytes().len(), 32);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.priv");
        let kp = KeyPair::generate();
        kp.save(&path).unwrap();
        let loaded = KeyPair::load(&path).unwrap();
        assert_eq!(kp.public(), loaded.public());
    }

    #[cfg(unix)]
    #[test]
    fn save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity.priv");
        KeyPair::generate().save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
