// darknode-crypto/src/keypair.rs

use crate::{CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Darknode public key as submitted at registration
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| CryptoError::DeserializationError(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Derive the darknode id for this key
    pub fn to_address(&self) -> Address {
        Address::from_public_key(self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", hex::encode(&self.0[..8.min(self.0.len())]))
    }
}

/// Ed25519 key pair used by operators to mint darknode identities
pub struct KeyPair {
    public_key: PublicKey,
    secret: Vec<u8>,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        use ed25519_dalek::{SigningKey, VerifyingKey};
        use rand::rngs::OsRng;

        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let verifying_key: VerifyingKey = (&signing_key).into();

        Self {
            public_key: PublicKey::new(verifying_key.to_bytes().to_vec()),
            secret: signing_key.to_bytes().to_vec(),
        }
    }

    /// Rebuild a keypair from a hex encoded ed25519 secret
    pub fn from_secret_hex(s: &str) -> CryptoResult<Self> {
        use ed25519_dalek::SigningKey;

        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| CryptoError::DeserializationError(e.to_string()))?;
        let secret: [u8; 32] = bytes.as_slice().try_into()
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        let signing_key = SigningKey::from_bytes(&secret);

        Ok(Self {
            public_key: PublicKey::new(signing_key.verifying_key().to_bytes().to_vec()),
            secret: secret.to_vec(),
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(&self.secret)
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// 20-byte address identifying darknodes, operators, and engine accounts.
///
/// The zero address is the null sentinel used by pagination and "never set"
/// fields.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive address from public key (last 20 bytes of its SHA-256)
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let hash = crate::hash::sha256(public_key.as_bytes());
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash.as_bytes()[12..32]);
        Self(address)
    }

    /// Deterministic address for well-known engine accounts
    pub fn from_label(label: &str) -> Self {
        Self::from_public_key(&PublicKey::new(label.as_bytes().to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| CryptoError::DeserializationError(e.to_string()))?;
        if bytes.len() != 20 {
            return Err(CryptoError::DeserializationError("Invalid address length".into()));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn zero() -> Self {
        Self([0u8; 20])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
