// darknode-crypto/src/lib.rs

//! Cryptographic primitives for the darknode registry
//!
//! This crate provides:
//! - SHA-256 digests and Blake3 epoch seeds
//! - Darknode public keys and the addresses derived from them
//! - Ed25519 key generation for operators and tooling

pub mod hash;
pub mod keypair;

pub use hash::{sha256, Hash};
pub use keypair::{Address, KeyPair, PublicKey};

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}
