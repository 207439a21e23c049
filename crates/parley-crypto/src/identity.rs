//! Long-term Ed25519 node identities.
//!
//! A node is identified by one Ed25519 key pair for its whole lifetime:
//! - 32-byte public keys (the wire encoding used in handshakes and contact lists)
//! - 64-byte deterministic signatures (the responder's and initiator's handshake proofs)
//! - 32-byte seeds (zeroized on drop)
//!
//! The same key pair is also an encryption target: its Montgomery form is an
//! X25519 key, which [`crate::sealed`] uses to encrypt handshake requests to a
//! node knowing only its public identity.
//!
//! ## Usage
//!
//! ```ignore
//! use parley_crypto::identity::Identity;
//! use rand_core::OsRng;
//!
//! let identity = Identity::generate(&mut OsRng);
//! let signature = identity.sign(b"authenticate this message");
//! assert!(identity.public_key().verify(b"authenticate this message", &signature).is_ok());
//! ```

use crate::CryptoError;
use ed25519_dalek::Signer;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zeroize::{ZeroizeOnDrop, Zeroizing};

/// Ed25519 public key size
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Ed25519 seed size
pub const SEED_SIZE: usize = 32;

/// Ed25519 signature size
pub const SIGNATURE_SIZE: usize = 64;

/// Ed25519 signature (64 bytes)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create a signature from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a signature from a slice
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the slice is not exactly 64 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; SIGNATURE_SIZE] =
            slice.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(bytes))
    }

    /// Get the raw signature bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

/// Long-term node identity (Ed25519 signing key).
///
/// Loaded once at startup and never mutated. Read-only use from many tasks at
/// once is safe; share it behind an `Arc`.
#[derive(ZeroizeOnDrop)]
pub struct Identity {
    inner: ed25519_dalek::SigningKey,
}

impl Identity {
    /// Generate a new random identity
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::generate(rng),
        }
    }

    /// Restore an identity from its 32-byte seed
    #[must_use]
    pub fn from_seed(seed: &[u8; SEED_SIZE]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Restore an identity from a hex-encoded seed (key file format).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if the input is not 64 hex characters.
    pub fn from_hex_seed(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            hex::decode(encoded.trim()).map_err(|_| CryptoError::InvalidKeyMaterial)?,
        );
        let seed: &[u8; SEED_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyMaterial)?;
        Ok(Self::from_seed(seed))
    }

    /// Export the seed (use with extreme caution)
    ///
    /// # Security
    ///
    /// This exposes the raw secret key bytes. The returned buffer is zeroized on drop.
    #[must_use]
    pub fn to_seed(&self) -> Zeroizing<[u8; SEED_SIZE]> {
        Zeroizing::new(self.inner.to_bytes())
    }

    /// Get the public identity
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Sign a message
    ///
    /// Signing is deterministic - the same message will always produce
    /// the same signature with the same key.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.inner.sign(message).to_bytes())
    }

    /// X25519 secret matching [`PublicKey::to_x25519`].
    pub(crate) fn to_x25519(&self) -> x25519_dalek::StaticSecret {
        let scalar = Zeroizing::new(self.inner.to_scalar_bytes());
        x25519_dalek::StaticSecret::from(*scalar)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key())
            .finish()
    }
}

/// Ed25519 public key identifying a node.
///
/// Can be shared publicly; used as the ContactList key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey {
    inner: ed25519_dalek::VerifyingKey,
}

impl PublicKey {
    /// Create from raw 32-byte public key
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the bytes do not
    /// represent a valid Ed25519 public key point.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<Self, CryptoError> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { inner })
    }

    /// Create from a slice that must be exactly 32 bytes
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] on a length mismatch and
    /// [`CryptoError::InvalidPublicKey`] if the point does not decode.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: &[u8; PUBLIC_KEY_SIZE] =
            slice.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: slice.len(),
            })?;
        Self::from_bytes(bytes)
    }

    /// Get the raw public key bytes
    #[must_use]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.inner.to_bytes()
    }

    /// Full lowercase hex encoding
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Verify a signature on a message
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] if the signature is invalid,
    /// malformed, or does not authenticate the message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
        self.inner
            .verify_strict(message, &signature)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// X25519 public key (birationally equivalent Montgomery point).
    pub(crate) fn to_x25519(&self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.inner.to_montgomery().to_bytes())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.to_bytes()[..8]))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|_| CryptoError::InvalidKeyMaterial)?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}
