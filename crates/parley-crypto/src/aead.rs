//! ChaCha20-Poly1305 AEAD with counter nonces.
//!
//! - 256-bit keys (zeroized on drop)
//! - 96-bit nonces built from a 64-bit message counter
//! - 128-bit authentication tags
//! - Associated data authentication
//!
//! [`CipherState`] owns one key and one counter and is used for exactly one
//! direction of one channel. A counter value is never handed out twice, so a
//! (key, nonce) pair is never reused.

use crate::CryptoError;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// ChaCha20-Poly1305 key size
pub const KEY_SIZE: usize = 32;

/// ChaCha20-Poly1305 nonce size
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size
pub const TAG_SIZE: usize = 16;

/// 96-bit AEAD nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Nonce for a message counter: four zero bytes then the big-endian counter.
    #[must_use]
    pub fn from_counter(counter: u64) -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        bytes[4..].copy_from_slice(&counter.to_be_bytes());
        Self(bytes)
    }

    /// All-zero nonce, only valid for keys that encrypt a single message.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; NONCE_SIZE])
    }

    /// Get the raw nonce bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// AEAD key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&self.0))
    }

    /// Encrypt `plaintext`, returning ciphertext with the tag appended.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if the AEAD rejects the input.
    pub fn encrypt(
        &self,
        nonce: &Nonce,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.cipher()
            .encrypt(
                chacha20poly1305::Nonce::from_slice(nonce.as_bytes()),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Verify and decrypt `ciphertext` (tag appended).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if the tag does not verify.
    pub fn decrypt(
        &self,
        nonce: &Nonce,
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.cipher()
            .decrypt(
                chacha20poly1305::Nonce::from_slice(nonce.as_bytes()),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AeadKey(..)")
    }
}

/// One direction of an encrypted channel: a key plus its message counter.
#[derive(Debug, ZeroizeOnDrop)]
pub struct CipherState {
    key: AeadKey,
    #[zeroize(skip)]
    counter: u64,
}

impl CipherState {
    /// Create a cipher state with the counter at zero.
    #[must_use]
    pub fn new(key: AeadKey) -> Self {
        Self { key, counter: 0 }
    }

    /// Counter value the next message will use.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Reserve the current counter value and advance.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::NonceOverflow`] once the counter space is exhausted.
    pub fn next_counter(&mut self) -> Result<u64, CryptoError> {
        if self.counter == u64::MAX {
            return Err(CryptoError::NonceOverflow);
        }
        let counter = self.counter;
        self.counter += 1;
        Ok(counter)
    }

    /// Encrypt under an explicit counter obtained from [`Self::next_counter`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] on AEAD failure.
    pub fn encrypt(
        &self,
        counter: u64,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.key.encrypt(&Nonce::from_counter(counter), plaintext, aad)
    }

    /// Decrypt under an explicit counter.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] on authentication failure.
    pub fn decrypt(
        &self,
        counter: u64,
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        self.key.decrypt(&Nonce::from_counter(counter), ciphertext, aad)
    }
}
