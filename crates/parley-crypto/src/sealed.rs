//! Sealed boxes: anonymous public-key encryption to a node identity.
//!
//! The sender generates a one-off X25519 key, agrees with the recipient's
//! identity in Montgomery form, and encrypts under a BLAKE3-derived key that is
//! bound to both public values. Only the holder of the recipient's long-term
//! private key can open the box.
//!
//! Layout: `[32 bytes sender X25519 public][ciphertext || 16-byte tag]`.

use crate::CryptoError;
use crate::aead::{AeadKey, Nonce, TAG_SIZE};
use crate::identity::{Identity, PublicKey};
use rand_core::{CryptoRng, RngCore};

/// Per-box overhead: sender public value plus tag.
pub const SEAL_OVERHEAD: usize = 32 + TAG_SIZE;

const SEAL_CONTEXT: &str = "parley 2026-01 sealed box key v1";

fn sealing_key(shared: &[u8; 32], sender: &[u8; 32], recipient: &[u8; 32]) -> AeadKey {
    let mut hasher = blake3::Hasher::new_derive_key(SEAL_CONTEXT);
    hasher.update(shared);
    hasher.update(sender);
    hasher.update(recipient);
    AeadKey::new(*hasher.finalize().as_bytes())
}

/// Encrypt `plaintext` so that only `recipient` can read it.
///
/// # Errors
///
/// Returns [`CryptoError::NonContributory`] if the recipient key maps to a
/// low-order point, or [`CryptoError::EncryptionFailed`] on AEAD failure.
pub fn seal<R: RngCore + CryptoRng>(
    recipient: &PublicKey,
    plaintext: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, CryptoError> {
    let sender = x25519_dalek::EphemeralSecret::random_from_rng(rng);
    let sender_public = x25519_dalek::PublicKey::from(&sender);
    let recipient_x = recipient.to_x25519();

    let shared = sender.diffie_hellman(&recipient_x);
    if !shared.was_contributory() {
        return Err(CryptoError::NonContributory);
    }

    // Fresh key per box, so the zero nonce is never reused.
    let key = sealing_key(
        shared.as_bytes(),
        sender_public.as_bytes(),
        recipient_x.as_bytes(),
    );
    let ciphertext = key.encrypt(&Nonce::zero(), plaintext, sender_public.as_bytes())?;

    let mut sealed = Vec::with_capacity(32 + ciphertext.len());
    sealed.extend_from_slice(sender_public.as_bytes());
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a box produced by [`seal`] for this identity.
///
/// # Errors
///
/// Returns [`CryptoError::DecryptionFailed`] for truncated input, a
/// non-contributory sender value, or a box sealed to a different key.
pub fn open(identity: &Identity, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(CryptoError::DecryptionFailed);
    }
    let (sender_bytes, ciphertext) = sealed.split_at(32);
    let mut sender = [0u8; 32];
    sender.copy_from_slice(sender_bytes);
    let sender_public = x25519_dalek::PublicKey::from(sender);

    let secret = identity.to_x25519();
    let shared = secret.diffie_hellman(&sender_public);
    if !shared.was_contributory() {
        return Err(CryptoError::DecryptionFailed);
    }

    let recipient_x = identity.public_key().to_x25519();
    let key = sealing_key(shared.as_bytes(), &sender, recipient_x.as_bytes());
    key.decrypt(&Nonce::zero(), ciphertext, &sender)
}
