//! # parley Crypto
//!
//! Cryptographic primitives for the parley handshake and secure channels.
//!
//! This crate provides:
//! - Ed25519 node identities and signatures
//! - Sealed boxes (public-key encryption to an identity)
//! - Ephemeral X25519 key agreement
//! - `ChaCha20-Poly1305` AEAD with counter nonces
//! - The BLAKE3 handshake key schedule
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Identity / Signatures | Ed25519 | 128-bit |
//! | Key Exchange | X25519 | 128-bit |
//! | AEAD | ChaCha20-Poly1305 | 256-bit key |
//! | Hash / KDF | BLAKE3 | 128-bit collision |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod aead;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod sealed;
pub mod x25519;

pub use error::CryptoError;
pub use identity::{Identity, PublicKey, Signature};
pub use kdf::{ChannelKeys, SharedKey, Transcript};
pub use x25519::{EphemeralPublicKey, EphemeralSecret};
