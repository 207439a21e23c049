//! # parley Core
//!
//! Core protocol implementation for parley: peer-to-peer nodes that establish
//! authenticated, encrypted point-to-point channels over raw TCP streams.
//!
//! This crate provides:
//! - [`ContactList`]: the authorization table gating inbound handshakes
//! - [`handshake`]: request/response/finish codec and both protocol sides
//! - [`SecureChannel`]: framed AEAD over a raw stream
//! - [`Listener`]: concurrent accept pipeline delivering ready channels
//! - [`Node`]: identity, contacts, and discovery in one handle
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         SecureChannel                            │
//! │   (counter-nonce AEAD frames, one key per direction)            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                          Handshake                               │
//! │   (sealed request, signed response, signed finish)              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                       Length-prefixed I/O                        │
//! │   (8-byte big-endian length, explicit EOF semantics)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod channel;
pub mod contacts;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod node;
pub mod wire;

pub use channel::{ChannelReceiver, ChannelSender, Role, SecureChannel};
pub use contacts::{ContactEntry, ContactList};
pub use error::{Error, Result};
pub use handshake::{HandshakeFinish, HandshakeRequest, HandshakeResponse};
pub use listener::{HandshakeContext, Listener, ListenerStats};
pub use node::{ChannelConfig, HandshakeConfig, ListenerConfig, NatConfig, Node, NodeConfig};
