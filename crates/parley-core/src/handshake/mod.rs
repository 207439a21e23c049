//! Contact-gated handshake.
//!
//! Converts the responder's long-term identity into a per-connection
//! SharedKey. The initiator learns it is talking to the holder of the
//! responder's private key; the responder learns the initiator is in its
//! contact list and holds the matching private key.

pub mod codec;
pub mod protocol;

pub use codec::{
    HandshakeFinish, HandshakeRequest, HandshakeResponse, decode_request, encode_request,
};
pub use protocol::{initiate, respond};
