//! Node orchestration layer
//!
//! The [`Node`] ties together the long-term identity, the contact list, the
//! discovery collaborator, and the listener/dialer entry points.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Node                              │
//! │     listen(port) ─► Listener      connect(peer)          │
//! ├─────────────────────────────────────────────────────────┤
//! │  ContactList  │  Handshake  │  SecureChannel │ Discovery │
//! ├─────────────────────────────────────────────────────────┤
//! │          parley-crypto          │    parley-discovery    │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
#[allow(clippy::module_inception)]
pub mod node;

pub use config::{ChannelConfig, HandshakeConfig, ListenerConfig, NatConfig, NodeConfig};
pub use node::Node;
