//! # parley Discovery
//!
//! Peer discovery interface for parley nodes.
//!
//! The node core treats discovery as an opaque collaborator: it is started and
//! stopped alongside the node, and asked for candidate addresses when a peer
//! is not in the local contact list. A resolution failure only means that no
//! address is available for dialing.
//!
//! This crate provides:
//! - [`NodeId`]: BLAKE3-derived identifiers for lookup
//! - [`Discovery`]: the collaborator trait (a DHT client implements this)
//! - [`StaticDirectory`]: an in-memory implementation
//!
//! ## Example
//!
//! ```rust,no_run
//! use parley_discovery::{Discovery, NodeId, StaticDirectory};
//!
//! # async fn example() -> Result<(), parley_discovery::DiscoveryError> {
//! let directory = StaticDirectory::new(6881);
//! let peer = NodeId::from_public_key(&[42u8; 32]);
//! directory.insert(peer, "192.0.2.10:4500").await;
//!
//! directory.start().await?;
//! let addrs = directory.resolve(&peer).await?;
//! assert_eq!(addrs, vec!["192.0.2.10:4500".to_string()]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod directory;
pub mod node_id;

pub use directory::StaticDirectory;
pub use node_id::NodeId;

use async_trait::async_trait;
use thiserror::Error;

/// Discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Operation requires a started service
    #[error("discovery service not running")]
    NotRunning,

    /// Service was already started
    #[error("discovery service already running")]
    AlreadyRunning,

    /// Startup failed (socket bind, bootstrap, ...)
    #[error("discovery startup failed: {0}")]
    StartFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Peer directory collaborator.
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Start the service (bind sockets, bootstrap).
    ///
    /// # Errors
    ///
    /// Returns an error if the service cannot start; callers must treat this
    /// as fatal to node construction.
    async fn start(&self) -> Result<(), DiscoveryError>;

    /// Stop the service.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::NotRunning`] if the service was not started.
    async fn stop(&self) -> Result<(), DiscoveryError>;

    /// Candidate network addresses (`host:port`) for a node, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup could not be performed.
    async fn resolve(&self, id: &NodeId) -> Result<Vec<String>, DiscoveryError>;

    /// Whether the service is running
    fn is_running(&self) -> bool;
}
