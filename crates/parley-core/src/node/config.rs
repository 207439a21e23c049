//! Node configuration

use crate::error::{Error, Result};
use parley_crypto::PublicKey;
use std::borrow::Cow;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default TCP listen port
pub const DEFAULT_LISTEN_PORT: u16 = 4500;

/// Default discovery (DHT) port
pub const DEFAULT_DISCOVERY_PORT: u16 = 6881;

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Interface to bind listeners on
    pub listen_host: IpAddr,

    /// Default listen port (used by callers that do not pick one)
    pub listen_port: u16,

    /// Port handed to the discovery service
    pub discovery_port: u16,

    /// NAT traversal configuration
    pub nat: NatConfig,

    /// Handshake configuration
    pub handshake: HandshakeConfig,

    /// Channel configuration
    pub channel: ChannelConfig,

    /// Listener configuration
    pub listener: ListenerConfig,

    /// Timeout for each outbound TCP connect attempt
    pub dial_timeout: Duration,

    /// Initial contact list contents
    pub contacts: Vec<(PublicKey, String)>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: DEFAULT_LISTEN_PORT,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            nat: NatConfig::default(),
            handshake: HandshakeConfig::default(),
            channel: ChannelConfig::default(),
            listener: ListenerConfig::default(),
            dial_timeout: Duration::from_secs(5),
            contacts: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Socket address for a listener on `port`
    #[must_use]
    pub fn listen_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.listen_host, port)
    }

    /// Check every field for values the node cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.dial_timeout.is_zero() {
            return Err(Error::invalid_config("dial_timeout must be non-zero"));
        }
        for (key, address) in &self.contacts {
            if address.trim().is_empty() {
                return Err(Error::InvalidConfig(Cow::Owned(format!(
                    "contact {} has an empty address",
                    hex::encode(&key.to_bytes()[..8])
                ))));
            }
        }
        self.nat.validate()?;
        self.handshake.validate()?;
        self.channel.validate()?;
        self.listener.validate()
    }
}

/// NAT traversal configuration
#[derive(Debug, Clone, Default)]
pub struct NatConfig {
    /// Local UDP port reserved for hole-punch reception
    pub recv_port: Option<u16>,
}

impl NatConfig {
    fn validate(&self) -> Result<()> {
        if self.recv_port == Some(0) {
            return Err(Error::invalid_config("nat.recv_port must be non-zero"));
        }
        Ok(())
    }
}

/// Handshake configuration
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Bound on one complete handshake, either side
    pub timeout: Duration,

    /// Largest handshake message accepted
    pub max_message_size: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_message_size: 4096,
        }
    }
}

impl HandshakeConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::invalid_config("handshake.timeout must be non-zero"));
        }
        // Sealed request is the largest message
        if self.max_message_size < 128 {
            return Err(Error::invalid_config(
                "handshake.max_message_size must be at least 128",
            ));
        }
        Ok(())
    }
}

/// Secure channel configuration
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Largest plaintext carried by one frame
    pub max_frame_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 64 * 1024, // 64 KiB
        }
    }
}

impl ChannelConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_frame_size == 0 || self.max_frame_size > u32::MAX as usize - 16 {
            return Err(Error::invalid_config(
                "channel.max_frame_size must be between 1 and 2^32 - 17",
            ));
        }
        Ok(())
    }
}

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Handshakes allowed in flight at once; extra connections are dropped
    pub max_pending_handshakes: usize,

    /// Established channels buffered ahead of `accept()`
    pub delivery_capacity: usize,

    /// Kernel listen backlog
    pub backlog: i32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_pending_handshakes: 256,
            delivery_capacity: 64,
            backlog: 1024,
        }
    }
}

impl ListenerConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_pending_handshakes == 0 {
            return Err(Error::invalid_config(
                "listener.max_pending_handshakes must be non-zero",
            ));
        }
        if self.delivery_capacity == 0 {
            return Err(Error::invalid_config(
                "listener.delivery_capacity must be non-zero",
            ));
        }
        if self.backlog <= 0 {
            return Err(Error::invalid_config("listener.backlog must be positive"));
        }
        Ok(())
    }
}
