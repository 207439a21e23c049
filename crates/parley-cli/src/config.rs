//! Configuration system for the parley CLI.

use anyhow::Context;
use parley_core::NodeConfig;
use parley_crypto::{Identity, PublicKey};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// parley configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Node configuration
    #[serde(default)]
    pub node: NodeSection,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Discovery configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Hole-punch configuration
    #[serde(default)]
    pub hole_punch: HolePunchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node identity and storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Human-readable node label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Identity key file (hex-encoded Ed25519 seed)
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,

    /// Directory holding node state (contacts)
    #[serde(default = "default_config_root")]
    pub config_root: PathBuf,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Interface to listen on
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// Default listen port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

/// Discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// DHT port
    #[serde(default = "default_discovery_port")]
    pub port: u16,

    /// Statically known peer addresses
    #[serde(default)]
    pub peers: Vec<PeerEntry>,
}

/// A statically configured peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerEntry {
    /// Peer public key (hex)
    pub public_key: String,
    /// Peer address (`host:port`)
    pub address: String,
}

/// Hole-punch configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HolePunchConfig {
    /// Local receive port reserved for hole punching
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recv_port: Option<u16>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_config_root() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("parley")
}

fn default_key_file() -> PathBuf {
    default_config_root().join("identity.key")
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    parley_core::node::config::DEFAULT_LISTEN_PORT
}

fn default_discovery_port() -> u16 {
    parley_core::node::config::DEFAULT_DISCOVERY_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            id: None,
            key_file: default_key_file(),
            config_root: default_config_root(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            peers: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        default_config_root().join("config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Contacts file inside the config root
    #[must_use]
    pub fn contacts_path(&self) -> PathBuf {
        self.node.config_root.join("contacts.json")
    }

    /// Parse the listen host
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not an IP address.
    pub fn listen_host(&self) -> anyhow::Result<IpAddr> {
        self.network
            .listen_host
            .parse()
            .with_context(|| format!("invalid listen_host: {}", self.network.listen_host))
    }

    /// Parse the statically configured discovery peers
    ///
    /// # Errors
    ///
    /// Returns an error if any public key is invalid.
    pub fn discovery_peers(&self) -> anyhow::Result<Vec<(PublicKey, String)>> {
        self.discovery
            .peers
            .iter()
            .map(|peer| {
                let key: PublicKey = peer
                    .public_key
                    .parse()
                    .with_context(|| format!("invalid peer public key: {}", peer.public_key))?;
                Ok((key, peer.address.clone()))
            })
            .collect()
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.listen_host()?;
        self.discovery_peers()?;

        if self.hole_punch.recv_port == Some(0) {
            anyhow::bail!("hole_punch.recv_port must be non-zero");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Library configuration for a node with the given initial contacts
    ///
    /// # Errors
    ///
    /// Returns an error if the listen host is invalid.
    pub fn node_config(&self, contacts: Vec<(PublicKey, String)>) -> anyhow::Result<NodeConfig> {
        let mut config = NodeConfig {
            listen_host: self.listen_host()?,
            listen_port: self.network.listen_port,
            discovery_port: self.discovery.port,
            contacts,
            ..NodeConfig::default()
        };
        config.nat.recv_port = self.hole_punch.recv_port;
        Ok(config)
    }

    /// Load the identity from the key file
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or does not hold a valid seed.
    pub fn load_identity(&self) -> anyhow::Result<Identity> {
        let encoded = Zeroizing::new(fs::read_to_string(&self.node.key_file).with_context(
            || {
                format!(
                    "reading key file {} (run `parley keygen` first)",
                    self.node.key_file.display()
                )
            },
        )?);
        Identity::from_hex_seed(&encoded)
            .with_context(|| format!("invalid key file {}", self.node.key_file.display()))
    }
}

/// Write an identity seed as hex, readable only by the owner on Unix
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_identity(path: &Path, identity: &Identity) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let encoded = Zeroizing::new(hex::encode(*identity.to_seed()));
    fs::write(path, encoded.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
