//! parley CLI - contact-gated encrypted channels between peers.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::Config;
use parley_core::{ContactList, Error, Node, SecureChannel};
use parley_crypto::{Identity, PublicKey};
use parley_discovery::{NodeId, StaticDirectory};
use rand_core::OsRng;
use std::path::PathBuf;
use std::sync::Arc;

/// parley - peer-to-peer channels between known contacts
#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new identity key
    Keygen {
        /// Output file (defaults to the configured key file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Show this node's identity
    Id,

    /// Manage the contact list
    Contacts {
        #[command(subcommand)]
        action: ContactsCommand,
    },

    /// Accept channels and echo every frame back to its sender
    Listen {
        /// Port to listen on (defaults to the configured listen port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Open a channel to a peer and exchange one message
    Connect {
        /// Peer public key (hex)
        public_key: String,

        /// Peer address (`host:port`), bypassing lookup
        #[arg(short, long)]
        addr: Option<String>,

        /// Message to send
        #[arg(short, long, default_value = "ping")]
        message: String,
    },
}

#[derive(Subcommand)]
enum ContactsCommand {
    /// List known contacts
    List,

    /// Add or update a contact
    Add {
        /// Contact public key (hex)
        public_key: String,

        /// Contact address (`host:port`)
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt().with_env_filter(level).init();

    match cli.command {
        Commands::Keygen { output, force } => {
            let path = output.unwrap_or_else(|| config.node.key_file.clone());
            generate_identity(&path, force)?;
        }
        Commands::Id => show_identity(&config)?,
        Commands::Contacts { action } => match action {
            ContactsCommand::List => list_contacts(&config)?,
            ContactsCommand::Add {
                public_key,
                address,
            } => add_contact(&config, &public_key, &address)?,
        },
        Commands::Listen { port } => listen(&config, port).await?,
        Commands::Connect {
            public_key,
            addr,
            message,
        } => {
            connect(&config, &public_key, addr.as_deref(), &message).await?;
        }
    }

    Ok(())
}

fn generate_identity(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let identity = Identity::generate(&mut OsRng);
    config::save_identity(path, &identity)?;

    let public_key = identity.public_key();
    println!("Identity written to {}", path.display());
    println!("  Public key: {}", public_key.to_hex());
    println!("  Node ID:    {}", NodeId::from_public_key(&public_key.to_bytes()).to_hex());
    Ok(())
}

fn show_identity(config: &Config) -> anyhow::Result<()> {
    let identity = config.load_identity()?;
    let public_key = identity.public_key();

    if let Some(label) = &config.node.id {
        println!("Node:       {label}");
    }
    println!("Public key: {}", public_key.to_hex());
    println!("Node ID:    {}", NodeId::from_public_key(&public_key.to_bytes()).to_hex());
    println!("Key file:   {}", config.node.key_file.display());
    Ok(())
}

fn load_contacts(config: &Config) -> anyhow::Result<ContactList> {
    let path = config.contacts_path();
    if !path.exists() {
        return Ok(ContactList::new());
    }
    ContactList::load(&path).with_context(|| format!("loading contacts {}", path.display()))
}

fn list_contacts(config: &Config) -> anyhow::Result<()> {
    let contacts = load_contacts(config)?;
    if contacts.is_empty() {
        println!("No contacts in {}", config.contacts_path().display());
        return Ok(());
    }

    println!("{} contacts:", contacts.len());
    for entry in contacts.snapshot() {
        println!("  {}  {}", entry.public_key.to_hex(), entry.address);
    }
    Ok(())
}

fn add_contact(config: &Config, public_key: &str, address: &str) -> anyhow::Result<()> {
    let key: PublicKey = public_key
        .parse()
        .with_context(|| format!("invalid public key: {public_key}"))?;

    let contacts = load_contacts(config)?;
    let previous = contacts.lookup(&key);
    contacts.upsert(key, address);
    contacts.save(config.contacts_path())?;

    match previous {
        Some(old) => println!("Updated {} ({} -> {})", key.to_hex(), old, address),
        None => println!("Added {} at {}", key.to_hex(), address),
    }
    Ok(())
}

async fn start_node(config: &Config) -> anyhow::Result<Node> {
    let identity = config.load_identity()?;
    let contacts = load_contacts(config)?;

    let directory = StaticDirectory::new(config.discovery.port);
    for (key, address) in config.discovery_peers()? {
        directory
            .insert(NodeId::from_public_key(&key.to_bytes()), address)
            .await;
    }

    let seed = contacts
        .snapshot()
        .into_iter()
        .map(|entry| (entry.public_key, entry.address))
        .collect();
    let node_config = config.node_config(seed)?;

    let node = Node::new(identity, node_config, Arc::new(directory)).await?;
    Ok(node)
}

async fn listen(config: &Config, port: Option<u16>) -> anyhow::Result<()> {
    let node = start_node(config).await?;
    let port = port.unwrap_or(node.config().listen_port);
    let listener = node.listen(port).await?;

    println!("Node {} listening on {}", node.node_id(), listener.local_addr());
    println!("  Public key: {}", node.public_key().to_hex());
    println!("  Contacts:   {}", node.contacts().len());
    println!("Press Ctrl+C to stop");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(channel) => {
                    tokio::spawn(echo(channel));
                }
                Err(Error::ListenerClosed) => break,
                Err(e) => tracing::warn!("Accept failed: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    listener.close();
    let stats = listener.stats();
    println!(
        "Accepted {} connections ({} handshakes failed, {} unauthorized, {} timed out, {} rejected under load)",
        stats.accepted, stats.failed, stats.unauthorized, stats.timed_out, stats.rejected_overload
    );

    node.shutdown().await?;
    Ok(())
}

async fn echo(mut channel: SecureChannel) {
    let peer = channel.peer().to_hex();
    let peer = &peer[..16];
    tracing::info!("Channel open with {} ({:?})", peer, channel.peer_addr());

    loop {
        match channel.read_frame().await {
            Ok(frame) => {
                tracing::debug!("{} bytes from {}", frame.len(), peer);
                if let Err(e) = channel.write(&frame).await {
                    tracing::warn!("Echo to {} failed: {}", peer, e);
                    break;
                }
            }
            Err(Error::ConnectionClosed) => {
                tracing::info!("Channel with {} closed", peer);
                break;
            }
            Err(e) => {
                tracing::warn!("Channel with {} failed: {}", peer, e);
                break;
            }
        }
    }

    if let Err(e) = channel.close().await {
        tracing::debug!("Closing channel with {} failed: {}", peer, e);
    }
}

async fn connect(
    config: &Config,
    public_key: &str,
    addr: Option<&str>,
    message: &str,
) -> anyhow::Result<()> {
    let peer: PublicKey = public_key
        .parse()
        .with_context(|| format!("invalid public key: {public_key}"))?;

    let node = start_node(config).await?;
    let mut channel = match addr {
        Some(addr) => node.connect_addr(addr, &peer).await?,
        None => node.connect(&peer).await?,
    };

    channel.write(message.as_bytes()).await?;
    let reply = channel.read_frame().await?;
    println!("{}", String::from_utf8_lossy(&reply));

    channel.close().await?;
    node.contacts().save(config.contacts_path())?;
    node.shutdown().await?;
    Ok(())
}
