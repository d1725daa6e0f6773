//! Lobby Link CLI
//!
//! Thin wrapper around lobby-core for pairing from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! # Show this device's identity
//! lobby identity
//!
//! # Check whether a username would be accepted
//! lobby username alice
//!
//! # Encrypt and decrypt with a passphrase
//! lobby encrypt "my passphrase" "hello"
//! lobby decrypt "my passphrase" <envelope>
//!
//! # Issue a capability token to an app
//! lobby link did:key:z6Mk...
//!
//! # Open this device's own channel and wait for apps
//! lobby open
//!
//! # Pair with a named owner through a known peer
//! lobby open --name alice --directory users.json --bootstrap <endpoint-id>
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use lobby_core::{
    crypto, GossipTransport, Keystore, LocalAccounts, Lobby, LobbyConfig, LobbyError,
    LobbyEvent, MemoryBus, MemoryNode, RootIdentity, StaticDirectory, Storage,
};
use serde_json::{Map, Value};
use tokio::io::AsyncBufReadExt;
use tracing::{debug, info, warn};

/// Lobby Link - pair apps with an account over public pub/sub
#[derive(Parser)]
#[command(name = "lobby")]
#[command(version = "0.1.0")]
#[command(about = "Lobby Link - pair apps with an account over public pub/sub")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.lobby/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON config file; missing fields take their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show this device's identity
    Identity,

    /// Check a username's validity and whether this device already uses it
    Username {
        /// Username to check
        name: String,
    },

    /// Encrypt text with a passphrase
    Encrypt {
        passphrase: String,
        text: String,
    },

    /// Decrypt an envelope with a passphrase
    Decrypt {
        passphrase: String,
        envelope: String,
    },

    /// Issue a capability token from the root identity to an app
    Link {
        /// DID of the app receiving the capability
        audience: String,
    },

    /// Open a secure channel and exchange JSON lines over it
    Open {
        /// Owner to pair with; omit to listen on this device's own topic
        #[arg(short, long)]
        name: Option<String>,

        /// JSON file mapping usernames to DIDs
        #[arg(long)]
        directory: Option<PathBuf>,

        /// Endpoint ids of peers to join the topic through
        #[arg(short, long)]
        bootstrap: Vec<String>,

        /// Encrypt outgoing lines with the topic as passphrase
        #[arg(short, long)]
        encrypt: bool,

        /// Give up pairing after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    debug!(?data_dir, "Using data directory");
    let config = match &cli.config {
        Some(path) => LobbyConfig::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {}", path.display(), e))?,
        None => LobbyConfig::default(),
    };

    match cli.command {
        Commands::Identity => {
            let storage = open_storage(&data_dir)?;
            let device = storage.load_or_create_device_keypair()?;

            println!("Lobby Link");
            println!("==========");
            println!();
            println!("Identity:");
            println!("  DID: {}", device.did());
            match storage.used_username()? {
                Some(username) => println!("  Username: {}", username),
                None => println!("  Username: (none)"),
            }
            match storage.ucan()? {
                Some(_) => println!("  Token: stored"),
                None => println!("  Token: (none)"),
            }
            println!();
            println!("Data Directory: {:?}", data_dir);
        }

        Commands::Username { name } => {
            let lobby = offline_lobby(&data_dir, config, StaticDirectory::new())?;
            let availability = lobby.check_username(&name).await?;

            println!("Username: {}", name);
            println!("  Valid: {}", availability.valid);
            // No account service is reachable offline, only local accounts
            println!("  Available locally: {}", availability.available);
        }

        Commands::Encrypt { passphrase, text } => {
            let envelope = tokio::task::spawn_blocking(move || crypto::encrypt(&text, &passphrase))
                .await??;
            println!("{}", envelope);
        }

        Commands::Decrypt {
            passphrase,
            envelope,
        } => {
            let plaintext = tokio::task::spawn_blocking(move || {
                crypto::decrypt(envelope.trim(), &passphrase)
            })
            .await??;
            println!("{}", plaintext);
        }

        Commands::Link { audience } => {
            let audience: RootIdentity = audience
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid audience: {}", e))?;
            let lobby = offline_lobby(&data_dir, config, StaticDirectory::new())?;
            let token = lobby.link_app(&audience).await?;
            println!("{}", token);
        }

        Commands::Open {
            name,
            directory,
            bootstrap,
            encrypt,
            timeout_ms,
        } => {
            let mut config = config;
            if let Some(ms) = timeout_ms {
                config.heartbeat = config.heartbeat.with_timeout(Duration::from_millis(ms));
            }

            let directory = match directory {
                Some(path) => load_directory(&path, &config.data_root_domain)?,
                None => StaticDirectory::new(),
            };
            let bootstrap = bootstrap
                .iter()
                .map(|s| parse_endpoint_id(s))
                .collect::<Result<Vec<_>>>()?;

            let storage = open_storage(&data_dir)?;
            let device = storage.load_or_create_device_keypair()?;
            let transport = Arc::new(GossipTransport::from_storage(&storage, bootstrap).await?);

            println!("Endpoint: {}", transport.endpoint_id());
            println!("DID: {}", device.did());

            let (mut lobby, mut events) = Lobby::new(
                config,
                storage,
                Arc::new(device),
                directory,
                transport.clone(),
                LocalAccounts::new(),
            );
            let topic = lobby.open_secure_channel(name.as_deref()).await?;
            info!(%topic, peer = ?name, encrypt, "Secure channel requested");
            println!("Topic: {}", topic);
            if name.is_some() {
                println!("Waiting for the owner to answer...");
            } else {
                println!("Listening. Type JSON objects or text, one per line.");
            }
            println!("Press Ctrl+C to stop");

            let stdin = tokio::io::stdin();
            let reader = tokio::io::BufReader::new(stdin);
            let mut lines = reader.lines();
            let mut input_open = true;
            let mut outcome = Ok(());

            loop {
                tokio::select! {
                    event = events.recv() => {
                        match event {
                            Some(LobbyEvent::ChannelOpened { topic }) => {
                                println!("Secure channel open on {}", topic);
                            }
                            Some(LobbyEvent::Message(msg)) => {
                                let marker = if msg.encrypted { "[encrypted] " } else { "" };
                                println!("{}{}: {}", marker, msg.from.short(), msg.to_json());
                            }
                            Some(LobbyEvent::HandshakeTimeout { topic, after_ms }) => {
                                warn!(%topic, after_ms, "Pairing timed out");
                                eprintln!("No answer on {}", topic);
                                outcome = Err(LobbyError::HandshakeTimeout(after_ms));
                                break;
                            }
                            Some(_) => {}
                            None => break,
                        }
                    }
                    line = lines.next_line(), if input_open => {
                        match line {
                            Ok(Some(text)) => {
                                let text = text.trim();
                                if text.is_empty() {
                                    continue;
                                }
                                let payload = line_payload(text);
                                let result = if encrypt {
                                    lobby.publish_encrypted(None, topic.as_str(), payload).await
                                } else {
                                    lobby.publish(None, payload).await
                                };
                                if let Err(e) = result {
                                    warn!(error = %e, "Failed to send line");
                                    eprintln!("Failed to send: {}", e);
                                }
                            }
                            Ok(None) => {
                                // stdin closed; keep listening
                                debug!("Input closed");
                                input_open = false;
                            }
                            Err(e) => {
                                eprintln!("Read error: {}", e);
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        println!();
                        println!("Received shutdown signal...");
                        break;
                    }
                }
            }

            println!("Shutting down...");
            info!(%topic, "Closing secure channel and transport");
            lobby.close_channel();
            transport.shutdown().await?;
            println!("Goodbye.");
            outcome?;
        }
    }

    Ok(())
}

/// Set up tracing based on verbosity level
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get default data directory
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lobby")
        .join("data")
}

fn open_storage(data_dir: &Path) -> Result<Storage> {
    Ok(Storage::new(data_dir.join("lobby.redb"))?)
}

/// A session that never touches the network, for token and account commands
fn offline_lobby(
    data_dir: &Path,
    config: LobbyConfig,
    directory: StaticDirectory,
) -> Result<Lobby<MemoryNode, StaticDirectory, LocalAccounts>> {
    let storage = open_storage(data_dir)?;
    let device = storage.load_or_create_device_keypair()?;
    let node = MemoryBus::new().node(device.did().as_str());
    let (lobby, _events) = Lobby::new(
        config,
        storage,
        Arc::new(device),
        directory,
        Arc::new(node),
        LocalAccounts::new(),
    );
    Ok(lobby)
}

/// Load a `{"username": "did:..."}` JSON file into a directory
fn load_directory(path: &Path, data_root_domain: &str) -> Result<StaticDirectory> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read directory '{}': {}", path.display(), e))?;
    let users: HashMap<String, String> = serde_json::from_str(&data)
        .map_err(|e| anyhow::anyhow!("Invalid directory '{}': {}", path.display(), e))?;
    Ok(StaticDirectory::from_usernames(data_root_domain, users))
}

/// Parse an endpoint ID as printed by `lobby open`
fn parse_endpoint_id(s: &str) -> Result<iroh::EndpointId> {
    s.parse::<iroh::EndpointId>()
        .map_err(|e| anyhow::anyhow!("Invalid endpoint ID '{}': {}", s, e))
}

/// JSON objects go out as-is; anything else is wrapped as `{"message": ...}`
fn line_payload(text: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(fields)) => fields,
        _ => {
            let mut fields = Map::new();
            fields.insert("message".to_string(), Value::String(text.to_string()));
            fields
        }
    }
}
