//! PrivateChain CLI Application
//!
//! Runs a single node, a local devnet, or generates validator keys.

use clap::{Parser, Subcommand};
use privatechain::core::Transaction;
use privatechain::crypto::KeyPair;
use privatechain::network::{GenesisAllocation, Node, NodeConfig, NodeHandle};
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "privatechain")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A permissioned single-validator blockchain node", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node
    Node {
        /// JSON config file; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Node id announced to peers
        #[arg(long)]
        id: Option<String>,

        /// Peer listener address (host:port)
        #[arg(short, long)]
        listen: Option<String>,

        /// Seed peers to dial (comma-separated)
        #[arg(long)]
        seeds: Option<String>,

        /// Hex private key; makes this node the validator
        #[arg(long)]
        validator_key: Option<String>,

        /// Block interval in milliseconds
        #[arg(long)]
        block_time_ms: Option<u64>,

        /// HTTP API address (host:port)
        #[arg(long)]
        api: Option<String>,
    },

    /// Generate a new key pair
    Keygen,

    /// Run a local network of in-process nodes
    Devnet {
        /// Block interval in milliseconds
        #[arg(long, default_value = "5000")]
        block_time_ms: u64,

        /// HTTP API address of the validator node
        #[arg(long, default_value = "127.0.0.1:9000")]
        api: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Node {
            config,
            id,
            listen,
            seeds,
            validator_key,
            block_time_ms,
            api,
        } => {
            let mut config = match config {
                Some(path) => NodeConfig::from_file(&path)?,
                None => NodeConfig::default(),
            };
            if let Some(id) = id {
                config.id = id;
            }
            if let Some(listen) = listen {
                config.listen_addr = listen;
            }
            if let Some(seeds) = seeds {
                config.seed_nodes = seeds
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            if validator_key.is_some() {
                config.validator_key = validator_key;
            }
            if let Some(ms) = block_time_ms {
                config.block_time_ms = ms;
            }
            if api.is_some() {
                config.api_listen_addr = api;
            }
            run_node(config)
        }
        Commands::Keygen => {
            let key = KeyPair::generate();
            println!("🔑 New key pair");
            println!("   Private key: {}", key.private_key_hex());
            println!("   Public key:  {}", key.public_key().to_hex());
            println!("   Address:     {}", key.address());
            Ok(())
        }
        Commands::Devnet { block_time_ms, api } => run_devnet(block_time_ms, api),
    }
}

fn run_node(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let node = Node::new(config).await?;
        let handle = node.handle();
        println!("🌐 Node {} listening on {}", handle.id(), handle.local_addr());

        // Handle Ctrl+C
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            println!("\n📴 Shutting down node...");
            handle.shutdown().await;
        });

        node.start().await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Devnet layout: LOCAL_NODE (validator) -> REMOTE_NODE -> REMOTE_NODE_B,
/// with LATE_NODE joining REMOTE_NODE after the chain has some height.
fn run_devnet(block_time_ms: u64, api: String) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let validator = KeyPair::generate();
        let faucet = KeyPair::generate();
        let allocations = vec![GenesisAllocation {
            address: faucet.address(),
            balance: 1_000_000_000,
        }];

        let config = |id: &str, listen: &str, seeds: &[&str]| NodeConfig {
            id: id.to_string(),
            listen_addr: listen.to_string(),
            seed_nodes: seeds.iter().map(|s| s.to_string()).collect(),
            block_time_ms,
            genesis_allocations: allocations.clone(),
            ..Default::default()
        };

        let local = Node::new(NodeConfig {
            validator_key: Some(validator.private_key_hex()),
            api_listen_addr: Some(api),
            ..config("LOCAL_NODE", "127.0.0.1:3000", &["127.0.0.1:4000"])
        })
        .await?;
        let remote = Node::new(config("REMOTE_NODE", "127.0.0.1:4000", &["127.0.0.1:5000"])).await?;
        let remote_b = Node::new(config("REMOTE_NODE_B", "127.0.0.1:5000", &[])).await?;

        let mut handles = vec![remote_b.handle(), remote.handle(), local.handle()];
        let local_handle = local.handle();

        // Listeners are bound by `Node::new`, so dial order does not matter
        for node in [remote_b, remote, local] {
            tokio::spawn(async move {
                if let Err(e) = node.start().await {
                    log::error!("Node stopped: {}", e);
                }
            });
        }

        let late = Node::new(config("LATE_NODE", "127.0.0.1:6000", &["127.0.0.1:4000"])).await?;
        handles.push(late.handle());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(11)).await;
            log::info!("LATE_NODE joining the network");
            if let Err(e) = late.start().await {
                log::error!("Node stopped: {}", e);
            }
        });

        tokio::spawn(send_transfers(local_handle, faucet));

        println!("🌐 Devnet running, validator {}", validator.address());
        tokio::signal::ctrl_c().await.ok();
        println!("\n📴 Shutting down devnet...");
        for handle in &handles {
            handle.shutdown().await;
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Submit a random faucet transfer every two seconds
async fn send_transfers(handle: NodeHandle, faucet: KeyPair) {
    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    loop {
        ticker.tick().await;

        let value = rand::thread_rng().gen_range(1..=100);
        let mut tx = Transaction::transfer(KeyPair::generate().public_key(), value);
        if let Err(e) = tx.sign(&faucet) {
            log::error!("Failed to sign transfer: {}", e);
            continue;
        }
        if handle.submit_transaction(tx).await.is_err() {
            break;
        }
    }
}
