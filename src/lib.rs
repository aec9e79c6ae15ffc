//! PrivateChain: a permissioned single-validator blockchain node
//!
//! This crate provides:
//! - secp256k1 signed transactions and validator-signed blocks
//! - An account-balance ledger with strict height/parent linking
//! - A bounded transaction mempool
//! - A small stack VM for contract data carried by transactions
//! - TCP gossip networking with a timer-driven validator loop
//! - A read-only HTTP API with transaction submission
//!
//! # Example
//!
//! ```rust,no_run
//! use privatechain::core::Transaction;
//! use privatechain::crypto::KeyPair;
//! use privatechain::network::{GenesisAllocation, Node, NodeConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let alice = KeyPair::generate();
//! let config = NodeConfig {
//!     validator_key: Some(KeyPair::generate().private_key_hex()),
//!     genesis_allocations: vec![GenesisAllocation {
//!         address: alice.address(),
//!         balance: 1_000,
//!     }],
//!     ..Default::default()
//! };
//!
//! let node = Node::new(config).await?;
//! let handle = node.handle();
//! tokio::spawn(node.start());
//!
//! let mut tx = Transaction::transfer(KeyPair::generate().public_key(), 10);
//! tx.sign(&alice)?;
//! handle.submit_transaction(tx).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod contract;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod network;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use contract::{OpCode, State, VM};
pub use core::{Account, AccountState, Block, Blockchain, Header, Transaction, TxKind};
pub use crypto::{Address, Hash, KeyPair, PublicKey, Signature};
pub use mining::{BlockProducer, Mempool, SingleValidator};
pub use network::{Node, NodeConfig, NodeHandle};
