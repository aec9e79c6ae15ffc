//! Core blockchain components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (account model, three kinds)
//! - Blocks (header + ordered transactions, validator-signed)
//! - Account state (address to balance)
//! - Blockchain (ledger acceptance rules and queries)

pub mod account;
pub mod block;
pub mod blockchain;
pub mod transaction;

pub use account::{Account, AccountError, AccountState};
pub use block::{payload_digest, Block, BlockError, Header, BLOCK_VERSION, HEADER_SIZE};
pub use blockchain::{ApplyError, Blockchain, ChainError, TxLocation};
pub use transaction::{CollectionTx, MintTx, Transaction, TransactionError, TxKind};
