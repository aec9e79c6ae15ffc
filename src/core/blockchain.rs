//! Blockchain implementation
//!
//! The ledger: an append-only, height-indexed chain of validated blocks that
//! owns the account state. `add_block` is the single acceptance path for both
//! self-produced and received blocks.
//!
//! A candidate block is rejected as a whole when its height, parent link,
//! payload digest, validator signature or any transaction signature is
//! invalid. A correctly signed transaction that cannot be applied (unknown
//! sender, insufficient balance, failing contract, unknown collection, or a
//! hash that is already indexed) is skipped instead: the block still
//! commits, but the transaction has no effect and is not indexed again.

use crate::contract::{State, VmError, VM};
use crate::core::account::{AccountError, AccountState};
use crate::core::block::{Block, BlockError, Header};
use crate::core::transaction::{CollectionTx, MintTx, Transaction, TransactionError, TxKind};
use crate::crypto::{Address, Hash};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

// =============================================================================
// Error Types
// =============================================================================

/// Blockchain-related errors
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Block already known: {0}")]
    BlockKnown(Hash),
    #[error("Block too high: height {height}, current height {current}")]
    BlockTooHigh { height: u32, current: u32 },
    #[error("Block too low: height {height}, current height {current}")]
    BlockTooLow { height: u32, current: u32 },
    #[error("Parent hash mismatch: expected {expected}, got {actual}")]
    ParentMismatch { expected: Hash, actual: Hash },
    #[error("Invalid block: {0}")]
    InvalidBlock(#[from] BlockError),
    #[error("Invalid transaction {hash}: {source}")]
    InvalidTransaction {
        hash: Hash,
        source: TransactionError,
    },
    #[error("Genesis block must have height 0, got {0}")]
    InvalidGenesis(u32),
    #[error("Height {height} out of range (current height {current})")]
    HeightOutOfRange { height: u32, current: u32 },
    #[error("Block not found: {0}")]
    BlockNotFound(Hash),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(Hash),
}

/// Why a correctly signed transaction was skipped during application
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error("Contract execution failed: {0}")]
    Contract(#[from] VmError),
    #[error("Unknown collection: {0}")]
    UnknownCollection(Hash),
    #[error("Transfer of {0} has no recipient")]
    MissingRecipient(u64),
    #[error("Transaction has no sender")]
    MissingSender,
    #[error("Transaction already applied at height {0}")]
    AlreadyApplied(u32),
}

/// Position of an applied transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxLocation {
    pub block_hash: Hash,
    pub height: u32,
    pub index: usize,
}

// =============================================================================
// Blockchain
// =============================================================================

struct ChainInner {
    /// Accepted headers, index == height, never empty
    headers: Vec<Header>,
    blocks: HashMap<Hash, Block>,
    /// Successfully applied transactions only
    tx_index: HashMap<Hash, TxLocation>,
    /// Collections keyed by the hash of their creating transaction
    collections: HashMap<Hash, CollectionTx>,
    /// Mints keyed by the hash of their minting transaction
    mints: HashMap<Hash, MintTx>,
    contract_state: State,
}

impl ChainInner {
    fn height(&self) -> u32 {
        (self.headers.len() - 1) as u32
    }

    fn tip(&self) -> &Header {
        &self.headers[self.headers.len() - 1]
    }

    fn store(&mut self, block: Block) {
        self.headers.push(*block.header());
        self.blocks.insert(block.hash(), block);
    }
}

/// The ledger
///
/// Internally synchronized: all methods take `&self` and the whole of
/// `add_block` runs under one write lock.
pub struct Blockchain {
    inner: RwLock<ChainInner>,
    accounts: AccountState,
}

impl Blockchain {
    /// Create a ledger from a genesis block
    pub async fn new(genesis: Block) -> Result<Self, ChainError> {
        Self::with_allocations(genesis, &[]).await
    }

    /// Create a ledger from a genesis block and seed account balances
    pub async fn with_allocations(
        genesis: Block,
        allocations: &[(Address, u64)],
    ) -> Result<Self, ChainError> {
        if genesis.height() != 0 {
            return Err(ChainError::InvalidGenesis(genesis.height()));
        }

        let accounts = AccountState::new();
        for (address, balance) in allocations {
            accounts.create_with_balance(*address, *balance).await;
        }

        log::info!("Initialized blockchain with genesis {}", genesis.hash());

        let mut inner = ChainInner {
            headers: Vec::new(),
            blocks: HashMap::new(),
            tx_index: HashMap::new(),
            collections: HashMap::new(),
            mints: HashMap::new(),
            contract_state: State::new(),
        };
        inner.store(genesis);

        Ok(Self {
            inner: RwLock::new(inner),
            accounts,
        })
    }

    pub fn accounts(&self) -> &AccountState {
        &self.accounts
    }

    /// Height of the last applied block
    pub async fn height(&self) -> u32 {
        self.inner.read().await.height()
    }

    /// Number of stored headers (height + 1)
    pub async fn header_count(&self) -> usize {
        self.inner.read().await.headers.len()
    }

    pub async fn has_block(&self, height: u32) -> bool {
        height <= self.height().await
    }

    pub async fn contains_block(&self, hash: &Hash) -> bool {
        self.inner.read().await.blocks.contains_key(hash)
    }

    pub async fn get_header(&self, height: u32) -> Result<Header, ChainError> {
        let inner = self.inner.read().await;
        inner
            .headers
            .get(height as usize)
            .copied()
            .ok_or(ChainError::HeightOutOfRange {
                height,
                current: inner.height(),
            })
    }

    /// Header at the current height
    pub async fn current_header(&self) -> Header {
        *self.inner.read().await.tip()
    }

    pub async fn get_block(&self, height: u32) -> Result<Block, ChainError> {
        let inner = self.inner.read().await;
        let header = inner
            .headers
            .get(height as usize)
            .ok_or(ChainError::HeightOutOfRange {
                height,
                current: inner.height(),
            })?;
        let hash = header.hash();
        inner
            .blocks
            .get(&hash)
            .cloned()
            .ok_or(ChainError::BlockNotFound(hash))
    }

    pub async fn get_block_by_hash(&self, hash: &Hash) -> Result<Block, ChainError> {
        self.inner
            .read()
            .await
            .blocks
            .get(hash)
            .cloned()
            .ok_or(ChainError::BlockNotFound(*hash))
    }

    /// Look up a successfully applied transaction
    pub async fn get_transaction_by_hash(&self, hash: &Hash) -> Result<Transaction, ChainError> {
        let inner = self.inner.read().await;
        inner
            .tx_index
            .get(hash)
            .and_then(|loc| {
                inner
                    .blocks
                    .get(&loc.block_hash)
                    .and_then(|block| block.transactions().get(loc.index))
            })
            .cloned()
            .ok_or(ChainError::TransactionNotFound(*hash))
    }

    pub async fn transaction_location(&self, hash: &Hash) -> Option<TxLocation> {
        self.inner.read().await.tx_index.get(hash).copied()
    }

    pub async fn contains_transaction(&self, hash: &Hash) -> bool {
        self.inner.read().await.tx_index.contains_key(hash)
    }

    pub async fn get_collection(&self, hash: &Hash) -> Option<CollectionTx> {
        self.inner.read().await.collections.get(hash).cloned()
    }

    pub async fn get_mint(&self, hash: &Hash) -> Option<MintTx> {
        self.inner.read().await.mints.get(hash).cloned()
    }

    /// Read a value written by contract execution
    pub async fn get_contract_value(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner
            .read()
            .await
            .contract_state
            .get(key)
            .map(<[u8]>::to_vec)
    }

    /// Validate and append a block
    pub async fn add_block(&self, block: Block) -> Result<(), ChainError> {
        let mut inner = self.inner.write().await;
        let hash = block.hash();

        if inner.blocks.contains_key(&hash) {
            return Err(ChainError::BlockKnown(hash));
        }

        // Height: exactly one above the tip
        let current = inner.height();
        let height = block.height();
        if height > current + 1 {
            return Err(ChainError::BlockTooHigh { height, current });
        }
        if height <= current {
            return Err(ChainError::BlockTooLow { height, current });
        }

        // Linkage
        let expected = inner.tip().hash();
        if block.header().parent_hash != expected {
            return Err(ChainError::ParentMismatch {
                expected,
                actual: block.header().parent_hash,
            });
        }

        block.verify_payload()?;
        block.verify()?;

        // Every transaction signature must hold before anything is applied
        for tx in block.transactions() {
            tx.verify()
                .map_err(|source| ChainError::InvalidTransaction {
                    hash: tx.compute_hash(),
                    source,
                })?;
        }

        let mut applied = 0;
        for (index, tx) in block.transactions().iter().enumerate() {
            let tx_hash = tx.compute_hash();
            match self.apply_transaction(&mut inner, tx, tx_hash).await {
                Ok(()) => {
                    inner.tx_index.insert(
                        tx_hash,
                        TxLocation {
                            block_hash: hash,
                            height,
                            index,
                        },
                    );
                    applied += 1;
                }
                Err(err) => {
                    log::warn!("Skipping transaction {} in block {}: {}", tx_hash, height, err);
                }
            }
        }

        log::info!(
            "Added block {} at height {} ({}/{} transactions applied)",
            hash,
            height,
            applied,
            block.tx_count()
        );

        inner.store(block);
        Ok(())
    }

    /// Apply one verified transaction; nothing is written on error
    async fn apply_transaction(
        &self,
        inner: &mut ChainInner,
        tx: &Transaction,
        tx_hash: Hash,
    ) -> Result<(), ApplyError> {
        if let Some(loc) = inner.tx_index.get(&tx_hash) {
            return Err(ApplyError::AlreadyApplied(loc.height));
        }

        let sender = tx.sender().ok_or(ApplyError::MissingSender)?;

        let scratch = if tx.data().is_empty() {
            None
        } else {
            let mut scratch = inner.contract_state.clone();
            VM::new(tx.data(), &mut scratch).run()?;
            Some(scratch)
        };

        if let TxKind::AssetMint(mint) = tx.kind() {
            if !inner.collections.contains_key(&mint.collection) {
                return Err(ApplyError::UnknownCollection(mint.collection));
            }
        }

        if tx.value() > 0 {
            let recipient = tx
                .recipient()
                .ok_or(ApplyError::MissingRecipient(tx.value()))?;
            self.accounts
                .transfer(&sender.address(), &recipient.address(), tx.value())
                .await?;
        }

        if let Some(scratch) = scratch {
            inner.contract_state = scratch;
        }

        match tx.kind() {
            TxKind::NativeTransfer => {}
            TxKind::CollectionCreate(collection) => {
                log::debug!("Created collection {}", tx_hash);
                inner.collections.insert(tx_hash, collection.clone());
            }
            TxKind::AssetMint(mint) => {
                log::debug!("Minted asset {} into {}", mint.asset_id, mint.collection);
                inner.mints.insert(tx_hash, mint.clone());
            }
        }
        Ok(())
    }
}
