//! Block production
//!
//! The validator loop builds blocks through a [`BlockProducer`]. There is a
//! single implementation today, a validator holding one signing key.

use crate::core::{Block, BlockError, Header, Transaction};
use crate::crypto::{KeyPair, PublicKey};
use log::info;

/// Strategy for turning pending transactions into a signed block
pub trait BlockProducer: Send + Sync {
    /// Build and sign the block on top of `prev`
    fn produce(&self, prev: &Header, pending: Vec<Transaction>) -> Result<Block, BlockError>;

    /// Key the produced blocks are signed with
    fn public_key(&self) -> PublicKey;
}

/// The one trusted validator of a permissioned chain
pub struct SingleValidator {
    key: KeyPair,
}

impl SingleValidator {
    pub fn new(key: KeyPair) -> Self {
        Self { key }
    }
}

impl BlockProducer for SingleValidator {
    fn produce(&self, prev: &Header, pending: Vec<Transaction>) -> Result<Block, BlockError> {
        let mut block = Block::from_prev_header(prev, pending);
        block.sign(&self.key)?;

        info!(
            "Produced block {} at height {} with {} transactions",
            block.hash(),
            block.height(),
            block.tx_count()
        );
        Ok(block)
    }

    fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }
}
