//! Block implementation for the blockchain
//!
//! A block contains a header with metadata and an ordered list of
//! transactions, and is signed by the validator that produced it. The block
//! hash covers the header only; transactions are committed through the
//! header's payload digest.

use crate::core::transaction::Transaction;
use crate::crypto::{sha256, Hash, KeyError, KeyPair, PublicKey, Signature};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current block version
pub const BLOCK_VERSION: u32 = 1;

/// Encoded header size: version + height + parent + digest + timestamp
pub const HEADER_SIZE: usize = 4 + 4 + 32 + 32 + 8;

// =============================================================================
// Block Errors
// =============================================================================

/// Block validation errors
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Block {0} has no validator signature")]
    Unsigned(Hash),
    #[error("Invalid validator signature on block {0}")]
    SignatureInvalid(Hash),
    #[error("Payload digest mismatch: header has {expected}, transactions hash to {actual}")]
    PayloadDigestMismatch { expected: Hash, actual: Hash },
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Block header containing metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u32,
    pub height: u32,
    /// Hash of the previous block header
    pub parent_hash: Hash,
    /// Digest of the transaction list
    pub payload_digest: Hash,
    /// Creation time in Unix nanoseconds
    pub timestamp: i64,
}

impl Header {
    /// Fixed little-endian encoding that is hashed and signed
    pub fn bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(self.parent_hash.as_bytes());
        buf.extend_from_slice(self.payload_digest.as_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf
    }

    /// Calculate the hash of the block header
    pub fn hash(&self) -> Hash {
        sha256(&self.bytes())
    }
}

/// Digest over an ordered transaction list
///
/// Each transaction contributes its canonical hash and its signature, so a
/// re-signed or reordered list produces a different digest.
pub fn payload_digest(transactions: &[Transaction]) -> Hash {
    let mut buf = Vec::with_capacity(transactions.len() * 97);
    for tx in transactions {
        buf.extend_from_slice(tx.compute_hash().as_bytes());
        match tx.signature() {
            Some(signature) => {
                buf.push(1);
                buf.extend_from_slice(signature.as_bytes());
            }
            None => buf.push(0),
        }
    }
    sha256(&buf)
}

/// A block in the blockchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    header: Header,
    transactions: Vec<Transaction>,
    validator: Option<PublicKey>,
    signature: Option<Signature>,
}

impl Block {
    /// Create an unsigned block; the payload digest is recomputed from `transactions`
    pub fn new(mut header: Header, transactions: Vec<Transaction>) -> Self {
        header.payload_digest = payload_digest(&transactions);
        Self {
            header,
            transactions,
            validator: None,
            signature: None,
        }
    }

    /// Create the next block on top of `prev`
    pub fn from_prev_header(prev: &Header, transactions: Vec<Transaction>) -> Self {
        let header = Header {
            version: BLOCK_VERSION,
            height: prev.height + 1,
            parent_hash: prev.hash(),
            payload_digest: Hash::zero(),
            timestamp: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        };
        Self::new(header, transactions)
    }

    /// The genesis block shared by every node
    pub fn genesis() -> Self {
        let header = Header {
            version: BLOCK_VERSION,
            height: 0,
            parent_hash: Hash::zero(),
            payload_digest: Hash::zero(),
            timestamp: 0,
        };
        Self::new(header, Vec::new())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn validator(&self) -> Option<&PublicKey> {
        self.validator.as_ref()
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Append a transaction and refresh the payload digest
    ///
    /// The header changes, so any existing signature is dropped and the
    /// block has to be signed again.
    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.push(tx);
        self.header.payload_digest = payload_digest(&self.transactions);
        self.validator = None;
        self.signature = None;
    }

    /// Sign the header bytes and record the signer as validator
    pub fn sign(&mut self, key: &KeyPair) -> Result<(), BlockError> {
        let signature = key.sign(&self.header.bytes())?;
        self.validator = Some(key.public_key());
        self.signature = Some(signature);
        Ok(())
    }

    /// Verify the validator signature over the current header
    pub fn verify(&self) -> Result<(), BlockError> {
        let (Some(validator), Some(signature)) = (self.validator.as_ref(), self.signature.as_ref())
        else {
            return Err(BlockError::Unsigned(self.hash()));
        };

        if !validator.verify(&self.header.bytes(), signature) {
            return Err(BlockError::SignatureInvalid(self.hash()));
        }
        Ok(())
    }

    /// Check that the header's payload digest matches the transactions
    pub fn verify_payload(&self) -> Result<(), BlockError> {
        let actual = payload_digest(&self.transactions);
        if actual != self.header.payload_digest {
            return Err(BlockError::PayloadDigestMismatch {
                expected: self.header.payload_digest,
                actual,
            });
        }
        Ok(())
    }

    /// Block hash (header only)
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn encode(&self) -> Result<Vec<u8>, BlockError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BlockError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
