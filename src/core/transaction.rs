//! Transaction handling for the blockchain
//!
//! An account-model transaction signed by its sender. The canonical hash
//! covers the fields fixed at signing time (`from`, `to`, `value`, `data`,
//! `nonce` and the kind payload) and never the signature or the cached hash.

use crate::crypto::{hex_bytes, sha256, Hash, KeyError, KeyPair, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction is not signed")]
    Unsigned,
    #[error("Invalid signature for transaction {0}")]
    SignatureInvalid(Hash),
    #[error("Cached hash {cached} does not match computed hash {computed}")]
    HashMismatch { cached: Hash, computed: Hash },
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// Transaction Kinds
// =============================================================================

/// Creates a new asset collection owned by the sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionTx {
    pub fee: u64,
    #[serde(with = "hex_bytes")]
    pub metadata: Vec<u8>,
}

/// Mints one asset into an existing collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintTx {
    pub fee: u64,
    /// Identifier of the minted asset
    pub asset_id: Hash,
    #[serde(with = "hex_bytes")]
    pub metadata: Vec<u8>,
    /// Hash of the `CollectionTx` that created the collection
    pub collection: Hash,
    pub collection_owner: PublicKey,
}

/// The closed set of transaction variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TxKind {
    #[default]
    NativeTransfer,
    CollectionCreate(CollectionTx),
    AssetMint(MintTx),
}

impl TxKind {
    pub fn name(&self) -> &'static str {
        match self {
            TxKind::NativeTransfer => "native_transfer",
            TxKind::CollectionCreate(_) => "collection_create",
            TxKind::AssetMint(_) => "asset_mint",
        }
    }

    fn write_canonical(&self, buf: &mut Vec<u8>) {
        match self {
            TxKind::NativeTransfer => buf.push(0),
            TxKind::CollectionCreate(collection) => {
                buf.push(1);
                buf.extend_from_slice(&collection.fee.to_le_bytes());
                write_bytes(buf, &collection.metadata);
            }
            TxKind::AssetMint(mint) => {
                buf.push(2);
                buf.extend_from_slice(&mint.fee.to_le_bytes());
                buf.extend_from_slice(mint.asset_id.as_bytes());
                write_bytes(buf, &mint.metadata);
                buf.extend_from_slice(mint.collection.as_bytes());
                buf.extend_from_slice(&mint.collection_owner.to_bytes());
            }
        }
    }
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn write_key(buf: &mut Vec<u8>, key: Option<&PublicKey>) {
    match key {
        Some(key) => {
            buf.push(1);
            buf.extend_from_slice(&key.to_bytes());
        }
        None => buf.push(0),
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A signed ledger transaction
///
/// Fields are private so that every mutation goes through a setter that
/// drops the memoized hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender key, set when the transaction is signed
    from: Option<PublicKey>,
    to: Option<PublicKey>,
    value: u64,
    nonce: u64,
    /// Contract bytecode executed on application, if non-empty
    #[serde(with = "hex_bytes")]
    data: Vec<u8>,
    kind: TxKind,
    signature: Option<Signature>,
    #[serde(default)]
    hash: Option<Hash>,
}

impl Transaction {
    /// Create an unsigned transaction of the given kind
    pub fn new(kind: TxKind, data: Vec<u8>) -> Self {
        Self {
            from: None,
            to: None,
            value: 0,
            nonce: 0,
            data,
            kind,
            signature: None,
            hash: None,
        }
    }

    /// Create an unsigned native transfer
    pub fn transfer(to: PublicKey, value: u64) -> Self {
        let mut tx = Self::new(TxKind::NativeTransfer, Vec::new());
        tx.to = Some(to);
        tx.value = value;
        tx
    }

    pub fn sender(&self) -> Option<&PublicKey> {
        self.from.as_ref()
    }

    pub fn recipient(&self) -> Option<&PublicKey> {
        self.to.as_ref()
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn kind(&self) -> &TxKind {
        &self.kind
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn set_sender(&mut self, from: PublicKey) {
        self.from = Some(from);
        self.hash = None;
    }

    pub fn set_recipient(&mut self, to: PublicKey) {
        self.to = Some(to);
        self.hash = None;
    }

    pub fn set_value(&mut self, value: u64) {
        self.value = value;
        self.hash = None;
    }

    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
        self.hash = None;
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
        self.hash = None;
    }

    pub fn set_kind(&mut self, kind: TxKind) {
        self.kind = kind;
        self.hash = None;
    }

    /// Drop the memoized hash; the next `hash()` recomputes it
    pub fn clear_cached_hash(&mut self) {
        self.hash = None;
    }

    /// Fixed-field encoding the canonical hash is computed over
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 + self.data.len());
        write_bytes(&mut buf, &self.data);
        write_key(&mut buf, self.to.as_ref());
        buf.extend_from_slice(&self.value.to_le_bytes());
        write_key(&mut buf, self.from.as_ref());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        self.kind.write_canonical(&mut buf);
        buf
    }

    /// Recompute the canonical hash from the current fields
    pub fn compute_hash(&self) -> Hash {
        sha256(&self.canonical_bytes())
    }

    /// Canonical hash, served from the cache when present
    pub fn hash(&self) -> Hash {
        self.hash.unwrap_or_else(|| self.compute_hash())
    }

    /// Sign with the sender's key; sets `from` and caches the hash
    pub fn sign(&mut self, key: &KeyPair) -> Result<(), TransactionError> {
        self.from = Some(key.public_key());
        let hash = self.compute_hash();
        let signature = key.sign(hash.as_bytes())?;
        self.signature = Some(signature);
        self.hash = Some(hash);
        Ok(())
    }

    /// Check the signature against a freshly computed hash
    ///
    /// A cached hash that disagrees with the fields is rejected as well.
    pub fn verify(&self) -> Result<(), TransactionError> {
        let computed = self.compute_hash();
        if let Some(cached) = self.hash {
            if cached != computed {
                return Err(TransactionError::HashMismatch { cached, computed });
            }
        }

        let (Some(from), Some(signature)) = (self.from.as_ref(), self.signature.as_ref()) else {
            return Err(TransactionError::Unsigned);
        };

        if !from.verify(computed.as_bytes(), signature) {
            return Err(TransactionError::SignatureInvalid(computed));
        }
        Ok(())
    }

    /// Serialize the full structure for the wire
    pub fn encode(&self) -> Result<Vec<u8>, TransactionError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransactionError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
