//! Transaction pool (mempool) for pending transactions
//!
//! Holds verified transactions waiting to be included in a block, keyed by
//! canonical hash and kept in arrival order. The pool is bounded: once it
//! holds `capacity` transactions, new ones are rejected with
//! [`MempoolError::Full`] until a block drains it. Nothing is evicted.

use crate::core::Transaction;
use crate::crypto::Hash;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Default maximum mempool transaction count
pub const DEFAULT_MEMPOOL_CAPACITY: usize = 1000;

/// Mempool errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("Mempool full ({0} transactions)")]
    Full(usize),
}

#[derive(Debug, Default)]
struct Pool {
    entries: HashMap<Hash, Transaction>,
    /// Hashes in order of arrival
    by_time: Vec<Hash>,
}

/// Internally synchronized pool of pending transactions
#[derive(Debug)]
pub struct Mempool {
    pool: RwLock<Pool>,
    capacity: usize,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMPOOL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pool: RwLock::new(Pool::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn contains(&self, hash: &Hash) -> bool {
        self.pool.read().await.entries.contains_key(hash)
    }

    /// Add a transaction
    ///
    /// A transaction already in the pool is overwritten in place and keeps
    /// its position. Deduplication before verification is up to the caller.
    pub async fn add(&self, tx: Transaction) -> Result<(), MempoolError> {
        let hash = tx.hash();
        let mut pool = self.pool.write().await;

        if let Some(existing) = pool.entries.get_mut(&hash) {
            *existing = tx;
            return Ok(());
        }

        if pool.entries.len() >= self.capacity {
            return Err(MempoolError::Full(self.capacity));
        }

        pool.entries.insert(hash, tx);
        pool.by_time.push(hash);
        Ok(())
    }

    pub async fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.pool.read().await.entries.get(hash).cloned()
    }

    /// Snapshot of pending transactions in arrival order
    pub async fn pending(&self) -> Vec<Transaction> {
        let pool = self.pool.read().await;
        pool.by_time
            .iter()
            .filter_map(|hash| pool.entries.get(hash))
            .cloned()
            .collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.pool.read().await.entries.len()
    }

    pub async fn clear_pending(&self) {
        let mut pool = self.pool.write().await;
        pool.entries.clear();
        pool.by_time.clear();
    }

    /// Remove the given transactions, keeping anything that arrived since
    pub async fn remove_batch(&self, hashes: &[Hash]) {
        let mut pool = self.pool.write().await;
        for hash in hashes {
            pool.entries.remove(hash);
        }
        let Pool { entries, by_time } = &mut *pool;
        by_time.retain(|hash| entries.contains_key(hash));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn signed_tx(value: u64) -> Transaction {
        let mut tx = Transaction::transfer(KeyPair::generate().public_key(), value);
        tx.sign(&KeyPair::generate()).unwrap();
        tx
    }

    #[tokio::test]
    async fn test_mempool_add_contains() {
        let mempool = Mempool::new();
        let tx = signed_tx(1);

        assert!(!mempool.contains(&tx.hash()).await);
        mempool.add(tx.clone()).await.unwrap();
        assert!(mempool.contains(&tx.hash()).await);
        assert_eq!(mempool.get(&tx.hash()).await, Some(tx));
    }

    #[tokio::test]
    async fn test_mempool_duplicate() {
        let mempool = Mempool::new();
        let tx = signed_tx(1);

        mempool.add(tx.clone()).await.unwrap();
        mempool.add(tx).await.unwrap();
        assert_eq!(mempool.pending().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mempool_pending_order_and_snapshot() {
        let mempool = Mempool::new();
        let txs: Vec<_> = (0..5).map(signed_tx).collect();
        for tx in &txs {
            mempool.add(tx.clone()).await.unwrap();
        }

        let snapshot = mempool.pending().await;
        assert_eq!(snapshot, txs);

        mempool.clear_pending().await;
        assert_eq!(mempool.pending_count().await, 0);
        assert_eq!(snapshot.len(), 5);
    }

    #[tokio::test]
    async fn test_mempool_capacity() {
        let mempool = Mempool::with_capacity(2);
        mempool.add(signed_tx(1)).await.unwrap();
        mempool.add(signed_tx(2)).await.unwrap();
        assert_eq!(
            mempool.add(signed_tx(3)).await,
            Err(MempoolError::Full(2))
        );
        assert_eq!(mempool.pending_count().await, 2);
    }

    #[tokio::test]
    async fn test_mempool_remove_batch() {
        let mempool = Mempool::new();
        let a = signed_tx(1);
        let b = signed_tx(2);
        let c = signed_tx(3);
        for tx in [&a, &b, &c] {
            mempool.add(tx.clone()).await.unwrap();
        }

        mempool.remove_batch(&[a.hash(), c.hash()]).await;
        assert_eq!(mempool.pending().await, vec![b]);
    }
}
