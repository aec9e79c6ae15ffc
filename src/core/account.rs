//! Account state
//!
//! Address to balance table owned by the ledger. Every operation takes the
//! table lock for its whole duration, so a transfer is never observed half
//! applied.

use crate::crypto::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tokio::sync::RwLock;

/// Account state errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("Account not found: {0}")]
    NotFound(Address),
    #[error("Insufficient balance in {address}: have {balance}, need {amount}")]
    InsufficientBalance {
        address: Address,
        balance: u64,
        amount: u64,
    },
    #[error("Balance overflow crediting {0}")]
    BalanceOverflow(Address),
}

/// A single account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: u64,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.address, self.balance)
    }
}

/// Internally synchronized account table
#[derive(Debug, Default)]
pub struct AccountState {
    accounts: RwLock<HashMap<Address, Account>>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty account, keeping an existing one untouched
    pub async fn create(&self, address: Address) -> Account {
        let mut accounts = self.accounts.write().await;
        *accounts.entry(address).or_insert(Account {
            address,
            balance: 0,
        })
    }

    /// Create or overwrite an account with the given balance
    pub async fn create_with_balance(&self, address: Address, balance: u64) -> Account {
        let account = Account { address, balance };
        self.accounts.write().await.insert(address, account);
        account
    }

    pub async fn get(&self, address: &Address) -> Result<Account, AccountError> {
        self.accounts
            .read()
            .await
            .get(address)
            .copied()
            .ok_or(AccountError::NotFound(*address))
    }

    pub async fn get_balance(&self, address: &Address) -> Result<u64, AccountError> {
        Ok(self.get(address).await?.balance)
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    /// Move `amount` from `from` to `to`
    ///
    /// Fails without touching either balance if the sender is unknown or
    /// short of funds. The recipient is created on first credit.
    pub async fn transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), AccountError> {
        let mut accounts = self.accounts.write().await;

        let sender_balance = accounts
            .get(from)
            .map(|account| account.balance)
            .ok_or(AccountError::NotFound(*from))?;

        if sender_balance < amount {
            return Err(AccountError::InsufficientBalance {
                address: *from,
                balance: sender_balance,
                amount,
            });
        }

        if from == to {
            return Ok(());
        }

        let recipient_balance = accounts.get(to).map_or(0, |account| account.balance);
        let credited = recipient_balance
            .checked_add(amount)
            .ok_or(AccountError::BalanceOverflow(*to))?;

        if let Some(sender) = accounts.get_mut(from) {
            sender.balance = sender_balance - amount;
        }
        accounts.insert(
            *to,
            Account {
                address: *to,
                balance: credited,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[tokio::test]
    async fn test_transfer_success() {
        let state = AccountState::new();
        let a = KeyPair::generate().address();
        let b = KeyPair::generate().address();
        state.create_with_balance(a, 1_000_000).await;

        state.transfer(&a, &b, 1_000).await.unwrap();
        assert_eq!(state.get_balance(&a).await.unwrap(), 999_000);
        assert_eq!(state.get_balance(&b).await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn test_transfer_from_unknown_account() {
        let state = AccountState::new();
        let a = KeyPair::generate().address();
        let b = KeyPair::generate().address();

        assert_eq!(
            state.transfer(&a, &b, 1).await,
            Err(AccountError::NotFound(a))
        );
        assert!(state.get(&b).await.is_err());
    }

    #[tokio::test]
    async fn test_transfer_insufficient_balance() {
        let state = AccountState::new();
        let b = KeyPair::generate().address();
        let c = KeyPair::generate().address();
        state.create_with_balance(b, 1_000).await;

        let err = state.transfer(&b, &c, 2_000).await.unwrap_err();
        assert!(matches!(err, AccountError::InsufficientBalance { .. }));
        assert_eq!(state.get_balance(&b).await.unwrap(), 1_000);
        assert!(matches!(
            state.get_balance(&c).await,
            Err(AccountError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_overflow_leaves_balances() {
        let state = AccountState::new();
        let a = KeyPair::generate().address();
        let b = KeyPair::generate().address();
        state.create_with_balance(a, 10).await;
        state.create_with_balance(b, u64::MAX).await;

        assert_eq!(
            state.transfer(&a, &b, 10).await,
            Err(AccountError::BalanceOverflow(b))
        );
        assert_eq!(state.get_balance(&a).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_create_keeps_existing() {
        let state = AccountState::new();
        let a = KeyPair::generate().address();
        state.create_with_balance(a, 7).await;
        assert_eq!(state.create(a).await.balance, 7);
        assert_eq!(state.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_transfers() {
        let state = std::sync::Arc::new(AccountState::new());
        let a = KeyPair::generate().address();
        let b = KeyPair::generate().address();
        state.create_with_balance(a, 100).await;

        let mut tasks = Vec::new();
        for _ in 0..100 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                state.transfer(&a, &b, 1).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(state.get_balance(&a).await.unwrap(), 0);
        assert_eq!(state.get_balance(&b).await.unwrap(), 100);
    }
}
