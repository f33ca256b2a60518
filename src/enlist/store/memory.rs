use super::{Account, AccountStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Accounts {
    next_id: i64,
    by_email: HashMap<String, Account>,
}

/// In-process store for local runs and tests.
///
/// The existence check and the insert happen under one lock, which plays the
/// role the unique index plays in PostgreSQL.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<Accounts>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.accounts.lock().await.by_email.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn register(&self, email: &str, secret_hash: &str) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.lock().await;
        if accounts.by_email.contains_key(email) {
            return Err(StoreError::DuplicateEmail);
        }

        accounts.next_id += 1;
        let account = Account {
            id: accounts.next_id,
            email: email.to_string(),
            secret_hash: secret_hash.to_string(),
        };
        accounts
            .by_email
            .insert(email.to_string(), account.clone());

        Ok(account)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.lock().await.by_email.get(email).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
