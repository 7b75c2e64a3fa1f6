//! In-process mutual exclusion per account.
//!
//! The engine holds an account's lock for the whole of one operation, before it
//! takes a pooled connection. Operations on the same account therefore queue
//! without pinning connections, while different accounts never contend here.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::AccountId;

type LockTable = DashMap<AccountId, Arc<Mutex<()>>>;

#[derive(Debug, Clone, Default)]
pub struct AccountLocks {
    table: Arc<LockTable>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`. Waiters are served in FIFO order.
    pub async fn lock(&self, id: AccountId) -> AccountGuard {
        // The shard guard must be released before awaiting.
        let mutex = self.table.entry(id).or_default().value().clone();
        let guard = mutex.lock_owned().await;
        AccountGuard {
            id,
            guard: Some(guard),
            table: Arc::clone(&self.table),
        }
    }

    /// Number of accounts currently locked or waited on.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Held for the duration of one operation; releases on drop.
#[derive(Debug)]
pub struct AccountGuard {
    id: AccountId,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<LockTable>,
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the table itself still references an idle entry.
        self.table
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_same_account_is_exclusive() {
        let locks = AccountLocks::new();
        let id = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let locks = locks.clone();
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(id).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_accounts_do_not_block() {
        let locks = AccountLocks::new();
        let _a = locks.lock(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(Uuid::new_v4())).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_idle_entries_are_removed() {
        let locks = AccountLocks::new();
        let id = Uuid::new_v4();
        {
            let _guard = locks.lock(id).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }
}
