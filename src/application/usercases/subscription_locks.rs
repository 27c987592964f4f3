use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

use crate::domain::errors::{BillingError, BillingResult};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Keyed async mutex serializing work on one subscription inside this
/// process. Cross-process writers are serialized by the store.
#[derive(Debug, Clone)]
pub struct SubscriptionLocks {
    table: LockTable,
    timeout: Duration,
}

impl SubscriptionLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    pub async fn acquire(&self, key: &str) -> BillingResult<SubscriptionLockGuard> {
        let entry = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(key.to_string()).or_default())
        };

        match tokio::time::timeout(self.timeout, entry.lock_owned()).await {
            Ok(guard) => Ok(SubscriptionLockGuard {
                guard: Some(guard),
                key: key.to_string(),
                table: Arc::clone(&self.table),
            }),
            Err(_) => {
                warn!(
                    lock_key = %key,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "subscription_locks: timed out waiting for lock"
                );
                Err(BillingError::TransientStore(format!(
                    "timed out waiting for lock on {key}"
                )))
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub struct SubscriptionLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    table: LockTable,
}

impl Drop for SubscriptionLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the table still references the mutex: nobody holds or waits on it.
        if table
            .get(&self.key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            table.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_holder_times_out_while_first_holds_lock() {
        let locks = SubscriptionLocks::new(Duration::from_millis(20));
        let _first = locks.acquire("sub-1").await.unwrap();

        let err = locks.acquire("sub-1").await.err().unwrap();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let locks = SubscriptionLocks::new(Duration::from_millis(20));
        let _first = locks.acquire("sub-1").await.unwrap();
        assert!(locks.acquire("sub-2").await.is_ok());
    }

    #[tokio::test]
    async fn released_entries_are_removed() {
        let locks = SubscriptionLocks::new(Duration::from_millis(20));
        {
            let _guard = locks.acquire("sub-1").await.unwrap();
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
        assert!(locks.acquire("sub-1").await.is_ok());
    }

    #[tokio::test]
    async fn waiter_gets_lock_after_release() {
        let locks = SubscriptionLocks::new(Duration::from_millis(500));
        let first = locks.acquire("sub-1").await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("sub-1").await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(first);

        assert!(waiter.await.unwrap().is_ok());
    }
}
