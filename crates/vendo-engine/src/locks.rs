//! # Keyed Locks
//!
//! One async mutex per pool, account, coupon code and order.
//!
//! ```text
//! place_order(account 7, links, HEMAT10)
//!   lock_all([account:7, coupon:HEMAT10, pool:links])   ← sorted, deduplicated
//!   db.begin()                                           ← only after the locks
//!   ... one write transaction ...
//!   commit, release
//! ```
//! Every caller takes its keys through [`KeyedLocks::lock_all`], which sorts
//! them first, so two callers can never wait on each other in a cycle.
//! Locks are always taken before a transaction begins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

use vendo_core::AccountId;

/// Map size above which idle entries are pruned on the next lock.
const PRUNE_THRESHOLD: usize = 1024;

pub fn pool_key(pool: &str) -> String {
    format!("pool:{}", pool)
}

pub fn account_key(account_id: AccountId) -> String {
    format!("account:{}", account_id)
}

pub fn coupon_key(code: &str) -> String {
    format!("coupon:{}", code)
}

pub fn order_key(order_id: i64) -> String {
    format!("order:{}", order_id)
}

/// Guards held for a set of keys; released on drop.
#[derive(Debug)]
pub struct LockSet {
    _guards: Vec<OwnedMutexGuard<()>>,
}

#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks a single key.
    pub async fn lock(&self, key: impl Into<String>) -> LockSet {
        self.lock_all(vec![key.into()]).await
    }

    /// Locks every key in sorted order.
    pub async fn lock_all(&self, mut keys: Vec<String>) -> LockSet {
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let mutex = self.entry(&key);
            trace!(key = %key, "Waiting for lock");
            guards.push(mutex.lock_owned().await);
        }

        LockSet { _guards: guards }
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if map.len() > PRUNE_THRESHOLD {
            map.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        }

        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicI64::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            handles.push(tokio::spawn(async move {
                let _held = locks.lock(pool_key("links")).await;
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_opposite_orders_do_not_deadlock() {
        let locks = Arc::new(KeyedLocks::new());
        let a = {
            let locks = locks.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let _held = locks.lock_all(vec![account_key(1), pool_key("links")]).await;
                    tokio::task::yield_now().await;
                }
            })
        };
        let b = {
            let locks = locks.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let _held = locks.lock_all(vec![pool_key("links"), account_key(1)]).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_keys_lock_once() {
        let locks = KeyedLocks::new();
        let _held = locks.lock_all(vec![order_key(3), order_key(3)]).await;
        assert_eq!(locks.len(), 1);
    }
}
