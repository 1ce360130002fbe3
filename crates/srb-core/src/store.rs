//! State store port + in-memory implementation.
//!
//! Every piece of registry / limiter / ledger state is expressed through
//! five KV primitives, so the backing technology (memory map, relational
//! table, remote cache) is swappable without touching the engine.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use crate::Result;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Atomically add 1 to the integer at `key` (absent counts as 0) and
    /// return the new value.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// After `ttl` the key behaves as absent.
    async fn expire_after(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Keys (not values) currently live under `prefix`.
    async fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Per-key async mutex map.
///
/// Compound read-modify-write sequences (start-dialog, window bump, ledger
/// add) take the lock for their key first, which is what makes them atomic
/// against concurrent delivery of messages for the same user.
#[derive(Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory `StateStore`, the deployment default.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(e) if e.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(e) => Ok(Some(e.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let current = match entries.get(key) {
            Some(e) if !e.is_expired(now) => e.value.parse::<i64>().unwrap_or(0),
            _ => 0,
        };
        let next = current + 1;

        // A plain increment clears any pending expiry, matching set().
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn expire_after(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if let Some(e) = entries.get_mut(key) {
            e.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| !e.is_expired(now));

        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn increment_counts_from_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("n").await.unwrap(), 1);
        assert_eq!(store.increment("n").await.unwrap(), 2);
        store.set("n", "41").await.unwrap();
        assert_eq!(store.increment("n").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn expired_keys_behave_as_absent() {
        let store = MemoryStore::new();
        store.set("gone", "x").await.unwrap();
        store.expire_after("gone", Duration::ZERO).await.unwrap();

        assert_eq!(store.get("gone").await.unwrap(), None);
        assert!(store.scan_by_prefix("go").await.unwrap().is_empty());
        // Re-creating after expiry starts fresh.
        assert_eq!(store.increment("gone").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scan_filters_by_prefix_and_sorts() {
        let store = MemoryStore::new();
        store.set("user:2", "b").await.unwrap();
        store.set("user:1", "a").await.unwrap();
        store.set("session:1", "s").await.unwrap();

        let keys = store.scan_by_prefix("user:").await.unwrap();
        assert_eq!(keys, vec!["user:1".to_string(), "user:2".to_string()]);
    }

    #[tokio::test]
    async fn keyed_locks_serialize_same_key() {
        let locks = Arc::new(KeyedLocks::default());
        let counter = Arc::new(Mutex::new(0u32));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("same").await;
                let mut c = counter.lock().await;
                let read = *c;
                tokio::task::yield_now().await;
                *c = read + 1;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*counter.lock().await, 16);
    }
}
