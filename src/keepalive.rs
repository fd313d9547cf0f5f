//! Keep-alive leases for remote sandboxes.
//!
//! The remote container service reclaims idle containers. Because several
//! caller processes may share one container by sandbox id, liveness cannot be
//! tracked locally — it is written to a shared key-value store with a short
//! expiry and refreshed on every operation, so any caller's activity extends
//! the lease for all of them.
//!
//! The store itself is an external collaborator: callers inject an
//! `Arc<dyn KeyValueStore>` (Redis, Upstash, whatever the deployment uses).
//! [`InMemoryKeyValueStore`] ships for tests and single-process setups.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimal contract the heartbeat needs from the shared store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Lease key for a sandbox id.
pub fn lease_key(sandbox_id: &str) -> String {
    format!("sandbox:lease:{sandbox_id}")
}

/// Process-local store. Expiry is checked lazily on read.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((_, expires)) if *expires <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Fire-and-forget lease refresher for one sandbox id.
///
/// `beat()` never blocks the calling operation; a failed refresh is logged
/// and the next operation tries again.
#[derive(Clone)]
pub struct Heartbeat {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    ttl: Duration,
}

impl Heartbeat {
    pub fn new(kv: Arc<dyn KeyValueStore>, sandbox_id: &str, ttl: Duration) -> Self {
        Self {
            kv,
            key: lease_key(sandbox_id),
            ttl,
        }
    }

    pub fn beat(&self) {
        let kv = self.kv.clone();
        let key = self.key.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            let stamp = chrono::Utc::now().to_rfc3339();
            if let Err(e) = kv.set_with_expiry(&key, &stamp, ttl).await {
                tracing::warn!(key = %key, error = %e, "failed to refresh sandbox lease");
            }
        });
    }

    /// Refresh the lease and wait for the write to land. Used at creation
    /// time so the container is covered before the first operation.
    pub async fn beat_now(&self) {
        let stamp = chrono::Utc::now().to_rfc3339();
        if let Err(e) = self.kv.set_with_expiry(&self.key, &stamp, self.ttl).await {
            tracing::warn!(key = %self.key, error = %e, "failed to refresh sandbox lease");
        }
    }
}
