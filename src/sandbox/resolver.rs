//! Sandbox resolver: backend selection, instance caching, and deduplication
//! of concurrent creation requests.
//!
//! The cache maps an identity key to a shared creation future. A second
//! caller arriving while creation is still in flight awaits the same future
//! instead of creating a second backend; a caller arriving after completion
//! gets the cached instance. On creation failure the entry is evicted before
//! the error propagates, so the next call retries from scratch instead of
//! replaying a poisoned future.
//!
//! The resolver is an ordinary object owning its cache as an instance field.
//! Tests construct isolated resolvers; the host process constructs one at its
//! composition root and passes it by reference.

use super::local::LocalBackend;
use super::remote::{RemoteBackend, RemoteSettings};
use super::{BackendKind, Sandbox, SandboxBackend};
use crate::config::{EnvSettings, SandboxConfig};
use crate::error::SandboxError;
use crate::keepalive::{Heartbeat, KeyValueStore};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How the resolver builds sandboxes for this process.
#[derive(Clone)]
pub struct ResolverOptions {
    pub backend: BackendKind,
    pub remote: Option<RemoteSettings>,
    pub store: Option<Arc<dyn KeyValueStore>>,
}

impl ResolverOptions {
    /// Local-only resolution; no credentials, no shared store.
    pub fn local() -> Self {
        Self {
            backend: BackendKind::Local,
            remote: None,
            store: None,
        }
    }

    pub fn remote(settings: RemoteSettings, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend: BackendKind::Remote,
            remote: Some(settings),
            store: Some(store),
        }
    }

    /// Provider auto-selection: remote when an API key is configured in the
    /// environment, local otherwise.
    pub fn from_env(settings: &EnvSettings, store: Option<Arc<dyn KeyValueStore>>) -> Self {
        match &settings.api_key {
            Some(api_key) => {
                let mut remote = RemoteSettings::new(api_key.clone());
                if let Some(base) = &settings.api_base {
                    remote.api_base = base.clone();
                }
                Self {
                    backend: BackendKind::Remote,
                    remote: Some(remote),
                    store,
                }
            }
            None => Self::local(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: BackendKind,
    workspace: Option<PathBuf>,
    sandbox_id: Option<String>,
}

type CreationFuture = Shared<BoxFuture<'static, Result<Sandbox, SandboxError>>>;

struct CacheSlot {
    generation: u64,
    future: CreationFuture,
}

/// Builds and caches one sandbox per identity key.
pub struct SandboxResolver {
    options: ResolverOptions,
    cache: Mutex<HashMap<CacheKey, CacheSlot>>,
    generation: AtomicU64,
}

impl SandboxResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self {
            options,
            cache: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.options.backend
    }

    fn cache_key(&self, config: &SandboxConfig) -> CacheKey {
        match self.options.backend {
            BackendKind::Local => CacheKey {
                kind: BackendKind::Local,
                workspace: config.workspace_path.clone(),
                sandbox_id: config.sandbox_id.clone(),
            },
            // Remote identity is the container id alone; the workspace path
            // is a location inside the container, not part of its identity.
            BackendKind::Remote => CacheKey {
                kind: BackendKind::Remote,
                workspace: None,
                sandbox_id: config.sandbox_id.clone(),
            },
        }
    }

    /// Return the sandbox for this configuration, creating it at most once
    /// per identity key across all concurrent callers.
    pub async fn resolve(&self, config: &SandboxConfig) -> Result<Sandbox, SandboxError> {
        self.check_configuration()?;

        let key = self.cache_key(config);
        let (generation, future) = {
            let mut cache = self.cache.lock();
            match cache.get(&key) {
                Some(slot) => (slot.generation, slot.future.clone()),
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let future = creation_future(self.options.clone(), config.clone());
                    cache.insert(
                        key.clone(),
                        CacheSlot {
                            generation,
                            future: future.clone(),
                        },
                    );
                    (generation, future)
                }
            }
        };

        match future.await {
            Ok(sandbox) => Ok(sandbox),
            Err(e) => {
                // Evict only our own slot; a refresh may have replaced it
                // while we were awaiting.
                let mut cache = self.cache.lock();
                if cache.get(&key).map(|slot| slot.generation) == Some(generation) {
                    cache.remove(&key);
                }
                Err(e)
            }
        }
    }

    /// The cached sandbox for this configuration, if creation has already
    /// completed successfully. Never triggers creation.
    pub fn peek(&self, config: &SandboxConfig) -> Option<Sandbox> {
        let key = self.cache_key(config);
        let cache = self.cache.lock();
        cache
            .get(&key)
            .and_then(|slot| slot.future.peek())
            .and_then(|result| result.as_ref().ok().cloned())
    }

    /// Drop the cache entry for this configuration, returning the sandbox it
    /// held if creation had completed. The caller decides whether to
    /// terminate the instance.
    pub fn evict(&self, config: &SandboxConfig) -> Option<Sandbox> {
        let key = self.cache_key(config);
        let slot = self.cache.lock().remove(&key)?;
        slot.future
            .peek()
            .and_then(|result| result.as_ref().ok().cloned())
    }

    fn check_configuration(&self) -> Result<(), SandboxError> {
        if self.options.backend == BackendKind::Remote {
            match &self.options.remote {
                Some(remote) if !remote.api_key.trim().is_empty() => {}
                _ => return Err(SandboxError::api_key_missing()),
            }
            if self.options.store.is_none() {
                return Err(SandboxError::secondary_memory_missing());
            }
        }
        Ok(())
    }
}

fn creation_future(options: ResolverOptions, config: SandboxConfig) -> CreationFuture {
    async move { create(options, config).await }.boxed().shared()
}

async fn create(options: ResolverOptions, config: SandboxConfig) -> Result<Sandbox, SandboxError> {
    match options.backend {
        BackendKind::Local => {
            let backend = LocalBackend::create(&config)?;
            tracing::debug!(sandbox_id = %backend.sandbox_id(), "created local sandbox");
            Ok(Sandbox::new(config, Arc::new(backend), None))
        }
        BackendKind::Remote => {
            // Checked in resolve(); kept here so a creation future cannot
            // outlive a valid configuration by accident.
            let settings = options.remote.ok_or_else(SandboxError::api_key_missing)?;
            let store = options
                .store
                .ok_or_else(SandboxError::secondary_memory_missing)?;

            let backend = RemoteBackend::create(&settings, &config).await?;
            let heartbeat = Heartbeat::new(store, &backend.sandbox_id(), config.auto_stop_delay);
            // Cover the container before the first operation lands.
            heartbeat.beat_now().await;
            tracing::debug!(sandbox_id = %backend.sandbox_id(), "created remote sandbox");
            Ok(Sandbox::new(config, Arc::new(backend), Some(heartbeat)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_without_api_key_is_a_configuration_error() {
        let resolver = SandboxResolver::new(ResolverOptions {
            backend: BackendKind::Remote,
            remote: None,
            store: None,
        });
        let err = resolver.check_configuration().unwrap_err();
        assert_eq!(err.code(), Some(crate::error::SANDBOX_API_KEY_MISSING));
    }

    #[test]
    fn remote_without_store_is_a_configuration_error() {
        let resolver = SandboxResolver::new(ResolverOptions {
            backend: BackendKind::Remote,
            remote: Some(RemoteSettings::new("key")),
            store: None,
        });
        let err = resolver.check_configuration().unwrap_err();
        assert_eq!(err.code(), Some(crate::error::SECONDARY_MEMORY_MISSING));
    }

    #[test]
    fn local_cache_key_includes_workspace_and_id() {
        let resolver = SandboxResolver::new(ResolverOptions::local());
        let a = resolver.cache_key(
            &SandboxConfig::default()
                .with_workspace_path("/tmp/a")
                .with_sandbox_id("one"),
        );
        let b = resolver.cache_key(
            &SandboxConfig::default()
                .with_workspace_path("/tmp/a")
                .with_sandbox_id("two"),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn remote_cache_key_ignores_workspace() {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(crate::keepalive::InMemoryKeyValueStore::new());
        let resolver = SandboxResolver::new(ResolverOptions::remote(
            RemoteSettings::new("key"),
            store,
        ));
        let a = resolver.cache_key(
            &SandboxConfig::default()
                .with_workspace_path("/a")
                .with_sandbox_id("same"),
        );
        let b = resolver.cache_key(
            &SandboxConfig::default()
                .with_workspace_path("/b")
                .with_sandbox_id("same"),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn from_env_selects_remote_only_with_api_key() {
        let env = EnvSettings {
            api_key: Some("k".to_string()),
            api_base: Some("http://localhost:1".to_string()),
            ..EnvSettings::default()
        };
        let options = ResolverOptions::from_env(&env, None);
        assert_eq!(options.backend, BackendKind::Remote);
        assert_eq!(
            options.remote.unwrap().api_base,
            "http://localhost:1"
        );

        let options = ResolverOptions::from_env(&EnvSettings::default(), None);
        assert_eq!(options.backend, BackendKind::Local);
    }
}
