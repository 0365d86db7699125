//! Registered key sources and the current key index.
//!
//! # Concurrency
//!
//! The index is an immutable snapshot published through [`ArcSwap`]. Lookups
//! load the current snapshot without locking. A reload builds a complete new
//! snapshot from every source and publishes it with a single pointer swap, so
//! readers see either the old key set or the new one, never a mix.
//!
//! Reloads are serialised by an async mutex and numbered when they start. A
//! caller that missed in the index reuses a reload only if that reload
//! started after the caller's lookup; a reload already in flight at the time
//! of the miss may have fetched its origin too early to see a rotated key.
//! Such a caller reloads again once the lock is free.

use super::{build_key_source, KeyLoadError, KeySource, KeySourceConfig, LoadedKey};
use crate::observability::metrics;
use arc_swap::ArcSwap;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::instrument;

/// Keys of one completed reload, indexed by `kid` and by `x5t`.
#[derive(Default)]
struct KeyIndex {
    by_kid: HashMap<String, Arc<LoadedKey>>,
    by_x5t: HashMap<String, Arc<LoadedKey>>,
    key_count: usize,
}

impl KeyIndex {
    fn build(keys: Vec<LoadedKey>) -> Self {
        let mut index = KeyIndex {
            key_count: keys.len(),
            ..KeyIndex::default()
        };

        for key in keys {
            let key = Arc::new(key);
            if let Some(kid) = key.kid() {
                if index.by_kid.insert(kid.to_string(), Arc::clone(&key)).is_some() {
                    tracing::debug!(target: "guard.keys.loader", kid = %kid, "Duplicate kid, keeping the last one loaded");
                }
            }
            if let Some(x5t) = key.x5t() {
                index.by_x5t.insert(x5t.to_string(), Arc::clone(&key));
            }
        }

        index
    }

    fn lookup(&self, kid: &str, x5t: Option<&str>) -> Option<Arc<LoadedKey>> {
        self.by_kid
            .get(kid)
            .or_else(|| x5t.and_then(|x5t| self.by_x5t.get(x5t)))
            .cloned()
    }
}

/// Key cache over a set of [`KeySource`]s.
pub struct PublicKeyLoader {
    sources: ArcSwap<Vec<Arc<dyn KeySource>>>,
    index: ArcSwap<KeyIndex>,
    reload_lock: Mutex<()>,
    reloads_started: AtomicU64,
}

impl Default for PublicKeyLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl PublicKeyLoader {
    pub fn new() -> Self {
        Self {
            sources: ArcSwap::from_pointee(Vec::new()),
            index: ArcSwap::from_pointee(KeyIndex::default()),
            reload_lock: Mutex::new(()),
            reloads_started: AtomicU64::new(0),
        }
    }

    /// Add a source and reload every source, including the new one.
    ///
    /// Returns once the reload has finished. The source stays registered
    /// when the reload fails; the next cache miss retries it.
    ///
    /// # Errors
    ///
    /// Returns the first source failure of the reload.
    pub async fn register_source(&self, source: Arc<dyn KeySource>) -> Result<usize, KeyLoadError> {
        let origin = source.origin();
        self.sources.rcu(|current| {
            let mut next = current.to_vec();
            next.push(Arc::clone(&source));
            next
        });

        tracing::info!(
            target: "guard.keys.loader",
            kind = %origin.kind,
            location = %origin.location,
            "Key source registered"
        );

        self.reload().await
    }

    /// Reload keys from every registered source.
    ///
    /// Sources are queried concurrently. If any of them fails, the reload is
    /// aborted and the previous index stays published.
    ///
    /// # Errors
    ///
    /// Returns the first source failure.
    pub async fn reload(&self) -> Result<usize, KeyLoadError> {
        let _guard = self.reload_lock.lock().await;
        self.reload_locked().await
    }

    /// Find a key by `kid`, falling back to `x5t`. Never triggers a reload.
    pub fn lookup(&self, kid: &str, x5t: Option<&str>) -> Option<Arc<LoadedKey>> {
        self.index.load().lookup(kid, x5t)
    }

    /// Find a key, reloading at most once on a miss.
    #[instrument(skip_all, fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str, x5t: Option<&str>) -> Option<Arc<LoadedKey>> {
        let seen_started = self.reloads_started.load(Ordering::Acquire);
        if let Some(key) = self.lookup(kid, x5t) {
            return Some(key);
        }

        {
            let _guard = self.reload_lock.lock().await;
            // With the lock held, every reload counted here has finished.
            if self.reloads_started.load(Ordering::Acquire) == seen_started {
                tracing::debug!(target: "guard.keys.loader", kid = %kid, "Key not cached, reloading");
                if let Err(e) = self.reload_locked().await {
                    tracing::warn!(target: "guard.keys.loader", kid = %kid, error = %e, "Reload on cache miss failed");
                }
            } else {
                tracing::debug!(target: "guard.keys.loader", kid = %kid, "Key not cached, reusing concurrent reload");
            }
        }

        let key = self.lookup(kid, x5t);
        if key.is_none() {
            tracing::warn!(target: "guard.keys.loader", kid = %kid, "Key not found after reload");
        }
        key
    }

    /// Number of keys in the current index.
    pub fn key_count(&self) -> usize {
        self.index.load().key_count
    }

    pub fn source_count(&self) -> usize {
        self.sources.load().len()
    }

    /// Must be called with `reload_lock` held.
    async fn reload_locked(&self) -> Result<usize, KeyLoadError> {
        self.reloads_started.fetch_add(1, Ordering::AcqRel);
        let sources = self.sources.load_full();
        let start = Instant::now();

        let results = join_all(sources.iter().map(|source| async move {
            (source.origin(), source.load_keys().await)
        }))
        .await;

        let mut keys = Vec::new();
        let mut failure = None;
        for (origin, result) in results {
            match result {
                Ok(mut loaded) => keys.append(&mut loaded),
                Err(e) => {
                    tracing::warn!(
                        target: "guard.keys.loader",
                        kind = %origin.kind,
                        location = %origin.location,
                        error = %e,
                        "Key source failed to load"
                    );
                    failure.get_or_insert(e);
                }
            }
        }

        let outcome = match failure {
            Some(e) => {
                metrics::record_key_reload("error", start.elapsed());
                tracing::warn!(
                    target: "guard.keys.loader",
                    "Key reload aborted, keeping previous key set"
                );
                Err(e)
            }
            None => {
                let index = KeyIndex::build(keys);
                let key_count = index.key_count;
                self.index.store(Arc::new(index));

                metrics::record_key_reload("success", start.elapsed());
                metrics::set_loaded_keys(key_count);
                tracing::info!(
                    target: "guard.keys.loader",
                    key_count,
                    source_count = sources.len(),
                    "Key index reloaded"
                );
                Ok(key_count)
            }
        };

        outcome
    }
}

/// Build and register every configured source.
///
/// A source whose initial reload fails stays registered and is retried on
/// the next cache miss.
///
/// # Errors
///
/// Returns `KeyLoadError::InvalidLocation` for a source whose location is not
/// a URL. Load failures are logged, not returned.
pub async fn register_configured_sources(
    loader: &PublicKeyLoader,
    configs: &[KeySourceConfig],
    http: &reqwest::Client,
) -> Result<(), KeyLoadError> {
    for config in configs {
        let source = build_key_source(config, http.clone())?;
        if let Err(e) = loader.register_source(source).await {
            tracing::warn!(
                target: "guard.keys.loader",
                kind = %config.kind,
                location = %config.location,
                error = %e,
                "Initial key load failed, will retry on demand"
            );
        }
    }
    Ok(())
}
