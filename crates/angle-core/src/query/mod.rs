//! Cache-aware reads and mutations over the RPC client.
//!
//! Reads are cached by hierarchical [`QueryKey`] and served from cache until
//! they go stale or a mutation invalidates a matching key prefix.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};

const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// Hierarchical cache key, e.g. `["items", "<id>", "images"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    fetched_at: Instant,
}

/// Shared query cache. Cloning shares the same cache.
#[derive(Clone)]
pub struct QueryClient {
    entries: Arc<Mutex<HashMap<QueryKey, CacheEntry>>>,
    stale_after: Duration,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER)
    }
}

impl QueryClient {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            stale_after,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<QueryKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh cached value for `key`, if any.
    pub fn cached<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let entries = self.entries();
        let entry = entries.get(key)?;
        if entry.fetched_at.elapsed() > self.stale_after {
            return None;
        }
        Arc::clone(&entry.value).downcast::<T>().ok()
    }

    /// Return the cached value or run `fetcher` and cache its success.
    ///
    /// Failures are returned to the caller and never cached.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.cached::<T>(&key) {
            tracing::debug!(?key, "Query cache hit");
            return Ok(value);
        }

        tracing::debug!(?key, "Query cache miss; fetching");
        let value = Arc::new(fetcher().await?);
        self.set(key, Arc::clone(&value));
        Ok(value)
    }

    /// Seed or overwrite a cache entry.
    pub fn set<T: Send + Sync + 'static>(&self, key: QueryKey, value: Arc<T>) {
        self.entries().insert(
            key,
            CacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop every entry whose key starts with `prefix`; returns how many.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        tracing::debug!(?prefix, removed, "Invalidated queries");
        removed
    }

    /// Run a write, then apply its invalidations and lifecycle callbacks.
    pub async fn mutate<T, Fut>(&self, mutation: Mutation<T>, request: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let Mutation {
            invalidates,
            on_success,
            on_error,
            on_settled,
        } = mutation;

        let result = request.await;
        match &result {
            Ok(value) => {
                for key in &invalidates {
                    self.invalidate(key);
                }
                if let Some(callback) = on_success {
                    callback(value);
                }
            }
            Err(error) => {
                if let Some(callback) = on_error {
                    callback(error);
                }
            }
        }
        if let Some(callback) = on_settled {
            callback();
        }
        result
    }
}

type SuccessCallback<T> = Box<dyn FnOnce(&T) + Send>;
type ErrorCallback = Box<dyn FnOnce(&Error) + Send>;
type SettledCallback = Box<dyn FnOnce() + Send>;

/// Options for one mutation run.
pub struct Mutation<T> {
    invalidates: Vec<QueryKey>,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
    on_settled: Option<SettledCallback>,
}

impl<T> Default for Mutation<T> {
    fn default() -> Self {
        Self {
            invalidates: Vec::new(),
            on_success: None,
            on_error: None,
            on_settled: None,
        }
    }
}

impl<T> Mutation<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate `prefix` after a successful write.
    #[must_use]
    pub fn invalidates(mut self, prefix: QueryKey) -> Self {
        self.invalidates.push(prefix);
        self
    }

    #[must_use]
    pub fn on_success(mut self, callback: impl FnOnce(&T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: impl FnOnce(&Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_settled(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_settled = Some(Box::new(callback));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn fetch_serves_cache_until_invalidated() {
        let client = QueryClient::default();
        let calls = AtomicUsize::new(0);
        let key = QueryKey::new(["wallet"]);

        for _ in 0..3 {
            let value = client
                .fetch(key.clone(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42_u32)
                })
                .await
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(client.invalidate(&QueryKey::new(["wallet"])), 1);
        client
            .fetch(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(43_u32)
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_go_stale() {
        let client = QueryClient::new(Duration::from_secs(5));
        let key = QueryKey::new(["items", "a"]);
        client.set(key.clone(), Arc::new("cached".to_string()));
        assert!(client.cached::<String>(&key).is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(client.cached::<String>(&key).is_none());
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let client = QueryClient::default();
        let key = QueryKey::new(["items"]);
        let error = client
            .fetch::<u32, _, _>(key.clone(), || async {
                Err(Error::Api("down".to_string()))
            })
            .await;
        assert!(error.is_err());
        assert!(client.cached::<u32>(&key).is_none());
    }

    #[test]
    fn invalidate_matches_prefix_only() {
        let client = QueryClient::default();
        client.set(QueryKey::new(["items", "a", "images"]), Arc::new(1_u8));
        client.set(QueryKey::new(["items", "b"]), Arc::new(2_u8));
        client.set(QueryKey::new(["wallet"]), Arc::new(3_u8));

        assert_eq!(client.invalidate(&QueryKey::new(["items"])), 2);
        assert!(client.cached::<u8>(&QueryKey::new(["wallet"])).is_some());
    }

    #[tokio::test]
    async fn mutate_runs_callbacks_and_invalidates() {
        let client = QueryClient::default();
        client.set(QueryKey::new(["wallet"]), Arc::new(10_u32));
        let settled = Arc::new(AtomicUsize::new(0));
        let succeeded = Arc::new(AtomicUsize::new(0));

        let mutation = Mutation::new()
            .invalidates(QueryKey::new(["wallet"]))
            .on_success({
                let succeeded = Arc::clone(&succeeded);
                move |value: &u32| {
                    succeeded.store(*value as usize, Ordering::SeqCst);
                }
            })
            .on_settled({
                let settled = Arc::clone(&settled);
                move || {
                    settled.fetch_add(1, Ordering::SeqCst);
                }
            });

        let value = client.mutate(mutation, async { Ok(5_u32) }).await.unwrap();
        assert_eq!(value, 5);
        assert_eq!(succeeded.load(Ordering::SeqCst), 5);
        assert_eq!(settled.load(Ordering::SeqCst), 1);
        assert!(client.cached::<u32>(&QueryKey::new(["wallet"])).is_none());
    }

    #[tokio::test]
    async fn failed_mutation_keeps_cache() {
        let client = QueryClient::default();
        client.set(QueryKey::new(["wallet"]), Arc::new(10_u32));
        let errors = Arc::new(AtomicUsize::new(0));

        let mutation = Mutation::<u32>::new()
            .invalidates(QueryKey::new(["wallet"]))
            .on_error({
                let errors = Arc::clone(&errors);
                move |_| {
                    errors.fetch_add(1, Ordering::SeqCst);
                }
            });

        let result = client
            .mutate(mutation, async { Err(Error::Api("rejected".to_string())) })
            .await;
        assert!(result.is_err());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(client.cached::<u32>(&QueryKey::new(["wallet"])).is_some());
    }
}
