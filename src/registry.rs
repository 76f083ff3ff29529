//! Named cache instances, created once per name and shared by every
//! operation that refers to the name.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use strata_core::{Cache, CacheBuilder, UNBOUNDED};

use crate::config::EffectivePolicy;
use crate::expiry::CacheKeyExpiry;
use crate::invoker::{ContextKey, InvokerLoader};
use crate::listener::RemovalLogger;

/// One engine cache addressed by name.
pub struct NamedCacheInstance<K, V> {
    name: String,
    cache: Cache<ContextKey<K, V>, V>,
}

impl<K, V> fmt::Debug for NamedCacheInstance<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCacheInstance")
            .field("name", &self.name)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<K, V> NamedCacheInstance<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache(&self) -> &Cache<ContextKey<K, V>, V> {
        &self.cache
    }

    /// Current maximum size, `None` when unbounded.
    pub fn maximum(&self) -> Option<u64> {
        Some(self.cache.policy().maximum()).filter(|max| *max != UNBOUNDED)
    }

    /// Current refresh interval, `None` when refresh is disabled.
    pub fn refresh_after_write(&self) -> Option<Duration> {
        self.cache.policy().refresh_after_write()
    }
}

/// Maps cache names to their engine instance.
///
/// Instances are created lazily, exactly once per name, and live as long as
/// the registry. Their size bound and refresh interval only ever move in one
/// direction through [`widen`](Self::widen).
pub struct CacheRegistry<K, V> {
    caches: RwLock<HashMap<String, Arc<NamedCacheInstance<K, V>>>>,
}

impl<K, V> Default for CacheRegistry<K, V> {
    fn default() -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> fmt::Debug for CacheRegistry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caches = self.caches.read();
        f.debug_struct("CacheRegistry")
            .field("names", &caches.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K, V> CacheRegistry<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instance for `name`, creating it from `policy` on first use.
    ///
    /// Concurrent first calls for one name create a single instance; the
    /// policy of the caller that wins the creation configures it. Callers are
    /// expected to [`widen`](Self::widen) the returned instance with their own
    /// policy afterwards.
    pub fn get_or_create(&self, name: &str, policy: &EffectivePolicy) -> Arc<NamedCacheInstance<K, V>> {
        if let Some(instance) = self.caches.read().get(name) {
            return Arc::clone(instance);
        }

        let mut caches = self.caches.write();
        let instance = caches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Self::create(name, policy)));
        Arc::clone(instance)
    }

    /// Applies `policy` to a live instance: the maximum size is raised if the
    /// policy asks for more, the refresh interval is lowered if the policy asks
    /// for a shorter one. Neither is ever moved the other way.
    pub fn widen(&self, instance: &NamedCacheInstance<K, V>, policy: &EffectivePolicy) {
        let engine = instance.cache.policy();
        if let Some(maximum) = policy.maximum() {
            if engine.grow_maximum(maximum) {
                tracing::debug!(cache = %instance.name, maximum, "raised maximum size");
            }
        }
        if let Some(interval) = policy.refresh_interval() {
            if engine.tighten_refresh_after_write(interval) {
                tracing::debug!(
                    cache = %instance.name,
                    refresh_ms = interval.as_millis(),
                    "lowered refresh interval"
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<NamedCacheInstance<K, V>>> {
        self.caches.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn create(name: &str, policy: &EffectivePolicy) -> NamedCacheInstance<K, V> {
        let mut builder: CacheBuilder<ContextKey<K, V>, V> = Cache::builder()
            .expire_after(CacheKeyExpiry::<K, V>::new())
            .loader(InvokerLoader::<K, V>::new())
            .removal_listener(RemovalLogger::<K, V>::new(name));
        if let Some(maximum) = policy.maximum() {
            builder = builder.maximum_size(maximum);
        }
        if let Some(interval) = policy.refresh_interval() {
            builder = builder.refresh_after_write(interval);
        }
        // The executor is fixed for the instance's lifetime.
        if let Some(executor) = &policy.executor {
            builder = builder.executor(executor.executor());
        }

        tracing::debug!(
            cache = name,
            maximum = ?policy.maximum(),
            refresh_ms = ?policy.refresh_interval().map(|d| d.as_millis()),
            executor = ?policy.executor.as_ref().map(|e| e.name()),
            "creating cache"
        );
        NamedCacheInstance {
            name: name.to_string(),
            cache: builder.build(),
        }
    }
}
