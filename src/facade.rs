//! Plain cache API over a named instance.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::CacheError;
use crate::invoker::{ContextKey, OperationContext};
use crate::key::CacheKey;
use crate::registry::NamedCacheInstance;

/// A named cache seen through one call's [`OperationContext`].
///
/// Bare keys are wrapped into [`CacheKey`]s carrying that context before they
/// reach the engine, so every entry this facade creates expires and reloads
/// under the policy and invoker of the call that created it. Lookups only
/// compare the bare key, so facades with different contexts over the same
/// instance see the same entries.
pub struct KeyedCache<K, V> {
    instance: Arc<NamedCacheInstance<K, V>>,
    context: Arc<OperationContext<V>>,
}

impl<K, V> Clone for KeyedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            instance: Arc::clone(&self.instance),
            context: Arc::clone(&self.context),
        }
    }
}

impl<K, V> fmt::Debug for KeyedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedCache")
            .field("instance", &self.instance)
            .field("context", &self.context)
            .finish()
    }
}

impl<K, V> KeyedCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(instance: Arc<NamedCacheInstance<K, V>>, context: impl Into<Arc<OperationContext<V>>>) -> Self {
        Self {
            instance,
            context: context.into(),
        }
    }

    pub fn name(&self) -> &str {
        self.instance.name()
    }

    pub fn context(&self) -> &Arc<OperationContext<V>> {
        &self.context
    }

    pub fn instance(&self) -> &Arc<NamedCacheInstance<K, V>> {
        &self.instance
    }

    /// Wraps `key` with this facade's context.
    pub fn wrap(&self, key: K) -> ContextKey<K, V> {
        CacheKey::with_shared_context(key, Arc::clone(&self.context))
    }

    /// Returns the cached value, loading it through the context's invoker on
    /// a miss. `Ok(None)` when nothing is cached and nothing could be loaded.
    pub fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        self.get_cache_key(&self.wrap(key.clone()))
    }

    /// Like [`get`](Self::get) for a pre-built key, whose context is used
    /// unchanged.
    pub fn get_cache_key(&self, key: &ContextKey<K, V>) -> Result<Option<V>, CacheError> {
        self.instance.cache().get(key).map_err(CacheError::from_load)
    }

    /// Returns the cached value without loading. The read lifetime follows
    /// this facade's policy.
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        self.instance.cache().get_if_present_as(&self.wrap(key.clone()))
    }

    /// Returns the cached value or computes it with `f`. Concurrent callers
    /// for the same key wait for one computation.
    pub fn get_with<F, E>(&self, key: K, f: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        self.get_with_cache_key(self.wrap(key), f)
    }

    pub fn get_with_cache_key<F, E>(&self, key: ContextKey<K, V>, f: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        self.instance.cache().get_with(key, |k| f(k.key()))
    }

    pub fn put(&self, key: K, value: V) {
        self.put_cache_key(self.wrap(key), value);
    }

    pub fn put_cache_key(&self, key: ContextKey<K, V>, value: V) {
        self.instance.cache().insert(key, value);
    }

    /// Stores `value` unless a live entry exists, returning the existing value.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<V> {
        self.put_if_absent_cache_key(self.wrap(key), value)
    }

    pub fn put_if_absent_cache_key(&self, key: ContextKey<K, V>, value: V) -> Option<V> {
        self.instance.cache().put_if_absent(key, value)
    }

    pub fn evict(&self, key: &K) {
        self.instance.cache().invalidate(key);
    }

    /// Evicts `key`, reporting whether a live entry was removed.
    pub fn evict_if_present(&self, key: &K) -> bool {
        self.instance.cache().invalidate(key).is_some()
    }

    pub fn clear(&self) {
        self.instance.cache().invalidate_all();
    }

    pub fn contains(&self, key: &K) -> bool {
        self.instance.cache().contains_key(key)
    }

    /// Bare keys of all live entries.
    pub fn keys(&self) -> Vec<K> {
        self.instance
            .cache()
            .snapshot()
            .into_iter()
            .map(|(key, _)| key.into_key())
            .collect()
    }

    /// Live entries with their stored key objects.
    pub fn entries(&self) -> Vec<(ContextKey<K, V>, V)> {
        self.instance.cache().snapshot()
    }

    pub fn len(&self) -> usize {
        self.instance.cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instance.cache().is_empty()
    }

    /// Replaces the context of the stored key for `key` with this facade's
    /// context. Returns false if there is no live entry.
    ///
    /// The engine keeps the key object of the first write, and reloads go
    /// through its invoker. This moves the entry's reloads under this caller.
    pub fn update_context(&self, key: &K) -> bool {
        match self.instance.cache().key_of(key) {
            Some(stored) => {
                stored.set_context(Arc::clone(&self.context));
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectivePolicy;
    use crate::invocation::{Operation, OperationDescriptor, Value};
    use crate::invoker::{ArgumentStore, ReloadInvoker};
    use crate::registry::CacheRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn facade(registry: &CacheRegistry<String, String>, context: OperationContext<String>) -> KeyedCache<String, String> {
        let instance = registry.get_or_create("names", &context.policy);
        KeyedCache::new(instance, context)
    }

    fn loading_context(calls: Arc<AtomicUsize>, arg: &str) -> OperationContext<String> {
        let op = Operation::new(OperationDescriptor::new("Names", "lookup"), move |args: &[Value]| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("loaded:{}", args[0]))
        });
        let args: Arc<[Value]> = vec![Value::from(arg)].into();
        let invoker = ReloadInvoker::for_call(op, &args, false, &ArgumentStore::default());
        OperationContext::new(EffectivePolicy::default(), Some(invoker))
    }

    #[test]
    fn test_put_get_evict() {
        let registry = CacheRegistry::new();
        let cache = facade(&registry, OperationContext::default());

        cache.put("a".to_string(), "1".to_string());
        assert_eq!(cache.get_if_present(&"a".to_string()), Some("1".to_string()));
        assert_eq!(cache.get(&"a".to_string()).unwrap(), Some("1".to_string()));
        assert_eq!(cache.keys(), vec!["a".to_string()]);

        assert!(cache.evict_if_present(&"a".to_string()));
        assert!(!cache.evict_if_present(&"a".to_string()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_without_invoker_is_none() {
        let registry = CacheRegistry::new();
        let cache = facade(&registry, OperationContext::default());
        assert_eq!(cache.get(&"missing".to_string()).unwrap(), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_loads_through_invoker() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = CacheRegistry::new();
        let cache = facade(&registry, loading_context(Arc::clone(&calls), "x"));

        assert_eq!(cache.get(&"k".to_string()).unwrap(), Some("loaded:x".to_string()));
        assert_eq!(cache.get(&"k".to_string()).unwrap(), Some("loaded:x".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_put_if_absent_and_get_with() {
        let registry = CacheRegistry::new();
        let cache = facade(&registry, OperationContext::default());

        assert_eq!(cache.put_if_absent("k".to_string(), "first".to_string()), None);
        assert_eq!(
            cache.put_if_absent("k".to_string(), "second".to_string()),
            Some("first".to_string())
        );

        let value: Result<String, CacheError> = cache.get_with("k".to_string(), |_| Ok("computed".to_string()));
        assert_eq!(value.unwrap(), "first");

        let value: Result<String, CacheError> = cache.get_with("n".to_string(), |k| Ok(format!("computed:{k}")));
        assert_eq!(value.unwrap(), "computed:n");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_prebuilt_key_passes_through() {
        let registry = CacheRegistry::new();
        let cache = facade(&registry, OperationContext::default());

        let policy = EffectivePolicy {
            expire_after_write: Some(60_000),
            ..Default::default()
        };
        let own = CacheKey::new("k".to_string(), OperationContext::new(policy, None));
        cache.put_cache_key(own, "v".to_string());

        let (stored, _) = cache.entries().remove(0);
        assert_eq!(stored.context().policy.expire_after_write, Some(60_000));
    }

    #[test]
    fn test_update_context_replaces_stored_context() {
        let registry = CacheRegistry::new();
        let first = facade(&registry, OperationContext::default());
        first.put("k".to_string(), "v".to_string());

        let second_context = OperationContext::new(
            EffectivePolicy {
                maximum_size: Some(5),
                ..Default::default()
            },
            None,
        );
        let second = facade(&registry, second_context);
        second.put("k".to_string(), "w".to_string());

        let stored = first.instance().cache().key_of(&"k".to_string()).unwrap();
        assert_eq!(stored.context().policy.maximum_size, None);

        assert!(second.update_context(&"k".to_string()));
        assert_eq!(stored.context().policy.maximum_size, Some(5));
        assert!(!second.update_context(&"other".to_string()));
    }

    #[test]
    fn test_clear() {
        let registry = CacheRegistry::new();
        let cache = facade(&registry, OperationContext::default());
        cache.put("a".to_string(), "1".to_string());
        cache.put("b".to_string(), "2".to_string());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.name(), "names");
    }
}
