/// Error type returned by loaders and load-through lookups.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Computes values for keys that are missing or due for refresh.
///
/// `Ok(None)` means the loader has nothing to offer for the key: a missing key
/// stays missing and, during a refresh, the existing mapping is removed so the
/// next lookup loads it from scratch. Errors are propagated to synchronous
/// callers; failed background refreshes are logged and the stale value is kept
/// until it expires.
pub trait CacheLoader<K, V>: Send + Sync {
    /// Loads the value for `key`.
    fn load(&self, key: &K) -> Result<Option<V>, BoxError>;

    /// Recomputes the value of a live entry. Defaults to [`load`](Self::load).
    fn reload(&self, key: &K, _old_value: &V) -> Result<Option<V>, BoxError> {
        self.load(key)
    }
}

impl<K, V, F> CacheLoader<K, V> for F
where
    F: Fn(&K) -> Result<Option<V>, BoxError> + Send + Sync,
{
    fn load(&self, key: &K) -> Result<Option<V>, BoxError> {
        self(key)
    }
}
