use std::fmt;

/// Why an entry left the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemovalCause {
    /// Removed by `invalidate`, `invalidate_all`, or a refresh that produced no value.
    Explicit,
    /// The value was overwritten by a write to the same key.
    Replaced,
    /// The entry's lifetime elapsed.
    Expired,
    /// Evicted to stay within the maximum size.
    Size,
}

impl RemovalCause {
    /// Returns true for removals the cache decided on by itself.
    pub fn was_evicted(&self) -> bool {
        matches!(self, RemovalCause::Expired | RemovalCause::Size)
    }
}

impl fmt::Display for RemovalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemovalCause::Explicit => "EXPLICIT",
            RemovalCause::Replaced => "REPLACED",
            RemovalCause::Expired => "EXPIRED",
            RemovalCause::Size => "SIZE",
        };
        f.write_str(s)
    }
}

/// Receives a notification for every entry that leaves the cache.
///
/// Listeners run on the thread that caused the removal, after the cache's
/// locks have been released, so they may call back into other caches.
pub trait RemovalListener<K, V>: Send + Sync {
    fn on_removal(&self, key: &K, value: &V, cause: RemovalCause);
}

impl<K, V, F> RemovalListener<K, V> for F
where
    F: Fn(&K, &V, RemovalCause) + Send + Sync,
{
    fn on_removal(&self, key: &K, value: &V, cause: RemovalCause) {
        self(key, value, cause)
    }
}
