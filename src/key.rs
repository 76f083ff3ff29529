use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;

/// Composite cache key: a lookup key plus a context that travels with it.
///
/// Equality and hashing only look at the lookup key, and `CacheKey<K, C>`
/// borrows as `K`, so a bare `&K` finds the entry no matter which context
/// created it. The context slot is shared by all clones of a key: replacing it
/// through one clone is visible through the key object stored in the cache.
///
/// ```
/// use strata::key::CacheKey;
///
/// let a = CacheKey::new("user:1".to_string(), 10);
/// let b = CacheKey::new("user:1".to_string(), 20);
/// assert_eq!(a, b);
///
/// let stored = a.clone();
/// a.set_context(30);
/// assert_eq!(*stored.context(), 30);
/// ```
pub struct CacheKey<K, C> {
    key: K,
    context: Arc<RwLock<Arc<C>>>,
}

impl<K, C> CacheKey<K, C> {
    pub fn new(key: K, context: C) -> Self {
        Self::with_shared_context(key, Arc::new(context))
    }

    pub fn with_shared_context(key: K, context: Arc<C>) -> Self {
        Self {
            key,
            context: Arc::new(RwLock::new(context)),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn into_key(self) -> K {
        self.key
    }

    /// The current context.
    pub fn context(&self) -> Arc<C> {
        Arc::clone(&self.context.read())
    }

    /// Replaces the context for this key and every clone of it.
    pub fn set_context(&self, context: impl Into<Arc<C>>) {
        *self.context.write() = context.into();
    }
}

impl<K: Clone, C> Clone for CacheKey<K, C> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            context: Arc::clone(&self.context),
        }
    }
}

impl<K: PartialEq, C> PartialEq for CacheKey<K, C> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<K: Eq, C> Eq for CacheKey<K, C> {}

impl<K: Hash, C> Hash for CacheKey<K, C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state)
    }
}

impl<K, C> Borrow<K> for CacheKey<K, C> {
    fn borrow(&self) -> &K {
        &self.key
    }
}

impl<K: fmt::Debug, C> fmt::Debug for CacheKey<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey").field(&self.key).finish()
    }
}

impl<K: fmt::Display, C> fmt::Display for CacheKey<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashMap;

    fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equality_ignores_context() {
        let a = CacheKey::new(String::from("k"), "first");
        let b = CacheKey::new(String::from("k"), "second");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&a), hash_of(&String::from("k")));
    }

    #[test]
    fn test_bare_key_lookup() {
        let mut map = HashMap::new();
        map.insert(CacheKey::new(String::from("k"), 1), "value");
        assert_eq!(map.get(&String::from("k")), Some(&"value"));
    }

    #[test]
    fn test_first_key_object_is_kept() {
        let mut map = HashMap::new();
        map.insert(CacheKey::new(7, "first"), 1);
        map.insert(CacheKey::new(7, "second"), 2);

        let (stored, value) = map.get_key_value(&7).unwrap();
        assert_eq!(*value, 2);
        assert_eq!(*stored.context(), "first");
    }

    #[test]
    fn test_clones_share_context() {
        let key = CacheKey::new(1, 10);
        let clone = key.clone();
        clone.set_context(Arc::new(11));
        assert_eq!(*key.context(), 11);
        assert_eq!(key.into_key(), 1);
    }
}
