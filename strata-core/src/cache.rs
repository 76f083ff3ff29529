use crate::executor::{default_executor, Executor};
use crate::expiry::{Expiry, NEVER};
use crate::loader::{BoxError, CacheLoader};
use crate::removal::{RemovalCause, RemovalListener};
use crate::utils::{find_min_frequency_key, move_key_to_end, remove_from_order};
use crate::{CacheEntry, EvictionPolicy};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "stats")]
use crate::CacheStats;

/// Maximum size meaning "no bound".
pub const UNBOUNDED: u64 = u64::MAX;

const REFRESH_DISABLED: u64 = u64::MAX;

type Removal<K, V> = (K, V, RemovalCause);

/// A thread-safe, capacity-bounded cache with per-entry expiry, load-through
/// lookups and refresh-after-write.
///
/// `Cache` is a cheap handle: clones share the same storage.
///
/// # Features
///
/// - **Eviction policies**: FIFO, LRU (default) and LFU when the maximum size is exceeded
/// - **Variable expiry**: an optional [`Expiry`] computes every entry's lifetime
///   on create, update and read
/// - **Loading**: an optional [`CacheLoader`] fills misses in [`get`](Cache::get)
/// - **Synchronised loads**: concurrent misses on one key run a single load while
///   the others wait for its result
/// - **Refresh after write**: reads of an entry older than the refresh interval
///   return the current value and schedule a reload on the cache's [`Executor`]
/// - **Runtime policy**: maximum size and refresh interval can be changed
///   through [`policy`](Cache::policy) while the cache is in use
/// - **Removal notifications**: an optional [`RemovalListener`] sees every
///   entry that leaves the cache
/// - **Statistics**: hit/miss/load/eviction counters (with `stats` feature)
///
/// # Thread Safety
///
/// Entries live in a `parking_lot::RwLock<HashMap>` and the eviction order in a
/// `parking_lot::Mutex<VecDeque>`. Writers always take the order lock before the
/// map lock. Misses only take the read lock. Listener callbacks and loaders run
/// without any of the cache's locks held.
///
/// # Examples
///
/// ```
/// use strata_core::{Cache, EvictionPolicy};
///
/// let cache: Cache<String, i32> = Cache::builder()
///     .maximum_size(2)
///     .eviction_policy(EvictionPolicy::LRU)
///     .build();
///
/// cache.insert("a".to_string(), 1);
/// cache.insert("b".to_string(), 2);
/// assert_eq!(cache.get_if_present("a"), Some(1));
///
/// // "b" is now the least recently used entry
/// cache.insert("c".to_string(), 3);
/// assert_eq!(cache.get_if_present("b"), None);
/// assert_eq!(cache.len(), 2);
/// ```
pub struct Cache<K, V> {
    inner: Arc<Inner<K, V>>,
}

struct Inner<K, V> {
    map: RwLock<HashMap<K, CacheEntry<V>>>,
    order: Mutex<VecDeque<K>>,
    loading: DashMap<K, Arc<Mutex<()>>>,
    maximum: AtomicU64,
    refresh_nanos: AtomicU64,
    generation: AtomicU64,
    policy: EvictionPolicy,
    expiry: Option<Arc<dyn Expiry<K, V>>>,
    loader: Option<Arc<dyn CacheLoader<K, V>>>,
    listener: Option<Arc<dyn RemovalListener<K, V>>>,
    executor: Arc<dyn Executor>,
    #[cfg(feature = "stats")]
    stats: CacheStats,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.inner.map.read().len())
            .field("maximum", &self.inner.maximum.load(Ordering::Relaxed))
            .field("policy", &self.inner.policy)
            .finish()
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Starts building a cache.
    pub fn builder() -> CacheBuilder<K, V> {
        CacheBuilder::default()
    }

    /// Returns the value for `key` if present and not expired.
    ///
    /// A hit restarts the entry's read countdown through the configured
    /// [`Expiry`], updates the eviction order and, if the entry is older than the
    /// refresh interval, schedules a background reload. The current value is
    /// returned without waiting for that reload.
    pub fn get_if_present<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lookup(key, None, true)
    }

    /// Like [`get_if_present`](Self::get_if_present), but the read lifetime is
    /// computed for `key` rather than for the key object stored with the entry.
    /// A background refresh still reloads through the stored key.
    pub fn get_if_present_as(&self, key: &K) -> Option<V> {
        self.lookup(key, Some(key), true)
    }

    /// Returns the value for `key`, loading it through the cache's loader on a
    /// miss.
    ///
    /// Concurrent misses on the same key run the loader once. `Ok(None)` means
    /// the key is absent and the loader had no value for it (or the cache has
    /// no loader).
    pub fn get(&self, key: &K) -> Result<Option<V>, BoxError> {
        if let Some(value) = self.lookup(key, Some(key), true) {
            return Ok(Some(value));
        }
        let loader = match &self.inner.loader {
            Some(loader) => Arc::clone(loader),
            None => return Ok(None),
        };

        let gate = self.load_gate(key);
        let _guard = gate.lock();
        if let Some(value) = self.lookup(key, Some(key), false) {
            self.release_gate(key, &gate);
            return Ok(Some(value));
        }

        let result = loader.load(key);
        match &result {
            Ok(Some(value)) => self.store_loaded(key.clone(), value.clone()),
            Ok(None) | Err(_) => self.record_load_failure(),
        }
        self.release_gate(key, &gate);
        result
    }

    /// Returns the value for `key`, computing and storing it with `f` on a miss.
    ///
    /// Only one caller per key runs `f` at a time; the others wait and then see
    /// the stored value. Errors from `f` are returned to the caller that ran it
    /// and nothing is stored.
    pub fn get_with<F, E>(&self, key: K, f: F) -> Result<V, E>
    where
        F: FnOnce(&K) -> Result<V, E>,
    {
        if let Some(value) = self.lookup(&key, Some(&key), true) {
            return Ok(value);
        }

        let gate = self.load_gate(&key);
        let _guard = gate.lock();
        if let Some(value) = self.lookup(&key, Some(&key), false) {
            self.release_gate(&key, &gate);
            return Ok(value);
        }

        let result = f(&key);
        match &result {
            Ok(value) => self.store_loaded(key.clone(), value.clone()),
            Err(_) => self.record_load_failure(),
        }
        self.release_gate(&key, &gate);
        result
    }

    /// Inserts or replaces the value for `key`.
    ///
    /// When the key is already present the stored key object is kept and the
    /// entry's lifetime is recomputed for the given `key` with
    /// `expire_after_update`; otherwise `expire_after_create` applies.
    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        let mut removed = Vec::new();
        {
            let mut order = self.inner.order.lock();
            let mut map = self.inner.map.write();
            self.write_locked(&mut order, &mut map, key, value, now, &mut removed);
        }
        self.notify(removed);
    }

    /// Stores `value` only if `key` has no live entry.
    ///
    /// Returns the existing value when there is one, `None` when `value` was
    /// stored.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<V> {
        let now = Instant::now();
        let mut removed = Vec::new();
        let existing = {
            let mut order = self.inner.order.lock();
            let mut map = self.inner.map.write();
            match map.get(&key) {
                Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
                _ => {
                    self.write_locked(&mut order, &mut map, key, value, now, &mut removed);
                    None
                }
            }
        };
        self.notify(removed);
        existing
    }

    /// Removes the entry for `key`, returning its value if it was live.
    pub fn invalidate<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let removed = {
            let mut order = self.inner.order.lock();
            let mut map = self.inner.map.write();
            remove_from_order(&mut order, key);
            map.remove_entry(key)
        };

        let (stored, entry) = removed?;
        let live = !entry.is_expired(now);
        let cause = if live {
            RemovalCause::Explicit
        } else {
            RemovalCause::Expired
        };
        let value = entry.value.clone();
        self.notify(vec![(stored, entry.value, cause)]);
        live.then_some(value)
    }

    /// Removes every entry.
    pub fn invalidate_all(&self) {
        let drained: Vec<Removal<K, V>> = {
            let mut order = self.inner.order.lock();
            let mut map = self.inner.map.write();
            order.clear();
            map.drain()
                .map(|(k, e)| (k, e.value, RemovalCause::Explicit))
                .collect()
        };
        self.notify(drained);
    }

    /// Whether `key` has a live entry. Does not count as a read.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        matches!(self.inner.map.read().get(key), Some(entry) if !entry.is_expired(now))
    }

    /// The key object stored for `key`, i.e. the one written first.
    pub fn key_of<Q>(&self, key: &Q) -> Option<K>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let map = self.inner.map.read();
        match map.get_key_value(key) {
            Some((stored, entry)) if !entry.is_expired(now) => Some(stored.clone()),
            _ => None,
        }
    }

    /// Copies out all live entries. Does not count as reads.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        self.inner
            .map
            .read()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(k, entry)| (k.clone(), entry.value.clone()))
            .collect()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.inner.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Purges expired entries now instead of waiting for them to be touched.
    pub fn run_pending_tasks(&self) {
        let now = Instant::now();
        let removed: Vec<Removal<K, V>> = {
            let mut order = self.inner.order.lock();
            let mut map = self.inner.map.write();
            let expired: Vec<K> = map
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|k| {
                    remove_from_order(&mut order, &k);
                    map.remove_entry(&k)
                        .map(|(k, e)| (k, e.value, RemovalCause::Expired))
                })
                .collect()
        };
        self.notify(removed);
    }

    /// Runtime view of the size and refresh settings.
    pub fn policy(&self) -> Policy<'_, K, V> {
        Policy { cache: self }
    }

    /// Hit/miss/load/eviction counters of this cache.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    /// `caller`, when given, is the key the read lifetime is computed for.
    fn lookup<Q>(&self, key: &Q, caller: Option<&K>, record: bool) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let mut expired = false;
        let mut present = false;

        // Read lock only: misses never contend with each other.
        {
            let map = self.inner.map.read();
            if let Some(entry) = map.get(key) {
                if entry.is_expired(now) {
                    expired = true;
                } else {
                    present = true;
                }
            }
        }

        if expired {
            self.remove_expired(key, now);
        }
        if !present {
            #[cfg(feature = "stats")]
            if record {
                self.inner.stats.record_miss();
            }
            return None;
        }

        let mut refresh = None;
        let value = {
            let mut order = self.inner.order.lock();
            let mut map = self.inner.map.write();
            let stored = match map.get_key_value(key) {
                Some((stored, _)) => stored.clone(),
                None => {
                    #[cfg(feature = "stats")]
                    if record {
                        self.inner.stats.record_miss();
                    }
                    return None;
                }
            };
            let entry = map.get_mut(key)?;
            if entry.is_expired(now) {
                drop(map);
                drop(order);
                self.remove_expired(key, now);
                #[cfg(feature = "stats")]
                if record {
                    self.inner.stats.record_miss();
                }
                return None;
            }

            if let Some(expiry) = &self.inner.expiry {
                let current = entry.remaining(now);
                let subject = caller.unwrap_or(&stored);
                let lifetime = expiry.expire_after_read(subject, &entry.value, now, current);
                entry.set_lifetime(now, lifetime);
            }
            entry.increment_frequency();

            if let Some(interval) = self.refresh_interval() {
                if self.inner.loader.is_some()
                    && !entry.refreshing
                    && entry.needs_refresh(now, interval)
                {
                    entry.refreshing = true;
                    refresh = Some((stored, entry.value.clone(), entry.generation));
                }
            }

            let value = entry.value.clone();
            if self.inner.policy.tracks_recency() {
                move_key_to_end(&mut order, key);
            }
            value
        };

        #[cfg(feature = "stats")]
        if record {
            self.inner.stats.record_hit();
        }

        if let Some((stored, old, generation)) = refresh {
            self.schedule_refresh(stored, old, generation);
        }
        Some(value)
    }

    /// The load gate for `key`. Waiters re-check the map after acquiring it, so
    /// a value stored by the previous holder is returned without loading again.
    fn load_gate(&self, key: &K) -> Arc<Mutex<()>> {
        self.inner
            .loading
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the gate unless other callers still wait on it. The last waiter
    /// removes it; a gate left behind by a racing waiter is reused and removed
    /// by the next load of the key.
    fn release_gate(&self, key: &K, gate: &Arc<Mutex<()>>) {
        self.inner
            .loading
            .remove_if(key, |_, current| Arc::ptr_eq(current, gate) && Arc::strong_count(current) <= 2);
    }

    fn store_loaded(&self, key: K, value: V) {
        self.insert(key, value);
        #[cfg(feature = "stats")]
        self.inner.stats.record_load_success();
    }

    fn record_load_failure(&self) {
        #[cfg(feature = "stats")]
        self.inner.stats.record_load_failure();
    }

    fn schedule_refresh(&self, key: K, old: V, generation: u64) {
        let cache = self.clone();
        tracing::trace!("scheduling refresh");
        self.inner.executor.execute(Box::new(move || {
            cache.complete_refresh(key, old, generation);
        }));
    }

    fn complete_refresh(&self, key: K, old: V, generation: u64) {
        let loader = match &self.inner.loader {
            Some(loader) => Arc::clone(loader),
            None => return,
        };
        let outcome = loader.reload(&key, &old);

        let now = Instant::now();
        let mut removed = Vec::new();
        {
            let mut order = self.inner.order.lock();
            let mut map = self.inner.map.write();
            let current = map.get(&key).map(|entry| entry.generation);
            if current != Some(generation) {
                tracing::debug!("entry changed during refresh, discarding reloaded value");
                return;
            }

            match outcome {
                Ok(Some(value)) => {
                    self.write_locked(&mut order, &mut map, key, value, now, &mut removed);
                    #[cfg(feature = "stats")]
                    self.inner.stats.record_load_success();
                }
                Ok(None) => {
                    tracing::debug!("refresh produced no value, removing entry");
                    remove_from_order(&mut order, &key);
                    if let Some((stored, entry)) = map.remove_entry(&key) {
                        removed.push((stored, entry.value, RemovalCause::Explicit));
                    }
                    #[cfg(feature = "stats")]
                    self.inner.stats.record_load_failure();
                }
                Err(err) => {
                    tracing::warn!(error = %err, "refresh failed, keeping stale value");
                    if let Some(entry) = map.get_mut(&key) {
                        entry.refreshing = false;
                    }
                    #[cfg(feature = "stats")]
                    self.inner.stats.record_load_failure();
                }
            }
        }
        self.notify(removed);
    }

    fn write_locked(
        &self,
        order: &mut VecDeque<K>,
        map: &mut HashMap<K, CacheEntry<V>>,
        key: K,
        value: V,
        now: Instant,
        removed: &mut Vec<Removal<K, V>>,
    ) {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let stored = map.get_key_value(&key).map(|(stored, _)| stored.clone());
        if let Some(stored) = stored {
            let expired = map.get(&key).map_or(true, |entry| entry.is_expired(now));
            if expired {
                remove_from_order(order, &key);
                if let Some((old_key, entry)) = map.remove_entry(&key) {
                    removed.push((old_key, entry.value, RemovalCause::Expired));
                }
            } else if let Some(entry) = map.get_mut(&key) {
                let current = entry.remaining(now);
                let old = std::mem::replace(&mut entry.value, value);
                let lifetime = match &self.inner.expiry {
                    Some(expiry) => expiry.expire_after_update(&key, &entry.value, now, current),
                    None => current,
                };
                entry.set_lifetime(now, lifetime);
                entry.written_at = now;
                entry.generation = generation;
                entry.refreshing = false;
                move_key_to_end(order, &key);
                removed.push((stored, old, RemovalCause::Replaced));
                return;
            }
        }

        let lifetime = match &self.inner.expiry {
            Some(expiry) => expiry.expire_after_create(&key, &value, now),
            None => NEVER,
        };
        map.insert(key.clone(), CacheEntry::new(value, now, lifetime, generation));
        order.push_back(key);

        self.evict_to_maximum(order, map, removed);
    }

    fn evict_to_maximum(
        &self,
        order: &mut VecDeque<K>,
        map: &mut HashMap<K, CacheEntry<V>>,
        removed: &mut Vec<Removal<K, V>>,
    ) {
        let maximum = self.inner.maximum.load(Ordering::Acquire);
        while map.len() as u64 > maximum {
            let victim = match self.inner.policy {
                EvictionPolicy::LFU => {
                    let key = find_min_frequency_key(map, order);
                    if let Some(key) = &key {
                        remove_from_order(order, key);
                    }
                    key
                }
                EvictionPolicy::FIFO | EvictionPolicy::LRU => {
                    // Skip orphaned queue keys until one still maps to an entry.
                    let mut found = None;
                    while let Some(key) = order.pop_front() {
                        if map.contains_key(&key) {
                            found = Some(key);
                            break;
                        }
                    }
                    found
                }
            };

            match victim.and_then(|key| map.remove_entry(&key)) {
                Some((key, entry)) => {
                    tracing::trace!("evicting entry to stay within maximum size");
                    removed.push((key, entry.value, RemovalCause::Size));
                }
                None => break,
            }
        }
    }

    fn remove_expired<Q>(&self, key: &Q, now: Instant)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = {
            let mut order = self.inner.order.lock();
            let mut map = self.inner.map.write();
            match map.get(key) {
                Some(entry) if entry.is_expired(now) => {
                    remove_from_order(&mut order, key);
                    map.remove_entry(key)
                }
                _ => None,
            }
        };
        if let Some((stored, entry)) = removed {
            self.notify(vec![(stored, entry.value, RemovalCause::Expired)]);
        }
    }

    fn notify(&self, removed: Vec<Removal<K, V>>) {
        for (key, value, cause) in removed {
            #[cfg(feature = "stats")]
            if cause.was_evicted() {
                self.inner.stats.record_eviction();
            }
            if let Some(listener) = &self.inner.listener {
                listener.on_removal(&key, &value, cause);
            }
        }
    }

    fn refresh_interval(&self) -> Option<Duration> {
        match self.inner.refresh_nanos.load(Ordering::Acquire) {
            REFRESH_DISABLED => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }
}

/// Runtime access to a cache's size bound and refresh interval.
///
/// The setters apply to the live cache: lowering the maximum evicts right away,
/// changing the refresh interval affects the next reads. The `grow_*` and
/// `tighten_*` variants are atomic read-modify-write operations that only ever
/// move the setting in one direction, so concurrent callers cannot undo each
/// other.
pub struct Policy<'a, K, V> {
    cache: &'a Cache<K, V>,
}

impl<'a, K, V> Policy<'a, K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Current maximum size, [`UNBOUNDED`] when there is none.
    pub fn maximum(&self) -> u64 {
        self.cache.inner.maximum.load(Ordering::Acquire)
    }

    /// Replaces the maximum size, evicting immediately if the cache is now over it.
    pub fn set_maximum(&self, maximum: u64) {
        self.cache.inner.maximum.store(maximum, Ordering::Release);
        let mut removed = Vec::new();
        {
            let mut order = self.cache.inner.order.lock();
            let mut map = self.cache.inner.map.write();
            self.cache.evict_to_maximum(&mut order, &mut map, &mut removed);
        }
        self.cache.notify(removed);
    }

    /// Raises the maximum to `maximum` if it is currently lower.
    ///
    /// Returns true when the bound changed.
    pub fn grow_maximum(&self, maximum: u64) -> bool {
        self.cache.inner.maximum.fetch_max(maximum, Ordering::AcqRel) < maximum
    }

    /// Current refresh interval, `None` when refresh is disabled.
    pub fn refresh_after_write(&self) -> Option<Duration> {
        self.cache.refresh_interval()
    }

    /// Replaces the refresh interval.
    pub fn set_refresh_after_write(&self, interval: Duration) {
        self.cache
            .inner
            .refresh_nanos
            .store(to_refresh_nanos(interval), Ordering::Release);
    }

    /// Lowers the refresh interval to `interval` if it is currently longer
    /// (or refresh is disabled).
    ///
    /// Returns true when the interval changed.
    pub fn tighten_refresh_after_write(&self, interval: Duration) -> bool {
        let nanos = to_refresh_nanos(interval);
        self.cache.inner.refresh_nanos.fetch_min(nanos, Ordering::AcqRel) > nanos
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.cache.inner.policy
    }

    /// Whether entries get individual lifetimes from an [`Expiry`].
    pub fn expires_variably(&self) -> bool {
        self.cache.inner.expiry.is_some()
    }
}

fn to_refresh_nanos(interval: Duration) -> u64 {
    // u64::MAX is reserved for "disabled".
    interval.as_nanos().min(u128::from(REFRESH_DISABLED - 1)) as u64
}

/// Builder for [`Cache`].
///
/// # Examples
///
/// ```
/// use strata_core::{BoxError, Cache, SameThreadExecutor};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let cache: Cache<u64, String> = Cache::builder()
///     .maximum_size(1_000)
///     .refresh_after_write(Duration::from_secs(30))
///     .loader(|key: &u64| -> Result<Option<String>, BoxError> { Ok(Some(format!("value-{key}"))) })
///     .executor(Arc::new(SameThreadExecutor))
///     .build();
///
/// assert_eq!(cache.get(&7).unwrap(), Some("value-7".to_string()));
/// ```
pub struct CacheBuilder<K, V> {
    maximum: u64,
    refresh_after_write: Option<Duration>,
    policy: EvictionPolicy,
    expiry: Option<Arc<dyn Expiry<K, V>>>,
    loader: Option<Arc<dyn CacheLoader<K, V>>>,
    listener: Option<Arc<dyn RemovalListener<K, V>>>,
    executor: Option<Arc<dyn Executor>>,
}

impl<K, V> Default for CacheBuilder<K, V> {
    fn default() -> Self {
        Self {
            maximum: UNBOUNDED,
            refresh_after_write: None,
            policy: EvictionPolicy::default(),
            expiry: None,
            loader: None,
            listener: None,
            executor: None,
        }
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Maximum number of entries before eviction kicks in.
    pub fn maximum_size(mut self, maximum: u64) -> Self {
        self.maximum = maximum;
        self
    }

    /// Reads of entries older than `interval` schedule a background reload.
    /// Requires a loader to have any effect.
    pub fn refresh_after_write(mut self, interval: Duration) -> Self {
        self.refresh_after_write = Some(interval);
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Gives every entry its own lifetime computed by `expiry`.
    pub fn expire_after(mut self, expiry: impl Expiry<K, V> + 'static) -> Self {
        self.expiry = Some(Arc::new(expiry));
        self
    }

    pub fn loader(mut self, loader: impl CacheLoader<K, V> + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn removal_listener(mut self, listener: impl RemovalListener<K, V> + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Executor for background refreshes, [`default_executor`] if not set.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> Cache<K, V> {
        let refresh_nanos = self
            .refresh_after_write
            .map_or(REFRESH_DISABLED, to_refresh_nanos);
        Cache {
            inner: Arc::new(Inner {
                map: RwLock::new(HashMap::new()),
                order: Mutex::new(VecDeque::new()),
                loading: DashMap::new(),
                maximum: AtomicU64::new(self.maximum),
                refresh_nanos: AtomicU64::new(refresh_nanos),
                generation: AtomicU64::new(0),
                policy: self.policy,
                expiry: self.expiry,
                loader: self.loader,
                listener: self.listener,
                executor: self.executor.unwrap_or_else(default_executor),
                #[cfg(feature = "stats")]
                stats: CacheStats::new(),
            }),
        }
    }
}
