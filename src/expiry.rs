use std::fmt;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use strata_core::{Expiry, NEVER};

use crate::config::EffectivePolicy;
use crate::invoker::ContextKey;

/// Per-entry expiry driven by the policy carried in each key's context.
///
/// With `W` the expire-after-write and `A` the expire-after-access bound of the
/// key's policy (unset or zero bounds are ignored):
///
/// * create: `min(W, A)`, never if neither is set
/// * update: `W` if set, else the remaining lifetime; then capped at `A`
/// * read: `A` if set, else the remaining lifetime
///
/// A read therefore never extends a write-only lifetime, and a write resets
/// the write countdown without being cut short by a looser access bound.
pub struct CacheKeyExpiry<K, V> {
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> CacheKeyExpiry<K, V> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K, V> Default for CacheKeyExpiry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifetime of a new entry.
pub fn lifetime_after_create(policy: &EffectivePolicy) -> Duration {
    match (policy.write_ttl(), policy.access_ttl()) {
        (Some(write), Some(access)) => write.min(access),
        (Some(ttl), None) | (None, Some(ttl)) => ttl,
        (None, None) => NEVER,
    }
}

/// Lifetime after the entry's value was replaced.
pub fn lifetime_after_update(policy: &EffectivePolicy, current: Duration) -> Duration {
    let lifetime = policy.write_ttl().unwrap_or(current);
    match policy.access_ttl() {
        Some(access) => lifetime.min(access),
        None => lifetime,
    }
}

/// Lifetime after the entry was read.
pub fn lifetime_after_read(policy: &EffectivePolicy, current: Duration) -> Duration {
    policy.access_ttl().unwrap_or(current)
}

impl<K, V> Expiry<ContextKey<K, V>, V> for CacheKeyExpiry<K, V>
where
    K: fmt::Debug,
{
    fn expire_after_create(&self, key: &ContextKey<K, V>, _value: &V, _now: Instant) -> Duration {
        let lifetime = lifetime_after_create(&key.context().policy);
        tracing::debug!(key = ?key.key(), lifetime_ms = lifetime.as_millis(), "expiry after create");
        lifetime
    }

    fn expire_after_update(
        &self,
        key: &ContextKey<K, V>,
        _value: &V,
        _now: Instant,
        current: Duration,
    ) -> Duration {
        let lifetime = lifetime_after_update(&key.context().policy, current);
        tracing::debug!(key = ?key.key(), lifetime_ms = lifetime.as_millis(), "expiry after update");
        lifetime
    }

    fn expire_after_read(
        &self,
        key: &ContextKey<K, V>,
        _value: &V,
        _now: Instant,
        current: Duration,
    ) -> Duration {
        let lifetime = lifetime_after_read(&key.context().policy, current);
        tracing::debug!(key = ?key.key(), lifetime_ms = lifetime.as_millis(), "expiry after read");
        lifetime
    }
}
