use std::time::{Duration, Instant};

use crate::expiry::NEVER;

/// Internal wrapper that tracks the write time and the expiry deadline of a
/// cached value.
///
/// Every value stored in a [`Cache`](crate::Cache) is wrapped in a
/// `CacheEntry`. The deadline is recomputed by the cache's
/// [`Expiry`](crate::Expiry) on create, update and read, so two entries of the
/// same cache can live for different amounts of time.
///
/// # Fields
///
/// * `value` - The cached value
/// * `written_at` - When the value was last written (drives refresh-after-write)
/// * `expires_at` - Absolute deadline, `None` when the entry never expires
/// * `frequency` - Number of reads, used by the LFU policy
/// * `generation` - Write stamp, lets an in-flight refresh detect that the
///   entry was replaced underneath it
/// * `refreshing` - Whether a background refresh is already scheduled
///
/// # Examples
///
/// ```
/// use strata_core::CacheEntry;
/// use std::time::{Duration, Instant};
///
/// let now = Instant::now();
/// let entry = CacheEntry::new(42, now, Duration::from_secs(60), 1);
/// assert_eq!(entry.value, 42);
/// assert!(!entry.is_expired(now));
/// assert!(entry.is_expired(now + Duration::from_secs(60)));
/// ```
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub written_at: Instant,
    pub expires_at: Option<Instant>,
    pub frequency: u64,
    pub generation: u64,
    pub refreshing: bool,
}

impl<V> CacheEntry<V> {
    /// Creates an entry written at `now` that lives for `lifetime`.
    ///
    /// A lifetime of [`NEVER`] (or one too large to be represented as an
    /// `Instant`) produces an entry without deadline.
    pub fn new(value: V, now: Instant, lifetime: Duration, generation: u64) -> Self {
        Self {
            value,
            written_at: now,
            expires_at: deadline(now, lifetime),
            frequency: 0,
            generation,
            refreshing: false,
        }
    }

    /// Returns true once `now` has reached the entry's deadline.
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    /// Time left before the entry expires, [`NEVER`] when it has no deadline.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.expires_at {
            Some(at) => at.saturating_duration_since(now),
            None => NEVER,
        }
    }

    /// Restarts the countdown: the entry now expires `lifetime` after `now`.
    pub fn set_lifetime(&mut self, now: Instant, lifetime: Duration) {
        self.expires_at = deadline(now, lifetime);
    }

    /// Whether at least `interval` has passed since the last write.
    pub fn needs_refresh(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.written_at) >= interval
    }

    /// Increments the access frequency counter.
    pub fn increment_frequency(&mut self) {
        self.frequency = self.frequency.saturating_add(1);
    }
}

fn deadline(now: Instant, lifetime: Duration) -> Option<Instant> {
    if lifetime == NEVER {
        None
    } else {
        now.checked_add(lifetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_not_expired() {
        let now = Instant::now();
        let entry = CacheEntry::new(42, now, Duration::from_secs(10), 0);
        assert_eq!(entry.value, 42);
        assert!(!entry.is_expired(now));
        assert_eq!(entry.remaining(now), Duration::from_secs(10));
    }

    #[test]
    fn test_entry_expiration() {
        let now = Instant::now();
        let entry = CacheEntry::new("data", now, Duration::from_millis(500), 0);
        assert!(!entry.is_expired(now + Duration::from_millis(499)));
        assert!(entry.is_expired(now + Duration::from_millis(500)));
        assert_eq!(
            entry.remaining(now + Duration::from_secs(2)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_never_expires() {
        let now = Instant::now();
        let entry = CacheEntry::new(100, now, NEVER, 0);
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired(now + Duration::from_secs(3600)));
        assert_eq!(entry.remaining(now), NEVER);
    }

    #[test]
    fn test_set_lifetime_restarts_countdown() {
        let now = Instant::now();
        let mut entry = CacheEntry::new(1, now, Duration::from_millis(100), 0);
        let later = now + Duration::from_millis(80);
        entry.set_lifetime(later, Duration::from_millis(100));
        assert!(!entry.is_expired(now + Duration::from_millis(150)));
        assert!(entry.is_expired(now + Duration::from_millis(180)));
    }

    #[test]
    fn test_needs_refresh() {
        let now = Instant::now();
        let entry = CacheEntry::new(1, now, NEVER, 0);
        assert!(!entry.needs_refresh(now, Duration::from_millis(10)));
        assert!(entry.needs_refresh(now + Duration::from_millis(10), Duration::from_millis(10)));
    }

    #[test]
    fn test_increment_frequency() {
        let mut entry = CacheEntry::new(1, Instant::now(), NEVER, 0);
        entry.increment_frequency();
        entry.increment_frequency();
        assert_eq!(entry.frequency, 2);
    }
}
