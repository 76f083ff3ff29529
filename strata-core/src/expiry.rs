use std::time::{Duration, Instant};

/// Lifetime meaning "does not expire".
pub const NEVER: Duration = Duration::MAX;

/// Per-entry expiration hook.
///
/// The cache asks its `Expiry` how long an entry may live every time the entry
/// is created, replaced or read. Each method returns the time left from `now`
/// until the entry expires; returning [`NEVER`] keeps it forever and returning
/// `current` leaves the running countdown untouched.
///
/// All durations are exchanged at nanosecond precision, so repeated reads do
/// not accumulate rounding drift.
///
/// # Examples
///
/// ```
/// use strata_core::{Cache, Expiry};
/// use std::time::{Duration, Instant};
///
/// /// Entries keyed by an even number live twice as long.
/// struct ParityExpiry;
///
/// impl Expiry<u32, String> for ParityExpiry {
///     fn expire_after_create(&self, key: &u32, _value: &String, _now: Instant) -> Duration {
///         if key % 2 == 0 { Duration::from_secs(20) } else { Duration::from_secs(10) }
///     }
///
///     fn expire_after_update(&self, key: &u32, value: &String, now: Instant, _current: Duration) -> Duration {
///         self.expire_after_create(key, value, now)
///     }
///
///     fn expire_after_read(&self, _key: &u32, _value: &String, _now: Instant, current: Duration) -> Duration {
///         current
///     }
/// }
///
/// let cache: Cache<u32, String> = Cache::builder().expire_after(ParityExpiry).build();
/// cache.insert(2, "two".to_string());
/// assert_eq!(cache.get_if_present(&2), Some("two".to_string()));
/// ```
pub trait Expiry<K, V>: Send + Sync {
    /// Lifetime of a freshly created entry.
    fn expire_after_create(&self, key: &K, value: &V, now: Instant) -> Duration;

    /// Lifetime after the value of a live entry was replaced.
    fn expire_after_update(&self, key: &K, value: &V, now: Instant, current: Duration)
        -> Duration;

    /// Lifetime after a successful read.
    fn expire_after_read(&self, key: &K, value: &V, now: Instant, current: Duration) -> Duration;
}
