use crate::CacheEntry;
use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Moves a key to the back of the order queue (marks it as most recently used).
///
/// Keys missing from the queue are ignored.
///
/// # Examples
///
/// ```
/// use std::collections::VecDeque;
/// use strata_core::utils::move_key_to_end;
///
/// let mut order = VecDeque::from(vec!["k1".to_string(), "k2".to_string(), "k3".to_string()]);
/// move_key_to_end(&mut order, "k2");
/// assert_eq!(order.back().unwrap(), "k2");
/// ```
pub fn move_key_to_end<K, Q>(order: &mut VecDeque<K>, key: &Q)
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    if let Some(pos) = order.iter().position(|k| k.borrow() == key) {
        if let Some(k) = order.remove(pos) {
            order.push_back(k);
        }
    }
}

/// Removes a key from the order queue, returning the queued key if present.
pub fn remove_from_order<K, Q>(order: &mut VecDeque<K>, key: &Q) -> Option<K>
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    let pos = order.iter().position(|k| k.borrow() == key)?;
    order.remove(pos)
}

/// Finds the queued key with the lowest access frequency.
///
/// Ties go to the key closest to the front of the queue (the oldest one).
/// Keys present in the queue but missing from the map are skipped.
///
/// # Examples
///
/// ```
/// use std::collections::{HashMap, VecDeque};
/// use std::time::{Duration, Instant};
/// use strata_core::{utils::find_min_frequency_key, CacheEntry};
///
/// let now = Instant::now();
/// let mut map = HashMap::new();
/// let mut hot = CacheEntry::new(1, now, Duration::MAX, 0);
/// hot.frequency = 5;
/// map.insert("hot", hot);
/// map.insert("cold", CacheEntry::new(2, now, Duration::MAX, 1));
///
/// let order = VecDeque::from(vec!["hot", "cold"]);
/// assert_eq!(find_min_frequency_key(&map, &order), Some("cold"));
/// ```
pub fn find_min_frequency_key<K, V>(
    map: &HashMap<K, CacheEntry<V>>,
    order: &VecDeque<K>,
) -> Option<K>
where
    K: Hash + Eq + Clone,
{
    let mut min_freq_key: Option<&K> = None;
    let mut min_freq = u64::MAX;

    for key in order.iter() {
        if let Some(entry) = map.get(key) {
            if entry.frequency < min_freq {
                min_freq = entry.frequency;
                min_freq_key = Some(key);
            }
        }
    }

    min_freq_key.cloned()
}
