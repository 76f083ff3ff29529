/// Policy used to pick a victim when a cache exceeds its maximum size.
///
/// # Variants
///
/// * `FIFO` - **First In, First Out**
///   - Entries are evicted in the order they were written
///   - Reads do NOT change an entry's position
///
/// * `LRU` - **Least Recently Used** (default)
///   - Reads and writes move an entry to the "most recent" end
///   - The least recently touched entry is evicted first
///
/// * `LFU` - **Least Frequently Used**
///   - Each read increments the entry's frequency counter
///   - The entry with the lowest counter is evicted, oldest first on ties
///
/// # Examples
///
/// ```
/// use strata_core::EvictionPolicy;
///
/// assert_eq!(EvictionPolicy::default(), EvictionPolicy::LRU);
///
/// let policy: EvictionPolicy = "fifo".into();
/// assert_eq!(policy, EvictionPolicy::FIFO);
///
/// let unknown: EvictionPolicy = "random".into();
/// assert_eq!(unknown, EvictionPolicy::LRU);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EvictionPolicy {
    FIFO,
    #[default]
    LRU,
    LFU,
}

impl EvictionPolicy {
    /// Whether reads reorder the eviction queue.
    pub(crate) fn tracks_recency(&self) -> bool {
        matches!(self, EvictionPolicy::LRU)
    }
}

/// Case-insensitive conversion, defaulting to LRU for unrecognized values.
impl From<&str> for EvictionPolicy {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fifo" => EvictionPolicy::FIFO,
            "lfu" => EvictionPolicy::LFU,
            _ => EvictionPolicy::LRU,
        }
    }
}
