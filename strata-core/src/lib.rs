//! # Strata Core
//!
//! The cache engine underneath `strata`.
//!
//! This crate provides a concurrent, capacity-bounded map whose entries carry
//! individual lifetimes, whose misses can be filled by a loader, and whose
//! entries can be refreshed in the background once they get old.
//!
//! ## Features
//!
//! - **Eviction Policies**: FIFO, LRU and LFU when the maximum size is exceeded
//! - **Variable Expiry**: per-entry lifetimes computed by an [`Expiry`] on create, update and read
//! - **Loaders**: load-through lookups with one load per key at a time
//! - **Refresh After Write**: stale reads return immediately and schedule a reload on an [`Executor`]
//! - **Runtime Policy**: maximum size and refresh interval adjustable on a live cache
//! - **Removal Notifications**: a [`RemovalListener`] sees every entry that leaves
//! - **Statistics**: hit/miss/load/eviction counters (with `stats` feature)
//!
//! ## Module Organization
//!
//! - [`cache_entry`] - Entry wrapper with write time, deadline and frequency
//! - [`eviction_policy`] - FIFO, LRU and LFU strategies
//! - [`expiry`] - Per-entry expiration hook
//! - [`loader`] - Value loading for misses and refreshes
//! - [`removal`] - Removal causes and listeners
//! - [`executor`] - Background task executors
//! - [`utils`] - Order-queue helpers shared by the eviction policies
//!
//! ## Example
//!
//! ```
//! use strata_core::{BoxError, Cache, RemovalCause};
//!
//! let cache: Cache<String, usize> = Cache::builder()
//!     .maximum_size(100)
//!     .loader(|key: &String| -> Result<Option<usize>, BoxError> { Ok(Some(key.len())) })
//!     .removal_listener(|key: &String, _: &usize, cause: RemovalCause| {
//!         println!("{key} removed: {cause}");
//!     })
//!     .build();
//!
//! assert_eq!(cache.get(&"hello".to_string()).unwrap(), Some(5));
//! assert_eq!(cache.invalidate("hello"), Some(5));
//! ```
mod cache;

pub mod cache_entry;
pub mod eviction_policy;
pub mod executor;
pub mod expiry;
pub mod loader;
pub mod removal;
pub mod utils;

#[cfg(feature = "stats")]
mod stats;

pub use cache::{Cache, CacheBuilder, Policy, UNBOUNDED};
pub use cache_entry::CacheEntry;
pub use eviction_policy::EvictionPolicy;
pub use executor::{default_executor, Executor, SameThreadExecutor, Task, ThreadExecutor, DEFAULT_REFRESH_WORKERS};
pub use expiry::{Expiry, NEVER};
pub use loader::{BoxError, CacheLoader};
pub use removal::{RemovalCause, RemovalListener};

#[cfg(feature = "tokio")]
pub use executor::TokioExecutor;

#[cfg(feature = "stats")]
pub use stats::CacheStats;
