//! Reloading entries: the captured call behind every cached value.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use strata_core::{BoxError, Cache, CacheLoader};

use crate::config::EffectivePolicy;
use crate::error::CacheError;
use crate::invocation::{Operation, Value};
use crate::key::CacheKey;

/// Default number of argument vectors an [`ArgumentStore`] keeps alive.
pub const DEFAULT_ARGUMENT_CAPACITY: u64 = 10_000;

/// What a cache key carries: the policy it was created under and the call
/// that can recompute its value.
pub struct OperationContext<V> {
    pub policy: EffectivePolicy,
    pub invoker: Option<ReloadInvoker<V>>,
}

impl<V> OperationContext<V> {
    pub fn new(policy: EffectivePolicy, invoker: Option<ReloadInvoker<V>>) -> Self {
        Self { policy, invoker }
    }
}

impl<V> Default for OperationContext<V> {
    fn default() -> Self {
        Self::new(EffectivePolicy::default(), None)
    }
}

impl<V> fmt::Debug for OperationContext<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("policy", &self.policy)
            .field("invoker", &self.invoker)
            .finish()
    }
}

/// Composite key used by every named cache.
pub type ContextKey<K, V> = CacheKey<K, OperationContext<V>>;

/// How a reload holds on to the original call's arguments.
#[derive(Clone)]
pub enum ArgumentRetention {
    /// The arguments live as long as the entry.
    Strong(Arc<[Value]>),
    /// The arguments live in an [`ArgumentStore`] and may be reclaimed before
    /// the entry goes away, in which case the entry can no longer be reloaded.
    Reclaimable {
        handle: Weak<[Value]>,
        lease: Arc<RetentionLease>,
    },
}

impl fmt::Debug for ArgumentRetention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentRetention::Strong(args) => f.debug_tuple("Strong").field(args).finish(),
            ArgumentRetention::Reclaimable { handle, lease } => f
                .debug_struct("Reclaimable")
                .field("id", &lease.id)
                .field("alive", &(handle.strong_count() > 0))
                .finish(),
        }
    }
}

/// Keeps an argument vector registered in its store. Dropping the last lease
/// releases the vector.
pub struct RetentionLease {
    id: u64,
    store: ArgumentStore,
}

impl RetentionLease {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for RetentionLease {
    fn drop(&mut self) {
        self.store.release(self.id);
    }
}

/// Bounded side store holding the only strong reference to reclaimable
/// argument vectors.
///
/// The store is itself a [`strata_core::Cache`] with LRU eviction: once more
/// than `capacity` vectors are retained the least recently registered ones
/// are dropped and their reloads degrade to "cannot reload".
/// [`reclaim_all`](Self::reclaim_all) drops everything at once, the
/// equivalent of the runtime freeing soft references under memory pressure.
#[derive(Clone, Debug)]
pub struct ArgumentStore {
    retained: Cache<u64, Arc<[Value]>>,
    next_id: Arc<AtomicU64>,
}

impl Default for ArgumentStore {
    fn default() -> Self {
        Self::new(DEFAULT_ARGUMENT_CAPACITY)
    }
}

impl ArgumentStore {
    pub fn new(capacity: u64) -> Self {
        Self {
            retained: Cache::builder().maximum_size(capacity).build(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stores a private copy of `args` and returns a reclaimable handle to it.
    pub fn retain(&self, args: &[Value]) -> ArgumentRetention {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let owned: Arc<[Value]> = args.iter().cloned().collect();
        let handle = Arc::downgrade(&owned);
        self.retained.insert(id, owned);
        ArgumentRetention::Reclaimable {
            handle,
            lease: Arc::new(RetentionLease {
                id,
                store: self.clone(),
            }),
        }
    }

    pub fn release(&self, id: u64) {
        self.retained.invalidate(&id);
    }

    /// Drops every retained vector.
    pub fn reclaim_all(&self) {
        tracing::debug!(retained = self.retained.len(), "reclaiming retained arguments");
        self.retained.invalidate_all();
    }

    pub fn len(&self) -> usize {
        self.retained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        self.retained.policy().maximum()
    }
}

/// Recomputes a cached value by calling its operation again with the
/// arguments of the call that created it.
pub struct ReloadInvoker<V> {
    operation: Operation<V>,
    retention: ArgumentRetention,
}

impl<V> fmt::Debug for ReloadInvoker<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadInvoker")
            .field("operation", &self.operation)
            .field("retention", &self.retention)
            .finish()
    }
}

impl<V> ReloadInvoker<V> {
    pub fn new(operation: Operation<V>, retention: ArgumentRetention) -> Self {
        Self {
            operation,
            retention,
        }
    }

    /// Strong retention unless `weak`, in which case the arguments go to `store`.
    pub fn for_call(operation: Operation<V>, args: &Arc<[Value]>, weak: bool, store: &ArgumentStore) -> Self {
        let retention = if weak {
            store.retain(args)
        } else {
            ArgumentRetention::Strong(Arc::clone(args))
        };
        Self::new(operation, retention)
    }

    pub fn operation(&self) -> &Operation<V> {
        &self.operation
    }

    pub fn is_reclaimable(&self) -> bool {
        matches!(self.retention, ArgumentRetention::Reclaimable { .. })
    }

    /// Whether the arguments are still around.
    pub fn can_reload(&self) -> bool {
        match &self.retention {
            ArgumentRetention::Strong(_) => true,
            ArgumentRetention::Reclaimable { handle, .. } => handle.strong_count() > 0,
        }
    }

    /// Calls the operation again.
    ///
    /// `Ok(None)` means the arguments were reclaimed and the value cannot be
    /// recomputed from this invoker.
    pub fn invoke(&self) -> Result<Option<V>, CacheError> {
        let args = match &self.retention {
            ArgumentRetention::Strong(args) => Arc::clone(args),
            ArgumentRetention::Reclaimable { handle, .. } => match handle.upgrade() {
                Some(args) => args,
                None => {
                    tracing::warn!(
                        operation = %self.operation.descriptor().qualified_name(),
                        "arguments were reclaimed, unable to reload"
                    );
                    return Ok(None);
                }
            },
        };

        self.operation
            .call(&args)
            .map(Some)
            .map_err(CacheError::Invocation)
    }
}

/// Loader installed on every named cache: delegates to the invoker carried by
/// the key's context.
pub struct InvokerLoader<K, V> {
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> InvokerLoader<K, V> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<K, V> Default for InvokerLoader<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheLoader<ContextKey<K, V>, V> for InvokerLoader<K, V>
where
    K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn load(&self, key: &ContextKey<K, V>) -> Result<Option<V>, BoxError> {
        let context = key.context();
        match &context.invoker {
            Some(invoker) => Ok(invoker.invoke()?),
            None => {
                tracing::warn!(key = ?key.key(), "no invoker for key, the mapping will be removed");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::OperationDescriptor;
    use std::sync::atomic::AtomicUsize;

    fn sum_operation(calls: Arc<AtomicUsize>) -> Operation<i64> {
        Operation::new(OperationDescriptor::new("Math", "sum"), move |args: &[Value]| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(args.iter().filter_map(Value::as_int).sum())
        })
    }

    #[test]
    fn test_strong_invoker() {
        let calls = Arc::new(AtomicUsize::new(0));
        let args: Arc<[Value]> = vec![Value::Int(1), Value::Int(2)].into();
        let invoker = ReloadInvoker::for_call(
            sum_operation(Arc::clone(&calls)),
            &args,
            false,
            &ArgumentStore::default(),
        );

        assert!(!invoker.is_reclaimable());
        assert_eq!(invoker.invoke().unwrap(), Some(3));
        assert_eq!(invoker.invoke().unwrap(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reclaimed_arguments_cannot_reload() {
        let store = ArgumentStore::new(8);
        let args: Arc<[Value]> = vec![Value::Int(4)].into();
        let invoker = ReloadInvoker::for_call(
            sum_operation(Arc::new(AtomicUsize::new(0))),
            &args,
            true,
            &store,
        );
        drop(args);

        assert!(invoker.is_reclaimable());
        assert_eq!(invoker.invoke().unwrap(), Some(4));

        store.reclaim_all();
        assert!(!invoker.can_reload());
        assert_eq!(invoker.invoke().unwrap(), None);
    }

    #[test]
    fn test_store_eviction_reclaims_oldest() {
        let store = ArgumentStore::new(2);
        let first = store.retain(&[Value::Int(1)]);
        let _second = store.retain(&[Value::Int(2)]);
        let _third = store.retain(&[Value::Int(3)]);

        assert_eq!(store.len(), 2);
        match first {
            ArgumentRetention::Reclaimable { handle, .. } => assert!(handle.upgrade().is_none()),
            ArgumentRetention::Strong(_) => panic!("expected reclaimable retention"),
        }
    }

    #[test]
    fn test_dropping_lease_releases_arguments() {
        let store = ArgumentStore::new(8);
        let retention = store.retain(&[Value::from("a")]);
        assert_eq!(store.len(), 1);
        drop(retention);
        assert!(store.is_empty());
    }

    #[test]
    fn test_handler_failure_is_invocation_error() {
        let op: Operation<i64> = Operation::new(OperationDescriptor::new("Svc", "fail"), |_: &[Value]| {
            Err("backend unavailable".into())
        });
        let invoker = ReloadInvoker::new(op, ArgumentRetention::Strong(Arc::from(Vec::new())));
        assert!(matches!(invoker.invoke(), Err(CacheError::Invocation(_))));
    }

    #[test]
    fn test_loader_without_invoker_yields_none() {
        let loader: InvokerLoader<String, i64> = InvokerLoader::new();
        let key = CacheKey::new("k".to_string(), OperationContext::default());
        assert!(loader.load(&key).unwrap().is_none());
    }

    #[test]
    fn test_loader_recovers_cache_error() {
        let op: Operation<i64> = Operation::new(OperationDescriptor::new("Svc", "fail"), |_: &[Value]| {
            Err("boom".into())
        });
        let invoker = ReloadInvoker::new(op, ArgumentRetention::Strong(Arc::from(Vec::new())));
        let key = CacheKey::new(
            "k".to_string(),
            OperationContext::new(EffectivePolicy::default(), Some(invoker)),
        );

        let loader: InvokerLoader<String, i64> = InvokerLoader::new();
        let err = loader.load(&key).unwrap_err();
        assert!(matches!(
            CacheError::from_load(err),
            CacheError::Invocation(_)
        ));
    }
}
