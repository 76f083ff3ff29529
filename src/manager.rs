//! Entry point for an interception layer: resolves the caches of a call and
//! runs the usual cacheable/put/evict flows against them.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use strata_core::Executor;

use crate::config::{CacheProperties, EffectivePolicy, ExecutorRegistry};
use crate::error::CacheError;
use crate::expression::{default_engine, ExpressionEngine, ExpressionEvaluator};
use crate::facade::KeyedCache;
use crate::invocation::InvocationContext;
use crate::invoker::{ArgumentRetention, ArgumentStore, OperationContext, ReloadInvoker, DEFAULT_ARGUMENT_CAPACITY};
use crate::registry::{CacheRegistry, NamedCacheInstance};
use crate::resolver::ResolverChain;

/// Owns the named caches of an application and the machinery that configures
/// them per call.
///
/// ```
/// use strata::{CacheManager, CacheManagerBuilder, InvocationContext, Operation, OperationDescriptor, PolicyDeclaration, Value};
///
/// let manager: CacheManager<i64, String> = CacheManagerBuilder::new().build();
/// let op = Operation::new(
///     OperationDescriptor::new("Users", "name")
///         .caches(["users"])
///         .method_policy(PolicyDeclaration::new().maximum_size(100)),
///     |args: &[Value]| Ok(format!("user-{}", args[0])),
/// );
///
/// let call = InvocationContext::new(op, vec![Value::Int(7)]);
/// assert_eq!(manager.invoke(&call, 7).unwrap(), "user-7");
/// assert_eq!(manager.get(&call, &7).unwrap(), Some("user-7".to_string()));
/// assert_eq!(manager.cache("users").and_then(|c| c.maximum()), Some(100));
/// ```
pub struct CacheManager<K, V> {
    chain: ResolverChain,
    registry: CacheRegistry<K, V>,
    arguments: ArgumentStore,
    evaluator: Arc<ExpressionEvaluator>,
}

impl<K, V> fmt::Debug for CacheManager<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("chain", &self.chain)
            .field("registry", &self.registry)
            .field("arguments", &self.arguments.len())
            .finish()
    }
}

impl<K, V> CacheManager<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// One facade per cache the call's operation declares, or a single cache
    /// named after the operation (`Type::method`) when it declares none.
    ///
    /// Each facade carries the call's effective policy and a reload invoker
    /// for the call. With `weak_arguments` the call's arguments are registered
    /// in the [`ArgumentStore`] once for all of them.
    pub fn resolve_caches(&self, call: &InvocationContext<V>) -> Result<Vec<KeyedCache<K, V>>, CacheError> {
        let resolved = self.resolve(call)?;
        Ok(self.bind(call, resolved))
    }

    /// The first cached value for `key` across the call's caches. Never runs
    /// the operation and never retains its arguments.
    pub fn get(&self, call: &InvocationContext<V>, key: &K) -> Result<Option<V>, CacheError> {
        let caches = self.read_only(self.resolve(call)?);
        Ok(caches.iter().find_map(|cache| cache.get_if_present(key)))
    }

    /// Returns the cached value for `key`, or runs the operation and caches
    /// its result in every cache of the call.
    ///
    /// Concurrent misses on one key run the operation once. Arguments are only
    /// retained on a miss.
    pub fn invoke(&self, call: &InvocationContext<V>, key: K) -> Result<V, CacheError> {
        let resolved = self.resolve(call)?;
        let readers = self.read_only(resolved.clone());
        if let Some(value) = readers.iter().find_map(|cache| cache.get_if_present(&key)) {
            return Ok(value);
        }

        let caches = self.bind(call, resolved);
        let Some((first, rest)) = caches.split_first() else {
            return call.operation().call(call.args()).map_err(CacheError::Invocation);
        };
        let value = match first.get(&key)? {
            Some(value) => value,
            // The arguments were reclaimed before the load could use them.
            None => {
                let value = call.operation().call(call.args()).map_err(CacheError::Invocation)?;
                first.put(key.clone(), value.clone());
                value
            }
        };
        for cache in rest {
            cache.put(key.clone(), value.clone());
        }
        Ok(value)
    }

    /// Stores `value` under `key` in every cache of the call.
    pub fn put(&self, call: &InvocationContext<V>, key: K, value: V) -> Result<(), CacheError> {
        for cache in self.resolve_caches(call)? {
            cache.put(key.clone(), value.clone());
        }
        Ok(())
    }

    /// Removes `key` from every cache of the call.
    pub fn evict(&self, call: &InvocationContext<V>, key: &K) -> Result<(), CacheError> {
        for (instance, _) in self.resolve(call)? {
            instance.cache().invalidate(key);
        }
        Ok(())
    }

    /// Empties every cache of the call.
    pub fn evict_all(&self, call: &InvocationContext<V>) -> Result<(), CacheError> {
        for (instance, _) in self.resolve(call)? {
            instance.cache().invalidate_all();
        }
        Ok(())
    }

    pub fn cache(&self, name: &str) -> Option<Arc<NamedCacheInstance<K, V>>> {
        self.registry.get(name)
    }

    pub fn cache_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn registry(&self) -> &CacheRegistry<K, V> {
        &self.registry
    }

    /// Store backing weakly retained arguments.
    pub fn arguments(&self) -> &ArgumentStore {
        &self.arguments
    }

    pub fn evaluator(&self) -> &ExpressionEvaluator {
        &self.evaluator
    }

    /// Resolves the policy of every cache of the call, creating and widening
    /// the caches as needed.
    fn resolve(&self, call: &InvocationContext<V>) -> Result<Vec<Resolved<K, V>>, CacheError> {
        let descriptor = call.operation().descriptor();
        let names = if descriptor.cache_names.is_empty() {
            vec![descriptor.qualified_name()]
        } else {
            descriptor.cache_names.clone()
        };

        let ctx = call.evaluation_context();
        names
            .iter()
            .map(|name| -> Result<Resolved<K, V>, CacheError> {
                let policy = self.chain.resolve(name, &ctx)?;
                tracing::debug!(cache = %name, operation = %descriptor.qualified_name(), ?policy, "resolved policy");

                let instance = self.registry.get_or_create(name, &policy);
                self.registry.widen(&instance, &policy);
                Ok((instance, policy))
            })
            .collect()
    }

    /// Facades whose keys carry the call's policy but no invoker.
    fn read_only(&self, resolved: Vec<Resolved<K, V>>) -> Vec<KeyedCache<K, V>> {
        resolved
            .into_iter()
            .map(|(instance, policy)| KeyedCache::new(instance, OperationContext::new(policy, None)))
            .collect()
    }

    fn bind(&self, call: &InvocationContext<V>, resolved: Vec<Resolved<K, V>>) -> Vec<KeyedCache<K, V>> {
        let mut reclaimable: Option<ArgumentRetention> = None;
        resolved
            .into_iter()
            .map(|(instance, policy)| {
                let retention = if policy.weak_arguments {
                    reclaimable
                        .get_or_insert_with(|| self.arguments.retain(call.args()))
                        .clone()
                } else {
                    ArgumentRetention::Strong(Arc::clone(call.args()))
                };
                let invoker = ReloadInvoker::new(call.operation().clone(), retention);
                KeyedCache::new(instance, OperationContext::new(policy, Some(invoker)))
            })
            .collect()
    }
}

type Resolved<K, V> = (Arc<NamedCacheInstance<K, V>>, EffectivePolicy);

/// Builds a [`CacheManager`].
pub struct CacheManagerBuilder {
    properties: CacheProperties,
    executors: ExecutorRegistry,
    engine: Arc<dyn ExpressionEngine>,
    argument_capacity: u64,
    chain: Option<ResolverChain>,
}

impl Default for CacheManagerBuilder {
    fn default() -> Self {
        Self {
            properties: CacheProperties::default(),
            executors: ExecutorRegistry::new(),
            engine: default_engine(),
            argument_capacity: DEFAULT_ARGUMENT_CAPACITY,
            chain: None,
        }
    }
}

impl fmt::Debug for CacheManagerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManagerBuilder")
            .field("properties", &self.properties)
            .field("executors", &self.executors)
            .field("argument_capacity", &self.argument_capacity)
            .field("custom_chain", &self.chain.is_some())
            .finish()
    }
}

impl CacheManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Global defaults.
    pub fn properties(mut self, properties: CacheProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Registers an executor under `name`.
    pub fn executor(mut self, name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        self.executors.register(name, executor);
        self
    }

    pub fn executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    pub fn expression_engine(mut self, engine: Arc<dyn ExpressionEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// How many weakly retained argument vectors are kept alive.
    pub fn argument_capacity(mut self, capacity: u64) -> Self {
        self.argument_capacity = capacity;
        self
    }

    /// Replaces the standard resolver chain. Properties, executors and the
    /// expression engine are then only used by resolvers the caller built
    /// from them.
    pub fn resolver_chain(mut self, chain: ResolverChain) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn build<K, V>(self) -> CacheManager<K, V>
    where
        K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let evaluator = Arc::new(ExpressionEvaluator::new(self.engine));
        let chain = match self.chain {
            Some(chain) => chain,
            None => ResolverChain::standard(self.properties, Arc::new(self.executors), Arc::clone(&evaluator)),
        };
        CacheManager {
            chain,
            registry: CacheRegistry::new(),
            arguments: ArgumentStore::new(self.argument_capacity),
            evaluator,
        }
    }
}
