//! # Strata
//!
//! Policy-driven caching for method-like operations, on top of the
//! [`strata_core`] engine.
//!
//! ## Features
//!
//! - **Layered configuration**: global defaults, then the operation's type,
//!   then the operation itself; the most specific setting wins
//! - **Expressions**: settings may be computed per call from the arguments
//!   (`"#size * 10"`), compiled once per declaration site
//! - **Per-key expiry**: every entry expires according to the policy of the
//!   call that created it, even when several operations share one cache
//! - **Refresh after write**: stale entries are served while the original
//!   call is re-run in the background
//! - **Reclaimable arguments**: reloads can hold the original arguments
//!   weakly, so large argument vectors do not pin memory
//! - **Monotonic sizing**: a shared cache only ever grows its capacity and
//!   shortens its refresh interval
//!
//! ## Quick Start
//!
//! ```rust
//! use strata::{CacheManager, CacheManagerBuilder, InvocationContext, Operation, OperationDescriptor, PolicyDeclaration, Setting, Value};
//!
//! let manager: CacheManager<Vec<Value>, String> = CacheManagerBuilder::new().build();
//!
//! let greet = Operation::new(
//!     OperationDescriptor::new("Greeter", "greet")
//!         .parameters(["name"])
//!         .caches(["greetings"])
//!         .method_policy(
//!             PolicyDeclaration::new()
//!                 .maximum_size(1_000)
//!                 .expire_after_write(Setting::expr("60 * 1000")),
//!         ),
//!     |args: &[Value]| Ok(format!("hello, {}", args[0])),
//! );
//!
//! let args = vec![Value::from("ferris")];
//! let call = InvocationContext::new(greet, args.clone());
//! assert_eq!(manager.invoke(&call, args.clone()).unwrap(), "hello, ferris");
//! assert_eq!(manager.get(&call, &args).unwrap(), Some("hello, ferris".to_string()));
//! ```
//!
//! ## Global defaults
//!
//! [`CacheProperties`] can be deserialized with serde or read from the
//! `STRATA_CACHE_*` environment variables:
//!
//! ```rust
//! use strata::{CacheManager, CacheManagerBuilder, CacheProperties};
//!
//! let properties = CacheProperties::from_lookup(|key| match key {
//!     "STRATA_CACHE_MAXIMUM_SIZE" => Some("500".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//!
//! let manager: CacheManager<u64, String> = CacheManagerBuilder::new().properties(properties).build();
//! # let _ = manager;
//! ```
//!
//! ## Logging
//!
//! The crate logs through `tracing`: cache creation, policy widening and
//! expiry computations at `debug`, removals at `info`, reclaimed arguments and
//! failed refreshes at `warn`. Install a subscriber to see them.

pub mod config;
pub mod error;
pub mod expiry;
pub mod expression;
pub mod facade;
pub mod invocation;
pub mod invoker;
pub mod key;
pub mod listener;
pub mod manager;
pub mod registry;
pub mod resolver;

pub use config::{CachePolicy, CacheProperties, EffectivePolicy, ExecutorRef, ExecutorRegistry};
pub use error::CacheError;
pub use expiry::CacheKeyExpiry;
pub use expression::{
    CompiledExpression, ExpressionEngine, ExpressionError, ExpressionEvaluator, Scope, SimpleExpressionEngine, SiteKey,
};
pub use facade::KeyedCache;
pub use invocation::{
    EvaluationContext, InvocationContext, Operation, OperationDescriptor, PolicyDeclaration, Setting, TextSetting, Value,
};
pub use invoker::{ArgumentRetention, ArgumentStore, ContextKey, InvokerLoader, OperationContext, ReloadInvoker};
pub use key::CacheKey;
pub use listener::RemovalLogger;
pub use manager::{CacheManager, CacheManagerBuilder};
pub use registry::{CacheRegistry, NamedCacheInstance};
pub use resolver::{ConfigResolver, DefaultConfigResolver, OperationConfigResolver, ResolverChain, TypeConfigResolver};

pub use strata_core;
