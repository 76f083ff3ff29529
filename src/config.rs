//! Policy model: partial layers, the merged result, and global defaults.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_core::Executor;

use crate::error::CacheError;

/// A named executor handle.
#[derive(Clone)]
pub struct ExecutorRef {
    name: String,
    executor: Arc<dyn Executor>,
}

impl ExecutorRef {
    pub fn new(name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        Self {
            name: name.into(),
            executor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.executor)
    }
}

impl fmt::Debug for ExecutorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExecutorRef").field(&self.name).finish()
    }
}

/// Executors are identified by name.
impl PartialEq for ExecutorRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ExecutorRef {}

/// Named executors that configuration can refer to.
#[derive(Clone, Debug, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, executor: Arc<dyn Executor>) {
        self.executors.insert(name.into(), executor);
    }

    pub fn with(mut self, name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        self.register(name, executor);
        self
    }

    /// Looks up `name`; an unknown name is a configuration error.
    pub fn resolve(&self, name: &str) -> Result<ExecutorRef, CacheError> {
        self.executors
            .get(name)
            .map(|executor| ExecutorRef::new(name, Arc::clone(executor)))
            .ok_or_else(|| CacheError::MissingExecutor(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }
}

/// One resolver's opinion: every field is optional.
///
/// Durations are milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CachePolicy {
    pub maximum_size: Option<u64>,
    pub expire_after_write: Option<u64>,
    pub expire_after_access: Option<u64>,
    pub refresh_after_write: Option<u64>,
    pub executor: Option<ExecutorRef>,
    pub weak_arguments: Option<bool>,
}

impl CachePolicy {
    /// Layers `specific` over `self`: every field `specific` sets wins.
    ///
    /// The weak-arguments flag follows the same rule, so it keeps the value of
    /// the most specific layer that set it explicitly.
    ///
    /// ```
    /// use strata::config::CachePolicy;
    ///
    /// let global = CachePolicy { maximum_size: Some(100), expire_after_write: Some(60_000), ..Default::default() };
    /// let operation = CachePolicy { maximum_size: Some(500), ..Default::default() };
    ///
    /// let merged = global.merge(Some(&operation));
    /// assert_eq!(merged.maximum_size, Some(500));
    /// assert_eq!(merged.expire_after_write, Some(60_000));
    /// ```
    pub fn merge(self, specific: Option<&CachePolicy>) -> CachePolicy {
        let Some(specific) = specific else {
            return self;
        };
        CachePolicy {
            maximum_size: specific.maximum_size.or(self.maximum_size),
            expire_after_write: specific.expire_after_write.or(self.expire_after_write),
            expire_after_access: specific.expire_after_access.or(self.expire_after_access),
            refresh_after_write: specific.refresh_after_write.or(self.refresh_after_write),
            executor: specific.executor.clone().or(self.executor),
            weak_arguments: specific.weak_arguments.or(self.weak_arguments),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == CachePolicy::default()
    }
}

/// The fully merged policy of one operation.
///
/// Zero durations and a zero maximum mean "not configured".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub maximum_size: Option<u64>,
    pub expire_after_write: Option<u64>,
    pub expire_after_access: Option<u64>,
    pub refresh_after_write: Option<u64>,
    pub executor: Option<ExecutorRef>,
    pub weak_arguments: bool,
}

impl From<CachePolicy> for EffectivePolicy {
    fn from(policy: CachePolicy) -> Self {
        Self {
            maximum_size: policy.maximum_size,
            expire_after_write: policy.expire_after_write,
            expire_after_access: policy.expire_after_access,
            refresh_after_write: policy.refresh_after_write,
            executor: policy.executor,
            weak_arguments: policy.weak_arguments.unwrap_or(false),
        }
    }
}

fn positive_millis(ms: Option<u64>) -> Option<Duration> {
    ms.filter(|ms| *ms > 0).map(Duration::from_millis)
}

impl EffectivePolicy {
    /// Configured maximum size, `None` for unbounded.
    pub fn maximum(&self) -> Option<u64> {
        self.maximum_size.filter(|max| *max > 0)
    }

    pub fn write_ttl(&self) -> Option<Duration> {
        positive_millis(self.expire_after_write)
    }

    pub fn access_ttl(&self) -> Option<Duration> {
        positive_millis(self.expire_after_access)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        positive_millis(self.refresh_after_write)
    }
}

pub const ENV_MAXIMUM_SIZE: &str = "STRATA_CACHE_MAXIMUM_SIZE";
pub const ENV_EXPIRE_AFTER_ACCESS: &str = "STRATA_CACHE_EXPIRE_AFTER_ACCESS";
pub const ENV_EXPIRE_AFTER_WRITE: &str = "STRATA_CACHE_EXPIRE_AFTER_WRITE";
pub const ENV_REFRESH_AFTER_WRITE: &str = "STRATA_CACHE_REFRESH_AFTER_WRITE";
pub const ENV_EXECUTOR: &str = "STRATA_CACHE_EXECUTOR";

/// Process-wide defaults, the least specific policy layer.
///
/// Deserializes from kebab-case keys, every key optional:
///
/// ```
/// use strata::config::CacheProperties;
///
/// let props: CacheProperties = serde_json::from_str(
///     r#"{ "maximum-size": 1000, "expire-after-write": 60000, "executor": "io" }"#,
/// ).unwrap();
/// assert_eq!(props.maximum_size, Some(1000));
/// assert_eq!(props.executor.as_deref(), Some("io"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheProperties {
    pub maximum_size: Option<u64>,
    pub expire_after_access: Option<u64>,
    pub expire_after_write: Option<u64>,
    pub refresh_after_write: Option<u64>,
    pub executor: Option<String>,
}

impl CacheProperties {
    /// Reads the `STRATA_CACHE_*` environment variables.
    pub fn from_env() -> Result<Self, CacheError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads properties through `lookup`, using the environment variable names
    /// as keys. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CacheError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &str| -> Result<Option<u64>, CacheError> {
            read(key)
                .map(|value| {
                    value.parse::<u64>().map_err(|err| CacheError::Config {
                        key: key.to_string(),
                        value: value.clone(),
                        reason: err.to_string(),
                    })
                })
                .transpose()
        };

        Ok(Self {
            maximum_size: number(ENV_MAXIMUM_SIZE)?,
            expire_after_access: number(ENV_EXPIRE_AFTER_ACCESS)?,
            expire_after_write: number(ENV_EXPIRE_AFTER_WRITE)?,
            refresh_after_write: number(ENV_REFRESH_AFTER_WRITE)?,
            executor: read(ENV_EXECUTOR),
        })
    }
}
