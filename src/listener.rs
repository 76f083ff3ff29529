use std::fmt;
use std::marker::PhantomData;

use strata_core::{RemovalCause, RemovalListener};

use crate::invoker::ContextKey;

/// Logs every removal from a named cache.
///
/// Arguments retained for the removed entry's reload are released once the
/// entry's key is dropped, right after this listener returns.
pub struct RemovalLogger<K, V> {
    name: String,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> RemovalLogger<K, V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<K, V> RemovalListener<ContextKey<K, V>, V> for RemovalLogger<K, V>
where
    K: fmt::Debug,
{
    fn on_removal(&self, key: &ContextKey<K, V>, _value: &V, cause: RemovalCause) {
        tracing::info!(cache = %self.name, "cache {} key={:?}", cause, key.key());
    }
}
