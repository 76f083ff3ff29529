use strata_core::BoxError;
use thiserror::Error;

use crate::expression::{ExpressionError, SiteKey};

/// Errors surfaced by the policy layer.
///
/// Configuration problems (`Expression`, `ExpressionType`, `Computed`,
/// `MissingExecutor`, `Config`) are raised while resolving a policy, before
/// any cache is touched. `Invocation` and `Load` come from running the cached
/// operation itself.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to evaluate expression `{expression}` at {site}")]
    Expression {
        site: SiteKey,
        expression: String,
        #[source]
        source: ExpressionError,
    },

    #[error("expression `{expression}` at {site} must yield {expected}, got {found}")]
    ExpressionType {
        site: SiteKey,
        expression: String,
        expected: &'static str,
        found: String,
    },

    #[error("computed setting at {site} failed")]
    Computed {
        site: SiteKey,
        #[source]
        source: BoxError,
    },

    #[error("no executor registered under the name `{0}`")]
    MissingExecutor(String),

    #[error("invalid value `{value}` for {key}: {reason}")]
    Config {
        key: String,
        value: String,
        reason: String,
    },

    #[error("cached operation failed")]
    Invocation(#[source] BoxError),

    #[error("cache load failed")]
    Load(#[source] BoxError),
}

impl CacheError {
    /// Recovers a `CacheError` from an engine load error, wrapping foreign
    /// errors as [`CacheError::Load`].
    pub fn from_load(err: BoxError) -> Self {
        match err.downcast::<CacheError>() {
            Ok(err) => *err,
            Err(other) => CacheError::Load(other),
        }
    }

    /// Whether this error stems from configuration rather than execution.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CacheError::Expression { .. }
                | CacheError::ExpressionType { .. }
                | CacheError::Computed { .. }
                | CacheError::MissingExecutor(_)
                | CacheError::Config { .. }
        )
    }
}
