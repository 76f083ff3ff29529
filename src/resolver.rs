//! Resolving the policy of one call: global defaults, then the operation's
//! type, then the operation itself.

use std::fmt;
use std::sync::Arc;

use crate::config::{CachePolicy, CacheProperties, EffectivePolicy, ExecutorRegistry};
use crate::error::CacheError;
use crate::expression::{ExpressionEvaluator, Scope, SiteKey};
use crate::invocation::{EvaluationContext, PolicyDeclaration, Setting, TextSetting};

/// One layer of policy resolution.
pub trait ConfigResolver: Send + Sync {
    /// The policy this layer contributes for `cache_name` in the call
    /// described by `ctx`. `Ok(None)` means no opinion.
    fn resolve(&self, cache_name: &str, ctx: &EvaluationContext<'_>) -> Result<Option<CachePolicy>, CacheError>;
}

/// Global defaults from [`CacheProperties`].
pub struct DefaultConfigResolver {
    properties: CacheProperties,
    executors: Arc<ExecutorRegistry>,
}

impl DefaultConfigResolver {
    pub fn new(properties: CacheProperties, executors: Arc<ExecutorRegistry>) -> Self {
        Self { properties, executors }
    }

    pub fn properties(&self) -> &CacheProperties {
        &self.properties
    }
}

impl fmt::Debug for DefaultConfigResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultConfigResolver")
            .field("properties", &self.properties)
            .finish()
    }
}

impl ConfigResolver for DefaultConfigResolver {
    fn resolve(&self, _cache_name: &str, _ctx: &EvaluationContext<'_>) -> Result<Option<CachePolicy>, CacheError> {
        let executor = match &self.properties.executor {
            Some(name) => Some(self.executors.resolve(name)?),
            None => None,
        };
        Ok(Some(CachePolicy {
            maximum_size: self.properties.maximum_size,
            expire_after_write: self.properties.expire_after_write,
            expire_after_access: self.properties.expire_after_access,
            refresh_after_write: self.properties.refresh_after_write,
            executor,
            weak_arguments: None,
        }))
    }
}

/// The declaration registered for the operation's type.
pub struct TypeConfigResolver {
    declarations: DeclarationResolver,
}

impl TypeConfigResolver {
    pub fn new(evaluator: Arc<ExpressionEvaluator>, executors: Arc<ExecutorRegistry>) -> Self {
        Self {
            declarations: DeclarationResolver { evaluator, executors },
        }
    }
}

impl ConfigResolver for TypeConfigResolver {
    fn resolve(&self, _cache_name: &str, ctx: &EvaluationContext<'_>) -> Result<Option<CachePolicy>, CacheError> {
        let Some(declaration) = &ctx.descriptor.type_policy else {
            return Ok(None);
        };
        self.declarations
            .resolve(declaration, Scope::Type, &ctx.descriptor.type_name, ctx)
            .map(Some)
    }
}

/// The declaration registered for the operation itself.
pub struct OperationConfigResolver {
    declarations: DeclarationResolver,
}

impl OperationConfigResolver {
    pub fn new(evaluator: Arc<ExpressionEvaluator>, executors: Arc<ExecutorRegistry>) -> Self {
        Self {
            declarations: DeclarationResolver { evaluator, executors },
        }
    }
}

impl ConfigResolver for OperationConfigResolver {
    fn resolve(&self, _cache_name: &str, ctx: &EvaluationContext<'_>) -> Result<Option<CachePolicy>, CacheError> {
        let Some(declaration) = &ctx.descriptor.method_policy else {
            return Ok(None);
        };
        self.declarations
            .resolve(declaration, Scope::Operation, &ctx.descriptor.qualified_name(), ctx)
            .map(Some)
    }
}

struct DeclarationResolver {
    evaluator: Arc<ExpressionEvaluator>,
    executors: Arc<ExecutorRegistry>,
}

impl DeclarationResolver {
    fn resolve(
        &self,
        declaration: &PolicyDeclaration,
        scope: Scope,
        owner: &str,
        ctx: &EvaluationContext<'_>,
    ) -> Result<CachePolicy, CacheError> {
        let number = |setting: &Option<Setting>, field: &'static str| -> Result<Option<u64>, CacheError> {
            let Some(setting) = setting else {
                return Ok(None);
            };
            let site = SiteKey::new(scope, owner, field);
            match setting {
                Setting::Fixed(n) => Ok(Some(*n)),
                Setting::Expression(text) => self.evaluator.evaluate_u64(text, &site, ctx).map(Some),
                Setting::Computed(f) => f(ctx).map(Some).map_err(|source| CacheError::Computed { site, source }),
            }
        };

        let executor = match &declaration.executor {
            Some(TextSetting::Literal(name)) => Some(self.executors.resolve(name)?),
            Some(TextSetting::Expression(text)) => {
                let site = SiteKey::new(scope, owner, "executor");
                let name = self.evaluator.evaluate_string(text, &site, ctx)?;
                Some(self.executors.resolve(&name)?)
            }
            None => None,
        };

        Ok(CachePolicy {
            maximum_size: number(&declaration.maximum_size, "maximum_size")?,
            expire_after_write: number(&declaration.expire_after_write, "expire_after_write")?,
            expire_after_access: number(&declaration.expire_after_access, "expire_after_access")?,
            refresh_after_write: number(&declaration.refresh_after_write, "refresh_after_write")?,
            executor,
            weak_arguments: declaration.weak_arguments,
        })
    }
}

/// Resolvers applied in order, each layered over the previous result.
pub struct ResolverChain {
    resolvers: Vec<Box<dyn ConfigResolver>>,
}

impl fmt::Debug for ResolverChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverChain")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}

impl ResolverChain {
    pub fn new(resolvers: Vec<Box<dyn ConfigResolver>>) -> Self {
        Self { resolvers }
    }

    /// Global defaults, then type declarations, then operation declarations.
    pub fn standard(
        properties: CacheProperties,
        executors: Arc<ExecutorRegistry>,
        evaluator: Arc<ExpressionEvaluator>,
    ) -> Self {
        Self::new(vec![
            Box::new(DefaultConfigResolver::new(properties, Arc::clone(&executors))),
            Box::new(TypeConfigResolver::new(Arc::clone(&evaluator), Arc::clone(&executors))),
            Box::new(OperationConfigResolver::new(evaluator, executors)),
        ])
    }

    pub fn push(&mut self, resolver: impl ConfigResolver + 'static) {
        self.resolvers.push(Box::new(resolver));
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Folds every resolver's opinion into the effective policy. The first
    /// error aborts resolution.
    pub fn resolve(&self, cache_name: &str, ctx: &EvaluationContext<'_>) -> Result<EffectivePolicy, CacheError> {
        let mut policy = CachePolicy::default();
        for resolver in &self.resolvers {
            let layer = resolver.resolve(cache_name, ctx)?;
            policy = policy.merge(layer.as_ref());
        }
        Ok(policy.into())
    }
}
