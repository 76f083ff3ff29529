//! The shape of a cached call: which operation runs, with which arguments,
//! under which declared policy.

use std::fmt;
use std::sync::Arc;

use strata_core::BoxError;

/// Argument and expression value.
///
/// Argument vectors are made of `Value`s, so they can be hashed into lookup
/// keys and read by expressions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Closure computing a numeric setting from the call being resolved.
pub type ComputeFn = Arc<dyn Fn(&EvaluationContext<'_>) -> Result<u64, BoxError> + Send + Sync>;

/// A declared numeric setting.
#[derive(Clone)]
pub enum Setting {
    /// A constant.
    Fixed(u64),
    /// Evaluated per call by the expression engine.
    Expression(String),
    /// Evaluated per call by a closure supplied at registration.
    Computed(ComputeFn),
}

impl Setting {
    pub fn expr(text: impl Into<String>) -> Self {
        Setting::Expression(text.into())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&EvaluationContext<'_>) -> Result<u64, BoxError> + Send + Sync + 'static,
    {
        Setting::Computed(Arc::new(f))
    }
}

impl From<u64> for Setting {
    fn from(n: u64) -> Self {
        Setting::Fixed(n)
    }
}

impl fmt::Debug for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Fixed(n) => f.debug_tuple("Fixed").field(n).finish(),
            Setting::Expression(text) => f.debug_tuple("Expression").field(text).finish(),
            Setting::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A declared textual setting (executor names).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextSetting {
    Literal(String),
    Expression(String),
}

impl From<&str> for TextSetting {
    fn from(s: &str) -> Self {
        TextSetting::Literal(s.to_string())
    }
}

/// Cache settings declared on a type or on a single operation.
///
/// Unset fields mean "no opinion": the value is inherited from the less
/// specific scope.
#[derive(Clone, Debug, Default)]
pub struct PolicyDeclaration {
    pub maximum_size: Option<Setting>,
    pub expire_after_write: Option<Setting>,
    pub expire_after_access: Option<Setting>,
    pub refresh_after_write: Option<Setting>,
    pub executor: Option<TextSetting>,
    pub weak_arguments: Option<bool>,
}

impl PolicyDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn maximum_size(mut self, setting: impl Into<Setting>) -> Self {
        self.maximum_size = Some(setting.into());
        self
    }

    /// Milliseconds after the last write.
    pub fn expire_after_write(mut self, setting: impl Into<Setting>) -> Self {
        self.expire_after_write = Some(setting.into());
        self
    }

    /// Milliseconds after the last read or write.
    pub fn expire_after_access(mut self, setting: impl Into<Setting>) -> Self {
        self.expire_after_access = Some(setting.into());
        self
    }

    /// Milliseconds after the last write before reads trigger a reload.
    pub fn refresh_after_write(mut self, setting: impl Into<Setting>) -> Self {
        self.refresh_after_write = Some(setting.into());
        self
    }

    pub fn executor(mut self, setting: impl Into<TextSetting>) -> Self {
        self.executor = Some(setting.into());
        self
    }

    pub fn weak_arguments(mut self, weak: bool) -> Self {
        self.weak_arguments = Some(weak);
        self
    }
}

/// Static description of a cacheable operation, fixed at registration.
#[derive(Clone, Debug, Default)]
pub struct OperationDescriptor {
    pub type_name: String,
    pub method_name: String,
    pub parameter_names: Vec<String>,
    pub cache_names: Vec<String>,
    pub type_policy: Option<PolicyDeclaration>,
    pub method_policy: Option<PolicyDeclaration>,
}

impl OperationDescriptor {
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
            ..Self::default()
        }
    }

    pub fn parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn caches<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn type_policy(mut self, declaration: PolicyDeclaration) -> Self {
        self.type_policy = Some(declaration);
        self
    }

    pub fn method_policy(mut self, declaration: PolicyDeclaration) -> Self {
        self.method_policy = Some(declaration);
        self
    }

    /// `Type::method`, the default cache name of the operation.
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.type_name, self.method_name)
    }
}

/// Handler behind an operation. The receiver is captured by the closure.
pub type Handler<V> = Arc<dyn Fn(&[Value]) -> Result<V, BoxError> + Send + Sync>;

/// An operation descriptor bound to the handler that computes its values.
pub struct Operation<V> {
    descriptor: Arc<OperationDescriptor>,
    handler: Handler<V>,
}

impl<V> Clone for Operation<V> {
    fn clone(&self) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<V> fmt::Debug for Operation<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.descriptor.qualified_name())
            .finish()
    }
}

impl<V> Operation<V> {
    pub fn new<F>(descriptor: OperationDescriptor, handler: F) -> Self
    where
        F: Fn(&[Value]) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        Self {
            descriptor: Arc::new(descriptor),
            handler: Arc::new(handler),
        }
    }

    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    /// Runs the handler.
    pub fn call(&self, args: &[Value]) -> Result<V, BoxError> {
        (self.handler)(args)
    }
}

/// One call of an operation.
pub struct InvocationContext<V> {
    operation: Operation<V>,
    args: Arc<[Value]>,
}

impl<V> Clone for InvocationContext<V> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
            args: Arc::clone(&self.args),
        }
    }
}

impl<V> fmt::Debug for InvocationContext<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("operation", &self.operation)
            .field("args", &self.args)
            .finish()
    }
}

impl<V> InvocationContext<V> {
    pub fn new(operation: Operation<V>, args: impl Into<Arc<[Value]>>) -> Self {
        Self {
            operation,
            args: args.into(),
        }
    }

    pub fn operation(&self) -> &Operation<V> {
        &self.operation
    }

    pub fn args(&self) -> &Arc<[Value]> {
        &self.args
    }

    /// Borrowed view used by resolvers and expressions.
    pub fn evaluation_context(&self) -> EvaluationContext<'_> {
        EvaluationContext::new(self.operation.descriptor(), &self.args)
    }
}

/// What settings are evaluated against.
#[derive(Clone, Copy, Debug)]
pub struct EvaluationContext<'a> {
    pub descriptor: &'a OperationDescriptor,
    pub args: &'a [Value],
}

impl<'a> EvaluationContext<'a> {
    pub fn new(descriptor: &'a OperationDescriptor, args: &'a [Value]) -> Self {
        Self { descriptor, args }
    }

    pub fn arg(&self, index: usize) -> Option<&'a Value> {
        self.args.get(index)
    }

    /// Argument bound to the declared parameter `name`.
    pub fn arg_named(&self, name: &str) -> Option<&'a Value> {
        let index = self
            .descriptor
            .parameter_names
            .iter()
            .position(|p| p == name)?;
        self.args.get(index)
    }
}
