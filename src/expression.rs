//! Expression evaluation for declared settings.
//!
//! Declarations may carry textual expressions that are evaluated per call, e.g.
//! `#ttl * 1000` or `max(#p0, 10)`. Parsing goes through an
//! [`ExpressionEngine`]; [`ExpressionEvaluator`] keeps the compiled form of
//! every expression per declaration site so each site is parsed once.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::error::CacheError;
use crate::invocation::{EvaluationContext, Value};

/// Parse and evaluation failures of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown parameter `#{0}`")]
    UnknownParameter(String),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("`{function}` expects {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("cannot apply `{op}` to {left} and {right}")]
    Operand {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("`{0}` is not an integer")]
    NotAnInteger(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,
}

/// A parsed expression, ready to be evaluated against calls.
pub trait CompiledExpression: Send + Sync {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<Value, ExpressionError>;
}

/// Parses expression text.
pub trait ExpressionEngine: Send + Sync {
    fn parse(&self, text: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionError>;
}

/// Which declaration an expression belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Type,
    Operation,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Global => "global",
            Scope::Type => "type",
            Scope::Operation => "operation",
        })
    }
}

/// Identifies one declared field: scope, owner (type or operation name) and
/// field name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SiteKey {
    pub scope: Scope,
    pub owner: String,
    pub field: &'static str,
}

impl SiteKey {
    pub fn new(scope: Scope, owner: impl Into<String>, field: &'static str) -> Self {
        Self {
            scope,
            owner: owner.into(),
            field,
        }
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.scope, self.owner, self.field)
    }
}

static DEFAULT_ENGINE: Lazy<Arc<dyn ExpressionEngine>> =
    Lazy::new(|| Arc::new(SimpleExpressionEngine));

/// The shared [`SimpleExpressionEngine`].
pub fn default_engine() -> Arc<dyn ExpressionEngine> {
    Arc::clone(&DEFAULT_ENGINE)
}

/// Evaluates declared expressions, compiling each one once per site.
pub struct ExpressionEvaluator {
    engine: Arc<dyn ExpressionEngine>,
    compiled: DashMap<(SiteKey, String), Arc<dyn CompiledExpression>>,
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new(default_engine())
    }
}

impl fmt::Debug for ExpressionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionEvaluator")
            .field("compiled", &self.compiled.len())
            .finish()
    }
}

impl ExpressionEvaluator {
    pub fn new(engine: Arc<dyn ExpressionEngine>) -> Self {
        Self {
            engine,
            compiled: DashMap::new(),
        }
    }

    /// Evaluates `text` declared at `site`.
    pub fn evaluate(
        &self,
        text: &str,
        site: &SiteKey,
        ctx: &EvaluationContext<'_>,
    ) -> Result<Value, CacheError> {
        let compiled = self.compile(text, site)?;
        compiled
            .evaluate(ctx)
            .map_err(|source| CacheError::Expression {
                site: site.clone(),
                expression: text.to_string(),
                source,
            })
    }

    /// Evaluates to a non-negative integer. Numeric strings are accepted.
    pub fn evaluate_u64(
        &self,
        text: &str,
        site: &SiteKey,
        ctx: &EvaluationContext<'_>,
    ) -> Result<u64, CacheError> {
        let value = self.evaluate(text, site, ctx)?;
        let number = match &value {
            Value::Int(n) => u64::try_from(*n).ok(),
            Value::Str(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        number.ok_or_else(|| type_error(text, site, "a non-negative integer", &value))
    }

    /// Evaluates to a string. Integers and booleans are rendered, null is rejected.
    pub fn evaluate_string(
        &self,
        text: &str,
        site: &SiteKey,
        ctx: &EvaluationContext<'_>,
    ) -> Result<String, CacheError> {
        match self.evaluate(text, site, ctx)? {
            Value::Null => Err(type_error(text, site, "a string", &Value::Null)),
            value => Ok(value.to_string()),
        }
    }

    /// Number of compiled (site, expression) pairs.
    pub fn compiled_len(&self) -> usize {
        self.compiled.len()
    }

    fn compile(&self, text: &str, site: &SiteKey) -> Result<Arc<dyn CompiledExpression>, CacheError> {
        match self.compiled.entry((site.clone(), text.to_string())) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                tracing::debug!(%site, expression = text, "compiling expression");
                let parsed = self
                    .engine
                    .parse(text)
                    .map_err(|source| CacheError::Expression {
                        site: site.clone(),
                        expression: text.to_string(),
                        source,
                    })?;
                Ok(Arc::clone(entry.insert(parsed).value()))
            }
        }
    }
}

fn type_error(text: &str, site: &SiteKey, expected: &'static str, found: &Value) -> CacheError {
    CacheError::ExpressionType {
        site: site.clone(),
        expression: text.to_string(),
        expected,
        found: format!("{} `{}`", found.type_name(), found),
    }
}

/// Built-in recursive-descent expression engine.
///
/// Supported syntax:
///
/// * integer literals, `'single quoted'` strings, `true`, `false`, `null`
/// * `#name` for the argument bound to a declared parameter, `#p0` / `#a0`
///   for arguments by position
/// * `#root.methodName` and `#root.typeName`
/// * `+ - * / %` with the usual precedence, unary `-`, parentheses;
///   `+` concatenates when either side is a string
/// * `int(x)`, `str(x)`, `max(a, b)`, `min(a, b)`
///
/// ```
/// use strata::expression::{ExpressionEngine, SimpleExpressionEngine};
/// use strata::invocation::{EvaluationContext, OperationDescriptor, Value};
///
/// let descriptor = OperationDescriptor::new("Quotes", "latest").parameters(["ttl"]);
/// let args = [Value::Int(5)];
/// let ctx = EvaluationContext::new(&descriptor, &args);
///
/// let expr = SimpleExpressionEngine.parse("max(#ttl, 2) * 1000").unwrap();
/// assert_eq!(expr.evaluate(&ctx).unwrap(), Value::Int(5000));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleExpressionEngine;

impl ExpressionEngine for SimpleExpressionEngine {
    fn parse(&self, text: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression()?;
        if let Some((offset, token)) = parser.tokens.get(parser.pos) {
            return Err(ExpressionError::Syntax {
                offset: *offset,
                message: format!("unexpected {token}"),
            });
        }
        Ok(Arc::new(expr))
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    Param(String),
    Root(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(n) => write!(f, "number {n}"),
            Token::Str(s) => write!(f, "string '{s}'"),
            Token::Ident(name) => write!(f, "`{name}`"),
            Token::Param(name) => write!(f, "`#{name}`"),
            Token::Root(field) => write!(f, "`#root.{field}`"),
            Token::Op(op) => write!(f, "`{op}`"),
            Token::LParen => f.write_str("`(`"),
            Token::RParen => f.write_str("`)`"),
            Token::Comma => f.write_str("`,`"),
        }
    }
}

fn syntax(offset: usize, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Syntax {
        offset,
        message: message.into(),
    }
}

fn read_ident(chars: &mut Peekable<CharIndices<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            ident.push(c);
            chars.next();
        } else {
            break;
        }
    }
    ident
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' => {
                let digits = read_ident(&mut chars);
                let n = digits
                    .parse::<i64>()
                    .map_err(|_| syntax(offset, format!("invalid number `{digits}`")))?;
                tokens.push((offset, Token::Int(n)));
            }
            '\'' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        // '' inside a literal is an escaped quote
                        Some((_, '\'')) if matches!(chars.peek(), Some((_, '\''))) => {
                            chars.next();
                            s.push('\'');
                        }
                        Some((_, '\'')) => break,
                        Some((_, c)) => s.push(c),
                        None => return Err(syntax(offset, "unterminated string")),
                    }
                }
                tokens.push((offset, Token::Str(s)));
            }
            '#' => {
                chars.next();
                let name = read_ident(&mut chars);
                if name.is_empty() {
                    return Err(syntax(offset, "expected a name after `#`"));
                }
                if name == "root" {
                    if !matches!(chars.next(), Some((_, '.'))) {
                        return Err(syntax(offset, "expected `.` after `#root`"));
                    }
                    let field = read_ident(&mut chars);
                    tokens.push((offset, Token::Root(field)));
                } else {
                    tokens.push((offset, Token::Param(name)));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                tokens.push((offset, Token::Ident(read_ident(&mut chars))));
            }
            '+' | '-' | '*' | '/' | '%' => {
                chars.next();
                tokens.push((offset, Token::Op(c)));
            }
            '(' => {
                chars.next();
                tokens.push((offset, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((offset, Token::RParen));
            }
            ',' => {
                chars.next();
                tokens.push((offset, Token::Comma));
            }
            other => return Err(syntax(offset, format!("unexpected character `{other}`"))),
        }
    }
    Ok(tokens)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Function {
    Int,
    Str,
    Max,
    Min,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Function::Int),
            "str" => Some(Function::Str),
            "max" => Some(Function::Max),
            "min" => Some(Function::Min),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Function::Int => "int",
            Function::Str => "str",
            Function::Max => "max",
            Function::Min => "min",
        }
    }

    fn arity(self) -> usize {
        match self {
            Function::Int | Function::Str => 1,
            Function::Max | Function::Min => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RootField {
    MethodName,
    TypeName,
}

#[derive(Clone, Debug, PartialEq)]
enum Expr {
    Literal(Value),
    Param(String),
    Root(RootField),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |(offset, _)| *offset)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        let offset = self.offset();
        match self.next() {
            Some((_, token)) if token == expected => Ok(()),
            Some((_, token)) => Err(syntax(offset, format!("expected {expected}, found {token}"))),
            None => Err(syntax(offset, format!("expected {expected}, found end of input"))),
        }
    }

    fn expression(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op('+')) => BinaryOp::Add,
                Some(Token::Op('-')) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op('*')) => BinaryOp::Mul,
                Some(Token::Op('/')) => BinaryOp::Div,
                Some(Token::Op('%')) => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        let (_, token) = self
            .next()
            .ok_or_else(|| syntax(offset, "unexpected end of input"))?;

        match token {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Param(name) => Ok(Expr::Param(name)),
            Token::Root(field) => match field.as_str() {
                "methodName" => Ok(Expr::Root(RootField::MethodName)),
                "typeName" => Ok(Expr::Root(RootField::TypeName)),
                _ => Err(syntax(offset, format!("unknown root property `{field}`"))),
            },
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => self.call(&name),
            },
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(syntax(offset, format!("unexpected {other}"))),
        }
    }

    fn call(&mut self, name: &str) -> Result<Expr, ExpressionError> {
        let function =
            Function::lookup(name).ok_or_else(|| ExpressionError::UnknownFunction(name.to_string()))?;
        self.expect(Token::LParen)?;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        if args.len() != function.arity() {
            return Err(ExpressionError::Arity {
                function: function.name(),
                expected: function.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call(function, args))
    }
}

impl CompiledExpression for Expr {
    fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<Value, ExpressionError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Param(name) => resolve_param(name, ctx),
            Expr::Root(RootField::MethodName) => Ok(Value::Str(ctx.descriptor.method_name.clone())),
            Expr::Root(RootField::TypeName) => Ok(Value::Str(ctx.descriptor.type_name.clone())),
            Expr::Neg(inner) => match inner.evaluate(ctx)? {
                Value::Int(n) => n.checked_neg().map(Value::Int).ok_or(ExpressionError::Overflow),
                other => Err(ExpressionError::Operand {
                    op: "-",
                    left: other.type_name(),
                    right: other.type_name(),
                }),
            },
            Expr::Binary(op, left, right) => {
                binary(*op, left.evaluate(ctx)?, right.evaluate(ctx)?)
            }
            Expr::Call(function, args) => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*function, values)
            }
        }
    }
}

fn resolve_param(name: &str, ctx: &EvaluationContext<'_>) -> Result<Value, ExpressionError> {
    if let Some(value) = ctx.arg_named(name) {
        return Ok(value.clone());
    }
    // #p0 / #a0 address arguments by position.
    let positional = name
        .strip_prefix('p')
        .or_else(|| name.strip_prefix('a'))
        .and_then(|index| index.parse::<usize>().ok());
    positional
        .and_then(|index| ctx.arg(index))
        .cloned()
        .ok_or_else(|| ExpressionError::UnknownParameter(name.to_string()))
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExpressionError> {
    if op == BinaryOp::Add && (matches!(left, Value::Str(_)) || matches!(right, Value::Str(_))) {
        return Ok(Value::Str(format!("{left}{right}")));
    }

    let (a, b) = match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => (*a, *b),
        _ => {
            return Err(ExpressionError::Operand {
                op: op.symbol(),
                left: left.type_name(),
                right: right.type_name(),
            })
        }
    };

    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(ExpressionError::DivisionByZero),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem => a.checked_rem(b),
    };
    result.map(Value::Int).ok_or(ExpressionError::Overflow)
}

fn call(function: Function, mut args: Vec<Value>) -> Result<Value, ExpressionError> {
    match function {
        Function::Int => match args.swap_remove(0) {
            Value::Int(n) => Ok(Value::Int(n)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| ExpressionError::NotAnInteger(s)),
            other => Err(ExpressionError::NotAnInteger(other.to_string())),
        },
        Function::Str => Ok(Value::Str(args.swap_remove(0).to_string())),
        Function::Max | Function::Min => match (&args[0], &args[1]) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(if function == Function::Max {
                *a.max(b)
            } else {
                *a.min(b)
            })),
            (a, b) => Err(ExpressionError::Operand {
                op: function.name(),
                left: a.type_name(),
                right: b.type_name(),
            }),
        },
    }
}
