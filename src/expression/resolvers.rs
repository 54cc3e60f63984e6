//! Built-in expression resolvers

use super::{ExpressionResolver, PropertyLookup};
#[cfg(feature = "env")]
use crate::source::EnvSource;

#[cfg(feature = "env")]
use std::sync::Arc;

/// Resolves `${conf:key}` (and unprefixed `${key}`) against the configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigResolver;

impl ExpressionResolver for ConfigResolver {
    fn prefix(&self) -> &str {
        "conf"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn resolve(&self, expression: &str, lookup: &dyn PropertyLookup) -> Option<String> {
        lookup.lookup(expression.trim())
    }
}

/// Resolves `${env:NAME}` from environment variables
#[cfg(feature = "env")]
#[derive(Clone)]
pub struct EnvResolver {
    env: Arc<dyn EnvSource>,
}

#[cfg(feature = "env")]
impl EnvResolver {
    pub fn new() -> Self {
        Self::with_env(Arc::new(crate::source::DefaultEnvSource))
    }

    pub fn with_env(env: Arc<dyn EnvSource>) -> Self {
        Self { env }
    }
}

#[cfg(feature = "env")]
impl Default for EnvResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "env")]
impl ExpressionResolver for EnvResolver {
    fn prefix(&self) -> &str {
        "env"
    }

    fn resolve(&self, expression: &str, _lookup: &dyn PropertyLookup) -> Option<String> {
        self.env.var(expression.trim())
    }
}

/// Resolver backed by a closure, see [`resolver_fn`]
pub struct FnResolver<F> {
    prefix: String,
    priority: i32,
    resolve: F,
}

impl<F> FnResolver<F> {
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl<F> ExpressionResolver for FnResolver<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn resolve(&self, expression: &str, _lookup: &dyn PropertyLookup) -> Option<String> {
        (self.resolve)(expression)
    }
}

/// Build a resolver from a prefix and a closure
///
/// ```
/// use tiercfg::{ExpressionEvaluator, resolver_fn};
/// use std::collections::BTreeMap;
///
/// let evaluator = ExpressionEvaluator::builder()
///     .with_resolver(resolver_fn("upper", |expr| Some(expr.to_uppercase())))
///     .build()
///     .unwrap();
///
/// let out = evaluator.evaluate("${upper:abc}", &BTreeMap::new()).unwrap();
/// assert_eq!(out, "ABC");
/// ```
pub fn resolver_fn<F>(prefix: impl Into<String>, resolve: F) -> FnResolver<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    FnResolver {
        prefix: prefix.into(),
        priority: 0,
        resolve,
    }
}
