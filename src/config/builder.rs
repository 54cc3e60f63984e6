//! Builder for Configuration
//!
//! This module contains [`ConfigurationBuilder`] which provides a fluent API
//! for assembling a [`Configuration`](super::Configuration).

use super::context::{CombinationPolicy, ConfigurationContext, OverridingPolicy};
use super::Configuration;
use crate::convert::{ConverterRegistry, PropertyConverter};
use crate::error::Result;
use crate::expression::{ExpressionEvaluatorBuilder, ExpressionResolver, UnresolvedPolicy};
use crate::filter::PropertyFilter;
use crate::registry::PropertySourceRegistry;
use crate::source::PropertySource;

use log::info;
use std::sync::Arc;

/// Builder for creating a [`Configuration`] with a fluent API.
///
/// Expression evaluation is only enabled once a resolver is registered (or
/// [`with_default_resolvers`](Self::with_default_resolvers) is called). Without
/// one, values are returned exactly as the sources hold them.
///
/// # Example
///
/// ```
/// use tiercfg::{Configuration, MemoryPropertySource};
///
/// let config = Configuration::builder()
///     .with_source(MemoryPropertySource::new("defaults", 0).with("db.port", "5432"))
///     .with_source(MemoryPropertySource::new("overrides", 100).with("db.port", "6432"))
///     .with_default_resolvers()
///     .build()
///     .unwrap();
///
/// assert_eq!(config.get_as::<u16>("db.port").unwrap(), Some(6432));
/// ```
pub struct ConfigurationBuilder {
    sources: Vec<Arc<dyn PropertySource>>,
    converters: ConverterRegistry,
    combination: Arc<dyn CombinationPolicy>,
    filters: Vec<Arc<dyn PropertyFilter>>,
    expressions: Option<ExpressionEvaluatorBuilder>,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationBuilder {
    /// Start with no sources and the default converters
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            converters: ConverterRegistry::with_defaults(),
            combination: Arc::new(OverridingPolicy),
            filters: Vec::new(),
            expressions: None,
        }
    }

    /// Register a property source
    pub fn with_source(mut self, source: impl PropertySource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Register a source that is also held elsewhere, e.g. to mutate it later
    pub fn with_shared_source(mut self, source: Arc<dyn PropertySource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources<I>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PropertySource>>,
    {
        self.sources.extend(sources);
        self
    }

    /// Register a converter for `T`, tried before the defaults
    pub fn with_converter<T, C>(mut self, converter: C) -> Self
    where
        T: 'static,
        C: PropertyConverter<T> + 'static,
    {
        self.converters.register::<T, C>(converter);
        self
    }

    /// Replace the converter registry entirely
    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = converters;
        self
    }

    pub fn with_combination_policy(mut self, policy: impl CombinationPolicy + 'static) -> Self {
        self.combination = Arc::new(policy);
        self
    }

    /// Add a context-wide filter, applied to every read before the caller's
    /// [`FilterChain`](crate::FilterChain)
    pub fn with_filter(mut self, filter: impl PropertyFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    fn map_expressions(
        mut self,
        f: impl FnOnce(ExpressionEvaluatorBuilder) -> ExpressionEvaluatorBuilder,
    ) -> Self {
        let builder = self.expressions.take().unwrap_or_default();
        self.expressions = Some(f(builder));
        self
    }

    /// Register an expression resolver and enable evaluation
    pub fn with_resolver(self, resolver: impl ExpressionResolver + 'static) -> Self {
        self.map_expressions(|b| b.with_resolver(resolver))
    }

    /// Enable evaluation with the built-in resolvers
    pub fn with_default_resolvers(self) -> Self {
        self.map_expressions(ExpressionEvaluatorBuilder::with_default_resolvers)
    }

    /// How unresolved placeholders are rendered (default: masked)
    pub fn unresolved(self, policy: UnresolvedPolicy) -> Self {
        self.map_expressions(|b| b.unresolved(policy))
    }

    /// `true` renders unresolved placeholders as `[${...}]`, `false` drops them
    pub fn mask_unresolved(self, mask: bool) -> Self {
        self.map_expressions(|b| b.mask_unresolved(mask))
    }

    /// Fail reads that leave a placeholder unresolved
    pub fn strict(self) -> Self {
        self.map_expressions(ExpressionEvaluatorBuilder::strict)
    }

    /// Limit the number of evaluation passes
    pub fn max_passes(self, passes: usize) -> Self {
        self.map_expressions(|b| b.max_passes(passes))
    }

    /// Build the immutable context without wrapping it
    ///
    /// # Errors
    ///
    /// Returns an error if expression settings were given without a resolver
    /// or with an invalid pass limit.
    pub fn build_context(self) -> Result<ConfigurationContext> {
        let evaluator = self
            .expressions
            .map(ExpressionEvaluatorBuilder::build)
            .transpose()?
            .map(Arc::new);

        let registry = PropertySourceRegistry::new().with_sources(self.sources);
        info!(
            "Configuration built with {} source(s), expressions {}",
            registry.len(),
            if evaluator.is_some() { "enabled" } else { "disabled" }
        );

        Ok(ConfigurationContext {
            registry,
            converters: self.converters,
            combination: self.combination,
            filters: self.filters,
            evaluator,
        })
    }

    /// Build the [`Configuration`].
    ///
    /// # Errors
    ///
    /// See [`build_context`](Self::build_context).
    pub fn build(self) -> Result<Configuration> {
        self.build_context().map(Configuration::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::source::MemoryPropertySource;

    #[test]
    fn test_expression_settings_without_resolver_fail() {
        let err = ConfigurationBuilder::new()
            .unresolved(UnresolvedPolicy::Fail)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::MissingResolver));
    }

    #[test]
    fn test_zero_passes_rejected() {
        let err = ConfigurationBuilder::new()
            .with_default_resolvers()
            .max_passes(0)
            .build()
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_no_expressions_by_default() {
        let config = ConfigurationBuilder::new()
            .with_source(MemoryPropertySource::new("s", 0).with("a", "${b}"))
            .build()
            .unwrap();
        assert!(config.context().evaluator().is_none());
        assert_eq!(config.get_value("a").unwrap().as_deref(), Some("${b}"));
    }
}
