//! Immutable snapshot of everything a lookup needs

use crate::convert::ConverterRegistry;
use crate::error::Result;
use crate::expression::{ExpressionEvaluator, PropertyLookup, has_expression_syntax};
use crate::filter::{FilterChain, FilterContext, PropertyFilter, apply_filters};
use crate::registry::PropertySourceRegistry;
use crate::value::{PropertyValue, is_metadata_key};

use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Decides how values for the same key from several sources combine.
///
/// Candidates are offered lowest precedence first. `current` is the result so
/// far (`None` before the first candidate); returning `None` drops the key.
pub trait CombinationPolicy: Send + Sync {
    fn collect(&self, current: Option<PropertyValue>, candidate: PropertyValue)
    -> Option<PropertyValue>;

    /// `true` if the result is always the highest-precedence candidate.
    ///
    /// Single-key lookups then stop at the first source holding the key
    /// instead of asking every source.
    fn overrides(&self) -> bool {
        false
    }
}

/// The highest-precedence value replaces everything below it
#[derive(Debug, Clone, Copy, Default)]
pub struct OverridingPolicy;

impl CombinationPolicy for OverridingPolicy {
    fn collect(
        &self,
        _current: Option<PropertyValue>,
        candidate: PropertyValue,
    ) -> Option<PropertyValue> {
        Some(candidate)
    }

    fn overrides(&self) -> bool {
        true
    }
}

/// Sources, converters, combination policy, context-wide filters and the
/// optional expression evaluator, frozen together.
///
/// A context never changes after construction. [`Configuration`](super::Configuration)
/// swaps in a new one when sources or converters change.
#[derive(Clone)]
pub struct ConfigurationContext {
    pub(super) registry: PropertySourceRegistry,
    pub(super) converters: ConverterRegistry,
    pub(super) combination: Arc<dyn CombinationPolicy>,
    pub(super) filters: Vec<Arc<dyn PropertyFilter>>,
    pub(super) evaluator: Option<Arc<ExpressionEvaluator>>,
}

impl Default for ConfigurationContext {
    fn default() -> Self {
        Self {
            registry: PropertySourceRegistry::new(),
            converters: ConverterRegistry::with_defaults(),
            combination: Arc::new(OverridingPolicy),
            filters: Vec::new(),
            evaluator: None,
        }
    }
}

impl ConfigurationContext {
    pub fn registry(&self) -> &PropertySourceRegistry {
        &self.registry
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn combination_policy(&self) -> &Arc<dyn CombinationPolicy> {
        &self.combination
    }

    /// Filters applied to every read before the caller's chain
    pub fn filters(&self) -> &[Arc<dyn PropertyFilter>] {
        &self.filters
    }

    pub fn evaluator(&self) -> Option<&Arc<ExpressionEvaluator>> {
        self.evaluator.as_ref()
    }

    /// Copy of this context with a different registry
    #[must_use]
    pub fn with_registry(&self, registry: PropertySourceRegistry) -> Self {
        Self {
            registry,
            ..self.clone()
        }
    }

    /// Copy of this context with different converters
    #[must_use]
    pub fn with_converters(&self, converters: ConverterRegistry) -> Self {
        Self {
            converters,
            ..self.clone()
        }
    }

    /// Combined, unfiltered value for `key`
    pub fn resolve(&self, key: &str) -> Option<PropertyValue> {
        if self.combination.overrides() {
            return self.registry.resolve(key);
        }
        self.registry
            .candidates(key)
            .into_iter()
            .fold(None, |current, candidate| {
                self.combination.collect(current, candidate)
            })
    }

    /// Combined, unfiltered content of every scannable source
    pub fn snapshot(&self) -> BTreeMap<String, PropertyValue> {
        let mut combined: BTreeMap<String, PropertyValue> = BTreeMap::new();
        for ranked in self.registry.sources() {
            let source = ranked.source();
            if !source.is_scannable() {
                debug!("Skipping non-scannable property source '{}'", source.name());
                continue;
            }
            let properties = match source.properties() {
                Ok(properties) => properties,
                Err(e) => {
                    warn!(
                        "Property source '{}' failed to list properties, skipping: {e}",
                        source.name()
                    );
                    continue;
                }
            };
            for (key, candidate) in properties {
                let current = combined.remove(&key);
                if let Some(value) = self.combination.collect(current, candidate) {
                    combined.insert(key, value);
                }
            }
        }
        combined
    }

    /// Resolve, filter and evaluate one key.
    ///
    /// # Errors
    ///
    /// Returns an error only if expression evaluation fails.
    pub fn get_with(&self, key: &str, chain: &FilterChain) -> Result<Option<PropertyValue>> {
        self.filtered(key, chain)
            .map(|value| self.evaluate(value, chain))
            .transpose()
    }

    /// Resolved value after the context filters and `chain`, not evaluated
    fn filtered(&self, key: &str, chain: &FilterChain) -> Option<PropertyValue> {
        let value = self.resolve(key)?;
        let ctx = FilterContext::single(key);
        apply_filters(&self.filters, value, &ctx).and_then(|value| chain.filter_property(value, &ctx))
    }

    /// Resolve, filter and evaluate every scannable key.
    ///
    /// A key whose expression fails to evaluate is logged and left out; the
    /// rest of the map is still returned. Read it with
    /// [`get_with`](Self::get_with) to see the error.
    pub fn properties_with(&self, chain: &FilterChain) -> BTreeMap<String, PropertyValue> {
        let snapshot = self.snapshot();
        let mut result = BTreeMap::new();
        for (key, value) in &snapshot {
            if chain.is_metadata_filtering() && is_metadata_key(key) {
                continue;
            }
            let ctx = FilterContext::bulk(key, &snapshot);
            let filtered = apply_filters(&self.filters, value.clone(), &ctx)
                .and_then(|value| chain.filter_property(value, &ctx));
            let Some(value) = filtered else {
                continue;
            };
            match self.evaluate(value, chain) {
                Ok(value) => {
                    result.insert(key.clone(), value);
                }
                Err(e) => warn!("Leaving '{key}' out of bulk read: {e}"),
            }
        }
        result
    }

    /// Placeholders see referenced keys through the same filters as a direct
    /// read of those keys.
    fn evaluate(&self, value: PropertyValue, chain: &FilterChain) -> Result<PropertyValue> {
        let Some(evaluator) = &self.evaluator else {
            return Ok(value);
        };
        match value.value() {
            Some(raw) if has_expression_syntax(raw) => {
                let lookup = FilteredLookup {
                    context: self,
                    chain,
                };
                let evaluated = evaluator.evaluate(raw, &lookup)?;
                Ok(value.with_value(Some(evaluated)))
            }
            _ => Ok(value),
        }
    }
}

struct FilteredLookup<'a> {
    context: &'a ConfigurationContext,
    chain: &'a FilterChain,
}

impl PropertyLookup for FilteredLookup<'_> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.context
            .filtered(key, self.chain)
            .and_then(PropertyValue::into_value)
    }
}

/// Unevaluated value after the context-wide filters
impl PropertyLookup for ConfigurationContext {
    fn lookup(&self, key: &str) -> Option<String> {
        self.filtered(key, &FilterChain::new())
            .and_then(PropertyValue::into_value)
    }
}

impl fmt::Debug for ConfigurationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationContext")
            .field("sources", &self.registry.names())
            .field("converters", &self.converters)
            .field("filters", &self.filters.len())
            .field("evaluator", &self.evaluator)
            .finish()
    }
}
