//! The live configuration view
//!
//! This module contains:
//! - [`Configuration`] - queryable view over the current context
//! - [`ConfigurationContext`] - immutable snapshot of sources, converters and policies
//! - [`ConfigurationBuilder`] - fluent setup
//! - [`CombinationPolicy`] - how values of several sources merge

mod builder;
mod context;

pub use builder::ConfigurationBuilder;
pub use context::{CombinationPolicy, ConfigurationContext, OverridingPolicy};

use crate::convert::PropertyConverter;
use crate::error::{Error, Result};
use crate::expression::PropertyLookup;
use crate::filter::FilterChain;
use crate::source::PropertySource;
use crate::value::PropertyValue;

use arc_swap::ArcSwap;
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Queryable configuration backed by an atomically swapped
/// [`ConfigurationContext`].
///
/// Every read loads the current context once and works on that snapshot, so a
/// concurrent [`add_sources`](Self::add_sources) is either fully visible to a
/// read or not at all. Share it between threads with `Arc<Configuration>`.
///
/// # Example
///
/// ```
/// use tiercfg::{Configuration, MemoryPropertySource};
///
/// let config = Configuration::builder()
///     .with_source(MemoryPropertySource::new("defaults", 0).with("app.name", "demo"))
///     .build()
///     .unwrap();
///
/// assert_eq!(config.get_value("app.name").unwrap().as_deref(), Some("demo"));
///
/// config.add_source(MemoryPropertySource::new("overrides", 10).with("app.name", "prod"));
/// assert_eq!(config.get_value("app.name").unwrap().as_deref(), Some("prod"));
/// ```
pub struct Configuration {
    context: ArcSwap<ConfigurationContext>,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    pub fn new(context: ConfigurationContext) -> Self {
        Self {
            context: ArcSwap::from_pointee(context),
        }
    }

    /// The context currently in effect
    pub fn context(&self) -> Arc<ConfigurationContext> {
        self.context.load_full()
    }

    // =========================================================================
    // Context updates
    // =========================================================================

    /// Register sources, replacing any with the same name
    pub fn add_sources<I>(&self, sources: I)
    where
        I: IntoIterator<Item = Arc<dyn PropertySource>>,
    {
        let sources: Vec<_> = sources.into_iter().collect();
        self.context.rcu(|current| {
            Arc::new(current.with_registry(current.registry().with_sources(sources.clone())))
        });
    }

    pub fn add_source(&self, source: impl PropertySource + 'static) {
        self.add_sources([Arc::new(source) as Arc<dyn PropertySource>]);
    }

    /// Unregister sources by name; unknown names are ignored
    pub fn remove_sources(&self, names: &[&str]) {
        self.context.rcu(|current| {
            Arc::new(current.with_registry(current.registry().without_sources(names)))
        });
        debug!("Removed property sources {names:?}");
    }

    /// Register a converter for `T`, tried before the ones already present
    pub fn add_converter<T, C>(&self, converter: C)
    where
        T: 'static,
        C: PropertyConverter<T> + 'static,
    {
        let converter: Arc<dyn PropertyConverter<T>> = Arc::new(converter);
        self.context.rcu(|current| {
            let mut converters = current.converters().clone();
            let shared = Arc::clone(&converter);
            converters.register_fn::<T, _>(move |raw: &str| shared.convert(raw));
            Arc::new(current.with_converters(converters))
        });
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up `key` with only the context-wide filters applied
    ///
    /// # Errors
    ///
    /// Returns an error if the value holds a placeholder that cannot be
    /// evaluated.
    pub fn get(&self, key: &str) -> Result<Option<PropertyValue>> {
        self.get_with(key, &FilterChain::new())
    }

    /// Look up `key`, additionally running it through `chain`
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub fn get_with(&self, key: &str, chain: &FilterChain) -> Result<Option<PropertyValue>> {
        self.context.load().get_with(key, chain)
    }

    /// Raw string value of `key`. A key mapped to an explicit null yields `None`.
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key)?.and_then(PropertyValue::into_value))
    }

    /// Value of `key` converted to `T`; `Ok(None)` if the key has no value
    ///
    /// # Errors
    ///
    /// - [`Error::NoConverter`] if `T` has no converter
    /// - [`Error::Conversion`] if the value doesn't convert
    pub fn get_as<T: 'static>(&self, key: &str) -> Result<Option<T>> {
        let context = self.context.load();
        let Some(raw) = context
            .get_with(key, &FilterChain::new())?
            .and_then(PropertyValue::into_value)
        else {
            return Ok(None);
        };
        context.converters().convert::<T>(key, &raw).map(Some)
    }

    /// Like [`get_as`](Self::get_as) but a missing value is an error
    ///
    /// # Errors
    ///
    /// Returns [`Error::PropertyNotFound`] if the key has no value, otherwise
    /// see [`get_as`](Self::get_as).
    pub fn require<T: 'static>(&self, key: &str) -> Result<T> {
        self.get_as::<T>(key)?
            .ok_or_else(|| Error::PropertyNotFound(key.to_string()))
    }

    /// All properties of scannable sources, with context-wide filters applied.
    ///
    /// Keys whose expressions fail to evaluate are logged and left out.
    pub fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.properties_with(&FilterChain::new())
    }

    /// All properties, additionally run through `chain`
    pub fn properties_with(&self, chain: &FilterChain) -> BTreeMap<String, PropertyValue> {
        self.context.load().properties_with(chain)
    }

    /// Keys of [`properties`](Self::properties)
    pub fn property_names(&self) -> Vec<String> {
        self.properties().into_keys().collect()
    }

    /// Names of the registered sources, lowest precedence first
    pub fn source_names(&self) -> Vec<String> {
        self.context
            .load()
            .registry()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

impl From<ConfigurationContext> for Configuration {
    fn from(context: ConfigurationContext) -> Self {
        Self::new(context)
    }
}

impl PropertyLookup for Configuration {
    fn lookup(&self, key: &str) -> Option<String> {
        self.context.load().lookup(key)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("context", &**self.context.load())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
