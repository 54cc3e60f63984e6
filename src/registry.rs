//! Ordinal-sorted collection of property sources
//!
//! The registry is an immutable value: adding or removing sources produces a
//! new registry, which the owning [`ConfigurationContext`](crate::ConfigurationContext)
//! publishes atomically. Readers never observe a half-sorted list.

use crate::source::{MutablePropertySource, PropertySource};
use crate::value::{PropertyValue, meta};

use log::{debug, warn};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Determine a source's ordinal, honoring a self-declared override.
///
/// The source is asked for [`meta::ORDINAL`] (then [`meta::ORDINAL_ENV`]); the
/// value's `_ordinal` metadata entry wins over its content. A parseable
/// integer replaces [`PropertySource::ordinal`]. Anything else is logged and
/// ignored; this function never fails.
pub fn effective_ordinal(source: &dyn PropertySource) -> i32 {
    for key in [meta::ORDINAL, meta::ORDINAL_ENV] {
        let declared = match source.get(key) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(e) => {
                warn!(
                    "Failed to read ordinal of property source '{}': {e}",
                    source.name()
                );
                continue;
            }
        };

        let Some(raw) = declared.meta(meta::ORDINAL).or(declared.value()) else {
            continue;
        };
        return match raw.trim().parse::<i32>() {
            Ok(ordinal) => ordinal,
            Err(_) => {
                warn!(
                    "Ignoring invalid {key} '{raw}' of property source '{}', using {}",
                    source.name(),
                    source.ordinal()
                );
                source.ordinal()
            }
        };
    }
    source.ordinal()
}

/// A registered source together with the ordinal it was ranked by
#[derive(Clone)]
pub struct RankedSource {
    source: Arc<dyn PropertySource>,
    ordinal: i32,
}

impl RankedSource {
    fn new(source: Arc<dyn PropertySource>) -> Self {
        let ordinal = effective_ordinal(source.as_ref());
        Self { source, ordinal }
    }

    pub fn source(&self) -> &Arc<dyn PropertySource> {
        &self.source
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Ordinal in effect (self-declared or assigned)
    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    /// Listing order: ordinal ascending; within one ordinal the smaller name
    /// comes last so it wins.
    fn listing_cmp(&self, other: &Self) -> Ordering {
        self.ordinal
            .cmp(&other.ordinal)
            .then_with(|| other.name().cmp(self.name()))
    }
}

impl fmt::Debug for RankedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RankedSource")
            .field("name", &self.name())
            .field("ordinal", &self.ordinal)
            .finish()
    }
}

/// Ordered, read-only view over the registered property sources.
///
/// [`sources`](Self::sources) lists lowest precedence first; the last entry
/// overrides everything before it. [`resolve`](Self::resolve) walks the list
/// backwards.
#[derive(Clone, Default, Debug)]
pub struct PropertySourceRegistry {
    sources: Vec<RankedSource>,
}

impl PropertySourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new registry with `sources` added and the list re-sorted.
    ///
    /// A source whose name is already registered replaces the old entry.
    #[must_use]
    pub fn with_sources<I>(&self, sources: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PropertySource>>,
    {
        let mut ranked = self.sources.clone();
        for source in sources {
            if let Some(pos) = ranked.iter().position(|r| r.name() == source.name()) {
                debug!("Replacing property source '{}'", source.name());
                ranked.remove(pos);
            }
            let entry = RankedSource::new(source);
            debug!(
                "Registered property source '{}' with ordinal {}",
                entry.name(),
                entry.ordinal()
            );
            ranked.push(entry);
        }
        ranked.sort_by(RankedSource::listing_cmp);
        Self { sources: ranked }
    }

    /// Return a new registry without the named sources
    #[must_use]
    pub fn without_sources(&self, names: &[&str]) -> Self {
        Self {
            sources: self
                .sources
                .iter()
                .filter(|r| !names.contains(&r.name()))
                .cloned()
                .collect(),
        }
    }

    /// Sources in listing order (ordinal ascending)
    pub fn sources(&self) -> &[RankedSource] {
        &self.sources
    }

    /// Sources in resolution order (highest precedence first)
    pub fn precedence(&self) -> impl Iterator<Item = &RankedSource> {
        self.sources.iter().rev()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(RankedSource::name).collect()
    }

    pub fn get_source(&self, name: &str) -> Option<&Arc<dyn PropertySource>> {
        self.sources
            .iter()
            .find(|r| r.name() == name)
            .map(RankedSource::source)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Highest-precedence value for `key`, or `None` if no source has it.
    ///
    /// Sources that fail are logged and skipped.
    pub fn resolve(&self, key: &str) -> Option<PropertyValue> {
        self.precedence()
            .find_map(|ranked| lookup(ranked.source.as_ref(), key))
    }

    /// Every present value for `key`, lowest precedence first
    pub fn candidates(&self, key: &str) -> Vec<PropertyValue> {
        self.sources
            .iter()
            .filter_map(|ranked| lookup(ranked.source.as_ref(), key))
            .collect()
    }

    /// Mutable sources in resolution order (highest precedence first)
    pub fn mutable_sources(&self) -> Vec<Arc<dyn MutablePropertySource>> {
        self.precedence()
            .filter_map(|ranked| Arc::clone(&ranked.source).as_mutable())
            .collect()
    }
}

fn lookup(source: &dyn PropertySource, key: &str) -> Option<PropertyValue> {
    match source.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                "Property source '{}' failed to resolve '{key}', skipping: {e}",
                source.name()
            );
            None
        }
    }
}
