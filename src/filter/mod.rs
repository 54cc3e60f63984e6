//! Value filters applied on read
//!
//! Filters run in two situations: single-value access (`get`) and bulk reads
//! (`properties`). A [`FilterChain`] is an explicit object owned by the caller
//! and passed by reference into the configuration, so filters installed by one
//! worker are never visible to another. Use [`FilterChain::scope`] to install
//! filters for the duration of one operation; the guard resets the chain on
//! every exit path.
//!
//! ```
//! use tiercfg::{Configuration, FilterChain, MemoryPropertySource, filter_fn};
//!
//! let config = Configuration::builder()
//!     .with_source(MemoryPropertySource::new("defaults", 0).with("db.password", "hunter2"))
//!     .build()
//!     .unwrap();
//!
//! let mut chain = FilterChain::new();
//! {
//!     let mut scope = chain.scope();
//!     scope.add_filter(filter_fn(|value, _ctx| {
//!         (!value.key().ends_with("password")).then_some(value)
//!     }));
//!     assert!(config.get_with("db.password", &scope).unwrap().is_none());
//! }
//! // scope dropped: chain is back to defaults
//! assert!(chain.is_empty());
//! ```

mod builtin;

pub use builtin::{MaskingFilter, RegexKeyFilter};

use crate::value::PropertyValue;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// How a value is being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Direct lookup of one key
    Single,
    /// Part of a full property map read
    Bulk,
}

/// What a filter gets to see besides the value itself.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    key: &'a str,
    snapshot: Option<&'a BTreeMap<String, PropertyValue>>,
    access: Access,
}

impl<'a> FilterContext<'a> {
    /// Context for a direct lookup
    pub fn single(key: &'a str) -> Self {
        Self {
            key,
            snapshot: None,
            access: Access::Single,
        }
    }

    /// Context for one key of a bulk read over `snapshot`
    pub fn bulk(key: &'a str, snapshot: &'a BTreeMap<String, PropertyValue>) -> Self {
        Self {
            key,
            snapshot: Some(snapshot),
            access: Access::Bulk,
        }
    }

    pub fn key(&self) -> &'a str {
        self.key
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_single(&self) -> bool {
        self.access == Access::Single
    }

    /// The full, unfiltered map being processed (bulk reads only)
    pub fn snapshot(&self) -> Option<&'a BTreeMap<String, PropertyValue>> {
        self.snapshot
    }

    /// Look up a sibling value of the map being processed
    pub fn sibling(&self, key: &str) -> Option<&'a PropertyValue> {
        self.snapshot.and_then(|s| s.get(key))
    }
}

/// A per-key transformation or suppression rule.
///
/// Returning `None` drops the key: single reads report it as not found and
/// bulk reads omit it.
pub trait PropertyFilter: Send + Sync {
    fn filter_property(&self, value: PropertyValue, ctx: &FilterContext<'_>)
    -> Option<PropertyValue>;
}

/// Filter backed by a closure, see [`filter_fn`]
pub struct FnFilter<F>(F);

impl<F> PropertyFilter for FnFilter<F>
where
    F: Fn(PropertyValue, &FilterContext<'_>) -> Option<PropertyValue> + Send + Sync,
{
    fn filter_property(
        &self,
        value: PropertyValue,
        ctx: &FilterContext<'_>,
    ) -> Option<PropertyValue> {
        (self.0)(value, ctx)
    }
}

/// Wrap a closure as a [`PropertyFilter`]
pub fn filter_fn<F>(f: F) -> FnFilter<F>
where
    F: Fn(PropertyValue, &FilterContext<'_>) -> Option<PropertyValue> + Send + Sync,
{
    FnFilter(f)
}

/// Pipe `value` through `filters` in order, stopping at the first `None`
pub(crate) fn apply_filters(
    filters: &[Arc<dyn PropertyFilter>],
    value: PropertyValue,
    ctx: &FilterContext<'_>,
) -> Option<PropertyValue> {
    filters
        .iter()
        .try_fold(value, |value, filter| filter.filter_property(value, ctx))
}

/// Ordered list of filters plus the metadata-filtering flag.
///
/// Filters run in registration order, each receiving the previous output.
/// While metadata filtering is on (the default), bulk reads also drop keys
/// starting with `_`.
#[derive(Clone)]
pub struct FilterChain {
    filters: Vec<Arc<dyn PropertyFilter>>,
    filter_metadata: bool,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            filter_metadata: true,
        }
    }

    /// Append a filter
    pub fn add_filter(&mut self, filter: impl PropertyFilter + 'static) -> &mut Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Append an already shared filter
    pub fn add_shared(&mut self, filter: Arc<dyn PropertyFilter>) -> &mut Self {
        self.filters.push(filter);
        self
    }

    /// Insert a filter at `pos`; positions past the end append
    pub fn insert_filter(&mut self, pos: usize, filter: impl PropertyFilter + 'static) -> &mut Self {
        let pos = pos.min(self.filters.len());
        self.filters.insert(pos, Arc::new(filter));
        self
    }

    /// Remove the filter at `pos`
    pub fn remove_filter(&mut self, pos: usize) -> Option<Arc<dyn PropertyFilter>> {
        (pos < self.filters.len()).then(|| self.filters.remove(pos))
    }

    pub fn clear_filters(&mut self) -> &mut Self {
        self.filters.clear();
        self
    }

    /// Replace all filters
    pub fn set_filters<I>(&mut self, filters: I) -> &mut Self
    where
        I: IntoIterator<Item = Arc<dyn PropertyFilter>>,
    {
        self.filters = filters.into_iter().collect();
        self
    }

    pub fn filters(&self) -> &[Arc<dyn PropertyFilter>] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Turn dropping of `_`-prefixed keys in bulk reads on or off
    pub fn set_metadata_filtering(&mut self, enabled: bool) -> &mut Self {
        self.filter_metadata = enabled;
        self
    }

    pub fn is_metadata_filtering(&self) -> bool {
        self.filter_metadata
    }

    /// Run `value` through every filter of the chain
    pub fn filter_property(
        &self,
        value: PropertyValue,
        ctx: &FilterContext<'_>,
    ) -> Option<PropertyValue> {
        apply_filters(&self.filters, value, ctx)
    }

    /// Reset filters and the metadata flag to their defaults
    pub fn cleanup_filter_context(&mut self) {
        self.filters.clear();
        self.filter_metadata = true;
    }

    /// Borrow the chain for one logical operation.
    ///
    /// The chain is reset to its defaults (no filters, metadata filtering on)
    /// when the returned guard is dropped, including during unwinding.
    pub fn scope(&mut self) -> FilterScope<'_> {
        FilterScope { chain: self }
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filters.len())
            .field("filter_metadata", &self.filter_metadata)
            .finish()
    }
}

/// Guard returned by [`FilterChain::scope`]; cleans the chain up on drop.
pub struct FilterScope<'a> {
    chain: &'a mut FilterChain,
}

impl Deref for FilterScope<'_> {
    type Target = FilterChain;

    fn deref(&self) -> &FilterChain {
        self.chain
    }
}

impl DerefMut for FilterScope<'_> {
    fn deref_mut(&mut self) -> &mut FilterChain {
        self.chain
    }
}

impl Drop for FilterScope<'_> {
    fn drop(&mut self) {
        self.chain.cleanup_filter_context();
    }
}
