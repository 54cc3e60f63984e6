//! Property source traits and built-in sources
//!
//! A [`PropertySource`] is a named provider of key/value data. Format parsers
//! and framework adapters live outside this crate and hand their data to the
//! core through this trait.

#[cfg(feature = "env")]
mod env;
mod memory;

#[cfg(feature = "env")]
pub use env::{DefaultEnvSource, EnvSource, EnvironmentPropertySource, MapEnvSource};
pub use memory::MemoryPropertySource;

use crate::error::Result;
use crate::mutable::ChangeRequest;
use crate::value::PropertyValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ordinal used by sources that don't declare one
pub const DEFAULT_ORDINAL: i32 = 0;

/// A named, ranked provider of configuration values.
///
/// Identity is by [`name`](PropertySource::name): registering a second source
/// with the same name replaces the first.
///
/// `get` and `properties` may fail; the registry logs such failures and treats
/// the source as not holding the key, so one broken source never aborts a
/// lookup.
pub trait PropertySource: Send + Sync {
    /// Stable name of the source
    fn name(&self) -> &str;

    /// Externally assigned ordinal. Higher ordinals override lower ones.
    ///
    /// A source can still override this value by serving the reserved
    /// [`meta::ORDINAL`](crate::value::meta::ORDINAL) key.
    fn ordinal(&self) -> i32 {
        DEFAULT_ORDINAL
    }

    /// Look up a single key
    fn get(&self, key: &str) -> Result<Option<PropertyValue>>;

    /// All properties, ordered by key
    fn properties(&self) -> Result<BTreeMap<String, PropertyValue>>;

    /// Whether [`properties`](PropertySource::properties) lists the full
    /// content. Non-scannable sources only answer direct lookups and are
    /// skipped by bulk reads.
    fn is_scannable(&self) -> bool {
        true
    }

    /// Access the mutable capability, if this source has one
    fn as_mutable(self: Arc<Self>) -> Option<Arc<dyn MutablePropertySource>> {
        None
    }
}

/// A property source that accepts write intents.
pub trait MutablePropertySource: PropertySource {
    /// Apply every put and remove of `request` to this source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source rejects the change. Sources should apply
    /// all or nothing.
    fn apply_change(&self, request: &ChangeRequest) -> Result<()>;

    /// Replace the whole content, used when restoring a backup.
    ///
    /// # Errors
    ///
    /// Returns an error if the source rejects the change.
    fn replace_all(&self, properties: BTreeMap<String, String>) -> Result<()>;
}
