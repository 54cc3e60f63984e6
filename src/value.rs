//! The atomic unit of configuration data

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known keys used by the library itself.
///
/// Metadata keys start with an underscore so bulk reads can tell them apart
/// from normal data.
pub mod meta {
    /// Prefix marking a key as metadata
    pub const PREFIX: &str = "_";
    /// Self-declared ordinal of a property source
    pub const ORDINAL: &str = "_ordinal";
    /// Alternative spelling of [`ORDINAL`] accepted for environment-style sources
    pub const ORDINAL_ENV: &str = "CONFIG_ORDINAL";
    /// Set by [`crate::filter::MaskingFilter`] on values it replaced
    pub const MASKED: &str = "_masked";
}

/// Returns true for keys reserved for metadata (leading underscore)
#[must_use]
pub fn is_metadata_key(key: &str) -> bool {
    key.starts_with(meta::PREFIX)
}

/// A resolved configuration entry: key, value, originating source and metadata.
///
/// Values are immutable once produced. Filters that want to change a value
/// derive a new one with [`PropertyValue::with_value`] or
/// [`PropertyValue::with_meta`].
///
/// # Example
///
/// ```
/// use tiercfg::PropertyValue;
///
/// let value = PropertyValue::new("db.url", "postgres://localhost", "defaults")
///     .with_meta("_origin", "built-in");
///
/// assert_eq!(value.value(), Some("postgres://localhost"));
/// assert_eq!(value.source(), "defaults");
/// assert_eq!(value.meta("_origin"), Some("built-in"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyValue {
    key: String,
    value: Option<String>,
    source: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
}

impl PropertyValue {
    /// Create a value with content
    pub fn new(key: impl Into<String>, value: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            source: source.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create a value whose content is explicitly null
    pub fn null(key: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            source: source.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Name of the property source that produced this value
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Get a single metadata entry
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Derive a copy carrying a different value
    #[must_use]
    pub fn with_value(&self, value: Option<String>) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }

    /// Derive a copy with one additional metadata entry
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Derive a copy with all given metadata entries added
    #[must_use]
    pub fn with_metadata<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Consume the value, returning its content
    pub fn into_value(self) -> Option<String> {
        self.value
    }

    /// Whether the key is a metadata key (see [`is_metadata_key`])
    pub fn is_metadata(&self) -> bool {
        is_metadata_key(&self.key)
    }
}
