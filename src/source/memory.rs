use super::{DEFAULT_ORDINAL, MutablePropertySource, PropertySource};
use crate::error::{Error, Result};
use crate::mutable::ChangeRequest;
use crate::sync::RwLockExt;
use crate::value::PropertyValue;

use log::debug;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// In-memory, mutable property source.
///
/// Used for programmatic defaults, overrides set at runtime and as the target
/// of [`MutableConfiguration`](crate::MutableConfiguration) in tests.
///
/// # Example
///
/// ```
/// use tiercfg::{MemoryPropertySource, PropertySource};
///
/// let source = MemoryPropertySource::new("overrides", 500)
///     .with("server.port", "8080")
///     .with("server.host", "0.0.0.0");
///
/// let port = source.get("server.port").unwrap().unwrap();
/// assert_eq!(port.value(), Some("8080"));
/// ```
pub struct MemoryPropertySource {
    name: String,
    ordinal: i32,
    scannable: bool,
    read_only: bool,
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryPropertySource {
    pub fn new(name: impl Into<String>, ordinal: i32) -> Self {
        Self {
            name: name.into(),
            ordinal,
            scannable: true,
            read_only: false,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a source with [`DEFAULT_ORDINAL`] holding the given entries
    pub fn from_map<I, K, V>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source = Self::new(name, DEFAULT_ORDINAL);
        source
            .entries
            .write_or_recover()
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        source
    }

    /// Add an entry (builder style)
    #[must_use]
    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.write_or_recover().insert(key.into(), value.into());
        self
    }

    /// Override the ordinal (builder style)
    #[must_use]
    pub fn ordinal_of(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    /// Only answer direct lookups; bulk reads skip this source
    #[must_use]
    pub fn not_scannable(mut self) -> Self {
        self.scannable = false;
        self
    }

    /// Reject every change request with [`Error::ChangeRejected`]
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Set a single entry directly, bypassing change requests
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.write_or_recover().insert(key.into(), value.into());
    }

    /// Remove a single entry directly, returning the old value
    pub fn unset(&self, key: &str) -> Option<String> {
        self.entries.write_or_recover().remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read_or_recover().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read_or_recover().is_empty()
    }

    fn reject_if_read_only(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::ChangeRejected {
                source_name: self.name.clone(),
                reason: "source is read-only".into(),
            });
        }
        Ok(())
    }
}

impl PropertySource for MemoryPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> Result<Option<PropertyValue>> {
        Ok(self
            .entries
            .read_or_recover()
            .get(key)
            .map(|v| PropertyValue::new(key, v.clone(), &self.name)))
    }

    fn properties(&self) -> Result<BTreeMap<String, PropertyValue>> {
        Ok(self
            .entries
            .read_or_recover()
            .iter()
            .map(|(k, v)| (k.clone(), PropertyValue::new(k.clone(), v.clone(), &self.name)))
            .collect())
    }

    fn is_scannable(&self) -> bool {
        self.scannable
    }

    fn as_mutable(self: Arc<Self>) -> Option<Arc<dyn MutablePropertySource>> {
        Some(self)
    }
}

impl MutablePropertySource for MemoryPropertySource {
    fn apply_change(&self, request: &ChangeRequest) -> Result<()> {
        self.reject_if_read_only()?;

        let mut entries = self.entries.write_or_recover();
        for key in request.removes() {
            entries.remove(key);
        }
        for (key, value) in request.puts() {
            entries.insert(key.clone(), value.clone());
        }
        debug!(
            "Applied change request {} to '{}' ({} puts, {} removes)",
            request.id(),
            self.name,
            request.puts().len(),
            request.removes().len()
        );
        Ok(())
    }

    fn replace_all(&self, properties: BTreeMap<String, String>) -> Result<()> {
        self.reject_if_read_only()?;
        *self.entries.write_or_recover() = properties;
        Ok(())
    }
}
