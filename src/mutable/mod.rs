//! Batched mutation of the configuration
//!
//! Writes are collected into a pending [`ChangeRequest`] and only reach the
//! underlying sources when [`MutableConfiguration::store`] hands the request to
//! a [`ChangePropagationPolicy`].
//!
//! ```
//! use std::sync::Arc;
//! use tiercfg::{ApplyToAll, Configuration, MemoryPropertySource, MutableConfiguration};
//!
//! let config = Arc::new(
//!     Configuration::builder()
//!         .with_source(MemoryPropertySource::new("user", 100))
//!         .with_source(MemoryPropertySource::new("defaults", 0).with("theme", "light"))
//!         .build()
//!         .unwrap(),
//! );
//!
//! let mut mutable = MutableConfiguration::new(config.clone(), ApplyToAll);
//! mutable.put("theme", "dark");
//! // nothing is written before store()
//! assert_eq!(mutable.get_value("theme").unwrap().as_deref(), Some("light"));
//!
//! let outcome = mutable.store().unwrap();
//! assert!(outcome.is_complete());
//! assert_eq!(config.get_value("theme").unwrap().as_deref(), Some("dark"));
//! ```

mod backup;
mod policy;
mod request;

pub use backup::{Backup, BackupStore};
pub use policy::{
    ApplyToAll, ApplyToFirstMatching, ChangePropagationPolicy, MostSignificantOnly, NoOp,
    PropagationOutcome, Selective,
};
pub use request::ChangeRequest;

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::events::{ChangeListeners, ValueChange, Validators};
use crate::value::PropertyValue;

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Write front-end over a [`Configuration`].
///
/// Reads go straight to the live configuration and never see the pending
/// request.
pub struct MutableConfiguration {
    config: Arc<Configuration>,
    policy: Arc<dyn ChangePropagationPolicy>,
    request: ChangeRequest,
    backups: Option<Arc<BackupStore>>,
    listeners: ChangeListeners<String>,
    validators: Validators,
}

impl MutableConfiguration {
    pub fn new(config: Arc<Configuration>, policy: impl ChangePropagationPolicy + 'static) -> Self {
        Self::with_shared_policy(config, Arc::new(policy))
    }

    pub fn with_shared_policy(
        config: Arc<Configuration>,
        policy: Arc<dyn ChangePropagationPolicy>,
    ) -> Self {
        Self {
            config,
            policy,
            request: ChangeRequest::new(),
            backups: None,
            listeners: ChangeListeners::new(),
            validators: Validators::new(),
        }
    }

    /// Snapshot every mutable source into `store` before each `store()`
    #[must_use]
    pub fn with_backups(mut self, store: Arc<BackupStore>) -> Self {
        self.backups = Some(store);
        self
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub fn policy(&self) -> &dyn ChangePropagationPolicy {
        self.policy.as_ref()
    }

    pub fn backups(&self) -> Option<&Arc<BackupStore>> {
        self.backups.as_ref()
    }

    // =========================================================================
    // Pending changes
    // =========================================================================

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.request.put(key, value);
        self
    }

    pub fn put_all<I, K, V>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.request.put_all(entries);
        self
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.request.remove(key);
        self
    }

    pub fn remove_all<I, K>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.request.remove_all(keys);
        self
    }

    /// The pending request
    pub fn change_request(&self) -> &ChangeRequest {
        &self.request
    }

    /// Drop the pending request and start a fresh one; returns the dropped one
    pub fn discard(&mut self) -> ChangeRequest {
        let dropped = std::mem::take(&mut self.request);
        debug!("Discarded change request {}", dropped.id());
        dropped
    }

    /// Register a validator run for every put of `key` at [`store`](Self::store)
    pub fn add_validator<F>(&self, key: &str, validator: F)
    where
        F: Fn(&str) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.validators.add(key, validator);
    }

    /// Listen to every key changed by a stored request
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&ValueChange<String>) + Send + Sync + 'static,
    {
        self.listeners.on_change(listener);
    }

    /// Listen to changes of one key
    pub fn watch<F>(&self, key: &str, listener: F)
    where
        F: Fn(&ValueChange<String>) + Send + Sync + 'static,
    {
        self.listeners.watch(key, listener);
    }

    /// Propagate the pending request and start a fresh one.
    ///
    /// Per-source failures don't make this fail; they are listed in the
    /// returned outcome. Use [`PropagationOutcome::into_result`] to treat
    /// partial propagation as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a validator rejects a value. The
    /// request then stays pending and no source is touched.
    pub fn store(&mut self) -> Result<PropagationOutcome> {
        for (key, value) in self.request.puts() {
            self.validators
                .validate(key, value)
                .map_err(|message| Error::Validation {
                    key: key.clone(),
                    message,
                })?;
        }

        let request = std::mem::take(&mut self.request);
        if request.is_empty() {
            debug!("Change request {} is empty, nothing to store", request.id());
            return Ok(PropagationOutcome::new(request.id()));
        }

        let sources = self.config.context().registry().mutable_sources();
        if let Some(store) = &self.backups {
            for source in &sources {
                if let Err(e) = store.backup(source.as_ref()) {
                    warn!("Failed to back up property source '{}': {e}", source.name());
                }
            }
        }

        let before: BTreeMap<&str, Option<String>> = request
            .keys()
            .into_iter()
            .map(|key| (key, self.read_quietly(key)))
            .collect();

        let outcome = self.policy.apply_change(&request, &sources);
        info!(
            "Stored change request {} via {}: {} source(s) updated, {} failure(s)",
            request.id(),
            self.policy.name(),
            outcome.applied.len(),
            outcome.failures.len()
        );

        if !outcome.applied.is_empty() {
            for (key, old) in before {
                let new = self.read_quietly(key);
                if old != new {
                    self.listeners.notify(&ValueChange::new(key, old, new));
                }
            }
        }
        Ok(outcome)
    }

    fn read_quietly(&self, key: &str) -> Option<String> {
        self.config.get_value(key).unwrap_or_else(|e| {
            warn!("Could not read '{key}' for change notification: {e}");
            None
        })
    }

    // =========================================================================
    // Read-through accessors
    // =========================================================================

    /// # Errors
    ///
    /// See [`Configuration::get_value`].
    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        self.config.get_value(key)
    }

    /// # Errors
    ///
    /// See [`Configuration::get`].
    pub fn get_optional_value(&self, key: &str) -> Result<Option<PropertyValue>> {
        self.config.get(key)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.config.property_names()
    }

    /// Names of all registered sources, lowest precedence first
    pub fn config_sources(&self) -> Vec<String> {
        self.config.source_names()
    }
}

impl fmt::Debug for MutableConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableConfiguration")
            .field("policy", &self.policy.name())
            .field("pending", &self.request)
            .field("backups", &self.backups.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryPropertySource, PropertySource};
    use std::sync::Mutex;

    fn setup() -> (Arc<MemoryPropertySource>, Arc<Configuration>) {
        let user = Arc::new(MemoryPropertySource::new("user", 100));
        let config = Configuration::builder()
            .with_shared_source(user.clone())
            .with_source(
                MemoryPropertySource::new("defaults", 0)
                    .with("a", "1")
                    .read_only(),
            )
            .build()
            .unwrap();
        (user, Arc::new(config))
    }

    #[test]
    fn test_store_starts_fresh_request() {
        let (_, config) = setup();
        let mut mutable = MutableConfiguration::new(config, MostSignificantOnly);
        mutable.put("a", "2");
        let first_id = mutable.change_request().id().to_string();

        let outcome = mutable.store().unwrap();
        assert_eq!(outcome.request_id, first_id);
        assert_ne!(mutable.change_request().id(), first_id);
        assert!(mutable.change_request().is_empty());
        assert_eq!(mutable.get_value("a").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_discard() {
        let (user, config) = setup();
        let mut mutable = MutableConfiguration::new(config, ApplyToAll);
        mutable.put("x", "1");
        let dropped = mutable.discard();
        assert_eq!(dropped.len(), 1);

        let outcome = mutable.store().unwrap();
        assert!(outcome.applied.is_empty());
        assert!(user.is_empty());
    }

    #[test]
    fn test_validation_keeps_request_pending() {
        let (user, config) = setup();
        let mut mutable = MutableConfiguration::new(config, MostSignificantOnly);
        mutable.add_validator("port", |v| {
            v.parse::<u16>().map(|_| ()).map_err(|e| e.to_string())
        });
        mutable.put("port", "http");

        let err = mutable.store().unwrap_err();
        assert!(matches!(err, Error::Validation { ref key, .. } if key == "port"));
        assert_eq!(mutable.change_request().len(), 1);
        assert!(user.is_empty());
    }

    #[test]
    fn test_listeners_see_changed_keys() {
        let (_, config) = setup();
        let mut mutable = MutableConfiguration::new(config, MostSignificantOnly);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        mutable.on_change(move |change| {
            seen_clone
                .lock()
                .unwrap()
                .push((change.key.clone(), change.old.clone(), change.new.clone()));
        });

        mutable.put("a", "5").put("b", "6");
        mutable.store().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("a".to_string(), Some("1".to_string()), Some("5".to_string())),
                ("b".to_string(), None, Some("6".to_string())),
            ]
        );
    }

    #[test]
    fn test_backups_taken_before_store() {
        let (user, config) = setup();
        user.set("a", "user-value");
        let backups = Arc::new(BackupStore::new());
        let mut mutable =
            MutableConfiguration::new(config, ApplyToAll).with_backups(backups.clone());

        mutable.put("a", "new");
        let outcome = mutable.store().unwrap();
        // the read-only defaults source reports a failure, user got the change
        assert_eq!(outcome.applied, vec!["user"]);
        assert_eq!(outcome.failures.len(), 1);

        assert_eq!(backups.latest("user").unwrap().properties["a"], "user-value");
        backups.restore_into(user.as_ref(), None).unwrap();
        assert_eq!(
            user.get("a").unwrap().and_then(|v| v.into_value()).as_deref(),
            Some("user-value")
        );
    }

    #[test]
    fn test_read_through_accessors() {
        let (_, config) = setup();
        let mutable = MutableConfiguration::new(config, NoOp);
        assert_eq!(mutable.config_sources(), vec!["defaults", "user"]);
        assert_eq!(mutable.property_names(), vec!["a"]);
        assert_eq!(
            mutable.get_optional_value("a").unwrap().unwrap().source(),
            "defaults"
        );
    }
}
