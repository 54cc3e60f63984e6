//! Change notification
//!
//! Provides reactive callbacks for dynamic values and stored mutations, plus
//! per-key validators that can veto a write before it reaches any source.

use crate::sync::RwLockExt;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// One observed change of a key's value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChange<T> {
    /// Key that changed
    pub key: String,
    /// Value before the change, `None` if absent
    pub old: Option<T>,
    /// Value after the change, `None` if removed
    pub new: Option<T>,
}

impl<T> ValueChange<T> {
    pub fn new(key: impl Into<String>, old: Option<T>, new: Option<T>) -> Self {
        Self {
            key: key.into(),
            old,
            new,
        }
    }

    /// True if the key disappeared
    pub fn is_removal(&self) -> bool {
        self.old.is_some() && self.new.is_none()
    }
}

/// Type alias for a change callback
pub type ChangeCallback<T> = Arc<dyn Fn(&ValueChange<T>) + Send + Sync>;

/// Type alias for a validator function
pub type Validator = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Listeners for changes of values of type `T`
pub struct ChangeListeners<T> {
    /// Called for every change
    global: RwLock<Vec<ChangeCallback<T>>>,

    /// Called only for changes of one key
    keyed: RwLock<HashMap<String, Vec<ChangeCallback<T>>>>,
}

impl<T> ChangeListeners<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            global: RwLock::new(Vec::new()),
            keyed: RwLock::new(HashMap::new()),
        }
    }

    /// Register a listener for every change
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&ValueChange<T>) + Send + Sync + 'static,
    {
        self.global.write_or_recover().push(Arc::new(callback));
    }

    /// Register a listener for changes of `key` only
    pub fn watch<F>(&self, key: &str, callback: F)
    where
        F: Fn(&ValueChange<T>) + Send + Sync + 'static,
    {
        self.keyed
            .write_or_recover()
            .entry(key.to_string())
            .or_default()
            .push(Arc::new(callback));
    }

    /// Call every matching listener.
    ///
    /// Listeners run outside the internal locks, so a callback may register
    /// further listeners without deadlocking.
    pub fn notify(&self, change: &ValueChange<T>) {
        let mut callbacks: Vec<ChangeCallback<T>> = self.global.read_or_recover().clone();
        if let Some(keyed) = self.keyed.read_or_recover().get(&change.key) {
            callbacks.extend(keyed.iter().cloned());
        }
        for callback in callbacks {
            callback(change);
        }
    }

    /// Remove all listeners for a specific key
    pub fn unwatch(&self, key: &str) {
        self.keyed.write_or_recover().remove(key);
    }

    /// Clear all listeners
    pub fn clear(&self) {
        self.global.write_or_recover().clear();
        self.keyed.write_or_recover().clear();
    }

    /// Total number of registered listeners
    pub fn len(&self) -> usize {
        self.global.read_or_recover().len()
            + self
                .keyed
                .read_or_recover()
                .values()
                .map(Vec::len)
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ChangeListeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-key validators for values about to be written
#[derive(Default)]
pub struct Validators {
    validators: RwLock<HashMap<String, Vec<Validator>>>,
}

impl Validators {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validator for `key`
    pub fn add<F>(&self, key: &str, validator: F)
    where
        F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators
            .write_or_recover()
            .entry(key.to_string())
            .or_default()
            .push(Arc::new(validator));
    }

    /// Run every validator of `key` against `value`
    ///
    /// # Errors
    ///
    /// Returns the first validation error message.
    pub fn validate(&self, key: &str, value: &str) -> Result<(), String> {
        let guard = self.validators.read_or_recover();
        if let Some(validators) = guard.get(key) {
            for validator in validators {
                validator(value)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_global_listener() {
        let listeners = ChangeListeners::<String>::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        listeners.on_change(move |_change| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        listeners.notify(&ValueChange::new("test.key", None, Some("value".to_string())));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_key_specific_listener() {
        let listeners = ChangeListeners::<i32>::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        listeners.watch("port", move |change| {
            assert_eq!(change.new, Some(9090));
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        listeners.notify(&ValueChange::new("port", Some(8080), Some(9090)));
        // other keys don't reach the watcher
        listeners.notify(&ValueChange::new("timeout", Some(1), Some(2)));

        assert_eq!(counter.load(Ordering::SeqCst), 1);

        listeners.unwatch("port");
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_listener_may_register_listener() {
        let listeners = Arc::new(ChangeListeners::<String>::new());
        let inner = Arc::clone(&listeners);
        listeners.on_change(move |_| inner.on_change(|_| {}));

        listeners.notify(&ValueChange::new("k", None, None));
        assert_eq!(listeners.len(), 2);
    }

    #[test]
    fn test_validator() {
        let validators = Validators::new();

        validators.add("port", |value| match value.parse::<u32>() {
            Ok(n) if (1..=65535).contains(&n) => Ok(()),
            _ => Err("Port must be between 1 and 65535".into()),
        });

        assert!(validators.validate("port", "8080").is_ok());
        assert!(validators.validate("port", "0").is_err());
        assert!(validators.validate("port", "abc").is_err());
        // keys without validators always pass
        assert!(validators.validate("host", "anything").is_ok());
    }

    #[test]
    fn test_removal() {
        let change = ValueChange::new("k", Some(1), None);
        assert!(change.is_removal());
        assert!(!ValueChange::new("k", None, Some(1)).is_removal());
    }
}
