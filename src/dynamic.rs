//! Cached, policy-driven handles to a single logical property
//!
//! A [`DynamicValue`] resolves once at construction and then serves the
//! committed value. Re-resolving writes into a staging slot; the staged value
//! only becomes visible through [`commit`](DynamicValue::commit), which swaps
//! it in with one atomic store. Readers see either the old or the new value,
//! never a mix.
//!
//! ```
//! use std::sync::Arc;
//! use tiercfg::{Configuration, DynamicValue, MemoryPropertySource, UpdatePolicy};
//!
//! let source = Arc::new(MemoryPropertySource::new("runtime", 0).with("pool.size", "4"));
//! let config = Arc::new(
//!     Configuration::builder()
//!         .with_shared_source(source.clone())
//!         .build()
//!         .unwrap(),
//! );
//!
//! let size = DynamicValue::<u32>::new(config, ["pool.size"]).unwrap();
//! source.set("pool.size", "8");
//!
//! // explicit policy: nothing changes until commit
//! assert_eq!(size.get(), Some(4));
//! assert!(size.update_value());
//! assert_eq!(size.get(), Some(4));
//! assert_eq!(size.commit_and_get(), Some(8));
//!
//! size.set_update_policy(UpdatePolicy::Immediate);
//! source.set("pool.size", "16");
//! assert_eq!(size.get(), Some(16));
//! ```

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::events::{ChangeListeners, ValueChange};
use crate::sync::{MutexExt, RwLockExt};

use arc_swap::ArcSwapOption;
use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

/// When re-resolved values become visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Changes are staged and only applied by `commit`
    #[default]
    Explicit,
    /// `get` re-resolves and commits changes on its own
    Immediate,
    /// The value never changes after construction
    Never,
    /// Changes are logged but never applied; the state stays `Loaded` (or
    /// `NoValue`) since nothing is ever staged
    LogOnly,
}

/// Lifecycle of a dynamic value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueState {
    /// No key of the list resolved
    NoValue,
    /// The committed value matches the configuration as last seen
    Loaded,
    /// A newer value was seen but not committed
    Stale,
    /// Re-resolution in progress
    Updating,
}

#[derive(Debug)]
struct Entry<T> {
    key: String,
    value: T,
}

type Slot<T> = Option<Arc<Entry<T>>>;

fn same_value<T: PartialEq>(a: &Slot<T>, b: &Slot<T>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.value == b.value,
        _ => false,
    }
}

/// A cached value for the first present key of a key list.
pub struct DynamicValue<T> {
    config: Arc<Configuration>,
    keys: Vec<String>,
    owner: String,
    committed: ArcSwapOption<Entry<T>>,
    /// `Some(slot)` while a re-resolved value waits for commit
    staged: Mutex<Option<Slot<T>>>,
    policy: RwLock<UpdatePolicy>,
    state: Mutex<ValueState>,
    listeners: ChangeListeners<T>,
}

impl<T> DynamicValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Resolve `keys` against `config` and cache the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `keys` is empty.
    pub fn new<I, K>(config: Arc<Configuration>, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Err(Error::Config(
                "a dynamic value needs at least one key".into(),
            ));
        }

        let owner = keys.join(",");
        let value = Self {
            config,
            keys,
            owner,
            committed: ArcSwapOption::empty(),
            staged: Mutex::new(None),
            policy: RwLock::new(UpdatePolicy::default()),
            state: Mutex::new(ValueState::NoValue),
            listeners: ChangeListeners::new(),
        };

        let initial = value.resolve();
        *value.state.lock_or_recover() = if initial.is_some() {
            ValueState::Loaded
        } else {
            ValueState::NoValue
        };
        value.committed.store(initial);
        Ok(value)
    }

    #[must_use]
    pub fn with_update_policy(self, policy: UpdatePolicy) -> Self {
        self.set_update_policy(policy);
        self
    }

    /// Label used in log messages, e.g. the component owning this value
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        *self.policy.read_or_recover()
    }

    pub fn set_update_policy(&self, policy: UpdatePolicy) {
        *self.policy.write_or_recover() = policy;
        debug!("Dynamic value '{}' now uses {policy:?} updates", self.owner);
    }

    pub fn state(&self) -> ValueState {
        *self.state.lock_or_recover()
    }

    /// Key of the list that produced the committed value
    pub fn resolved_key(&self) -> Option<String> {
        self.committed.load_full().map(|entry| entry.key.clone())
    }

    /// First present, convertible key of the list
    fn resolve(&self) -> Slot<T> {
        for key in &self.keys {
            match self.config.get_as::<T>(key) {
                Ok(Some(value)) => {
                    return Some(Arc::new(Entry {
                        key: key.clone(),
                        value,
                    }));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        "Dynamic value '{}' could not read '{key}', treating it as absent: {e}",
                        self.owner
                    );
                }
            }
        }
        None
    }

    /// The committed value. With [`UpdatePolicy::Immediate`] the value is
    /// re-resolved and committed first.
    pub fn get(&self) -> Option<T> {
        if self.update_policy() == UpdatePolicy::Immediate && self.update_value() {
            self.commit();
        }
        self.committed.load_full().map(|entry| entry.value.clone())
    }

    /// Re-resolve into the staging slot.
    ///
    /// Returns true if the freshly resolved value differs from the committed
    /// one. The committed value is never touched.
    pub fn update_value(&self) -> bool {
        let policy = self.update_policy();
        if policy == UpdatePolicy::Never {
            return false;
        }

        let previous = {
            let mut state = self.state.lock_or_recover();
            std::mem::replace(&mut *state, ValueState::Updating)
        };
        let fresh = self.resolve();

        let mut staged = self.staged.lock_or_recover();
        let committed = self.committed.load_full();
        let changed = !same_value(&fresh, &committed);

        let next_state = if !changed {
            *staged = None;
            if committed.is_some() {
                ValueState::Loaded
            } else {
                ValueState::NoValue
            }
        } else if policy == UpdatePolicy::LogOnly {
            info!(
                "Dynamic value '{}' changed in the configuration (key {:?}), not applied",
                self.owner,
                fresh.as_ref().map(|entry| entry.key.as_str())
            );
            *staged = None;
            if committed.is_some() {
                ValueState::Loaded
            } else {
                ValueState::NoValue
            }
        } else {
            *staged = Some(fresh);
            ValueState::Stale
        };
        if previous != next_state {
            debug!(
                "Dynamic value '{}': {previous:?} -> {next_state:?}",
                self.owner
            );
        }
        *self.state.lock_or_recover() = next_state;
        changed
    }

    /// Make the staged value visible; no-op if nothing is staged
    pub fn commit(&self) {
        let mut staged = self.staged.lock_or_recover();
        let Some(next) = staged.take() else {
            return;
        };
        let old = self.committed.swap(next.clone());
        *self.state.lock_or_recover() = if next.is_some() {
            ValueState::Loaded
        } else {
            ValueState::NoValue
        };
        drop(staged);

        if same_value(&old, &next) {
            return;
        }
        let key = next
            .as_ref()
            .or(old.as_ref())
            .map_or_else(|| self.keys[0].clone(), |entry| entry.key.clone());
        debug!("Dynamic value '{}' committed new value of '{key}'", self.owner);
        self.listeners.notify(&ValueChange::new(
            key,
            old.map(|entry| entry.value.clone()),
            next.map(|entry| entry.value.clone()),
        ));
    }

    /// [`commit`](Self::commit), then return the committed value
    pub fn commit_and_get(&self) -> Option<T> {
        self.commit();
        self.committed.load_full().map(|entry| entry.value.clone())
    }

    /// Drop a staged value without applying it
    pub fn discard(&self) {
        if self.staged.lock_or_recover().take().is_some() {
            let committed = self.committed.load();
            *self.state.lock_or_recover() = if committed.is_some() {
                ValueState::Loaded
            } else {
                ValueState::NoValue
            };
        }
    }

    /// True if a re-resolved value is waiting for commit
    pub fn has_staged(&self) -> bool {
        self.staged.lock_or_recover().is_some()
    }

    pub fn is_present(&self) -> bool {
        self.get().is_some()
    }

    pub fn or_else(&self, default: T) -> T {
        self.get().unwrap_or(default)
    }

    pub fn or_else_get<F>(&self, default: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.get().unwrap_or_else(default)
    }

    /// The value, or the caller's error if absent
    ///
    /// # Errors
    ///
    /// Returns `err()` when no value is present.
    pub fn ok_or_else<E, F>(&self, err: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> E,
    {
        self.get().ok_or_else(err)
    }

    /// Register a listener called after each committed change
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&ValueChange<T>) + Send + Sync + 'static,
    {
        self.listeners.on_change(listener);
    }
}

impl<T> fmt::Debug for DynamicValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicValue")
            .field("owner", &self.owner)
            .field("keys", &self.keys)
            .field("policy", &*self.policy.read_or_recover())
            .field("state", &*self.state.lock_or_recover())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
