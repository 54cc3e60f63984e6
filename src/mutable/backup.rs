//! Versioned snapshots of property sources
//!
//! A [`BackupStore`] is an explicit object owned by whoever needs it (usually
//! handed to a [`MutableConfiguration`](super::MutableConfiguration)). It keeps
//! numbered snapshots per source name and can write one back into a mutable
//! source.

use crate::error::{Error, Result};
use crate::source::{MutablePropertySource, PropertySource};
use crate::sync::RwLockExt;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;
use time::OffsetDateTime;

/// One snapshot of a source's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    /// Per-source version, starting at 1
    pub version: u64,

    #[serde(with = "time::serde::rfc3339")]
    pub taken_at: OffsetDateTime,

    /// Non-null values of the source at that time
    pub properties: BTreeMap<String, String>,
}

/// JSON layout of an exported store
#[derive(Serialize, Deserialize)]
struct Exported {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_versions: Option<usize>,
    backups: BTreeMap<String, Vec<Backup>>,
}

/// Versioned backups keyed by source name
#[derive(Debug, Default)]
pub struct BackupStore {
    backups: RwLock<BTreeMap<String, Vec<Backup>>>,
    max_versions: Option<usize>,
}

impl BackupStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max` versions per source, dropping the oldest
    #[must_use]
    pub fn with_max_versions(mut self, max: usize) -> Self {
        self.max_versions = Some(max.max(1));
        self
    }

    /// Snapshot `source` and return the new version number.
    ///
    /// # Errors
    ///
    /// Returns the source's error if it cannot list its properties.
    pub fn backup<S>(&self, source: &S) -> Result<u64>
    where
        S: PropertySource + ?Sized,
    {
        let properties: BTreeMap<String, String> = source
            .properties()?
            .into_iter()
            .filter_map(|(key, value)| value.into_value().map(|v| (key, v)))
            .collect();

        let mut backups = self.backups.write_or_recover();
        let versions = backups.entry(source.name().to_string()).or_default();
        let version = versions.last().map_or(1, |b| b.version + 1);
        versions.push(Backup {
            version,
            taken_at: OffsetDateTime::now_utc(),
            properties,
        });
        self.prune(versions);
        debug!("Backed up property source '{}' as version {version}", source.name());
        Ok(version)
    }

    /// Retention cap per source, if any
    pub fn max_versions(&self) -> Option<usize> {
        self.max_versions
    }

    fn prune(&self, versions: &mut Vec<Backup>) {
        if let Some(max) = self.max_versions {
            let excess = versions.len().saturating_sub(max);
            versions.drain(..excess);
        }
    }

    /// Most recent backup of `source_name`
    pub fn latest(&self, source_name: &str) -> Option<Backup> {
        self.backups
            .read_or_recover()
            .get(source_name)
            .and_then(|v| v.last().cloned())
    }

    /// A specific backup version
    pub fn version(&self, source_name: &str, version: u64) -> Option<Backup> {
        self.backups
            .read_or_recover()
            .get(source_name)
            .and_then(|v| v.iter().find(|b| b.version == version).cloned())
    }

    /// Available versions of `source_name`, oldest first
    pub fn versions(&self, source_name: &str) -> Vec<u64> {
        self.backups
            .read_or_recover()
            .get(source_name)
            .map(|v| v.iter().map(|b| b.version).collect())
            .unwrap_or_default()
    }

    /// Names of sources with at least one backup
    pub fn source_names(&self) -> Vec<String> {
        self.backups.read_or_recover().keys().cloned().collect()
    }

    /// Write a backup back into `source`, replacing its content.
    ///
    /// `version: None` restores the latest backup. Returns the restored
    /// version.
    ///
    /// # Errors
    ///
    /// - [`Error::BackupNotFound`] if there is no such backup
    /// - the source's error if it rejects the content
    pub fn restore_into<S>(&self, source: &S, version: Option<u64>) -> Result<u64>
    where
        S: MutablePropertySource + ?Sized,
    {
        let backup = match version {
            Some(v) => self.version(source.name(), v),
            None => self.latest(source.name()),
        }
        .ok_or_else(|| Error::BackupNotFound {
            source_name: source.name().to_string(),
            version,
        })?;

        source.replace_all(backup.properties)?;
        info!(
            "Restored property source '{}' to version {}",
            source.name(),
            backup.version
        );
        Ok(backup.version)
    }

    /// Drop every backup of `source_name`; returns whether any existed
    pub fn remove(&self, source_name: &str) -> bool {
        self.backups.write_or_recover().remove(source_name).is_some()
    }

    /// Total number of stored backups
    pub fn len(&self) -> usize {
        self.backups.read_or_recover().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Export all backups and the retention cap as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialize`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let exported = Exported {
            max_versions: self.max_versions,
            backups: self.backups.read_or_recover().clone(),
        };
        Ok(serde_json::to_string_pretty(&exported)?)
    }

    /// Import a store exported with [`to_json`](Self::to_json).
    ///
    /// The exported retention cap stays in effect and is applied to the
    /// imported versions right away.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialize`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        let Exported {
            max_versions,
            mut backups,
        } = serde_json::from_str(json)?;
        let store = Self {
            backups: RwLock::new(BTreeMap::new()),
            max_versions,
        };
        for versions in backups.values_mut() {
            store.prune(versions);
        }
        *store.backups.write_or_recover() = backups;
        Ok(store)
    }
}
