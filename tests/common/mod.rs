//! Common test utilities for tiercfg integration tests
//!
//! Provides shared fixtures, failing sources and helper functions.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use tiercfg::{Configuration, Error, MemoryPropertySource, PropertySource, PropertyValue, Result};

/// Route library logs to the test output; safe to call from every test
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// =============================================================================
// Test Sources
// =============================================================================

/// A source whose backend is always down
pub struct FailingSource {
    name: String,
    ordinal: i32,
}

impl FailingSource {
    pub fn new(name: &str, ordinal: i32) -> Self {
        Self {
            name: name.to_string(),
            ordinal,
        }
    }
}

impl PropertySource for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, _key: &str) -> Result<Option<PropertyValue>> {
        Err(Error::from_source(&self.name, "backend unavailable"))
    }

    fn properties(&self) -> Result<BTreeMap<String, PropertyValue>> {
        Err(Error::from_source(&self.name, "backend unavailable"))
    }
}

/// Raw value of `key` held by one source
pub fn source_value(source: &dyn PropertySource, key: &str) -> Option<String> {
    source
        .get(key)
        .expect("source lookup failed")
        .and_then(PropertyValue::into_value)
}

// =============================================================================
// Test Fixtures
// =============================================================================

/// Two memory sources (`defaults` at 0, `user` at 100) behind one
/// configuration with the default expression resolvers
pub struct TestFixture {
    pub defaults: Arc<MemoryPropertySource>,
    pub user: Arc<MemoryPropertySource>,
    pub config: Arc<Configuration>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::build(MemoryPropertySource::new("defaults", 0))
    }

    /// Same as [`TestFixture::new`] but the defaults reject writes
    pub fn with_read_only_defaults() -> Self {
        Self::build(MemoryPropertySource::new("defaults", 0).read_only())
    }

    fn build(defaults: MemoryPropertySource) -> Self {
        init_logging();
        let defaults = Arc::new(
            defaults
                .with("app.name", "demo")
                .with("db.host", "localhost")
                .with("db.port", "5432")
                .with("db.url", "postgres://${db.host}:${db.port}/app")
                .with("db.password", "hunter2")
                .with("_internal.revision", "7"),
        );
        let user = Arc::new(MemoryPropertySource::new("user", 100));
        let config = Configuration::builder()
            .with_shared_source(defaults.clone())
            .with_shared_source(user.clone())
            .with_default_resolvers()
            .build()
            .expect("Failed to build configuration");

        Self {
            defaults,
            user,
            config: Arc::new(config),
        }
    }

    /// Resolved string value of `key`
    pub fn value(&self, key: &str) -> Option<String> {
        self.config.get_value(key).expect("lookup failed")
    }
}
