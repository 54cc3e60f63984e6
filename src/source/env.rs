//! Environment variables as a property source

use super::PropertySource;
use crate::error::Result;
use crate::value::PropertyValue;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Abstraction over the process environment so lookups can be tested
/// without mutating real environment variables.
pub trait EnvSource: Send + Sync {
    /// Value of a single variable
    fn var(&self, name: &str) -> Option<String>;

    /// All variables
    fn vars(&self) -> Vec<(String, String)>;
}

/// Reads the real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEnvSource;

impl EnvSource for DefaultEnvSource {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }
}

/// Fixed set of variables, mainly for tests
#[derive(Debug, Clone, Default)]
pub struct MapEnvSource {
    vars: HashMap<String, String>,
}

impl MapEnvSource {
    pub fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl EnvSource for MapEnvSource {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Property source backed by environment variables.
///
/// Ordinal defaults to [`EnvironmentPropertySource::DEFAULT_ORDINAL`] so the
/// environment overrides ordinary defaults. With a prefix set, only variables
/// starting with the prefix are visible and the prefix is stripped from keys
/// (`APP_DB_URL` becomes `DB_URL` for prefix `APP_`).
pub struct EnvironmentPropertySource {
    name: String,
    ordinal: i32,
    prefix: Option<String>,
    env: Arc<dyn EnvSource>,
}

impl EnvironmentPropertySource {
    pub const DEFAULT_ORDINAL: i32 = 300;
    pub const DEFAULT_NAME: &'static str = "environment-properties";

    pub fn new() -> Self {
        Self::with_env(Arc::new(DefaultEnvSource))
    }

    pub fn with_env(env: Arc<dyn EnvSource>) -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_string(),
            ordinal: Self::DEFAULT_ORDINAL,
            prefix: None,
            env,
        }
    }

    /// Restrict the source to variables with this prefix
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.name = format!("{}[{prefix}]", Self::DEFAULT_NAME);
        self.prefix = Some(prefix);
        self
    }

    #[must_use]
    pub fn ordinal_of(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    fn var_name(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        }
    }
}

impl Default for EnvironmentPropertySource {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> Result<Option<PropertyValue>> {
        Ok(self
            .env
            .var(&self.var_name(key))
            .map(|v| PropertyValue::new(key, v, &self.name)))
    }

    fn properties(&self) -> Result<BTreeMap<String, PropertyValue>> {
        let mut props = BTreeMap::new();
        for (name, value) in self.env.vars() {
            let key = match &self.prefix {
                Some(prefix) => match name.strip_prefix(prefix.as_str()) {
                    Some(stripped) => stripped.to_string(),
                    None => continue,
                },
                None => name,
            };
            props.insert(key.clone(), PropertyValue::new(key, value, &self.name));
        }
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Arc<dyn EnvSource> {
        Arc::new(MapEnvSource::new([
            ("APP_DB_URL", "postgres://db"),
            ("APP_PORT", "8080"),
            ("HOME", "/home/me"),
        ]))
    }

    #[test]
    fn test_unprefixed_lookup() {
        let source = EnvironmentPropertySource::with_env(env());
        let home = source.get("HOME").unwrap().unwrap();
        assert_eq!(home.value(), Some("/home/me"));
        assert_eq!(source.ordinal(), 300);
        assert_eq!(source.properties().unwrap().len(), 3);
    }

    #[test]
    fn test_prefix_is_stripped() {
        let source = EnvironmentPropertySource::with_env(env()).prefix("APP_");
        assert_eq!(
            source.get("PORT").unwrap().unwrap().value(),
            Some("8080")
        );
        assert!(source.get("HOME").unwrap().is_none());

        let keys: Vec<_> = source.properties().unwrap().into_keys().collect();
        assert_eq!(keys, vec!["DB_URL".to_string(), "PORT".to_string()]);
        assert_eq!(source.name(), "environment-properties[APP_]");
    }

    #[test]
    fn test_ordinal_override() {
        let source = EnvironmentPropertySource::with_env(env()).ordinal_of(50);
        assert_eq!(source.ordinal(), 50);
        assert_eq!(source.name(), EnvironmentPropertySource::DEFAULT_NAME);
    }
}
