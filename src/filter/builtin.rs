use super::{FilterContext, PropertyFilter};
use crate::error::{Error, Result};
use crate::value::{PropertyValue, meta};

use regex::Regex;

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Config(format!("Invalid key pattern '{pattern}': {e}")))
}

/// Drops every key matching a regular expression.
///
/// ```
/// use tiercfg::{FilterContext, PropertyFilter, PropertyValue, RegexKeyFilter};
///
/// let filter = RegexKeyFilter::new(r"^internal\.").unwrap();
/// let hidden = PropertyValue::new("internal.token", "x", "defaults");
/// assert!(filter.filter_property(hidden, &FilterContext::single("internal.token")).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct RegexKeyFilter {
    pattern: Regex,
}

impl RegexKeyFilter {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern is not a valid regex.
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
        })
    }
}

impl PropertyFilter for RegexKeyFilter {
    fn filter_property(
        &self,
        value: PropertyValue,
        _ctx: &FilterContext<'_>,
    ) -> Option<PropertyValue> {
        (!self.pattern.is_match(value.key())).then_some(value)
    }
}

/// Replaces the value of matching keys with a mask, e.g. for secrets that
/// must not show up in dumps of the configuration.
///
/// Masked values carry the [`meta::MASKED`] metadata entry.
#[derive(Debug, Clone)]
pub struct MaskingFilter {
    pattern: Regex,
    mask: String,
}

impl MaskingFilter {
    pub const DEFAULT_MASK: &'static str = "*****";

    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern is not a valid regex.
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
            mask: Self::DEFAULT_MASK.to_string(),
        })
    }

    #[must_use]
    pub fn mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = mask.into();
        self
    }
}

impl PropertyFilter for MaskingFilter {
    fn filter_property(
        &self,
        value: PropertyValue,
        _ctx: &FilterContext<'_>,
    ) -> Option<PropertyValue> {
        if value.value().is_none() || !self.pattern.is_match(value.key()) {
            return Some(value);
        }
        Some(
            value
                .with_value(Some(self.mask.clone()))
                .with_meta(meta::MASKED, "true"),
        )
    }
}
