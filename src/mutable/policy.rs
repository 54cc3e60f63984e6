//! Rules for pushing a change request into mutable sources

use super::ChangeRequest;
use crate::error::{Error, Result, SourceFailure};
use crate::source::MutablePropertySource;

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// What happened when a change request was propagated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationOutcome {
    /// Id of the propagated request
    pub request_id: String,

    /// Names of sources that accepted (their part of) the change
    pub applied: Vec<String>,

    /// Every per-source failure, in the order encountered
    pub failures: Vec<SourceFailure>,
}

impl PropagationOutcome {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            applied: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self, source_name: impl Into<String>) {
        self.applied.push(source_name.into());
    }

    pub fn record_failure(&mut self, source_name: impl Into<String>, message: impl Into<String>) {
        let failure = SourceFailure {
            source_name: source_name.into(),
            message: message.into(),
        };
        warn!(
            "Change request {} failed for '{}': {}",
            self.request_id, failure.source_name, failure.message
        );
        self.failures.push(failure);
    }

    /// True if no source failed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn any failure into [`Error::PartialPropagation`]
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartialPropagation`] listing every failure.
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(Error::PartialPropagation {
                request_id: self.request_id,
                failures: self.failures,
            })
        }
    }

    fn apply_to(&mut self, source: &dyn MutablePropertySource, request: &ChangeRequest) {
        match source.apply_change(request) {
            Ok(()) => self.record_success(source.name()),
            Err(e) => self.record_failure(source.name(), e.to_string()),
        }
    }
}

const NO_MUTABLE_SOURCE: &str = "no mutable property source registered";

/// Applies a [`ChangeRequest`] to the mutable sources of a configuration.
///
/// `sources` are given highest precedence first. Implementations record
/// per-source failures in the outcome instead of stopping at the first one.
pub trait ChangePropagationPolicy: Send + Sync {
    /// Short name used in log messages
    fn name(&self) -> &str;

    fn apply_change(
        &self,
        request: &ChangeRequest,
        sources: &[Arc<dyn MutablePropertySource>],
    ) -> PropagationOutcome;
}

// =============================================================================
// Built-in policies
// =============================================================================

/// Apply every change to every mutable source
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyToAll;

impl ChangePropagationPolicy for ApplyToAll {
    fn name(&self) -> &str {
        "apply-to-all"
    }

    fn apply_change(
        &self,
        request: &ChangeRequest,
        sources: &[Arc<dyn MutablePropertySource>],
    ) -> PropagationOutcome {
        let mut outcome = PropagationOutcome::new(request.id());
        if sources.is_empty() {
            outcome.record_failure("*", NO_MUTABLE_SOURCE);
        }
        for source in sources {
            outcome.apply_to(source.as_ref(), request);
        }
        outcome
    }
}

/// Apply each key to the most significant source already holding it, or to
/// a designated default source.
#[derive(Debug, Clone)]
pub struct ApplyToFirstMatching {
    default_source: String,
}

impl ApplyToFirstMatching {
    pub fn new(default_source: impl Into<String>) -> Self {
        Self {
            default_source: default_source.into(),
        }
    }

    pub fn default_source(&self) -> &str {
        &self.default_source
    }

    fn holds(source: &dyn MutablePropertySource, key: &str) -> bool {
        match source.get(key) {
            Ok(value) => value.is_some(),
            Err(e) => {
                warn!(
                    "Property source '{}' failed to resolve '{key}', skipping: {e}",
                    source.name()
                );
                false
            }
        }
    }
}

impl ChangePropagationPolicy for ApplyToFirstMatching {
    fn name(&self) -> &str {
        "apply-to-first-matching"
    }

    fn apply_change(
        &self,
        request: &ChangeRequest,
        sources: &[Arc<dyn MutablePropertySource>],
    ) -> PropagationOutcome {
        let mut outcome = PropagationOutcome::new(request.id());
        let default = sources
            .iter()
            .position(|s| s.name() == self.default_source);

        // source index -> its share of the request
        let mut parts: BTreeMap<usize, ChangeRequest> = BTreeMap::new();
        for key in request.keys() {
            let target = sources
                .iter()
                .position(|s| Self::holds(s.as_ref(), key))
                .or(default);
            let Some(index) = target else {
                outcome.record_failure(
                    self.default_source.as_str(),
                    format!("no source holds '{key}' and the default source is not registered"),
                );
                continue;
            };
            let part = parts
                .entry(index)
                .or_insert_with(|| request.derive_empty());
            match request.puts().get(key) {
                Some(value) => part.put(key, value.as_str()),
                None => part.remove(key),
            };
        }

        for (index, part) in parts {
            let source = &sources[index];
            debug!(
                "Routing {} change(s) of request {} to '{}'",
                part.len(),
                request.id(),
                source.name()
            );
            outcome.apply_to(source.as_ref(), &part);
        }
        outcome
    }
}

/// Apply everything to the highest-precedence mutable source only
#[derive(Debug, Clone, Copy, Default)]
pub struct MostSignificantOnly;

impl ChangePropagationPolicy for MostSignificantOnly {
    fn name(&self) -> &str {
        "most-significant-only"
    }

    fn apply_change(
        &self,
        request: &ChangeRequest,
        sources: &[Arc<dyn MutablePropertySource>],
    ) -> PropagationOutcome {
        let mut outcome = PropagationOutcome::new(request.id());
        match sources.first() {
            Some(source) => outcome.apply_to(source.as_ref(), request),
            None => outcome.record_failure("*", NO_MUTABLE_SOURCE),
        }
        outcome
    }
}

/// Apply only to the named sources, in precedence order.
///
/// Names with no matching mutable source are reported as failures.
#[derive(Debug, Clone)]
pub struct Selective {
    names: BTreeSet<String>,
}

impl Selective {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }
}

impl ChangePropagationPolicy for Selective {
    fn name(&self) -> &str {
        "selective"
    }

    fn apply_change(
        &self,
        request: &ChangeRequest,
        sources: &[Arc<dyn MutablePropertySource>],
    ) -> PropagationOutcome {
        let mut outcome = PropagationOutcome::new(request.id());
        for source in sources.iter().filter(|s| self.names.contains(s.name())) {
            outcome.apply_to(source.as_ref(), request);
        }
        for name in &self.names {
            if !sources.iter().any(|s| s.name() == name.as_str()) {
                outcome.record_failure(name.as_str(), Error::NotMutable(name.clone()).to_string());
            }
        }
        outcome
    }
}

/// Apply nothing; useful for dry runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOp;

impl ChangePropagationPolicy for NoOp {
    fn name(&self) -> &str {
        "no-op"
    }

    fn apply_change(
        &self,
        request: &ChangeRequest,
        _sources: &[Arc<dyn MutablePropertySource>],
    ) -> PropagationOutcome {
        info!(
            "Dry run: change request {} with {} change(s) not applied",
            request.id(),
            request.len()
        );
        PropagationOutcome::new(request.id())
    }
}

// =============================================================================
// Tests
// =============================================================================
