//! Placeholder substitution
//!
//! Values may contain `${[resolver:]expression}` placeholders. `\$` escapes a
//! literal dollar sign. A placeholder naming a registered resolver prefix is
//! handed to that resolver only; any other placeholder is offered to every
//! resolver, highest priority first.
//!
//! Evaluation repeats until a pass changes nothing, so resolved values may
//! themselves contain placeholders. The number of passes is bounded: circular
//! references fail with [`Error::ExpressionLoop`] instead of spinning.
//!
//! ```
//! use tiercfg::{ExpressionEvaluator, UnresolvedPolicy, resolver_fn};
//! use std::collections::BTreeMap;
//!
//! let evaluator = ExpressionEvaluator::builder()
//!     .with_resolver(resolver_fn("demo", |expr| (expr == "x").then(|| "MID".to_string())))
//!     .build()
//!     .unwrap();
//! let props = BTreeMap::new();
//!
//! assert_eq!(evaluator.evaluate("a${x}b", &props).unwrap(), "aMIDb");
//! assert_eq!(evaluator.evaluate("a${y}b", &props).unwrap(), "a[${y}]b");
//! assert_eq!(evaluator.evaluate("\\${x}", &props).unwrap(), "${x}");
//! ```

mod parser;
mod resolvers;

#[cfg(feature = "env")]
pub use resolvers::EnvResolver;
pub use resolvers::{ConfigResolver, FnResolver, resolver_fn};

use crate::error::{Error, Result};
use parser::Segment;

use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

pub(crate) use parser::has_expression_syntax;

/// Default upper bound on evaluation passes
pub const MAX_EVALUATION_PASSES: usize = 10;

/// Raw key lookup used by resolvers that reference other configuration keys
pub trait PropertyLookup {
    fn lookup(&self, key: &str) -> Option<String>;
}

impl PropertyLookup for BTreeMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl PropertyLookup for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Handler for one family of placeholder expressions
pub trait ExpressionResolver: Send + Sync {
    /// Prefix selecting this resolver, without the trailing colon
    fn prefix(&self) -> &str;

    /// Order among resolvers tried for unprefixed placeholders (higher first)
    fn priority(&self) -> i32 {
        0
    }

    /// Resolve `expression`, or `None` if this resolver can't
    fn resolve(&self, expression: &str, lookup: &dyn PropertyLookup) -> Option<String>;
}

/// What to do with a placeholder no resolver could handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedPolicy {
    /// Keep the placeholder wrapped in brackets: `[${foo}]`
    #[default]
    Mask,
    /// Replace it with an empty string
    Empty,
    /// Fail with [`Error::UnresolvedExpression`]
    Fail,
}

impl UnresolvedPolicy {
    /// `true` maps to [`UnresolvedPolicy::Mask`], `false` to [`UnresolvedPolicy::Empty`]
    pub fn from_mask_flag(mask_unresolved: bool) -> Self {
        if mask_unresolved { Self::Mask } else { Self::Empty }
    }
}

/// Builder for [`ExpressionEvaluator`]
#[derive(Default)]
pub struct ExpressionEvaluatorBuilder {
    resolvers: Vec<Arc<dyn ExpressionResolver>>,
    unresolved: UnresolvedPolicy,
    max_passes: Option<usize>,
}

impl ExpressionEvaluatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(mut self, resolver: impl ExpressionResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    pub fn with_shared_resolver(mut self, resolver: Arc<dyn ExpressionResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Register [`ConfigResolver`] (and [`EnvResolver`] with the `env` feature)
    pub fn with_default_resolvers(self) -> Self {
        let builder = self.with_resolver(ConfigResolver);
        #[cfg(feature = "env")]
        let builder = builder.with_resolver(EnvResolver::new());
        builder
    }

    pub fn unresolved(mut self, policy: UnresolvedPolicy) -> Self {
        self.unresolved = policy;
        self
    }

    /// Shorthand for [`UnresolvedPolicy::from_mask_flag`]
    pub fn mask_unresolved(self, mask: bool) -> Self {
        self.unresolved(UnresolvedPolicy::from_mask_flag(mask))
    }

    /// Fail on unresolved placeholders
    pub fn strict(self) -> Self {
        self.unresolved(UnresolvedPolicy::Fail)
    }

    pub fn max_passes(mut self, passes: usize) -> Self {
        self.max_passes = Some(passes);
        self
    }

    /// # Errors
    ///
    /// - [`Error::MissingResolver`] if no resolver was registered
    /// - [`Error::Config`] if `max_passes` is zero
    pub fn build(self) -> Result<ExpressionEvaluator> {
        if self.resolvers.is_empty() {
            return Err(Error::MissingResolver);
        }
        let max_passes = self.max_passes.unwrap_or(MAX_EVALUATION_PASSES);
        if max_passes == 0 {
            return Err(Error::Config("max_passes must be greater than 0".into()));
        }

        let mut resolvers = self.resolvers;
        resolvers.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.prefix().cmp(b.prefix()))
        });

        Ok(ExpressionEvaluator {
            resolvers,
            unresolved: self.unresolved,
            max_passes,
        })
    }
}

/// Placeholder substitution engine. Immutable and shareable across threads.
pub struct ExpressionEvaluator {
    resolvers: Vec<Arc<dyn ExpressionResolver>>,
    unresolved: UnresolvedPolicy,
    max_passes: usize,
}

impl ExpressionEvaluator {
    pub fn builder() -> ExpressionEvaluatorBuilder {
        ExpressionEvaluatorBuilder::new()
    }

    /// Resolvers in the order they are tried for unprefixed placeholders
    pub fn resolvers(&self) -> &[Arc<dyn ExpressionResolver>] {
        &self.resolvers
    }

    pub fn unresolved_policy(&self) -> UnresolvedPolicy {
        self.unresolved
    }

    pub fn max_passes(&self) -> usize {
        self.max_passes
    }

    /// Evaluate every placeholder in `text`.
    ///
    /// # Errors
    ///
    /// - [`Error::ExpressionFormat`] for an unterminated `${`
    /// - [`Error::ExpressionLoop`] if the text does not settle within the pass
    ///   limit or a placeholder resolves to itself
    /// - [`Error::UnresolvedExpression`] in strict mode
    pub fn evaluate(&self, text: &str, lookup: &dyn PropertyLookup) -> Result<String> {
        if !has_expression_syntax(text) {
            return Ok(text.to_string());
        }

        let mut current = text.to_string();
        for pass in 1..=self.max_passes {
            let (next, resolved_any) = self.substitute(&current, lookup)?;
            if next == current {
                if resolved_any {
                    return Err(Error::ExpressionLoop {
                        expression: text.to_string(),
                        passes: pass,
                    });
                }
                return self.render(&current);
            }
            debug!("Expression pass {pass}: '{current}' -> '{next}'");
            current = next;
        }

        Err(Error::ExpressionLoop {
            expression: text.to_string(),
            passes: self.max_passes,
        })
    }

    fn resolve_placeholder(
        &self,
        placeholder: &parser::Placeholder<'_>,
        lookup: &dyn PropertyLookup,
    ) -> Option<String> {
        if let Some((prefix, expression)) = placeholder.prefixed {
            if let Some(resolver) = self.resolvers.iter().find(|r| r.prefix() == prefix) {
                return resolver.resolve(expression, lookup);
            }
        }
        self.resolvers
            .iter()
            .find_map(|r| r.resolve(placeholder.inner, lookup))
    }

    /// One pass: substitute what can be resolved, keep escapes and unresolved
    /// placeholders verbatim so later passes never re-read rendered output.
    fn substitute(&self, text: &str, lookup: &dyn PropertyLookup) -> Result<(String, bool)> {
        let mut out = String::with_capacity(text.len());
        let mut resolved_any = false;
        for segment in parser::parse(text)? {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Escaped => out.push_str("\\$"),
                Segment::Placeholder(p) => match self.resolve_placeholder(&p, lookup) {
                    Some(value) => {
                        resolved_any = true;
                        out.push_str(&value);
                    }
                    None => out.push_str(p.raw),
                },
            }
        }
        Ok((out, resolved_any))
    }

    fn render(&self, text: &str) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        for segment in parser::parse(text)? {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Escaped => out.push('$'),
                Segment::Placeholder(p) => match self.unresolved {
                    UnresolvedPolicy::Mask => {
                        out.push('[');
                        out.push_str(p.raw);
                        out.push(']');
                    }
                    UnresolvedPolicy::Empty => {}
                    UnresolvedPolicy::Fail => {
                        return Err(Error::UnresolvedExpression(p.raw.to_string()));
                    }
                },
            }
        }
        Ok(out)
    }
}

impl fmt::Debug for ExpressionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionEvaluator")
            .field(
                "resolvers",
                &self.resolvers.iter().map(|r| r.prefix()).collect::<Vec<_>>(),
            )
            .field("unresolved", &self.unresolved)
            .field("max_passes", &self.max_passes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn evaluator(policy: UnresolvedPolicy) -> ExpressionEvaluator {
        ExpressionEvaluator::builder()
            .with_resolver(ConfigResolver)
            .with_resolver(resolver_fn("demo", |e| (e == "x").then(|| "MID".to_string())))
            .unresolved(policy)
            .build()
            .unwrap()
    }

    #[test]
    fn test_substitution() {
        let ev = evaluator(UnresolvedPolicy::Mask);
        assert_eq!(ev.evaluate("a${x}b", &props(&[])).unwrap(), "aMIDb");
    }

    #[test]
    fn test_unresolved_policies() {
        let empty = props(&[]);
        assert_eq!(
            evaluator(UnresolvedPolicy::Mask).evaluate("a${nope}b", &empty).unwrap(),
            "a[${nope}]b"
        );
        assert_eq!(
            evaluator(UnresolvedPolicy::Empty).evaluate("a${nope}b", &empty).unwrap(),
            "ab"
        );
        let err = evaluator(UnresolvedPolicy::Fail)
            .evaluate("a${nope}b", &empty)
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedExpression(ref raw) if raw == "${nope}"));
    }

    #[test]
    fn test_escape_is_never_resolved() {
        let ev = evaluator(UnresolvedPolicy::Fail);
        assert_eq!(ev.evaluate("\\${x}", &props(&[])).unwrap(), "${x}");
        assert_eq!(ev.evaluate("price: \\$5", &props(&[])).unwrap(), "price: $5");
    }

    #[test]
    fn test_nested_values_are_reevaluated() {
        let ev = evaluator(UnresolvedPolicy::Fail);
        let p = props(&[("url", "http://${host}:${port}"), ("host", "example.org"), ("port", "80")]);
        assert_eq!(ev.evaluate("${url}/api", &p).unwrap(), "http://example.org:80/api");
    }

    #[test]
    fn test_prefix_selects_single_resolver() {
        let ev = evaluator(UnresolvedPolicy::Mask);
        let p = props(&[("x", "from-config")]);
        assert_eq!(ev.evaluate("${x}", &p).unwrap(), "from-config");
        assert_eq!(ev.evaluate("${demo:x}", &p).unwrap(), "MID");
        assert_eq!(ev.evaluate("${conf:x}", &p).unwrap(), "from-config");
        // unknown prefix: full text offered to everyone
        assert_eq!(ev.evaluate("${other:x}", &p).unwrap(), "[${other:x}]");
    }

    #[test]
    fn test_priority_orders_unprefixed_resolvers() {
        let ev = ExpressionEvaluator::builder()
            .with_resolver(resolver_fn("low", |_| Some("low".into())))
            .with_resolver(resolver_fn("high", |_| Some("high".into())).priority(10))
            .build()
            .unwrap();
        assert_eq!(ev.evaluate("${anything}", &props(&[])).unwrap(), "high");
        assert_eq!(ev.resolvers()[0].prefix(), "high");
    }

    #[test]
    fn test_circular_reference_is_an_error() {
        let ev = evaluator(UnresolvedPolicy::Mask);
        let p = props(&[("a", "${b}"), ("b", "${a}")]);
        let err = ev.evaluate("${a}", &p).unwrap_err();
        assert!(matches!(err, Error::ExpressionLoop { passes: 10, .. }));
    }

    #[test]
    fn test_self_reference_is_an_error() {
        let ev = evaluator(UnresolvedPolicy::Mask);
        let p = props(&[("a", "${a}")]);
        let err = ev.evaluate("${a}", &p).unwrap_err();
        assert!(matches!(err, Error::ExpressionLoop { passes: 1, .. }));
    }

    #[test]
    fn test_growing_reference_hits_bound() {
        let ev = ExpressionEvaluator::builder()
            .with_resolver(ConfigResolver)
            .max_passes(3)
            .build()
            .unwrap();
        let p = props(&[("a", "x${a}")]);
        assert!(matches!(
            ev.evaluate("${a}", &p).unwrap_err(),
            Error::ExpressionLoop { passes: 3, .. }
        ));
    }

    #[test]
    fn test_unterminated_placeholder() {
        let ev = evaluator(UnresolvedPolicy::Mask);
        assert!(matches!(
            ev.evaluate("${open", &props(&[])).unwrap_err(),
            Error::ExpressionFormat { .. }
        ));
    }

    #[test]
    fn test_builder_requires_resolver() {
        assert!(matches!(
            ExpressionEvaluator::builder().build().unwrap_err(),
            Error::MissingResolver
        ));
        assert!(
            ExpressionEvaluator::builder()
                .with_resolver(ConfigResolver)
                .max_passes(0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_mask_flag_and_strict_shorthands() {
        assert_eq!(UnresolvedPolicy::from_mask_flag(true), UnresolvedPolicy::Mask);
        assert_eq!(UnresolvedPolicy::from_mask_flag(false), UnresolvedPolicy::Empty);

        let base = || ExpressionEvaluator::builder().with_resolver(ConfigResolver);
        let empty = props(&[]);

        let masked = base().mask_unresolved(true).build().unwrap();
        assert_eq!(masked.evaluate("a${x}b", &empty).unwrap(), "a[${x}]b");

        let dropped = base().mask_unresolved(false).build().unwrap();
        assert_eq!(dropped.unresolved_policy(), UnresolvedPolicy::Empty);
        assert_eq!(dropped.evaluate("a${x}b", &empty).unwrap(), "ab");

        let strict = base().mask_unresolved(true).strict().build().unwrap();
        assert!(matches!(
            strict.evaluate("a${x}b", &empty).unwrap_err(),
            Error::UnresolvedExpression(_)
        ));
    }

    #[test]
    fn test_shared_resolver_is_used() {
        let shared: Arc<dyn ExpressionResolver> =
            Arc::new(resolver_fn("shared", |e| Some(e.to_uppercase())));
        let first = ExpressionEvaluator::builder()
            .with_shared_resolver(Arc::clone(&shared))
            .build()
            .unwrap();
        let second = ExpressionEvaluator::builder()
            .with_shared_resolver(Arc::clone(&shared))
            .build()
            .unwrap();

        assert_eq!(first.evaluate("${shared:abc}", &props(&[])).unwrap(), "ABC");
        assert_eq!(second.evaluate("${abc}", &props(&[])).unwrap(), "ABC");
        assert_eq!(Arc::strong_count(&shared), 3);
    }
}
