//! Filters and placeholder evaluation as seen through `Configuration`

mod common;

use common::{TestFixture, init_logging};
use std::sync::Arc;
use std::thread;
use tiercfg::{
    Configuration, Error, FilterChain, FilterContext, MaskingFilter, MemoryPropertySource,
    PropertyValue, RegexKeyFilter, UnresolvedPolicy, filter_fn, meta, resolver_fn,
};

// =============================================================================
// Filters
// =============================================================================

#[test]
fn test_identity_filters_change_nothing() {
    let fixture = TestFixture::new();
    let mut chain = FilterChain::new();
    chain
        .add_filter(filter_fn(|v, _| Some(v)))
        .add_filter(filter_fn(|v, _| Some(v)));

    assert_eq!(
        fixture.config.properties_with(&chain),
        fixture.config.properties()
    );
    assert_eq!(
        fixture.config.get_with("db.url", &chain).unwrap(),
        fixture.config.get("db.url").unwrap()
    );
}

#[test]
fn test_dropping_filter_hides_key_everywhere() {
    let fixture = TestFixture::new();
    let mut chain = FilterChain::new();
    chain.add_filter(RegexKeyFilter::new(r"^db\.").unwrap());

    assert!(fixture.config.get_with("db.host", &chain).unwrap().is_none());
    let all = fixture.config.properties_with(&chain);
    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["app.name"]);
}

#[test]
fn test_metadata_flag() {
    let fixture = TestFixture::new();
    let mut chain = FilterChain::new();
    assert!(!fixture.config.properties_with(&chain).contains_key("_internal.revision"));

    chain.set_metadata_filtering(false);
    assert!(fixture.config.properties_with(&chain).contains_key("_internal.revision"));

    chain.cleanup_filter_context();
    assert!(chain.is_metadata_filtering());
}

#[test]
fn test_bulk_filter_sees_siblings() {
    let fixture = TestFixture::new();
    let mut chain = FilterChain::new();
    // keep the password only if a host is configured next to it
    chain.add_filter(filter_fn(|v: PropertyValue, ctx: &FilterContext<'_>| {
        if ctx.key() != "db.password" || ctx.is_single() {
            return Some(v);
        }
        ctx.sibling("db.host").map(|_| v.with_value(Some("<set>".into())))
    }));

    let all = fixture.config.properties_with(&chain);
    assert_eq!(all["db.password"].value(), Some("<set>"));
    // single access is untouched by this filter
    assert_eq!(
        fixture.config.get_with("db.password", &chain).unwrap().unwrap().value(),
        Some("hunter2")
    );
}

#[test]
fn test_context_filters_run_before_caller_chain() {
    init_logging();
    let config = Configuration::builder()
        .with_source(
            MemoryPropertySource::new("defaults", 0)
                .with("api.token", "abc")
                .with("api.url", "https://example.org"),
        )
        .with_filter(MaskingFilter::new(r"token$").unwrap())
        .build()
        .unwrap();

    let mut chain = FilterChain::new();
    chain.add_filter(filter_fn(|v, _| {
        // the caller only ever sees the masked value
        assert_ne!(v.value(), Some("abc"));
        Some(v)
    }));

    let token = config.get_with("api.token", &chain).unwrap().unwrap();
    assert_eq!(token.value(), Some(MaskingFilter::DEFAULT_MASK));
    assert_eq!(token.meta(meta::MASKED), Some("true"));
    assert!(config.get("api.url").unwrap().unwrap().meta(meta::MASKED).is_none());
}

fn secret_config() -> Configuration {
    init_logging();
    Configuration::builder()
        .with_source(
            MemoryPropertySource::new("defaults", 0)
                .with("api.token", "s3cret")
                .with("api.header", "Bearer ${api.token}"),
        )
        .with_filter(MaskingFilter::new(r"token$").unwrap())
        .with_default_resolvers()
        .build()
        .unwrap()
}

#[test]
fn test_references_to_masked_keys_stay_masked() {
    let config = secret_config();
    let masked = format!("Bearer {}", MaskingFilter::DEFAULT_MASK);

    assert_eq!(config.get_value("api.header").unwrap(), Some(masked.clone()));
    let all = config.properties();
    assert_eq!(all["api.token"].value(), Some(MaskingFilter::DEFAULT_MASK));
    assert_eq!(all["api.header"].value(), Some(masked.as_str()));
}

#[test]
fn test_references_to_dropped_keys_are_unresolved() {
    let config = secret_config();
    let mut chain = FilterChain::new();
    chain.add_filter(RegexKeyFilter::new(r"^api\.token$").unwrap());

    assert!(config.get_with("api.token", &chain).unwrap().is_none());
    assert_eq!(
        config.get_with("api.header", &chain).unwrap().unwrap().value(),
        Some("Bearer [${api.token}]")
    );
    assert_eq!(
        config.properties_with(&chain)["api.header"].value(),
        Some("Bearer [${api.token}]")
    );
}

#[test]
fn test_scoped_chains_are_isolated_per_thread() {
    let fixture = TestFixture::new();
    let config = Arc::clone(&fixture.config);

    let masking = {
        let config = Arc::clone(&config);
        thread::spawn(move || {
            let mut chain = FilterChain::new();
            for _ in 0..100 {
                let mut scope = chain.scope();
                scope.add_filter(filter_fn(|v, _| Some(v.with_value(Some("x".into())))));
                assert_eq!(
                    config.get_with("app.name", &scope).unwrap().unwrap().value(),
                    Some("x")
                );
            }
            assert!(chain.is_empty());
        })
    };

    let plain = thread::spawn(move || {
        let chain = FilterChain::new();
        for _ in 0..100 {
            assert_eq!(
                config.get_with("app.name", &chain).unwrap().unwrap().value(),
                Some("demo")
            );
        }
    });

    masking.join().unwrap();
    plain.join().unwrap();
}

#[test]
fn test_scope_cleanup_on_error_path() {
    fn lookup_with_scope(config: &Configuration, chain: &mut FilterChain) -> tiercfg::Result<()> {
        let mut scope = chain.scope();
        scope.add_filter(filter_fn(|_, _| None));
        config
            .get_with("app.name", &scope)?
            .ok_or_else(|| Error::PropertyNotFound("app.name".into()))?;
        Ok(())
    }

    let fixture = TestFixture::new();
    let mut chain = FilterChain::new();
    let err = lookup_with_scope(&fixture.config, &mut chain).unwrap_err();
    assert!(err.is_not_found());
    assert!(chain.is_empty());
}

// =============================================================================
// Expressions
// =============================================================================

fn config_with(entries: &[(&str, &str)], policy: UnresolvedPolicy) -> Configuration {
    init_logging();
    Configuration::builder()
        .with_source(MemoryPropertySource::from_map(
            "defaults",
            entries.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        ))
        .with_default_resolvers()
        .unresolved(policy)
        .build()
        .unwrap()
}

#[test]
fn test_nested_expressions() {
    let fixture = TestFixture::new();
    fixture.user.set("db.dsn", "jdbc:${db.url}");
    assert_eq!(
        fixture.value("db.dsn").as_deref(),
        Some("jdbc:postgres://localhost:5432/app")
    );
}

#[test]
fn test_unresolved_policies() {
    let entries = [("greeting", "hello ${who}")];

    let masked = config_with(&entries, UnresolvedPolicy::Mask);
    assert_eq!(
        masked.get_value("greeting").unwrap().as_deref(),
        Some("hello [${who}]")
    );

    let empty = config_with(&entries, UnresolvedPolicy::Empty);
    assert_eq!(empty.get_value("greeting").unwrap().as_deref(), Some("hello "));

    let strict = config_with(&entries, UnresolvedPolicy::Fail);
    assert!(matches!(
        strict.get_value("greeting").unwrap_err(),
        Error::UnresolvedExpression(_)
    ));
}

#[test]
fn test_mask_unresolved_flag() {
    let build = |mask: bool| {
        Configuration::builder()
            .with_source(MemoryPropertySource::new("defaults", 0).with("greeting", "a${who}b"))
            .with_default_resolvers()
            .mask_unresolved(mask)
            .build()
            .unwrap()
    };
    assert_eq!(build(true).get_value("greeting").unwrap().as_deref(), Some("a[${who}]b"));
    assert_eq!(build(false).get_value("greeting").unwrap().as_deref(), Some("ab"));
}

#[test]
fn test_strict_mode() {
    let config = Configuration::builder()
        .with_source(MemoryPropertySource::new("defaults", 0).with("greeting", "a${who}b"))
        .with_default_resolvers()
        .strict()
        .build()
        .unwrap();
    assert!(matches!(
        config.get_value("greeting").unwrap_err(),
        Error::UnresolvedExpression(ref raw) if raw == "${who}"
    ));
}

#[test]
fn test_circular_reference_is_bounded() {
    let config = config_with(&[("a", "${b}"), ("b", "${a}")], UnresolvedPolicy::Mask);
    match config.get_value("a").unwrap_err() {
        Error::ExpressionLoop { passes, .. } => assert_eq!(passes, tiercfg::MAX_EVALUATION_PASSES),
        other => panic!("unexpected {other:?}"),
    }
    // bulk reads leave the broken keys out and keep the rest
    let all = config.properties();
    assert!(!all.contains_key("a"));
    assert!(!all.contains_key("b"));
}

#[test]
fn test_bulk_read_keeps_healthy_keys() {
    let config = config_with(
        &[("loop", "${loop}"), ("host", "localhost"), ("url", "http://${host}")],
        UnresolvedPolicy::Fail,
    );
    let all = config.properties();
    assert_eq!(all.keys().collect::<Vec<_>>(), vec!["host", "url"]);
    assert_eq!(all["url"].value(), Some("http://localhost"));
    assert!(config.get_value("loop").is_err());
}

#[test]
fn test_self_reference() {
    let config = config_with(&[("a", "${a}")], UnresolvedPolicy::Mask);
    assert!(matches!(
        config.get_value("a").unwrap_err(),
        Error::ExpressionLoop { .. }
    ));
}

#[test]
fn test_escaped_placeholder_stays_literal() {
    let config = config_with(&[("price", "\\${amount}"), ("amount", "5")], UnresolvedPolicy::Fail);
    assert_eq!(config.get_value("price").unwrap().as_deref(), Some("${amount}"));
}

#[test]
fn test_unterminated_placeholder() {
    let config = config_with(&[("broken", "${oops")], UnresolvedPolicy::Mask);
    assert!(matches!(
        config.get_value("broken").unwrap_err(),
        Error::ExpressionFormat { .. }
    ));
}

#[test]
fn test_custom_resolver_prefix() {
    init_logging();
    let config = Configuration::builder()
        .with_source(
            MemoryPropertySource::new("defaults", 0)
                .with("shout", "${upper:quiet}")
                .with("quiet", "ignored"),
        )
        .with_resolver(resolver_fn("upper", |expr| Some(expr.to_uppercase())))
        .build()
        .unwrap();

    assert_eq!(config.get_value("shout").unwrap().as_deref(), Some("QUIET"));
}

#[cfg(feature = "env")]
#[test]
fn test_env_resolver() {
    use tiercfg::{ConfigResolver, EnvResolver, MapEnvSource};

    let env = Arc::new(MapEnvSource::new([("HOME", "/home/app")]));
    let config = Configuration::builder()
        .with_source(MemoryPropertySource::new("defaults", 0).with("cache.dir", "${env:HOME}/.cache"))
        .with_resolver(ConfigResolver)
        .with_resolver(EnvResolver::with_env(env))
        .build()
        .unwrap();

    assert_eq!(
        config.get_value("cache.dir").unwrap().as_deref(),
        Some("/home/app/.cache")
    );
}

#[test]
fn test_missing_resolver_is_configuration_error() {
    let err = Configuration::builder()
        .max_passes(5)
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::MissingResolver));
    assert!(err.is_configuration_error());
}
