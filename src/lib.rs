//! # tiercfg - layered configuration resolution
//!
//! Combines many key/value property sources with different precedence into
//! one queryable configuration view.
//!
//! ## Features
//!
//! - **Ranked sources**: every [`PropertySource`] has an ordinal; higher wins,
//!   ties are broken by name so the order never depends on registration order
//! - **Filters**: per-key transformation or suppression on read, scoped to the
//!   caller through an explicit [`FilterChain`]
//! - **Expressions**: `${key}`, `${env:NAME}` and custom `${prefix:expr}`
//!   placeholders with cycle protection
//! - **Dynamic values**: cached handles with explicit or immediate updates and
//!   atomic commit
//! - **Mutation**: batched [`ChangeRequest`]s pushed into mutable sources by a
//!   [`ChangePropagationPolicy`], with optional versioned backups
//!
//! ## Quick Start
//!
//! ```
//! use tiercfg::{Configuration, MemoryPropertySource};
//!
//! let config = Configuration::builder()
//!     .with_source(
//!         MemoryPropertySource::new("defaults", 0)
//!             .with("server.host", "localhost")
//!             .with("server.port", "8080")
//!             .with("server.url", "http://${server.host}:${server.port}"),
//!     )
//!     .with_source(MemoryPropertySource::new("site", 100).with("server.port", "9000"))
//!     .with_default_resolvers()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.get_as::<u16>("server.port").unwrap(), Some(9000));
//! assert_eq!(
//!     config.get_value("server.url").unwrap().as_deref(),
//!     Some("http://localhost:9000")
//! );
//! ```
//!
//! ## Self-declared ordinals
//!
//! A source can rank itself by serving the reserved `_ordinal` key (or
//! `CONFIG_ORDINAL`). Invalid values are logged and the assigned ordinal is
//! used instead.
//!
//! ```
//! use tiercfg::{Configuration, MemoryPropertySource};
//!
//! let config = Configuration::builder()
//!     .with_source(MemoryPropertySource::new("a", 500).with("k", "a"))
//!     .with_source(
//!         MemoryPropertySource::new("b", 0)
//!             .with("_ordinal", "1000")
//!             .with("k", "b"),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.get_value("k").unwrap().as_deref(), Some("b"));
//! // metadata keys are hidden from bulk reads
//! assert!(!config.properties().contains_key("_ordinal"));
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade. Install any logger (for example
//! `env_logger`) to see source failures, ordinal fallbacks and propagation
//! results.

// Core modules
mod convert;
mod dynamic;
mod error;
mod events;
mod registry;
mod sync;
mod value;

// Grouped modules
pub mod config;
pub mod expression;
pub mod filter;
pub mod mutable;
pub mod source;

// Re-exports from core
pub use convert::{ConverterRegistry, PropertyConverter};
pub use dynamic::{DynamicValue, UpdatePolicy, ValueState};
pub use error::{Error, Result, SourceFailure};
pub use events::{ChangeListeners, ValueChange, Validators};
pub use registry::{PropertySourceRegistry, RankedSource, effective_ordinal};
pub use value::{PropertyValue, is_metadata_key, meta};

// Re-exports from grouped modules
pub use config::{
    CombinationPolicy, Configuration, ConfigurationBuilder, ConfigurationContext, OverridingPolicy,
};
pub use expression::{
    ConfigResolver, ExpressionEvaluator, ExpressionEvaluatorBuilder, ExpressionResolver,
    MAX_EVALUATION_PASSES, PropertyLookup, UnresolvedPolicy, resolver_fn,
};
pub use filter::{
    Access, FilterChain, FilterContext, FilterScope, MaskingFilter, PropertyFilter, RegexKeyFilter,
    filter_fn,
};
pub use mutable::{
    ApplyToAll, ApplyToFirstMatching, Backup, BackupStore, ChangePropagationPolicy, ChangeRequest,
    MostSignificantOnly, MutableConfiguration, NoOp, PropagationOutcome, Selective,
};
pub use source::{DEFAULT_ORDINAL, MemoryPropertySource, MutablePropertySource, PropertySource};

#[cfg(feature = "env")]
pub use expression::EnvResolver;
#[cfg(feature = "env")]
pub use source::{DefaultEnvSource, EnvSource, EnvironmentPropertySource, MapEnvSource};
