//! Typed conversion of raw property values
//!
//! Converters are registered per target type. When several converters exist
//! for one type, the most recently registered one is tried first and the first
//! successful result wins, so applications can override the defaults.

use crate::error::{Error, Result};

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Turns a raw string into a `T`, or `None` if the text doesn't fit
pub trait PropertyConverter<T>: Send + Sync {
    fn convert(&self, raw: &str) -> Option<T>;
}

impl<T, F> PropertyConverter<T> for F
where
    F: Fn(&str) -> Option<T> + Send + Sync,
{
    fn convert(&self, raw: &str) -> Option<T> {
        self(raw)
    }
}

type ErasedConverter = Arc<dyn Any + Send + Sync>;

/// Converters grouped by target type
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<TypeId, Vec<ErasedConverter>>,
}

macro_rules! register_integers {
    ($registry:ident, $($t:ty),+ $(,)?) => {
        $(
            $registry.register_fn(|raw: &str| -> Option<$t> {
                let s = raw.trim();
                match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                    Some(hex) => <$t>::from_str_radix(hex, 16).ok(),
                    None => s.parse::<$t>().ok(),
                }
            });
        )+
    };
}

impl ConverterRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with converters for `String`, `bool`, `char`, all integer and
    /// float primitives.
    ///
    /// Booleans accept `true/false`, `yes/no`, `y/n`, `on/off` and `1/0`,
    /// case-insensitively. Integers accept a `0x` prefix for hex.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_fn(|raw: &str| Some(raw.to_string()));
        registry.register_fn(parse_bool);
        registry.register_fn(|raw: &str| {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => None,
            }
        });
        register_integers!(registry, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
        registry.register_fn(|raw: &str| raw.trim().parse::<f32>().ok());
        registry.register_fn(|raw: &str| raw.trim().parse::<f64>().ok());
        registry
    }

    /// Register a converter for `T`
    pub fn register<T, C>(&mut self, converter: C) -> &mut Self
    where
        T: 'static,
        C: PropertyConverter<T> + 'static,
    {
        let typed: Arc<dyn PropertyConverter<T>> = Arc::new(converter);
        self.converters
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Arc::new(typed));
        self
    }

    /// Register a closure converter for `T`
    pub fn register_fn<T, F>(&mut self, converter: F) -> &mut Self
    where
        T: 'static,
        F: Fn(&str) -> Option<T> + Send + Sync + 'static,
    {
        self.register::<T, F>(converter)
    }

    pub fn has_converter<T: 'static>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<T>())
    }

    /// Number of target types with at least one converter
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Convert the raw value of `key`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoConverter`] if nothing is registered for `T`
    /// - [`Error::Conversion`] if every converter rejected the value
    pub fn convert<T: 'static>(&self, key: &str, raw: &str) -> Result<T> {
        let entries = self
            .converters
            .get(&TypeId::of::<T>())
            .ok_or(Error::NoConverter {
                target: type_name::<T>(),
            })?;

        entries
            .iter()
            .rev()
            .filter_map(|entry| entry.downcast_ref::<Arc<dyn PropertyConverter<T>>>())
            .find_map(|converter| converter.convert(raw))
            .ok_or_else(|| Error::Conversion {
                key: key.to_string(),
                value: raw.to_string(),
                target: type_name::<T>(),
            })
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("types", &self.converters.len())
            .finish()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}
