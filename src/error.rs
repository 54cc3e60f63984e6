//! Error types for tiercfg library

use thiserror::Error;

/// Result type alias for tiercfg operations
pub type Result<T> = std::result::Result<T, Error>;

/// A single per-source failure collected while propagating a change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    /// Name of the source that rejected the change
    pub source_name: String,
    /// Human readable reason
    pub message: String,
}

impl std::fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source_name, self.message)
    }
}

/// Main error type for tiercfg library
#[derive(Error, Debug)]
pub enum Error {
    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No expression resolver registered")]
    MissingResolver,

    #[error("Expression '{expression}' did not settle after {passes} passes (circular reference?)")]
    ExpressionLoop { expression: String, passes: usize },

    #[error("Malformed expression '{expression}': unterminated placeholder at byte {position}")]
    ExpressionFormat { expression: String, position: usize },

    #[error("Unresolved expression: {0}")]
    UnresolvedExpression(String),

    // -------------------------------------------------------------------------
    // Source Errors
    // -------------------------------------------------------------------------
    #[error("Property source '{source_name}' failed: {message}")]
    Source {
        source_name: String,
        message: String,
    },

    #[error("Property source '{0}' not registered")]
    SourceNotFound(String),

    #[error("Property source '{0}' is not mutable")]
    NotMutable(String),

    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    // -------------------------------------------------------------------------
    // Conversion Errors
    // -------------------------------------------------------------------------
    #[error("No converter registered for type {target}")]
    NoConverter { target: &'static str },

    #[error("Cannot convert value '{value}' of {key} to {target}")]
    Conversion {
        key: String,
        value: String,
        target: &'static str,
    },

    // -------------------------------------------------------------------------
    // Propagation Errors
    // -------------------------------------------------------------------------
    #[error("Change request {request_id} was only partially applied: {}", format_failures(.failures))]
    PartialPropagation {
        request_id: String,
        failures: Vec<SourceFailure>,
    },

    #[error("Property source '{source_name}' rejected the change: {reason}")]
    ChangeRejected { source_name: String, reason: String },

    #[error("Invalid value for {key}: {message}")]
    Validation { key: String, message: String },

    // -------------------------------------------------------------------------
    // Backup Errors
    // -------------------------------------------------------------------------
    #[error("No backup of '{source_name}' with version {version:?}")]
    BackupNotFound {
        source_name: String,
        version: Option<u64>,
    },

    #[error("Failed to serialize data: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn format_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Check if this is a "not found" type error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::PropertyNotFound(_) | Error::SourceNotFound(_) | Error::BackupNotFound { .. }
        )
    }

    /// Check if this error stems from an invalid setup rather than from data
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::MissingResolver
                | Error::ExpressionLoop { .. }
                | Error::ExpressionFormat { .. }
                | Error::UnresolvedExpression(_)
                | Error::NoConverter { .. }
        )
    }

    /// Shorthand for a [`Error::Source`] error
    pub fn from_source(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Source {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}
