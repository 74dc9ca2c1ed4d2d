//! Error types for schema resolution, validation and form operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading or resolving a schema node.
///
/// At the render boundary these never abort the whole tree: the offending
/// subtree is replaced by an inline diagnostic node.
#[derive(Debug, Error)]
pub enum ResolveError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    // Schema errors (exit code 2)
    #[error("could not find a definition for {reference}")]
    InvalidRef { reference: String },

    #[error("unsupported external reference {reference}")]
    ExternalRef { reference: String },

    #[error("circular $ref detected: {reference}")]
    RefCycle { reference: String },

    #[error("uiSchema order list does not contain {}", describe_properties(properties))]
    OrderMissing { properties: Vec<String> },

    #[error("uiSchema order list contains more than one wildcard item")]
    OrderMultipleWildcards,

    #[error("invalid schema: {message}")]
    InvalidSchema { message: String },
}

fn describe_properties(properties: &[String]) -> String {
    if properties.len() > 1 {
        format!("properties '{}'", properties.join("', '"))
    } else {
        format!(
            "property '{}'",
            properties.first().map(String::as_str).unwrap_or_default()
        )
    }
}

/// Errors during validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<SchemaError> },
}

/// Single validation error with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchemaError {
    /// JSON Pointer (RFC 6901) to the invalid field.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors raised by structural form operations.
#[derive(Debug, Error)]
pub enum FormError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("no value at path {path}")]
    UnknownPath { path: String },

    #[error("value at {path} is not an array")]
    NotAnArray { path: String },

    #[error("value at {path} is not an object")]
    NotAnObject { path: String },

    #[error("index {index} out of range for array of length {len} at {path}")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("schema at {path} has no anyOf/oneOf options")]
    NotComposition { path: String },

    #[error("{operation} is disabled for {path}")]
    NotAllowed { path: String, operation: String },
}

impl ResolveError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ResolveError::FileNotFound { .. } | ResolveError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            ResolveError::NetworkError { .. } => 3,
            _ => 2,
        }
    }
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Resolve(e) => e.exit_code(),
            ValidateError::Invalid { .. } => 1,
        }
    }
}

impl FormError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            FormError::Resolve(e) => e.exit_code(),
            _ => 2,
        }
    }
}
