//! The validator collaborator.
//!
//! Validation itself is delegated to the `jsonschema` crate; this module only
//! adapts its output into the [`ErrorSchema`] wire shape and answers the
//! structural "does this data match this schema" question the resolver and
//! the composition selector ask.

use serde_json::Value;
use tracing::warn;

use crate::error::{ResolveError, ValidateError};
use crate::error_schema::ErrorSchema;
use crate::types::{pointer_to_path, PathSegment};

/// Validation capability consumed by the resolver and the form pipeline.
pub trait SchemaValidator: Send + Sync {
    /// Whether `data` satisfies `schema`; `$ref`s resolve against `root`.
    fn is_valid(&self, schema: &Value, data: &Value, root: &Value) -> bool;

    /// Validate `data` and report failures as an error schema.
    ///
    /// # Errors
    ///
    /// Returns `ValidateError::Resolve` if the schema itself cannot be compiled.
    fn validate(&self, schema: &Value, data: &Value) -> Result<ErrorSchema, ValidateError>;
}

/// Default validator backed by the `jsonschema` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

impl SchemaValidator for JsonSchemaValidator {
    fn is_valid(&self, schema: &Value, data: &Value, root: &Value) -> bool {
        let schema = with_root_definitions(schema, root);
        match jsonschema::validator_for(&schema) {
            Ok(validator) => validator.is_valid(data),
            Err(e) => {
                warn!(error = %e, "schema could not be compiled for matching");
                false
            }
        }
    }

    fn validate(&self, schema: &Value, data: &Value) -> Result<ErrorSchema, ValidateError> {
        let validator = jsonschema::validator_for(schema).map_err(|e| {
            ValidateError::Resolve(ResolveError::InvalidSchema {
                message: e.to_string(),
            })
        })?;

        let mut errors = ErrorSchema::new();
        for error in validator.iter_errors(data) {
            let mut path = pointer_to_path(&error.instance_path.to_string());
            let message = match &error.kind {
                jsonschema::error::ValidationErrorKind::Required { property } => {
                    let name = property
                        .as_str()
                        .map(String::from)
                        .unwrap_or_else(|| property.to_string());
                    let message = format!("must have required property '{}'", name);
                    path.push(PathSegment::Key(name));
                    message
                }
                _ => error.to_string(),
            };
            errors.add_error_at(&path, message);
        }
        Ok(errors)
    }
}

/// Validate `data` against `schema`, failing with the flattened messages.
///
/// # Errors
///
/// Returns `ValidateError::Invalid` if the data doesn't match the schema.
pub fn validate_form_data(
    validator: &dyn SchemaValidator,
    schema: &Value,
    data: &Value,
) -> Result<(), ValidateError> {
    let errors = validator.validate(schema, data)?;
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid {
            errors: errors.to_schema_errors(),
        })
    }
}

/// Copy the root's definition tables into a detached subschema so local
/// `$ref`s keep resolving when it is compiled on its own.
fn with_root_definitions(schema: &Value, root: &Value) -> Value {
    let mut schema = schema.clone();
    if let Value::Object(map) = &mut schema {
        for key in ["definitions", "$defs"] {
            if let Some(defs) = root.get(key) {
                map.entry(key.to_string()).or_insert_with(|| defs.clone());
            }
        }
    }
    schema
}
