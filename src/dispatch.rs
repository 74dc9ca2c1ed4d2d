//! Field-kind dispatch for resolved schema nodes.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::registry::Registry;
use crate::resolver::primary_type;
use crate::ui::{UiField, UiOptions};

/// The field that renders a schema node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum FieldKind {
    Array,
    Boolean,
    Number,
    Object,
    String,
    Null,
    /// No standalone field; the `anyOf`/`oneOf` selector renders the node.
    Composition,
    /// A field registered by name.
    Custom(String),
    /// Nothing else fits; renders an "unsupported" notice.
    Fallback,
}

impl FieldKind {
    /// The built-in kind a `ui:field` name refers to.
    pub fn from_builtin_name(name: &str) -> Option<Self> {
        Some(match name {
            "ArrayField" => FieldKind::Array,
            "BooleanField" => FieldKind::Boolean,
            "NumberField" => FieldKind::Number,
            "ObjectField" => FieldKind::Object,
            "StringField" => FieldKind::String,
            "NullField" => FieldKind::Null,
            "AnyOfField" | "OneOfField" | "MultiSchemaField" => FieldKind::Composition,
            "FallbackField" | "UnsupportedField" => FieldKind::Fallback,
            _ => return None,
        })
    }

    /// Kind for a JSON Schema primitive type name.
    pub fn from_type(type_name: &str) -> Option<Self> {
        Some(match type_name {
            "array" => FieldKind::Array,
            "boolean" => FieldKind::Boolean,
            "integer" | "number" => FieldKind::Number,
            "object" => FieldKind::Object,
            "string" => FieldKind::String,
            "null" => FieldKind::Null,
            _ => return None,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            FieldKind::Array => "ArrayField",
            FieldKind::Boolean => "BooleanField",
            FieldKind::Number => "NumberField",
            FieldKind::Object => "ObjectField",
            FieldKind::String => "StringField",
            FieldKind::Null => "NullField",
            FieldKind::Composition => "MultiSchemaField",
            FieldKind::Custom(name) => name,
            FieldKind::Fallback => "FallbackField",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<FieldKind> for String {
    fn from(kind: FieldKind) -> Self {
        kind.name().to_string()
    }
}

/// Pick the field kind for a resolved schema node.
///
/// In order: an explicit `ui:field` naming a built-in kind or a registered
/// field; a field registered under the schema's `$id`; the primitive type;
/// `Composition` for an untyped `anyOf`/`oneOf`; otherwise `Fallback`.
pub fn dispatch(schema: &Value, ui: &UiOptions, registry: &Registry) -> FieldKind {
    match &ui.field {
        Some(UiField::Kind(kind)) => return kind.clone(),
        Some(UiField::Named(name)) if registry.has_field(name) => {
            return FieldKind::Custom(name.clone())
        }
        Some(UiField::Named(name)) => {
            debug!(field = %name, "ui:field names no registered field, dispatching by schema");
        }
        None => {}
    }

    if let Some(id) = schema.get("$id").and_then(Value::as_str) {
        if registry.has_field(id) {
            return FieldKind::Custom(id.to_string());
        }
    }

    if let Some(kind) = primary_type(schema).as_deref().and_then(FieldKind::from_type) {
        return kind;
    }

    if schema.get("anyOf").is_some() || schema.get("oneOf").is_some() {
        return FieldKind::Composition;
    }
    FieldKind::Fallback
}
