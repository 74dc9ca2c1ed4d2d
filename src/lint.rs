//! Static checks of a schema and its uiSchema.
//!
//! Reports:
//! - JSON syntax errors in either file
//! - `$ref`s that point nowhere inside the schema, or outside it
//! - `ui:order` lists that leave properties out or repeat the wildcard
//! - `ui:field` / `ui:itemsGenerator` names nothing can serve

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::dispatch::FieldKind;
use crate::loader::{load_json, navigate_fragment};
use crate::registry::Registry;
use crate::resolver::SchemaResolver;
use crate::types::json_type_name;
use crate::ui::order_properties;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic message from linting.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    /// JSON Pointer to the issue, prefixed by the document it is in
    /// (e.g. `schema:/properties/id` or `ui:/list`).
    pub path: String,
    pub message: String,
}

/// Status of a lint run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LintStatus {
    Ok,
    Error,
    Warning,
}

/// Result of linting a schema/uiSchema pair.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_schema_file: Option<PathBuf>,
    pub status: LintStatus,
    pub errors: usize,
    pub warnings: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl LintResult {
    fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let errors = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count();
        let warnings = diagnostics.len() - errors;
        let status = if errors > 0 {
            LintStatus::Error
        } else if warnings > 0 {
            LintStatus::Warning
        } else {
            LintStatus::Ok
        };
        Self {
            schema_file: None,
            ui_schema_file: None,
            status,
            errors,
            warnings,
            diagnostics,
        }
    }

    /// True when there are no errors; with `strict`, no warnings either.
    pub fn is_ok(&self, strict: bool) -> bool {
        if strict {
            self.status == LintStatus::Ok
        } else {
            self.status != LintStatus::Error
        }
    }
}

/// Lint a schema and uiSchema already in memory.
pub fn lint(schema: &Value, ui_schema: &Value, registry: &Registry) -> LintResult {
    let mut diagnostics = Vec::new();
    check_refs(schema, "", schema, &mut diagnostics);
    let utils = registry.utils(schema);
    check_ui(
        ui_schema,
        Some(schema),
        utils.resolver(),
        registry,
        "",
        &mut diagnostics,
    );
    LintResult::from_diagnostics(diagnostics)
}

/// Lint a schema file and an optional uiSchema file.
pub fn lint_files(schema_file: &Path, ui_schema_file: Option<&Path>, registry: &Registry) -> LintResult {
    let mut load_errors = Vec::new();
    let mut load = |file: &Path, label: &str| match load_json(file) {
        Ok(value) => Some(value),
        Err(e) => {
            load_errors.push(Diagnostic {
                severity: Severity::Error,
                code: "E001".to_string(),
                path: format!("{}:/", label),
                message: format!("cannot load {}: {}", file.display(), e),
            });
            None
        }
    };
    let schema = load(schema_file, "schema");
    let ui_schema = match ui_schema_file {
        Some(file) => load(file, "ui"),
        None => Some(Value::Null),
    };

    let mut result = match (schema, ui_schema) {
        (Some(schema), Some(ui_schema)) => lint(&schema, &ui_schema, registry),
        _ => LintResult::from_diagnostics(load_errors),
    };
    result.schema_file = Some(schema_file.to_path_buf());
    result.ui_schema_file = ui_schema_file.map(Path::to_path_buf);
    result
}

/// Recursively check `$ref` values in a schema.
fn check_refs(value: &Value, path: &str, root: &Value, diagnostics: &mut Vec<Diagnostic>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                check_single_ref(reference, path, root, diagnostics);
            }
            for (key, val) in map {
                let child_path = format!("{}/{}", path, escape(key));
                check_refs(val, &child_path, root, diagnostics);
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                let child_path = format!("{}/{}", path, i);
                check_refs(item, &child_path, root, diagnostics);
            }
        }
        _ => {}
    }
}

fn check_single_ref(reference: &str, path: &str, root: &Value, diagnostics: &mut Vec<Diagnostic>) {
    let local = match root.get("$id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() && reference.starts_with(id) => &reference[id.len()..],
        _ => reference,
    };
    if local.is_empty() || local == "#" {
        return;
    }
    if !local.starts_with('#') {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            code: "W001".to_string(),
            path: format!("schema:{}", path),
            message: format!("external reference cannot be resolved: {}", reference),
        });
        return;
    }
    if navigate_fragment(root, local).is_err() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            code: "E002".to_string(),
            path: format!("schema:{}", path),
            message: format!("reference not found: {}", reference),
        });
    }
}

/// Walk a uiSchema alongside the schema node it describes.
fn check_ui(
    ui: &Value,
    schema: Option<&Value>,
    resolver: &SchemaResolver<'_>,
    registry: &Registry,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Value::Object(map) = ui else {
        return;
    };
    // Broken refs are already reported by `check_refs`.
    let resolved = schema.and_then(|s| resolver.resolve(s, None).ok());
    let ui_path = if path.is_empty() { "/" } else { path };

    if let Some(field) = map.get("ui:field") {
        match field.as_str() {
            Some(name) if FieldKind::from_builtin_name(name).is_some() || registry.has_field(name) => {}
            Some(name) => diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                code: "W003".to_string(),
                path: format!("ui:{}", ui_path),
                message: format!("ui:field \"{}\" is not registered; the schema type decides", name),
            }),
            None => diagnostics.push(Diagnostic {
                severity: Severity::Error,
                code: "E004".to_string(),
                path: format!("ui:{}", ui_path),
                message: format!("invalid ui:field type: expected string, got {}", json_type_name(field)),
            }),
        }
    }

    if let Some(generator) = map.get("ui:itemsGenerator").and_then(Value::as_str) {
        if registry.item_ui_generator(generator).is_none() {
            diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                code: "W004".to_string(),
                path: format!("ui:{}", ui_path),
                message: format!("no item uiSchema generator named \"{}\"", generator),
            });
        }
    }

    if let Some(order) = map.get("ui:order") {
        check_order(order, resolved.as_ref(), ui_path, diagnostics);
    }

    for (key, child) in map {
        if key.starts_with("ui:") {
            continue;
        }
        let child_path = format!("{}/{}", path, escape(key));
        let child_schema = resolved.as_ref().and_then(|s| match key.as_str() {
            "items" | "additionalProperties" => s.get(key.as_str()),
            _ => s.get("properties").and_then(|p| p.get(key.as_str())),
        });
        match (key.as_str(), child, child_schema) {
            // Fixed-item arrays and per-branch uiSchemas are lists.
            (_, Value::Array(list), Some(Value::Array(schemas))) => {
                for (i, (ui_item, schema_item)) in list.iter().zip(schemas).enumerate() {
                    let item_path = format!("{}/{}", child_path, i);
                    check_ui(ui_item, Some(schema_item), resolver, registry, &item_path, diagnostics);
                }
            }
            ("anyOf" | "oneOf", Value::Array(list), None) => {
                let schemas = resolved
                    .as_ref()
                    .and_then(|s| s.get(key.as_str()))
                    .and_then(Value::as_array);
                for (i, ui_item) in list.iter().enumerate() {
                    let item_path = format!("{}/{}", child_path, i);
                    let schema_item = schemas.and_then(|s| s.get(i));
                    check_ui(ui_item, schema_item, resolver, registry, &item_path, diagnostics);
                }
            }
            _ => check_ui(child, child_schema, resolver, registry, &child_path, diagnostics),
        }
    }
}

fn check_order(order: &Value, schema: Option<&Value>, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let Some(names) = order
        .as_array()
        .and_then(|list| list.iter().map(|v| v.as_str().map(String::from)).collect::<Option<Vec<_>>>())
    else {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            code: "E003".to_string(),
            path: format!("ui:{}", path),
            message: format!("invalid ui:order: expected array of strings, got {}", json_type_name(order)),
        });
        return;
    };
    let Some(properties) = schema.and_then(|s| s.get("properties")).and_then(Value::as_object) else {
        return;
    };
    let properties: Vec<String> = properties.keys().cloned().collect();
    if let Err(e) = order_properties(&properties, Some(&names)) {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            code: "E003".to_string(),
            path: format!("ui:{}", path),
            message: e.to_string(),
        });
    }
}

fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}
