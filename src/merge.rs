//! Best-effort merging of `allOf` branches into a single schema.

use serde_json::{Map, Value};

/// Two schemas that cannot both hold, e.g. `string` merged with `boolean`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub keyword: String,
    pub message: String,
}

impl std::fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.keyword, self.message)
    }
}

/// Keywords where the stricter bound is the larger value.
const LOWER_BOUNDS: &[&str] = &[
    "minimum",
    "exclusiveMinimum",
    "minLength",
    "minItems",
    "minProperties",
    "minContains",
];

/// Keywords where the stricter bound is the smaller value.
const UPPER_BOUNDS: &[&str] = &[
    "maximum",
    "exclusiveMaximum",
    "maxLength",
    "maxItems",
    "maxProperties",
    "maxContains",
];

/// Merge `overlay` into `base`, keeping both sets of constraints.
///
/// Annotation keywords (`title`, `default`, ...) keep the base value when
/// both are present.
///
/// # Errors
///
/// Returns `MergeConflict` when the two schemas are incompatible: disjoint
/// types, disjoint enums, or different constants.
pub fn merge_schemas(base: &Value, overlay: &Value) -> Result<Value, MergeConflict> {
    let (Some(base_map), Some(overlay_map)) = (base.as_object(), overlay.as_object()) else {
        // Boolean schemas: `true` adds nothing, anything else wins outright.
        return Ok(match overlay {
            Value::Bool(true) => base.clone(),
            _ if base.as_bool() == Some(true) => overlay.clone(),
            _ => base.clone(),
        });
    };

    let mut merged = base_map.clone();
    for (key, value) in overlay_map {
        let Some(existing) = base_map.get(key) else {
            merged.insert(key.clone(), value.clone());
            continue;
        };

        let combined = match key.as_str() {
            "type" => merge_types(existing, value)?,
            "properties" | "patternProperties" | "$defs" | "definitions" => {
                merge_property_maps(existing, value)?
            }
            "required" => union_strings(existing, value),
            "enum" => intersect_enums(existing, value)?,
            "const" => {
                if existing != value {
                    return Err(MergeConflict {
                        keyword: "const".to_string(),
                        message: format!("{} conflicts with {}", existing, value),
                    });
                }
                existing.clone()
            }
            "items" | "additionalItems" | "contains" | "propertyNames" => {
                if existing.is_object() && value.is_object() {
                    merge_schemas(existing, value)?
                } else {
                    existing.clone()
                }
            }
            "additionalProperties" => match (existing, value) {
                (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
                (Value::Object(_), Value::Object(_)) => merge_schemas(existing, value)?,
                (Value::Object(_), _) => existing.clone(),
                _ => value.clone(),
            },
            "uniqueItems" => Value::Bool(
                existing.as_bool().unwrap_or(false) || value.as_bool().unwrap_or(false),
            ),
            k if LOWER_BOUNDS.contains(&k) => pick_bound(existing, value, true),
            k if UPPER_BOUNDS.contains(&k) => pick_bound(existing, value, false),
            _ => existing.clone(),
        };
        merged.insert(key.clone(), combined);
    }

    Ok(Value::Object(merged))
}

fn type_list(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(arr) => arr.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn merge_types(existing: &Value, value: &Value) -> Result<Value, MergeConflict> {
    let left = type_list(existing);
    let right = type_list(value);

    let mut common: Vec<&str> = Vec::new();
    for a in &left {
        for b in &right {
            let hit = match (*a, *b) {
                (x, y) if x == y => Some(x),
                ("number", "integer") | ("integer", "number") => Some("integer"),
                _ => None,
            };
            if let Some(t) = hit {
                if !common.contains(&t) {
                    common.push(t);
                }
            }
        }
    }

    match common.as_slice() {
        [] => Err(MergeConflict {
            keyword: "type".to_string(),
            message: format!("{} is incompatible with {}", existing, value),
        }),
        [single] => Ok(Value::String(single.to_string())),
        many => Ok(Value::Array(
            many.iter().map(|t| Value::String(t.to_string())).collect(),
        )),
    }
}

fn merge_property_maps(existing: &Value, value: &Value) -> Result<Value, MergeConflict> {
    let (Some(left), Some(right)) = (existing.as_object(), value.as_object()) else {
        return Ok(existing.clone());
    };
    let mut merged: Map<String, Value> = left.clone();
    for (name, schema) in right {
        let combined = match left.get(name) {
            Some(current) => merge_schemas(current, schema)?,
            None => schema.clone(),
        };
        merged.insert(name.clone(), combined);
    }
    Ok(Value::Object(merged))
}

fn union_strings(existing: &Value, value: &Value) -> Value {
    let mut out: Vec<Value> = existing.as_array().cloned().unwrap_or_default();
    for item in value.as_array().into_iter().flatten() {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    Value::Array(out)
}

fn intersect_enums(existing: &Value, value: &Value) -> Result<Value, MergeConflict> {
    let right = value.as_array().cloned().unwrap_or_default();
    let common: Vec<Value> = existing
        .as_array()
        .into_iter()
        .flatten()
        .filter(|v| right.contains(v))
        .cloned()
        .collect();
    if common.is_empty() {
        return Err(MergeConflict {
            keyword: "enum".to_string(),
            message: "enums share no values".to_string(),
        });
    }
    Ok(Value::Array(common))
}

fn pick_bound(existing: &Value, value: &Value, larger: bool) -> Value {
    match (existing.as_f64(), value.as_f64()) {
        (Some(a), Some(b)) if (b > a) == larger && a != b => value.clone(),
        _ => existing.clone(),
    }
}
