//! Default form state computed from schema `default`s.

use serde_json::{Map, Value};
use tracing::warn;

use crate::array::ItemLayout;
use crate::composition::closest_matching_option;
use crate::error::ResolveError;
use crate::options::{ArrayMinItems, DefaultsBehavior, EmptyObjectFields};
use crate::resolver::{primary_type, SchemaResolver};
use crate::translate::{TranslatableString, TranslateFn};

/// Arrays longer than this are not padded up to `minItems`.
const MAX_FILLED_ITEMS: u64 = 10_000;

/// Compute the form state for `schema`: its defaults with `data` layered on
/// top. Explicit data always wins over a default.
///
/// Returns `None` when there is neither data nor a default.
pub fn get_default_form_state(
    resolver: &SchemaResolver<'_>,
    schema: &Value,
    data: Option<&Value>,
    behavior: &DefaultsBehavior,
) -> Result<Option<Value>, ResolveError> {
    let defaults = compute_defaults(resolver, schema, None, data, true, behavior, &mut Vec::new())?;
    Ok(merge_defaults(defaults, data.cloned()))
}

/// Fill the root-level properties of `schema` that `data` lacks with their
/// own `default`; nested objects are left for their own field.
pub fn shallow_defaults(
    resolver: &SchemaResolver<'_>,
    schema: &Value,
    data: Option<Value>,
) -> Result<Option<Value>, ResolveError> {
    let resolved = resolver.resolve(schema, data.as_ref())?;
    let Some(properties) = resolved.get("properties").and_then(Value::as_object) else {
        return Ok(data.or_else(|| resolved.get("default").cloned()));
    };

    let mut out = match data {
        Some(Value::Object(map)) => map,
        Some(other) => return Ok(Some(other)),
        None => match resolved.get("default") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        },
    };
    for (name, prop) in properties {
        if out.contains_key(name) {
            continue;
        }
        let prop = resolver.resolve(prop, None)?;
        if let Some(value) = prop.get("const").or_else(|| prop.get("default")) {
            out.insert(name.clone(), value.clone());
        }
    }
    Ok(Some(Value::Object(out)))
}

/// Value for a freshly inserted array item.
///
/// The item schema's `default` wins; otherwise the type's empty value:
/// `[]`, `false`, `null`, `0`, an object holding any property defaults, or
/// the translated new-string placeholder.
pub fn new_item_value(
    resolver: &SchemaResolver<'_>,
    item_schema: &Value,
    behavior: &DefaultsBehavior,
    translate: TranslateFn,
) -> Result<Value, ResolveError> {
    let resolved = resolver.resolve(item_schema, None)?;
    if let Some(default) = resolved.get("default") {
        return Ok(default.clone());
    }
    Ok(match primary_type(&resolved).as_deref() {
        Some("array") => Value::Array(Vec::new()),
        Some("boolean") => Value::Bool(false),
        Some("null") => Value::Null,
        Some("integer") | Some("number") => Value::from(0),
        Some("object") => get_default_form_state(resolver, &resolved, None, behavior)?
            .unwrap_or_else(|| Value::Object(Map::new())),
        _ => Value::String(translate(TranslatableString::NewStringDefault, &[])),
    })
}

fn compute_defaults(
    resolver: &SchemaResolver<'_>,
    schema: &Value,
    parent_default: Option<&Value>,
    data: Option<&Value>,
    required: bool,
    behavior: &DefaultsBehavior,
    refs: &mut Vec<String>,
) -> Result<Option<Value>, ResolveError> {
    // A recursive reference contributes only what its parent supplies.
    let reference = schema.get("$ref").and_then(Value::as_str).map(String::from);
    if let Some(reference) = &reference {
        if refs.contains(reference) {
            return Ok(parent_default.cloned());
        }
        refs.push(reference.clone());
    }
    let result = compute_resolved_defaults(resolver, schema, parent_default, data, required, behavior, refs);
    if reference.is_some() {
        refs.pop();
    }
    result
}

fn compute_resolved_defaults(
    resolver: &SchemaResolver<'_>,
    schema: &Value,
    parent_default: Option<&Value>,
    data: Option<&Value>,
    required: bool,
    behavior: &DefaultsBehavior,
    refs: &mut Vec<String>,
) -> Result<Option<Value>, ResolveError> {
    let mut resolved = resolver.resolve(schema, data)?;
    let own_default = resolved
        .get("default")
        .cloned()
        .or_else(|| parent_default.cloned());

    // Defaults of the branch that best matches the data.
    for key in ["oneOf", "anyOf"] {
        let options = match resolved.as_object_mut().and_then(|m| m.remove(key)) {
            Some(Value::Array(options)) if !options.is_empty() => options,
            _ => continue,
        };
        let index = closest_matching_option(resolver, data, &options, None, None)?;
        let branch = resolver.resolve(&options[index], data)?;
        if let Ok(merged) = crate::merge::merge_schemas(&resolved, &branch) {
            resolved = merged;
        }
    }

    match primary_type(&resolved).as_deref() {
        Some("object") => {
            object_defaults(resolver, &resolved, own_default, data, required, behavior, refs)
        }
        Some("array") => array_defaults(resolver, &resolved, own_default, data, behavior, refs),
        _ => Ok(own_default),
    }
}

fn object_defaults(
    resolver: &SchemaResolver<'_>,
    schema: &Value,
    own_default: Option<Value>,
    data: Option<&Value>,
    required: bool,
    behavior: &DefaultsBehavior,
    refs: &mut Vec<String>,
) -> Result<Option<Value>, ResolveError> {
    let required_props: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut out = match &own_default {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    let properties = schema.get("properties").and_then(Value::as_object);
    for (name, prop) in properties.into_iter().flatten() {
        let prop_required = required_props.contains(&name.as_str());
        let keep = match behavior.empty_object_fields {
            EmptyObjectFields::PopulateAllDefaults => true,
            EmptyObjectFields::PopulateRequiredDefaults => prop_required,
            EmptyObjectFields::SkipDefaults => false,
        };
        let parent = own_default.as_ref().and_then(|d| d.get(name));
        let child_data = data.and_then(|d| d.get(name));
        let value = match compute_defaults(resolver, prop, parent, child_data, prop_required, behavior, refs) {
            Ok(value) => value,
            Err(e) => {
                warn!(property = %name, error = %e, "no defaults for unresolvable property");
                None
            }
        };
        match value {
            Some(v) if keep || parent.is_some() => {
                out.insert(name.clone(), v);
            }
            _ => {}
        }
    }

    if out.is_empty() && own_default.is_none() && !required {
        return Ok(None);
    }
    Ok(Some(Value::Object(out)))
}

fn array_defaults(
    resolver: &SchemaResolver<'_>,
    schema: &Value,
    own_default: Option<Value>,
    data: Option<&Value>,
    behavior: &DefaultsBehavior,
    refs: &mut Vec<String>,
) -> Result<Option<Value>, ResolveError> {
    let mut items = match own_default {
        Some(Value::Array(items)) => items,
        Some(other) => return Ok(Some(other)),
        None => Vec::new(),
    };
    let layout = ItemLayout::of(schema);
    let data_items = data.and_then(Value::as_array).map_or(&[][..], Vec::as_slice);

    // Existing items get their own item schema's defaults.
    for (index, item_data) in data_items.iter().enumerate() {
        let Some(item_schema) = layout.schema_for(index).filter(|s| s.is_object()) else {
            continue;
        };
        let parent = items.get(index).cloned();
        let value = match compute_defaults(
            resolver,
            item_schema,
            parent.as_ref(),
            Some(item_data),
            false,
            behavior,
            refs,
        ) {
            Ok(value) => value,
            Err(e) => {
                warn!(index, error = %e, "no defaults for unresolvable array item");
                None
            }
        };
        if let Some(value) = value {
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            items[index] = value;
        }
    }

    let min_items = match schema.get("minItems").and_then(Value::as_u64).unwrap_or(0) {
        n if n > MAX_FILLED_ITEMS => {
            warn!(min_items = n, limit = MAX_FILLED_ITEMS, "minItems too large to fill, skipping");
            0
        }
        n => n as usize,
    };
    let current = items.len().max(data_items.len());

    if behavior.array_min_items == ArrayMinItems::Populate && current < min_items {
        let filler = match layout.schema_for(current).filter(|s| s.is_object()) {
            Some(item_schema) => {
                compute_defaults(resolver, item_schema, None, None, false, behavior, refs)?
            }
            None => None,
        };
        if items.len() < data_items.len() {
            items.resize(data_items.len(), Value::Null);
        }
        items.resize(min_items, filler.unwrap_or(Value::Null));
    }

    if items.is_empty() && data.is_none() {
        return Ok(None);
    }
    Ok(Some(Value::Array(items)))
}

/// Layer `data` over `defaults`. Objects merge key by key; arrays merge
/// index by index; everything else takes the data value.
fn merge_defaults(defaults: Option<Value>, data: Option<Value>) -> Option<Value> {
    match (defaults, data) {
        (None, data) => data,
        (defaults, None) => defaults,
        (Some(Value::Object(mut base)), Some(Value::Object(overlay))) => {
            for (k, v) in overlay {
                let merged = merge_defaults(base.remove(&k), Some(v));
                if let Some(merged) = merged {
                    base.insert(k, merged);
                }
            }
            Some(Value::Object(base))
        }
        (Some(Value::Array(base)), Some(Value::Array(overlay))) => {
            let len = base.len().max(overlay.len());
            let mut base = base.into_iter();
            let mut overlay = overlay.into_iter();
            let merged = (0..len)
                .filter_map(|_| match (base.next(), overlay.next()) {
                    (d, Some(Value::Null)) if d.is_some() => d,
                    (d, o) => merge_defaults(d, o),
                })
                .collect();
            Some(Value::Array(merged))
        }
        (_, data) => data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::english_strings;
    use crate::validator::JsonSchemaValidator;
    use serde_json::json;

    fn state(schema: &Value, data: Option<&Value>) -> Option<Value> {
        let resolver = SchemaResolver::new(schema, &JsonSchemaValidator);
        get_default_form_state(&resolver, schema, data, &DefaultsBehavior::default()).unwrap()
    }

    #[test]
    fn fills_nested_property_defaults() {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "default": "anon" },
                "address": {
                    "type": "object",
                    "properties": { "city": { "type": "string", "default": "Paris" } }
                }
            }
        });
        assert_eq!(
            state(&schema, None),
            Some(json!({ "name": "anon", "address": { "city": "Paris" } }))
        );
    }

    #[test]
    fn data_wins_over_defaults() {
        let schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string", "default": "anon" } }
        });
        assert_eq!(
            state(&schema, Some(&json!({ "name": "bob", "extra": 1 }))),
            Some(json!({ "name": "bob", "extra": 1 }))
        );
    }

    #[test]
    fn required_only_behavior() {
        let schema = json!({
            "type": "object",
            "required": ["a"],
            "properties": {
                "a": { "type": "string", "default": "x" },
                "b": { "type": "string", "default": "y" }
            }
        });
        let resolver = SchemaResolver::new(&schema, &JsonSchemaValidator);
        let behavior = DefaultsBehavior {
            empty_object_fields: EmptyObjectFields::PopulateRequiredDefaults,
            ..DefaultsBehavior::default()
        };
        let state = get_default_form_state(&resolver, &schema, None, &behavior).unwrap();
        assert_eq!(state, Some(json!({ "a": "x" })));
    }

    #[test]
    fn pads_arrays_to_min_items() {
        let schema = json!({
            "type": "array",
            "minItems": 3,
            "items": { "type": "string", "default": "z" }
        });
        assert_eq!(state(&schema, Some(&json!(["a"]))), Some(json!(["a", "z", "z"])));
    }

    #[test]
    fn existing_items_get_item_defaults() {
        let schema = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": { "text": { "type": "string", "default": "x" } }
            }
        });
        assert_eq!(
            state(&schema, Some(&json!([{}, { "text": "y" }]))),
            Some(json!([{ "text": "x" }, { "text": "y" }]))
        );
    }

    #[test]
    fn fixed_items_use_their_own_schema() {
        let schema = json!({
            "type": "array",
            "items": [
                { "type": "object", "properties": { "a": { "type": "integer", "default": 1 } } }
            ],
            "additionalItems": {
                "type": "object",
                "properties": { "b": { "type": "integer", "default": 2 } }
            }
        });
        assert_eq!(
            state(&schema, Some(&json!([{}, {}]))),
            Some(json!([{ "a": 1 }, { "b": 2 }]))
        );
    }

    #[test]
    fn huge_min_items_is_not_filled() {
        let schema = json!({
            "type": "array",
            "minItems": 1_000_000_000_000u64,
            "items": { "type": "string", "default": "z" }
        });
        assert_eq!(state(&schema, Some(&json!(["a"]))), Some(json!(["a"])));
    }

    #[test]
    fn no_defaults_and_no_data_is_absent() {
        assert_eq!(state(&json!({ "type": "string" }), None), None);
    }

    #[test]
    fn new_item_values_by_type() {
        let root = json!({});
        let resolver = SchemaResolver::new(&root, &JsonSchemaValidator);
        let behavior = DefaultsBehavior::default();
        let item = |schema: Value| {
            new_item_value(&resolver, &schema, &behavior, english_strings).unwrap()
        };

        assert_eq!(item(json!({ "type": "array" })), json!([]));
        assert_eq!(item(json!({ "type": "boolean" })), json!(false));
        assert_eq!(item(json!({ "type": "null" })), json!(null));
        assert_eq!(item(json!({ "type": "number" })), json!(0));
        assert_eq!(item(json!({ "type": "object", "properties": { "text": { "type": "string" } } })), json!({}));
        assert_eq!(item(json!({ "type": "string" })), json!(""));
        assert_eq!(item(json!({ "type": "string", "default": "hi" })), json!("hi"));
    }

    #[test]
    fn shallow_defaults_skip_grandchildren() {
        let schema = json!({
            "type": "object",
            "properties": {
                "kind": { "const": "b" },
                "size": { "type": "integer", "default": 2 },
                "inner": {
                    "type": "object",
                    "properties": { "deep": { "type": "string", "default": "no" } }
                }
            }
        });
        let resolver = SchemaResolver::new(&schema, &JsonSchemaValidator);
        let filled = shallow_defaults(&resolver, &schema, Some(json!({ "size": 5 }))).unwrap();
        assert_eq!(filled, Some(json!({ "size": 5, "kind": "b" })));
    }

    #[test]
    fn recursive_reference_stops_expanding() {
        let schema = json!({
            "definitions": {
                "node": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "default": "n" },
                        "child": { "$ref": "#/definitions/node" }
                    }
                }
            },
            "$ref": "#/definitions/node"
        });
        assert_eq!(state(&schema, None), Some(json!({ "name": "n" })));
    }

    #[test]
    fn unresolvable_property_gets_no_default() {
        let schema = json!({
            "type": "object",
            "properties": {
                "ok": { "type": "string", "default": "x" },
                "broken": { "$ref": "#/definitions/nowhere" }
            }
        });
        assert_eq!(state(&schema, None), Some(json!({ "ok": "x" })));
    }
}
