//! Branch selection and data sanitizing for `anyOf` / `oneOf` nodes.

use serde_json::{json, Map, Value};

use crate::defaults::shallow_defaults;
use crate::error::ResolveError;
use crate::resolver::{primary_type, SchemaResolver};
use crate::translate::{TranslatableString, TranslateFn};
use crate::types::{guess_type, ANY_OF_SELECT, ONE_OF_SELECT};

/// Which composition keyword a node uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositionKeyword {
    OneOf,
    AnyOf,
}

impl CompositionKeyword {
    pub fn key(&self) -> &'static str {
        match self {
            CompositionKeyword::OneOf => "oneOf",
            CompositionKeyword::AnyOf => "anyOf",
        }
    }

    /// Suffix of the field id reported when the selector changes branch.
    pub fn select_suffix(&self) -> &'static str {
        match self {
            CompositionKeyword::OneOf => ONE_OF_SELECT,
            CompositionKeyword::AnyOf => ANY_OF_SELECT,
        }
    }

    /// The keyword and options of a composition node, `oneOf` first.
    pub fn of(schema: &Value) -> Option<(Self, &Vec<Value>)> {
        [CompositionKeyword::OneOf, CompositionKeyword::AnyOf]
            .into_iter()
            .find_map(|kw| {
                schema
                    .get(kw.key())
                    .and_then(Value::as_array)
                    .filter(|options| !options.is_empty())
                    .map(|options| (kw, options))
            })
    }
}

/// The discriminator property named by `discriminator.propertyName`.
pub fn discriminator_field(schema: &Value) -> Option<&str> {
    schema
        .get("discriminator")
        .and_then(|d| d.get("propertyName"))
        .and_then(Value::as_str)
}

/// The option whose `const`/`enum` for the discriminator equals the data's.
pub fn option_matching_discriminator(
    data: Option<&Value>,
    options: &[Value],
    field: &str,
) -> Option<usize> {
    let value = data?.get(field)?;
    options.iter().position(|option| {
        let Some(prop) = option.get("properties").and_then(|p| p.get(field)) else {
            return false;
        };
        prop.get("const") == Some(value)
            || prop
                .get("enum")
                .and_then(Value::as_array)
                .is_some_and(|values| values.contains(value))
    })
}

/// Pick the branch of `options` that best fits `data`.
///
/// A discriminator match wins outright. Otherwise the previously selected
/// branch is kept while it still matches, a single matching branch is taken,
/// and remaining ties go to the highest score, then the lowest index.
pub fn closest_matching_option(
    resolver: &SchemaResolver<'_>,
    data: Option<&Value>,
    options: &[Value],
    selected: Option<usize>,
    discriminator: Option<&str>,
) -> Result<usize, ResolveError> {
    let selected = selected.filter(|i| *i < options.len());
    let Some(data) = data else {
        return Ok(selected.unwrap_or(0));
    };
    if let Some(index) =
        discriminator.and_then(|field| option_matching_discriminator(Some(data), options, field))
    {
        return Ok(index);
    }

    let resolved = options
        .iter()
        .map(|option| resolver.resolve_all_refs(option))
        .collect::<Result<Vec<_>, _>>()?;

    let valid: Vec<usize> = resolved
        .iter()
        .enumerate()
        .filter(|(_, option)| structurally_matches(resolver, option, data))
        .map(|(i, _)| i)
        .collect();

    if let Some(previous) = selected.filter(|i| valid.contains(i)) {
        return Ok(previous);
    }
    if let [only] = valid.as_slice() {
        return Ok(*only);
    }

    let candidates: Vec<usize> = if valid.is_empty() {
        (0..resolved.len()).collect()
    } else {
        valid
    };
    let mut best: Option<(usize, i64)> = None;
    let mut distinct_scores = Vec::new();
    for index in candidates {
        let score = score_option(resolver, &resolved[index], data)?;
        if !distinct_scores.contains(&score) {
            distinct_scores.push(score);
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((index, score));
        }
    }

    // Nothing tells the candidates apart: keep what the user had.
    if distinct_scores.len() == 1 {
        if let Some(previous) = selected {
            return Ok(previous);
        }
    }
    Ok(best.map_or(0, |(index, _)| index))
}

/// Data matches an object option only if it also carries one of the
/// option's properties, so an all-optional object does not match everything.
fn structurally_matches(resolver: &SchemaResolver<'_>, option: &Value, data: &Value) -> bool {
    let properties = option.get("properties").and_then(Value::as_object);
    let schema = match (data, properties) {
        (Value::Object(_), Some(props)) if !props.is_empty() => {
            let any_present: Vec<Value> = props
                .keys()
                .map(|key| json!({ "required": [key] }))
                .collect();
            json!({ "allOf": [option, { "anyOf": any_present }] })
        }
        _ => option.clone(),
    };
    resolver
        .validator()
        .is_valid(&schema, data, resolver.root())
}

fn score_option(
    resolver: &SchemaResolver<'_>,
    option: &Value,
    data: &Value,
) -> Result<i64, ResolveError> {
    let properties = option.get("properties").and_then(Value::as_object);
    let (Value::Object(values), Some(properties)) = (data, properties) else {
        return Ok(i64::from(type_matches(option, data)));
    };

    let required: Vec<&str> = option
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut score = 0;
    for (key, prop) in properties {
        let Some(value) = values.get(key) else {
            continue;
        };
        if required.contains(&key.as_str()) {
            score += 1;
        }
        if !prop.is_object() {
            continue;
        }
        let prop = resolver.resolve(prop, Some(value))?;
        if let Some((_, nested)) = CompositionKeyword::of(&prop) {
            let index = closest_matching_option(
                resolver,
                Some(value),
                nested,
                None,
                discriminator_field(&prop),
            )?;
            score += score_option(resolver, &nested[index], value)?;
            continue;
        }
        if primary_type(&prop).as_deref() == Some("object") {
            if value.is_object() {
                score += 1;
            }
            score += score_option(resolver, &prop, value)?;
            continue;
        }
        if type_matches(&prop, value) {
            score += 1;
            if let Some(expected) = prop.get("default").or_else(|| prop.get("const")) {
                score += if expected == value { 1 } else { -1 };
            }
        }
    }
    Ok(score)
}

fn type_matches(schema: &Value, value: &Value) -> bool {
    let Some(expected) = primary_type(schema) else {
        return false;
    };
    let actual = guess_type(value);
    expected == actual || (expected == "number" && actual == "integer")
}

/// Whether `value` can stay when `schema` takes over the field.
fn is_compatible(schema: &Value, value: &Value) -> bool {
    if let Some(constant) = schema.get("const") {
        return constant == value;
    }
    if let Some(values) = schema.get("enum").and_then(Value::as_array) {
        return values.contains(value);
    }
    primary_type(schema).is_none() || type_matches(schema, value)
}

/// Drop the parts of `data` that `new_option` cannot hold.
///
/// Keys owned only by `old_option` are removed; shared keys stay when their
/// value is still compatible, recursing into nested objects.
pub fn sanitize_data_for_new_schema(
    resolver: &SchemaResolver<'_>,
    new_option: &Value,
    old_option: Option<&Value>,
    data: Option<&Value>,
) -> Result<Option<Value>, ResolveError> {
    let Some(data) = data else {
        return Ok(None);
    };
    let new_schema = resolver.resolve(new_option, Some(data))?;
    let old_schema = match old_option {
        Some(old) => Some(resolver.resolve(old, Some(data))?),
        None => None,
    };

    let Value::Object(values) = data else {
        return Ok(is_compatible(&new_schema, data).then(|| data.clone()));
    };
    if primary_type(&new_schema).as_deref() != Some("object") {
        return Ok(is_compatible(&new_schema, data).then(|| data.clone()));
    }

    let empty = Map::new();
    let new_props = new_schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let old_props = old_schema
        .as_ref()
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let closed = new_schema.get("additionalProperties") == Some(&Value::Bool(false));

    let mut out = Map::new();
    for (key, value) in values {
        match new_props.get(key) {
            Some(prop) => {
                let prop = resolver.resolve(prop, Some(value))?;
                if !is_compatible(&prop, value) {
                    continue;
                }
                let kept = match old_props.get(key) {
                    Some(old_prop) if value.is_object() => {
                        sanitize_data_for_new_schema(resolver, &prop, Some(old_prop), Some(value))?
                    }
                    _ => Some(value.clone()),
                };
                if let Some(kept) = kept {
                    out.insert(key.clone(), kept);
                }
            }
            None if old_props.contains_key(key) || closed => {}
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(Some(Value::Object(out)))
}

/// Data for the field after the selector switches from `old_option` to
/// `new_option`: sanitized, then shallowly filled with the new branch's
/// root-level defaults. `None` means the field's value is removed.
pub fn on_branch_change(
    resolver: &SchemaResolver<'_>,
    new_option: &Value,
    old_option: Option<&Value>,
    data: Option<&Value>,
) -> Result<Option<Value>, ResolveError> {
    let sanitized = sanitize_data_for_new_schema(resolver, new_option, old_option, data)?;
    shallow_defaults(resolver, new_option, sanitized)
}

/// Label shown for an option in the selector.
pub fn option_label(option: &Value, index: usize, translate: TranslateFn) -> String {
    option
        .get("title")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| translate(TranslatableString::OptionPrefix, &[&(index + 1).to_string()]))
}
