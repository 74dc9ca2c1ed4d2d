//! Object fields and additional-property editing.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::FormError;
use crate::registry::Context;
use crate::render::{field_node, Field, FieldInput, FieldProps, RenderNode, Renderer};
use crate::resolver::primary_type;
use crate::translate::{TranslatableString, TranslateFn};
use crate::types::ADDITIONAL_PROPERTY_FLAG;
use crate::ui::{order_properties, property_ui_schema, UiOptions};

/// Whether the user may add keys to an object.
///
/// Needs `additionalProperties` or `patternProperties` that admit values,
/// `expandable` not turned off, and room below `maxProperties`.
pub fn can_expand(schema: &Value, ui: &UiOptions, data: Option<&Value>) -> bool {
    let admits = |key: &str| match schema.get(key) {
        None | Some(Value::Bool(false)) | Some(Value::Null) => false,
        Some(_) => true,
    };
    if !admits("additionalProperties") && !admits("patternProperties") {
        return false;
    }
    if ui.extra.get("expandable").and_then(Value::as_bool) == Some(false) {
        return false;
    }
    match (schema.get("maxProperties").and_then(Value::as_u64), data) {
        (Some(max), Some(Value::Object(map))) => (map.len() as u64) < max,
        _ => true,
    }
}

/// `preferred`, or `preferred` plus the separator and the first counter that
/// makes it unique among `existing` keys, e.g. `newKey-1`.
pub fn available_key(preferred: &str, existing: &Map<String, Value>, separator: &str) -> String {
    let mut candidate = preferred.to_string();
    let mut counter = 0;
    while existing.contains_key(&candidate) {
        counter += 1;
        candidate = format!("{}{}{}", preferred, separator, counter);
    }
    candidate
}

/// Starting value for a new additional property of `type_name`.
pub fn default_value_for_type(type_name: Option<&str>, translate: TranslateFn) -> Value {
    match type_name {
        Some("array") => Value::Array(Vec::new()),
        Some("boolean") => Value::Bool(false),
        Some("null") => Value::Null,
        Some("number") | Some("integer") => Value::from(0),
        Some("object") => Value::Object(Map::new()),
        _ => Value::String(translate(TranslatableString::NewStringDefault, &[])),
    }
}

fn separator<'a>(ctx: &'a Context<'_>, ui: &'a UiOptions) -> &'a str {
    ui.duplicate_key_suffix_separator
        .as_deref()
        .unwrap_or(&ctx.options().duplicate_key_suffix_separator)
}

fn as_object<'v>(data: Option<&'v Value>, path: &str) -> Result<Option<&'v Map<String, Value>>, FormError> {
    match data {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(FormError::NotAnObject {
            path: path.to_string(),
        }),
    }
}

/// Add an additional property under a fresh key.
///
/// Returns the key and the new object.
///
/// # Errors
///
/// `FormError::NotAllowed` when the object cannot expand,
/// `FormError::NotAnObject` when `data` is not an object.
pub fn add_property(
    ctx: &Context<'_>,
    schema: &Value,
    ui: &UiOptions,
    data: Option<&Value>,
    path: &str,
) -> Result<(String, Map<String, Value>), FormError> {
    let mut object = as_object(data, path)?.cloned().unwrap_or_default();
    if !can_expand(schema, ui, data) {
        return Err(FormError::NotAllowed {
            path: path.to_string(),
            operation: "add property".to_string(),
        });
    }
    let value_type = match schema.get("additionalProperties") {
        Some(additional) if additional.is_object() => {
            primary_type(&ctx.utils.retrieve_schema(additional, None)?)
        }
        _ => None,
    };
    let translate = ctx.registry.translate();
    let key = available_key(
        &translate(TranslatableString::NewKeyDefault, &[]),
        &object,
        separator(ctx, ui),
    );
    object.insert(key.clone(), default_value_for_type(value_type.as_deref(), translate));
    debug!(path, key = %key, "additional property added");
    Ok((key, object))
}

/// Rename key `from` to `to`, keeping its position.
///
/// A `to` that is already taken gets a counter suffix. Returns the key
/// actually used and the new object.
///
/// # Errors
///
/// `FormError::UnknownPath` when `from` is not a key of the object.
pub fn rename_property(
    ctx: &Context<'_>,
    ui: &UiOptions,
    data: Option<&Value>,
    from: &str,
    to: &str,
    path: &str,
) -> Result<(String, Map<String, Value>), FormError> {
    let object = as_object(data, path)?.cloned().unwrap_or_default();
    if !object.contains_key(from) {
        return Err(FormError::UnknownPath {
            path: format!("{}/{}", path.trim_end_matches('/'), from),
        });
    }
    if from == to {
        return Ok((to.to_string(), object));
    }
    let key = available_key(to, &object, separator(ctx, ui));
    let renamed = object
        .into_iter()
        .map(|(k, v)| if k == from { (key.clone(), v) } else { (k, v) })
        .collect();
    debug!(path, from, to = %key, "additional property renamed");
    Ok((key, renamed))
}

pub(crate) struct ObjectField;

impl Field for ObjectField {
    fn render(&self, renderer: &mut Renderer<'_>, props: &FieldProps) -> RenderNode {
        let ctx = *renderer.context();
        let mut node = field_node(renderer, props);
        node.set_prop(
            "canAddProperty",
            !props.disabled && !props.readonly && can_expand(&props.schema, &props.ui, props.data.as_ref()),
        );

        let properties = props
            .schema
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let names: Vec<String> = properties.keys().cloned().collect();
        let ordered = match order_properties(&names, props.ui.order.as_deref()) {
            Ok(ordered) => ordered,
            Err(e) => {
                warn!(id = %props.id.id, error = %e, "invalid ui:order");
                node.children.push(RenderNode::diagnostic(&props.id.id, &e));
                return node;
            }
        };

        let required: Vec<&str> = props
            .schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let translate = ctx.registry.translate();

        for name in ordered {
            let Some(schema) = properties.get(&name) else {
                continue;
            };
            let additional = schema.get(ADDITIONAL_PROPERTY_FLAG).and_then(Value::as_bool) == Some(true);
            let ui_schema = if additional {
                props.ui_schema.get("additionalProperties").cloned().unwrap_or(Value::Null)
            } else {
                property_ui_schema(&props.ui_schema, &name).clone()
            };
            let id = props.id.child(name.as_str());
            let mut child = renderer.render_field(FieldInput {
                schema: schema.clone(),
                ui_schema,
                id: id.clone(),
                name: name.clone(),
                data: props.data.as_ref().and_then(|d| d.get(&name)).cloned(),
                errors: props.errors.as_ref().and_then(|e| e.child(&name)).cloned(),
                required: required.contains(&name.as_str()),
                disabled: props.disabled,
                readonly: props.readonly,
            });
            if additional {
                child.set_prop("additionalProperty", true);
                child.set_prop("keyId", id.suffixed("-key"));
                child.set_prop("removeLabel", translate(TranslatableString::RemoveButton, &[]));
            }
            node.children.push(child);
        }
        node
    }
}
