//! Presentation hints read from a uiSchema.
//!
//! Options come either as `ui:`-prefixed keys on the uiSchema node or inside
//! its `ui:options` object; the prefixed form wins when both are set.

use serde_json::{Map, Value};

use crate::dispatch::FieldKind;
use crate::error::ResolveError;
use crate::options::GlobalUiOptions;

/// Override of the field that renders a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiField {
    /// One of the built-in field kinds, e.g. `"ArrayField"`.
    Kind(FieldKind),
    /// A field registered by name in the registry.
    Named(String),
}

impl UiField {
    fn parse(name: &str) -> Self {
        match FieldKind::from_builtin_name(name) {
            Some(kind) => UiField::Kind(kind),
            None => UiField::Named(name.to_string()),
        }
    }
}

/// Parsed UI options of one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiOptions {
    pub field: Option<UiField>,
    pub widget: Option<String>,
    pub order: Option<Vec<String>>,
    pub addable: Option<bool>,
    pub removable: Option<bool>,
    pub copyable: Option<bool>,
    pub orderable: Option<bool>,
    pub duplicate_key_suffix_separator: Option<String>,
    pub hide_error: bool,
    pub disabled: Option<bool>,
    pub readonly: Option<bool>,
    pub autofocus: bool,
    pub label: Option<bool>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub class_names: Option<String>,
    pub style: Option<Value>,
    /// Name of a registered per-item uiSchema generator.
    pub items_generator: Option<String>,
    /// Options this crate does not interpret, passed on to widgets.
    pub extra: Map<String, Value>,
}

impl UiOptions {
    /// Read the options of a uiSchema node. Anything that is not an object
    /// yields the defaults.
    pub fn from_ui_schema(ui_schema: &Value) -> Self {
        let mut flat = Map::new();
        if let Some(nested) = ui_schema.get("ui:options").and_then(Value::as_object) {
            for (k, v) in nested {
                flat.insert(k.clone(), v.clone());
            }
        }
        if let Some(map) = ui_schema.as_object() {
            for (k, v) in map {
                if let Some(name) = k.strip_prefix("ui:") {
                    if name != "options" {
                        flat.insert(name.to_string(), v.clone());
                    }
                }
            }
        }

        let mut opts = UiOptions::default();
        for (key, value) in flat {
            match key.as_str() {
                "field" => opts.field = value.as_str().map(UiField::parse),
                "widget" => opts.widget = value.as_str().map(String::from),
                "order" => {
                    opts.order = value.as_array().map(|names| {
                        names
                            .iter()
                            .filter_map(Value::as_str)
                            .map(String::from)
                            .collect()
                    })
                }
                "addable" => opts.addable = value.as_bool(),
                "removable" => opts.removable = value.as_bool(),
                "copyable" => opts.copyable = value.as_bool(),
                "orderable" => opts.orderable = value.as_bool(),
                "duplicateKeySuffixSeparator" => {
                    opts.duplicate_key_suffix_separator = value.as_str().map(String::from)
                }
                "hideError" => opts.hide_error = value.as_bool().unwrap_or(false),
                "disabled" => opts.disabled = value.as_bool(),
                "readonly" => opts.readonly = value.as_bool(),
                "autofocus" => opts.autofocus = value.as_bool().unwrap_or(false),
                "label" => opts.label = value.as_bool(),
                "title" => opts.title = value.as_str().map(String::from),
                "description" => opts.description = value.as_str().map(String::from),
                "classNames" => opts.class_names = value.as_str().map(String::from),
                "style" => opts.style = Some(value),
                "itemsGenerator" => opts.items_generator = value.as_str().map(String::from),
                _ => {
                    opts.extra.insert(key, value);
                }
            }
        }
        opts
    }

    pub fn addable(&self, global: &GlobalUiOptions) -> bool {
        self.addable.unwrap_or(global.addable)
    }

    pub fn removable(&self, global: &GlobalUiOptions) -> bool {
        self.removable.unwrap_or(global.removable)
    }

    pub fn copyable(&self, global: &GlobalUiOptions) -> bool {
        self.copyable.unwrap_or(global.copyable)
    }

    pub fn orderable(&self, global: &GlobalUiOptions) -> bool {
        self.orderable.unwrap_or(global.orderable)
    }

    pub fn disabled(&self, global: &GlobalUiOptions) -> bool {
        self.disabled.unwrap_or(global.disabled)
    }

    pub fn readonly(&self, global: &GlobalUiOptions) -> bool {
        self.readonly.unwrap_or(global.readonly)
    }

    pub fn label(&self, global: &GlobalUiOptions) -> bool {
        self.label.unwrap_or(global.label)
    }
}

/// The uiSchema of a child property.
pub fn property_ui_schema<'a>(ui_schema: &'a Value, name: &str) -> &'a Value {
    static EMPTY: Value = Value::Null;
    ui_schema.get(name).unwrap_or(&EMPTY)
}

/// The static uiSchema of array item `index`: `items` when it is an object,
/// or the matching entry when `items` is a list (fixed-item arrays).
pub fn item_ui_schema(ui_schema: &Value, index: usize) -> Value {
    match ui_schema.get("items") {
        Some(Value::Array(list)) => list.get(index).cloned().unwrap_or(Value::Null),
        Some(items) => items.clone(),
        None => Value::Null,
    }
}

/// Arrange `properties` by a `ui:order` list.
///
/// Names missing from the schema are skipped; a single `*` stands for every
/// property the list does not name.
///
/// # Errors
///
/// `ResolveError::OrderMissing` when properties are left out and there is no
/// wildcard, `ResolveError::OrderMultipleWildcards` for more than one `*`.
pub fn order_properties(
    properties: &[String],
    order: Option<&[String]>,
) -> Result<Vec<String>, ResolveError> {
    let Some(order) = order else {
        return Ok(properties.to_vec());
    };

    let filtered: Vec<&String> = order
        .iter()
        .filter(|name| *name == "*" || properties.contains(name))
        .collect();
    let rest: Vec<String> = properties
        .iter()
        .filter(|name| !filtered.contains(name))
        .cloned()
        .collect();

    let wildcards: Vec<usize> = filtered
        .iter()
        .enumerate()
        .filter(|(_, name)| name.as_str() == "*")
        .map(|(i, _)| i)
        .collect();

    match wildcards.as_slice() {
        [] if rest.is_empty() => Ok(filtered.into_iter().cloned().collect()),
        [] => Err(ResolveError::OrderMissing { properties: rest }),
        [at] => {
            let mut complete: Vec<String> = filtered.iter().map(|s| s.to_string()).collect();
            complete.splice(*at..=*at, rest);
            Ok(complete)
        }
        _ => Err(ResolveError::OrderMultipleWildcards),
    }
}
