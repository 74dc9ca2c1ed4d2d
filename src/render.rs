//! Render description tree.
//!
//! Fields do not draw anything: each one returns a [`RenderNode`] (a kind,
//! props and children) that a toolkit-specific renderer turns into widgets.
//! [`Renderer`] walks the schema, resolving and dispatching every node, and
//! owns nothing but a borrow of the per-form [`FieldState`].

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::array::ArrayField;
use crate::composition::{discriminator_field, option_label, CompositionKeyword};
use crate::dispatch::{dispatch, FieldKind};
use crate::error::ResolveError;
use crate::error_schema::ErrorSchema;
use crate::keyed::{reconcile, KeyedList};
use crate::object::ObjectField;
use crate::remap::ArrayOperation;
use crate::registry::Context;
use crate::resolver::{is_select, primary_type};
use crate::translate::TranslatableString;
use crate::types::FieldPathId;
use crate::ui::UiOptions;

/// One node of the render description tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderNode {
    pub kind: String,
    pub id: String,
    /// Stable identity of an array item row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub props: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RenderNode>,
}

impl RenderNode {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            key: None,
            props: Map::new(),
            children: Vec::new(),
        }
    }

    /// Inline notice standing in for a subtree that could not be resolved.
    pub fn diagnostic(id: impl Into<String>, error: &ResolveError) -> Self {
        Self::new("Diagnostic", id).with_prop("message", error.to_string())
    }

    pub fn with_prop(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_prop(name, value);
        self
    }

    pub fn set_prop(&mut self, name: &str, value: impl Into<Value>) {
        self.props.insert(name.to_string(), value.into());
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.props.get(name)
    }

    /// Depth-first search for the first node with `id` and `kind`.
    pub fn find(&self, kind: &str, id: &str) -> Option<&RenderNode> {
        if self.kind == kind && self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(kind, id))
    }

    /// Every node of the subtree, depth first.
    pub fn descendants(&self) -> Vec<&RenderNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.descendants());
        }
        out
    }
}

/// A field implementation: built-in or registered by name.
pub trait Field: Send + Sync {
    fn render(&self, renderer: &mut Renderer<'_>, props: &FieldProps) -> RenderNode;
}

/// A child a field asks the renderer to render: schema still unresolved.
#[derive(Debug, Clone)]
pub struct FieldInput {
    pub schema: Value,
    pub ui_schema: Value,
    pub id: FieldPathId,
    pub name: String,
    pub data: Option<Value>,
    pub errors: Option<ErrorSchema>,
    pub required: bool,
    pub disabled: bool,
    pub readonly: bool,
}

/// What a field receives: the resolved schema, its options and its kind.
#[derive(Debug, Clone)]
pub struct FieldProps {
    pub schema: Value,
    pub ui_schema: Value,
    pub ui: UiOptions,
    pub kind: FieldKind,
    pub id: FieldPathId,
    pub name: String,
    pub data: Option<Value>,
    pub errors: Option<ErrorSchema>,
    pub required: bool,
    pub disabled: bool,
    pub readonly: bool,
}

/// Mutable state owned per form: the keyed list of every array field and
/// the selected branch of every composition node, both by field id.
#[derive(Debug, Clone, Default)]
pub struct FieldState {
    keyed: HashMap<String, KeyedList>,
    selections: HashMap<String, usize>,
}

impl FieldState {
    pub fn keyed(&self, id: &str) -> Option<&KeyedList> {
        self.keyed.get(id)
    }

    pub fn selection(&self, id: &str) -> Option<usize> {
        self.selections.get(id).copied()
    }

    /// Reconcile the cached list of `id` against `values` and store the result.
    pub(crate) fn reconcile(&mut self, id: &str, values: &[Value]) -> KeyedList {
        let next = reconcile(self.keyed.get(id), values);
        self.keyed.insert(id.to_string(), next.clone());
        next
    }

    pub(crate) fn set_keyed(&mut self, id: &str, list: KeyedList) {
        self.keyed.insert(id.to_string(), list);
    }

    pub(crate) fn set_selection(&mut self, id: &str, index: usize) {
        self.selections.insert(id.to_string(), index);
    }

    /// Carry the state of every field nested in the items of array `id`
    /// through `operation`, so it stays with its item. State under a removed
    /// item is dropped.
    pub(crate) fn follow_items(
        &mut self,
        id: &str,
        separator: &str,
        operation: ArrayOperation,
        len: usize,
    ) {
        let prefix = format!("{}{}", id, separator);
        let keyed = std::mem::take(&mut self.keyed);
        self.keyed = reindex_items(keyed, &prefix, separator, operation, len);
        let selections = std::mem::take(&mut self.selections);
        self.selections = reindex_items(selections, &prefix, separator, operation, len);
    }
}

/// Re-index the entries whose id is `prefix`, an item index, then the rest
/// of a nested id.
fn reindex_items<T>(
    entries: HashMap<String, T>,
    prefix: &str,
    separator: &str,
    operation: ArrayOperation,
    len: usize,
) -> HashMap<String, T> {
    entries
        .into_iter()
        .filter_map(|(id, entry)| {
            let Some(rest) = id.strip_prefix(prefix) else {
                return Some((id, entry));
            };
            let (index, tail) = match rest.find(separator) {
                Some(at) if !separator.is_empty() => rest.split_at(at),
                _ => (rest, ""),
            };
            let Ok(index) = index.parse::<usize>() else {
                return Some((id, entry));
            };
            let moved = operation.item_index(index, len)?;
            Some((format!("{}{}{}", prefix, moved, tail), entry))
        })
        .collect()
}

/// Walks a schema, producing the render tree.
pub struct Renderer<'a> {
    ctx: Context<'a>,
    state: &'a mut FieldState,
}

impl<'a> Renderer<'a> {
    pub fn new(ctx: Context<'a>, state: &'a mut FieldState) -> Self {
        Self { ctx, state }
    }

    pub fn context(&self) -> &Context<'a> {
        &self.ctx
    }

    pub fn state(&mut self) -> &mut FieldState {
        &mut *self.state
    }

    /// Render the whole form.
    pub fn render_root(&mut self, ui_schema: &Value, data: Option<&Value>) -> RenderNode {
        let options = self.ctx.options();
        let input = FieldInput {
            schema: self.ctx.utils.root_schema().clone(),
            ui_schema: ui_schema.clone(),
            id: FieldPathId::root(&options.id_prefix, &options.id_separator),
            name: String::new(),
            data: data.cloned(),
            errors: Some(self.ctx.error_schema.clone()),
            required: false,
            disabled: false,
            readonly: false,
        };
        self.render_field(input)
    }

    /// Resolve, dispatch and render one field.
    ///
    /// A resolution failure renders as a diagnostic node in place of the
    /// field; the rest of the tree is unaffected.
    pub fn render_field(&mut self, input: FieldInput) -> RenderNode {
        let resolved = match self
            .ctx
            .utils
            .retrieve_schema(&input.schema, input.data.as_ref())
        {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(id = %input.id.id, error = %e, "schema could not be resolved");
                return RenderNode::diagnostic(&input.id.id, &e);
            }
        };
        let ui = UiOptions::from_ui_schema(&input.ui_schema);
        let kind = dispatch(&resolved, &ui, self.ctx.registry);
        let global = &self.ctx.options().global_ui;
        let read_only_schema = resolved.get("readOnly").and_then(Value::as_bool) == Some(true);

        let props = FieldProps {
            disabled: input.disabled || ui.disabled(global),
            readonly: input.readonly || ui.readonly(global) || read_only_schema,
            schema: resolved,
            ui_schema: input.ui_schema,
            ui,
            kind,
            id: input.id,
            name: input.name,
            data: input.data,
            errors: input.errors,
            required: input.required,
        };

        let registry = self.ctx.registry;
        let mut node = match &props.kind {
            FieldKind::Custom(name) => match registry.field(name) {
                Some(field) => field.render(self, &props),
                None => FallbackField.render(self, &props),
            },
            FieldKind::Array => ArrayField.render(self, &props),
            FieldKind::Object => ObjectField.render(self, &props),
            FieldKind::String | FieldKind::Number | FieldKind::Boolean | FieldKind::Null => {
                LeafField.render(self, &props)
            }
            FieldKind::Composition => MultiSchemaField.render(self, &props),
            FieldKind::Fallback => FallbackField.render(self, &props),
        };

        // A typed node may still offer branches on top of its own fields;
        // const-only branches are a select widget instead.
        let typed_builtin = !matches!(
            props.kind,
            FieldKind::Composition | FieldKind::Custom(_) | FieldKind::Fallback
        );
        if typed_builtin && !is_select(&props.schema) && CompositionKeyword::of(&props.schema).is_some() {
            node.children.push(MultiSchemaField.render(self, &props));
        }
        node
    }
}

/// Props shared by every built-in field node.
pub(crate) fn field_node(renderer: &Renderer<'_>, props: &FieldProps) -> RenderNode {
    let mut node = RenderNode::new(props.kind.name(), &props.id.id);
    let title = props
        .ui
        .title
        .clone()
        .or_else(|| props.schema.get("title").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| props.name.clone());
    node.set_prop("name", props.name.clone());
    node.set_prop("title", title);
    if let Some(description) = props
        .ui
        .description
        .clone()
        .or_else(|| props.schema.get("description").and_then(Value::as_str).map(String::from))
    {
        node.set_prop("description", description);
    }
    node.set_prop("required", props.required);
    node.set_prop("disabled", props.disabled);
    node.set_prop("readonly", props.readonly);
    if props.ui.autofocus {
        node.set_prop("autofocus", true);
    }
    node.set_prop(
        "label",
        renderer
            .context()
            .utils
            .get_display_label(&props.schema, &props.ui_schema),
    );
    if !props.ui.hide_error {
        let errors = props.errors.as_ref().map(ErrorSchema::errors).unwrap_or_default();
        if !errors.is_empty() {
            node.set_prop("errors", errors.to_vec());
        }
    }
    if let Some(class_names) = &props.ui.class_names {
        node.set_prop("classNames", class_names.clone());
    }
    if let Some(style) = &props.ui.style {
        node.set_prop("style", style.clone());
    }
    if !props.ui.extra.is_empty() {
        node.set_prop("options", Value::Object(props.ui.extra.clone()));
    }
    node
}

/// Choices of an `enum`, or of a `oneOf`/`anyOf` whose options are all `const`.
pub(crate) fn enum_options(schema: &Value) -> Option<Vec<Value>> {
    if let Some(values) = schema.get("enum").and_then(Value::as_array) {
        let names = schema.get("enumNames").and_then(Value::as_array);
        return Some(
            values
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    let label = names
                        .and_then(|n| n.get(i))
                        .and_then(Value::as_str)
                        .map(String::from)
                        .unwrap_or_else(|| label_of(value));
                    json!({ "label": label, "value": value })
                })
                .collect(),
        );
    }
    if !is_select(schema) {
        return None;
    }
    let (_, options) = CompositionKeyword::of(schema)?;
    Some(
        options
            .iter()
            .filter_map(|option| {
                let value = option.get("const")?;
                let label = option
                    .get("title")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| label_of(value));
                Some(json!({ "label": label, "value": value }))
            })
            .collect(),
    )
}

fn label_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// String, number, boolean and null fields: a single widget.
struct LeafField;

impl Field for LeafField {
    fn render(&self, renderer: &mut Renderer<'_>, props: &FieldProps) -> RenderNode {
        let mut node = field_node(renderer, props);
        let choices = enum_options(&props.schema);
        let widget = props.ui.widget.clone().unwrap_or_else(|| {
            let default = match (&props.kind, &choices) {
                (FieldKind::Boolean, _) => "checkbox",
                (FieldKind::Null, _) => "hidden",
                (_, Some(_)) => "select",
                (FieldKind::String, None) => match props.schema.get("format").and_then(Value::as_str) {
                    Some("email") => "email",
                    Some("uri") => "url",
                    Some("date") => "date",
                    Some("date-time") => "datetime",
                    Some("data-url") => "file",
                    _ => "text",
                },
                _ => "updown",
            };
            default.to_string()
        });
        node.set_prop("widget", widget);
        if let Some(choices) = choices {
            node.set_prop("enumOptions", choices);
        }
        let value = match (&props.kind, &props.data) {
            (FieldKind::Null, _) => Value::Null,
            (_, Some(value)) => value.clone(),
            (_, None) => Value::Null,
        };
        node.set_prop("value", value);
        node
    }
}

/// Selector over the branches of an `anyOf`/`oneOf` node plus the chosen
/// branch's own field.
struct MultiSchemaField;

impl Field for MultiSchemaField {
    fn render(&self, renderer: &mut Renderer<'_>, props: &FieldProps) -> RenderNode {
        let Some((keyword, options)) = CompositionKeyword::of(&props.schema) else {
            return FallbackField.render(renderer, props);
        };
        let ctx = *renderer.context();
        let previous = renderer.state().selection(&props.id.id);
        let discriminator = discriminator_field(&props.schema);
        let selected = match ctx.utils.get_closest_matching_option(
            props.data.as_ref(),
            options,
            previous,
            discriminator,
        ) {
            Ok(index) => index,
            Err(e) => {
                warn!(id = %props.id.id, error = %e, "composition options could not be resolved");
                return RenderNode::diagnostic(&props.id.id, &e);
            }
        };
        renderer.state().set_selection(&props.id.id, selected);

        let translate = ctx.registry.translate();
        let labels: Vec<String> = options
            .iter()
            .enumerate()
            .map(|(i, option)| option_label(option, i, translate))
            .collect();
        let mut node = RenderNode::new("MultiSchemaField", &props.id.id)
            .with_prop("keyword", keyword.key())
            .with_prop("selectId", props.id.suffixed(keyword.select_suffix()))
            .with_prop("selectLabel", translate(TranslatableString::SelectLabel, &[]))
            .with_prop("options", labels)
            .with_prop("selected", selected)
            .with_prop("disabled", props.disabled || props.readonly);

        let mut option = options[selected].clone();
        if let (Value::Object(map), Some(base_type)) = (&mut option, props.schema.get("type")) {
            if !map.contains_key("type") && !map.contains_key("$ref") {
                map.insert("type".to_string(), base_type.clone());
            }
        }
        let option_ui = props
            .ui_schema
            .get(keyword.key())
            .and_then(|list| list.get(selected))
            .cloned()
            .unwrap_or(Value::Null);
        let child = renderer.render_field(FieldInput {
            schema: option,
            ui_schema: option_ui,
            id: props.id.clone(),
            name: props.name.clone(),
            data: props.data.clone(),
            errors: props.errors.clone(),
            required: props.required,
            disabled: props.disabled,
            readonly: props.readonly,
        });
        node.children.push(child);
        node
    }
}

/// Stand-in for schemas no field can edit.
struct FallbackField;

impl Field for FallbackField {
    fn render(&self, renderer: &mut Renderer<'_>, props: &FieldProps) -> RenderNode {
        let translate = renderer.context().registry.translate();
        let type_name = primary_type(&props.schema).unwrap_or_else(|| "unknown".to_string());
        let mut node = field_node(renderer, props);
        node.kind = FieldKind::Fallback.name().to_string();
        node.set_prop(
            "reason",
            translate(TranslatableString::UnsupportedFieldWithReason, &[&type_name]),
        );
        if let Some(value) = &props.data {
            node.set_prop("value", value.clone());
        }
        node
    }
}
