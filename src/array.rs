//! Array fields: item layout, capabilities, rendering and structural edits.
//!
//! Every structural edit produces the new keyed list, the new array value and
//! the remapped error subtree together, so the caller can emit them as one
//! change.

use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::defaults::new_item_value;
use crate::error::FormError;
use crate::error_schema::ErrorSchema;
use crate::keyed::KeyedList;
use crate::options::GlobalUiOptions;
use crate::registry::Context;
use crate::remap::{remap, ArrayOperation};
use crate::render::{enum_options, field_node, Field, FieldInput, FieldProps, RenderNode, Renderer};
use crate::translate::TranslatableString;
use crate::ui::{item_ui_schema, UiOptions};

/// Which schema applies to which item.
///
/// A list-valued `items` fixes the schema of the leading positions; later
/// positions use `additionalItems` when it is a schema.
#[derive(Debug, Clone, Copy)]
pub struct ItemLayout<'s> {
    fixed: &'s [Value],
    rest: Option<&'s Value>,
}

impl<'s> ItemLayout<'s> {
    pub fn of(schema: &'s Value) -> Self {
        match schema.get("items") {
            Some(Value::Array(fixed)) => Self {
                fixed,
                rest: schema.get("additionalItems").filter(|s| s.is_object()),
            },
            items => Self {
                fixed: &[],
                rest: items,
            },
        }
    }

    /// Number of leading positions with their own schema.
    pub fn fixed_len(&self) -> usize {
        self.fixed.len()
    }

    pub fn is_fixed(&self) -> bool {
        !self.fixed.is_empty()
    }

    /// Whether items can exist past the fixed positions.
    pub fn allows_additional(&self) -> bool {
        self.rest.is_some()
    }

    pub fn schema_for(&self, index: usize) -> Option<&'s Value> {
        self.fixed.get(index).or(self.rest)
    }
}

/// What the user may do with an array as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayCapabilities {
    pub can_add: bool,
    pub removable: bool,
    pub orderable: bool,
    pub copyable: bool,
}

impl ArrayCapabilities {
    /// `can_add` needs `addable` and room below `maxItems`; a disabled or
    /// read-only array allows nothing.
    pub fn new(
        schema: &Value,
        ui: &UiOptions,
        global: &GlobalUiOptions,
        len: usize,
        locked: bool,
    ) -> Self {
        let under_max = schema
            .get("maxItems")
            .and_then(Value::as_u64)
            .map_or(true, |max| (len as u64) < max);
        let layout = ItemLayout::of(schema);
        let room = !layout.is_fixed() || layout.allows_additional();
        Self {
            can_add: !locked && ui.addable(global) && under_max && room,
            removable: !locked && ui.removable(global),
            orderable: !locked && ui.orderable(global),
            copyable: !locked && ui.copyable(global),
        }
    }
}

/// Controls shown on one item row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemControls {
    pub has_toolbar: bool,
    pub can_move_up: bool,
    pub can_move_down: bool,
    pub has_remove: bool,
    pub has_copy: bool,
}

impl ItemControls {
    /// Items in fixed positions can't be moved, removed or copied.
    pub fn new(index: usize, len: usize, fixed_len: usize, caps: &ArrayCapabilities) -> Self {
        let free = index >= fixed_len;
        let can_move_up = caps.orderable && free && index > fixed_len;
        let can_move_down = caps.orderable && free && index + 1 < len;
        let has_remove = caps.removable && free;
        let has_copy = caps.copyable && caps.can_add && free;
        Self {
            has_toolbar: can_move_up || can_move_down || has_remove || has_copy,
            can_move_up,
            can_move_down,
            has_remove,
            has_copy,
        }
    }
}

/// The uiSchema of item `index`.
///
/// A registered generator named by `ui:itemsGenerator` wins over the static
/// `items` entry. A generator that fails only costs that one item its
/// options: the failure (an `Err` or a panic) is logged and the item gets an
/// empty uiSchema.
pub fn item_ui(
    ctx: &Context<'_>,
    ui: &UiOptions,
    ui_schema: &Value,
    index: usize,
    item: &Value,
    array: &Value,
) -> Value {
    let Some(name) = &ui.items_generator else {
        return item_ui_schema(ui_schema, index);
    };
    let Some(generator) = ctx.registry.item_ui_generator(name) else {
        warn!(generator = %name, "no item uiSchema generator registered under this name");
        return item_ui_schema(ui_schema, index);
    };
    match panic::catch_unwind(AssertUnwindSafe(|| generator(index, item, array))) {
        Ok(Ok(generated)) => generated,
        Ok(Err(e)) => {
            warn!(generator = %name, index, error = %e, "item uiSchema generator failed");
            Value::Object(Map::new())
        }
        Err(_) => {
            warn!(generator = %name, index, "item uiSchema generator panicked");
            Value::Object(Map::new())
        }
    }
}

/// Result of a structural edit.
#[derive(Debug, Clone)]
pub struct ArrayEdit {
    pub keyed: KeyedList,
    /// The new array value.
    pub value: Value,
    /// The remapped error subtree; `None` when nothing is left.
    pub errors: Option<ErrorSchema>,
}

/// Apply `operation` to an array field.
///
/// `schema` is the array's resolved schema, `keyed` its current keyed list
/// and `errors` its current error subtree. `path` only labels errors.
///
/// # Errors
///
/// `FormError::IndexOutOfRange` for a bad index, `FormError::NotAllowed` when
/// the field's options or its fixed items forbid the edit.
pub fn apply_operation(
    ctx: &Context<'_>,
    schema: &Value,
    ui: &UiOptions,
    keyed: &KeyedList,
    errors: Option<&ErrorSchema>,
    operation: ArrayOperation,
    path: &str,
) -> Result<ArrayEdit, FormError> {
    let len = keyed.len();
    let layout = ItemLayout::of(schema);
    let global = &ctx.options().global_ui;
    let locked = ui.disabled(global) || ui.readonly(global);
    let caps = ArrayCapabilities::new(schema, ui, global, len, locked);

    let not_allowed = || FormError::NotAllowed {
        path: path.to_string(),
        operation: operation.name().to_string(),
    };
    let check_index = |index: usize, bound: usize| {
        if index < bound {
            Ok(())
        } else {
            Err(FormError::IndexOutOfRange {
                path: path.to_string(),
                index,
                len,
            })
        }
    };

    let next = match operation {
        ArrayOperation::Insert { index } => {
            let at = index.unwrap_or(len);
            check_index(at, len + 1)?;
            if !caps.can_add || at < layout.fixed_len() {
                return Err(not_allowed());
            }
            let item_schema = layout.schema_for(at).ok_or_else(not_allowed)?;
            let value = new_item_value(
                ctx.utils.resolver(),
                item_schema,
                &ctx.options().defaults,
                ctx.registry.translate(),
            )?;
            keyed.insert(Some(at), value)
        }
        ArrayOperation::Remove { index } => {
            check_index(index, len)?;
            if !caps.removable || index < layout.fixed_len() {
                return Err(not_allowed());
            }
            keyed.remove(index).ok_or_else(not_allowed)?
        }
        ArrayOperation::Duplicate { index } => {
            check_index(index, len)?;
            if !caps.copyable || !caps.can_add || index < layout.fixed_len() {
                return Err(not_allowed());
            }
            keyed.duplicate(index).ok_or_else(not_allowed)?
        }
        ArrayOperation::Move { from, to } => {
            check_index(from, len)?;
            check_index(to, len)?;
            if !caps.orderable || from.min(to) < layout.fixed_len() {
                return Err(not_allowed());
            }
            keyed.move_item(from, to).ok_or_else(not_allowed)?
        }
    };
    debug!(path, operation = operation.name(), len = next.len(), "array edited");

    let errors = errors
        .map(|previous| remap(previous, operation, len))
        .filter(|remapped| !remapped.is_empty());
    Ok(ArrayEdit {
        value: Value::Array(next.values()),
        keyed: next,
        errors,
    })
}

pub(crate) struct ArrayField;

impl Field for ArrayField {
    fn render(&self, renderer: &mut Renderer<'_>, props: &FieldProps) -> RenderNode {
        let ctx = *renderer.context();
        let mut node = field_node(renderer, props);

        let as_widget = if ctx.utils.is_multi_select(&props.schema) {
            Some("select")
        } else if ctx.utils.is_files_array(&props.schema, &props.ui_schema) {
            Some("files")
        } else {
            None
        };
        if let Some(default_widget) = as_widget {
            let widget = props.ui.widget.clone().unwrap_or_else(|| default_widget.to_string());
            node.set_prop("widget", widget);
            node.set_prop("multiple", true);
            if let Some(choices) = props.schema.get("items").and_then(|items| {
                ctx.utils
                    .retrieve_schema(items, None)
                    .ok()
                    .and_then(|items| enum_options(&items))
            }) {
                node.set_prop("enumOptions", choices);
            }
            node.set_prop("value", props.data.clone().unwrap_or(Value::Array(Vec::new())));
            return node;
        }

        let values = props
            .data
            .as_ref()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let array = Value::Array(values.clone());
        let keyed = renderer.state().reconcile(&props.id.id, &values);

        let layout = ItemLayout::of(&props.schema);
        let global = &ctx.options().global_ui;
        let caps = ArrayCapabilities::new(
            &props.schema,
            &props.ui,
            global,
            keyed.len(),
            props.disabled || props.readonly,
        );
        let translate = ctx.registry.translate();
        node.set_prop("canAdd", caps.can_add);
        node.set_prop(
            "addLabel",
            translate(TranslatableString::AddItemButton, &[]),
        );
        node.set_prop("itemCount", keyed.len());

        let item_required = props.schema.get("minItems").and_then(Value::as_u64).unwrap_or(0) > 0;
        let empty = Value::Object(Map::new());
        for (index, item) in keyed.items().iter().enumerate() {
            let item_schema = layout.schema_for(index).unwrap_or(&empty).clone();
            let item_ui_schema = item_ui(&ctx, &props.ui, &props.ui_schema, index, &item.value, &array);
            let id = props.id.child(index);
            let child = renderer.render_field(FieldInput {
                schema: item_schema,
                ui_schema: item_ui_schema,
                id: id.clone(),
                name: format!("{}-{}", props.name, index),
                data: Some(item.value.clone()),
                errors: props
                    .errors
                    .as_ref()
                    .and_then(|e| e.child(&index.to_string()))
                    .cloned(),
                required: item_required,
                disabled: props.disabled,
                readonly: props.readonly,
            });

            let controls = ItemControls::new(index, keyed.len(), layout.fixed_len(), &caps);
            let mut row = RenderNode::new("ArrayItem", id.id.clone()).with_prop("index", index);
            if let Ok(Value::Object(flags)) = serde_json::to_value(controls) {
                row.props.extend(flags);
            }
            row.key = Some(item.key.clone());
            row.children.push(child);
            node.children.push(row);
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use serde_json::json;

    fn caps(schema: Value, ui: Value, len: usize) -> ArrayCapabilities {
        ArrayCapabilities::new(
            &schema,
            &UiOptions::from_ui_schema(&ui),
            &GlobalUiOptions::default(),
            len,
            false,
        )
    }

    #[test]
    fn can_add_respects_max_items_and_addable() {
        let schema = json!({ "type": "array", "maxItems": 2, "items": {} });
        assert!(caps(schema.clone(), json!({}), 1).can_add);
        assert!(!caps(schema.clone(), json!({}), 2).can_add);

        let open = json!({ "type": "array", "items": {} });
        assert!(!caps(open, json!({ "ui:options": { "addable": false } }), 0).can_add);
    }

    #[test]
    fn capability_defaults() {
        let c = caps(json!({ "type": "array", "items": {} }), json!({}), 0);
        assert!(c.removable && c.orderable && !c.copyable);
    }

    #[test]
    fn locked_arrays_allow_nothing() {
        let c = ArrayCapabilities::new(
            &json!({ "type": "array", "items": {} }),
            &UiOptions::default(),
            &GlobalUiOptions::default(),
            0,
            true,
        );
        assert!(!c.can_add && !c.removable && !c.orderable && !c.copyable);
    }

    #[test]
    fn fixed_items_layout() {
        let schema = json!({
            "type": "array",
            "items": [{ "type": "string" }, { "type": "number" }],
            "additionalItems": { "type": "boolean" }
        });
        let layout = ItemLayout::of(&schema);
        assert_eq!(layout.fixed_len(), 2);
        assert_eq!(layout.schema_for(1), Some(&json!({ "type": "number" })));
        assert_eq!(layout.schema_for(5), Some(&json!({ "type": "boolean" })));

        let closed = json!({ "type": "array", "items": [{ "type": "string" }] });
        assert!(!ItemLayout::of(&closed).allows_additional());
        assert!(!caps(closed, json!({}), 1).can_add);
    }

    #[test]
    fn item_controls_at_edges() {
        let c = caps(json!({ "type": "array", "items": {} }), json!({ "ui:copyable": true }), 3);
        let first = ItemControls::new(0, 3, 0, &c);
        assert!(!first.can_move_up && first.can_move_down && first.has_remove && first.has_copy);
        let last = ItemControls::new(2, 3, 0, &c);
        assert!(last.can_move_up && !last.can_move_down);

        let fixed = ItemControls::new(1, 3, 2, &c);
        assert!(!fixed.has_toolbar);
        let extra = ItemControls::new(2, 3, 2, &c);
        assert!(!extra.can_move_up && extra.has_remove);
    }

    fn edit(schema: &Value, ui: Value, values: &[Value], op: ArrayOperation) -> Result<ArrayEdit, FormError> {
        let registry = Registry::new();
        let errors = ErrorSchema::new();
        let data = Value::Array(values.to_vec());
        let ctx = Context::new(&registry, schema, &data, &errors);
        let keyed = KeyedList::fresh(values);
        apply_operation(&ctx, schema, &UiOptions::from_ui_schema(&ui), &keyed, None, op, "/")
    }

    #[test]
    fn insert_uses_item_default() {
        let schema = json!({ "type": "array", "items": { "type": "string", "default": "x" } });
        let result = edit(&schema, json!({}), &[json!("a")], ArrayOperation::Insert { index: Some(0) }).unwrap();
        assert_eq!(result.value, json!(["x", "a"]));
        assert!(result.errors.is_none());
    }

    #[test]
    fn fixed_positions_are_protected() {
        let schema = json!({
            "type": "array",
            "items": [{ "type": "string" }],
            "additionalItems": { "type": "number" }
        });
        let values = [json!("a"), json!(1)];
        assert!(matches!(
            edit(&schema, json!({}), &values, ArrayOperation::Remove { index: 0 }),
            Err(FormError::NotAllowed { .. })
        ));
        let appended = edit(&schema, json!({}), &values, ArrayOperation::Insert { index: None }).unwrap();
        assert_eq!(appended.value, json!(["a", 1, 0]));
    }

    #[test]
    fn disabled_options_refuse_edits() {
        let schema = json!({ "type": "array", "items": { "type": "string" } });
        let values = [json!("a"), json!("b")];
        assert!(matches!(
            edit(&schema, json!({ "ui:orderable": false }), &values, ArrayOperation::Move { from: 1, to: 0 }),
            Err(FormError::NotAllowed { .. })
        ));
        assert!(matches!(
            edit(&schema, json!({}), &values, ArrayOperation::Duplicate { index: 0 }),
            Err(FormError::NotAllowed { .. })
        ));
        assert!(matches!(
            edit(&schema, json!({}), &values, ArrayOperation::Remove { index: 2 }),
            Err(FormError::IndexOutOfRange { index: 2, len: 2, .. })
        ));
    }

    #[test]
    fn failing_generator_only_blanks_its_item() {
        let registry = Registry::new().with_item_ui_generator("rows", |index, _, _| {
            if index == 1 {
                Err("boom".into())
            } else {
                Ok(json!({ "ui:widget": "textarea" }))
            }
        });
        let schema = json!({ "type": "array", "items": { "type": "string" } });
        let data = json!(["a", "b", "c"]);
        let errors = ErrorSchema::new();
        let ctx = Context::new(&registry, &schema, &data, &errors);
        let ui_schema = json!({ "ui:itemsGenerator": "rows" });
        let ui = UiOptions::from_ui_schema(&ui_schema);

        assert_eq!(item_ui(&ctx, &ui, &ui_schema, 0, &json!("a"), &data), json!({ "ui:widget": "textarea" }));
        assert_eq!(item_ui(&ctx, &ui, &ui_schema, 1, &json!("b"), &data), json!({}));
        assert_eq!(item_ui(&ctx, &ui, &ui_schema, 2, &json!("c"), &data), json!({ "ui:widget": "textarea" }));
    }

    #[test]
    fn panicking_generator_is_contained() {
        let registry = Registry::new().with_item_ui_generator("rows", |index, _, _| {
            if index == 0 {
                panic!("generator bug");
            }
            Ok(json!({ "ui:widget": "textarea" }))
        });
        let schema = json!({ "type": "array", "items": { "type": "string" } });
        let data = json!(["a", "b"]);
        let errors = ErrorSchema::new();
        let ctx = Context::new(&registry, &schema, &data, &errors);
        let ui_schema = json!({ "ui:itemsGenerator": "rows" });
        let ui = UiOptions::from_ui_schema(&ui_schema);

        assert_eq!(item_ui(&ctx, &ui, &ui_schema, 0, &json!("a"), &data), json!({}));
        assert_eq!(item_ui(&ctx, &ui, &ui_schema, 1, &json!("b"), &data), json!({ "ui:widget": "textarea" }));
    }
}
