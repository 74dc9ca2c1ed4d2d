//! The top-level form pipeline.
//!
//! A [`Form`] owns the schema, uiSchema, data and error schema plus the
//! per-field state (keyed lists and branch selections). Every user action
//! goes through [`Form::apply`], which runs one complete pass and notifies
//! the change listeners exactly once with a [`FormChange`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::array::{apply_operation, ItemLayout};
use crate::composition::{discriminator_field, on_branch_change, CompositionKeyword};
use crate::error::{FormError, ResolveError, ValidateError};
use crate::error_schema::ErrorSchema;
use crate::merge::merge_schemas;
use crate::object::{add_property, rename_property};
use crate::options::FormOptions;
use crate::registry::{Context, Registry, SchemaUtils};
use crate::remap::ArrayOperation;
use crate::render::{FieldState, RenderNode, Renderer};
use crate::resolver::primary_type;
use crate::types::{
    apply_change, path_to_pointer, value_at, ChangeValue, FieldPathId, PathSegment,
    ADDITIONAL_PROPERTY_FLAG,
};
use crate::ui::{item_ui_schema, property_ui_schema, UiOptions};

/// A user action on the form. Paths are JSON Pointers in serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum FormAction {
    /// Set or remove the value at `path`.
    SetValue {
        #[serde(with = "pointer")]
        path: Vec<PathSegment>,
        value: ChangeValue,
    },
    /// Structural edit of the array at `path`.
    Array {
        #[serde(with = "pointer")]
        path: Vec<PathSegment>,
        operation: ArrayOperation,
    },
    /// Switch the `anyOf`/`oneOf` node at `path` to branch `index`.
    SelectBranch {
        #[serde(with = "pointer")]
        path: Vec<PathSegment>,
        index: usize,
    },
    AddProperty {
        #[serde(with = "pointer")]
        path: Vec<PathSegment>,
    },
    RenameProperty {
        #[serde(with = "pointer")]
        path: Vec<PathSegment>,
        from: String,
        to: String,
    },
    RemoveProperty {
        #[serde(with = "pointer")]
        path: Vec<PathSegment>,
        key: String,
    },
}

/// The single notification emitted per action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormChange {
    pub value: ChangeValue,
    #[serde(with = "pointer")]
    pub path: Vec<PathSegment>,
    /// The whole error schema, when the action rewrote it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_schema: Option<ErrorSchema>,
    /// Id of the field the change came from.
    pub id: String,
}

/// Receives every [`FormChange`].
pub type ChangeListener = Box<dyn FnMut(&FormChange) + Send>;

/// A schema-driven form.
pub struct Form {
    schema: Value,
    ui_schema: Value,
    data: Option<Value>,
    errors: ErrorSchema,
    registry: Registry,
    state: FieldState,
    listeners: Vec<ChangeListener>,
}

impl std::fmt::Debug for Form {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Form")
            .field("data", &self.data)
            .field("errors", &self.errors)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

/// A node located by data path.
struct Located {
    schema: Value,
    ui_schema: Value,
    id: FieldPathId,
}

impl Form {
    /// Build a form; the initial data is `data` layered over the schema's
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` if the root schema cannot be resolved.
    pub fn new(
        schema: Value,
        ui_schema: Value,
        data: Option<Value>,
        registry: Registry,
    ) -> Result<Self, ResolveError> {
        let data = registry
            .utils(&schema)
            .get_default_form_state(&schema, data.as_ref())?;
        Ok(Self {
            schema,
            ui_schema,
            data,
            errors: ErrorSchema::new(),
            registry,
            state: FieldState::default(),
            listeners: Vec::new(),
        })
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn ui_schema(&self) -> &Value {
        &self.ui_schema
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn errors(&self) -> &ErrorSchema {
        &self.errors
    }

    /// Replace the error schema, e.g. with one produced by an external validator.
    pub fn set_errors(&mut self, errors: ErrorSchema) {
        self.errors = errors;
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> &FormOptions {
        self.registry.options()
    }

    pub fn state(&self) -> &FieldState {
        &self.state
    }

    /// Id of the field at `path`.
    pub fn field_id(&self, path: &[PathSegment]) -> FieldPathId {
        let options = self.options();
        FieldPathId::from_path(&options.id_prefix, &options.id_separator, path)
    }

    /// Register a listener called once per applied action.
    pub fn on_change(&mut self, listener: impl FnMut(&FormChange) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Produce the render description tree for the current inputs.
    pub fn render(&mut self) -> RenderNode {
        let empty = Value::Null;
        let form_data = self.data.as_ref().unwrap_or(&empty);
        let ctx = Context::new(&self.registry, &self.schema, form_data, &self.errors);
        Renderer::new(ctx, &mut self.state).render_root(&self.ui_schema, self.data.as_ref())
    }

    /// Validate the data, storing the result as the form's error schema.
    ///
    /// # Errors
    ///
    /// `ValidateError::Invalid` listing every message when the data does not
    /// satisfy the schema.
    pub fn validate(&mut self) -> Result<(), ValidateError> {
        let data = self.data.clone().unwrap_or(Value::Null);
        self.errors = self.registry.validator().validate(&self.schema, &data)?;
        debug!(errors = self.errors.error_count(), "form validated");
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidateError::Invalid {
                errors: self.errors.to_schema_errors(),
            })
        }
    }

    /// Apply one action and notify listeners with the resulting change.
    ///
    /// # Errors
    ///
    /// Returns `FormError` when the path does not exist, the node has the
    /// wrong shape, or the field's options forbid the action. A failed
    /// action leaves the form untouched and notifies nobody.
    pub fn apply(&mut self, action: FormAction) -> Result<FormChange, FormError> {
        let change = match action {
            FormAction::SetValue { path, value } => self.set_value(path, value)?,
            FormAction::Array { path, operation } => self.edit_array(path, operation)?,
            FormAction::SelectBranch { path, index } => self.select_branch(path, index)?,
            FormAction::AddProperty { path } => self.add_property(path)?,
            FormAction::RenameProperty { path, from, to } => self.rename_property(path, &from, &to)?,
            FormAction::RemoveProperty { path, key } => self.remove_property(path, key)?,
        };
        debug!(id = %change.id, path = %path_to_pointer(&change.path), "form changed");
        for listener in &mut self.listeners {
            listener(&change);
        }
        Ok(change)
    }

    fn set_value(&mut self, path: Vec<PathSegment>, value: ChangeValue) -> Result<FormChange, FormError> {
        self.write(&path, value.clone())?;
        Ok(FormChange {
            value,
            id: self.field_id(&path).id,
            path,
            error_schema: None,
        })
    }

    fn edit_array(
        &mut self,
        path: Vec<PathSegment>,
        operation: ArrayOperation,
    ) -> Result<FormChange, FormError> {
        let pointer = path_to_pointer(&path);
        let located = self.locate(&path)?;
        if primary_type(&located.schema).as_deref() != Some("array") {
            return Err(FormError::NotAnArray { path: pointer });
        }
        let values = match self.value(&path) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => values.clone(),
            Some(_) => return Err(FormError::NotAnArray { path: pointer }),
        };

        let keyed = self.state.reconcile(&located.id.id, &values);
        let edit = {
            let empty = Value::Null;
            let form_data = self.data.as_ref().unwrap_or(&empty);
            let ctx = Context::new(&self.registry, &self.schema, form_data, &self.errors);
            let ui = UiOptions::from_ui_schema(&located.ui_schema);
            apply_operation(
                &ctx,
                &located.schema,
                &ui,
                &keyed,
                self.errors.at_path(&path),
                operation,
                &pointer,
            )?
        };

        self.state.follow_items(
            &located.id.id,
            &self.registry.options().id_separator,
            operation,
            values.len(),
        );
        self.state.set_keyed(&located.id.id, edit.keyed);
        self.write(&path, ChangeValue::Set(edit.value.clone()))?;
        self.errors.set_at_path(&path, edit.errors);
        Ok(FormChange {
            value: ChangeValue::Set(edit.value),
            path,
            error_schema: Some(self.errors.clone()),
            id: located.id.id,
        })
    }

    fn select_branch(&mut self, path: Vec<PathSegment>, index: usize) -> Result<FormChange, FormError> {
        let pointer = path_to_pointer(&path);
        let located = self.locate(&path)?;
        let (keyword, options) = CompositionKeyword::of(&located.schema)
            .ok_or_else(|| FormError::NotComposition { path: pointer.clone() })?;
        if index >= options.len() {
            return Err(FormError::IndexOutOfRange {
                path: pointer,
                index,
                len: options.len(),
            });
        }

        let current = self.value(&path).cloned();
        let utils = self.registry.utils(&self.schema);
        let previous = match self.state.selection(&located.id.id) {
            Some(previous) if previous < options.len() => previous,
            _ => utils.get_closest_matching_option(
                current.as_ref(),
                options,
                None,
                discriminator_field(&located.schema),
            )?,
        };
        let next = on_branch_change(
            utils.resolver(),
            &options[index],
            Some(&options[previous]),
            current.as_ref(),
        )?;

        let value = ChangeValue::from_option(next);
        self.state.set_selection(&located.id.id, index);
        self.write(&path, value.clone())?;
        Ok(FormChange {
            value,
            path,
            error_schema: None,
            id: located.id.suffixed(keyword.select_suffix()),
        })
    }

    fn add_property(&mut self, path: Vec<PathSegment>) -> Result<FormChange, FormError> {
        let located = self.locate(&path)?;
        let (_, object) = {
            let empty = Value::Null;
            let form_data = self.data.as_ref().unwrap_or(&empty);
            let ctx = Context::new(&self.registry, &self.schema, form_data, &self.errors);
            let ui = UiOptions::from_ui_schema(&located.ui_schema);
            add_property(&ctx, &located.schema, &ui, self.value(&path), &path_to_pointer(&path))?
        };
        let value = Value::Object(object);
        self.write(&path, ChangeValue::Set(value.clone()))?;
        Ok(FormChange {
            value: ChangeValue::Set(value),
            path,
            error_schema: None,
            id: located.id.id,
        })
    }

    fn rename_property(
        &mut self,
        path: Vec<PathSegment>,
        from: &str,
        to: &str,
    ) -> Result<FormChange, FormError> {
        let located = self.locate(&path)?;
        let (key, object) = {
            let empty = Value::Null;
            let form_data = self.data.as_ref().unwrap_or(&empty);
            let ctx = Context::new(&self.registry, &self.schema, form_data, &self.errors);
            let ui = UiOptions::from_ui_schema(&located.ui_schema);
            rename_property(&ctx, &ui, self.value(&path), from, to, &path_to_pointer(&path))?
        };
        let value = Value::Object(object);
        self.write(&path, ChangeValue::Set(value.clone()))?;

        let mut old_path = path.clone();
        old_path.push(PathSegment::Key(from.to_string()));
        let moved = self.errors.at_path(&old_path).cloned();
        let error_schema = match moved {
            Some(subtree) if key != from => {
                self.errors.set_at_path(&old_path, None);
                let mut new_path = path.clone();
                new_path.push(PathSegment::Key(key));
                self.errors.set_at_path(&new_path, Some(subtree));
                Some(self.errors.clone())
            }
            _ => None,
        };
        Ok(FormChange {
            value: ChangeValue::Set(value),
            path,
            error_schema,
            id: located.id.id,
        })
    }

    fn remove_property(&mut self, path: Vec<PathSegment>, key: String) -> Result<FormChange, FormError> {
        let pointer = path_to_pointer(&path);
        match self.value(&path) {
            Some(Value::Object(map)) if map.contains_key(&key) => {}
            Some(Value::Object(_)) | None => {
                return Err(FormError::UnknownPath {
                    path: format!("{}/{}", pointer, key),
                })
            }
            Some(_) => return Err(FormError::NotAnObject { path: pointer }),
        }
        let mut target = path;
        target.push(PathSegment::Key(key));
        self.write(&target, ChangeValue::Remove)?;
        self.errors.set_at_path(&target, None);
        Ok(FormChange {
            value: ChangeValue::Remove,
            id: self.field_id(&target).id,
            path: target,
            error_schema: Some(self.errors.clone()),
        })
    }

    fn value(&self, path: &[PathSegment]) -> Option<&Value> {
        self.data.as_ref().and_then(|data| value_at(data, path))
    }

    fn write(&mut self, path: &[PathSegment], change: ChangeValue) -> Result<(), FormError> {
        if path.is_empty() {
            self.data = change.as_value().cloned();
            return Ok(());
        }
        let root = self.data.get_or_insert_with(|| Value::Object(Map::new()));
        if apply_change(root, path, change) {
            Ok(())
        } else {
            Err(FormError::UnknownPath {
                path: path_to_pointer(path),
            })
        }
    }

    /// Find the resolved schema and uiSchema of the node at `path`.
    fn locate(&self, path: &[PathSegment]) -> Result<Located, FormError> {
        let utils = self.registry.utils(&self.schema);
        let options = self.options();
        let mut schema = self.schema.clone();
        let mut ui_schema = self.ui_schema.clone();
        let mut id = FieldPathId::root(&options.id_prefix, &options.id_separator);
        let mut data = self.data.as_ref();

        for segment in path {
            let resolved = utils.retrieve_schema(&schema, data)?;
            let resolved = with_selected_branch(&utils, &self.state, resolved, &id, data)?;
            let unknown = || FormError::UnknownPath {
                path: path_to_pointer(path),
            };
            (schema, ui_schema) = match segment {
                PathSegment::Key(key) => {
                    let child = resolved
                        .get("properties")
                        .and_then(|p| p.get(key))
                        .cloned()
                        .or_else(|| match resolved.get("additionalProperties") {
                            Some(Value::Bool(true)) => Some(Value::Object(Map::new())),
                            Some(additional @ Value::Object(_)) => Some(additional.clone()),
                            _ => None,
                        })
                        .ok_or_else(unknown)?;
                    let child_ui = if child.get(ADDITIONAL_PROPERTY_FLAG).is_some() {
                        ui_schema.get("additionalProperties").cloned().unwrap_or(Value::Null)
                    } else {
                        property_ui_schema(&ui_schema, key).clone()
                    };
                    (child, child_ui)
                }
                PathSegment::Index(index) => {
                    if primary_type(&resolved).as_deref() != Some("array") {
                        return Err(FormError::NotAnArray {
                            path: path_to_pointer(path),
                        });
                    }
                    let child = ItemLayout::of(&resolved)
                        .schema_for(*index)
                        .cloned()
                        .ok_or_else(unknown)?;
                    (child, item_ui_schema(&ui_schema, *index))
                }
            };
            id = id.child(segment.clone());
            data = data.and_then(|d| value_at(d, std::slice::from_ref(segment)));
        }

        Ok(Located {
            schema: utils.retrieve_schema(&schema, data)?,
            ui_schema,
            id,
        })
    }
}

/// Fold the currently selected `anyOf`/`oneOf` branch into `resolved`, so
/// paths can reach the branch's own properties.
fn with_selected_branch(
    utils: &SchemaUtils<'_>,
    state: &FieldState,
    resolved: Value,
    id: &FieldPathId,
    data: Option<&Value>,
) -> Result<Value, ResolveError> {
    let Some((keyword, options)) = CompositionKeyword::of(&resolved) else {
        return Ok(resolved);
    };
    let index = utils.get_closest_matching_option(
        data,
        options,
        state.selection(&id.id),
        discriminator_field(&resolved),
    )?;
    let option = utils.retrieve_schema(&options[index], data)?;
    let mut base = resolved.clone();
    if let Value::Object(map) = &mut base {
        map.remove(keyword.key());
    }
    Ok(merge_schemas(&base, &option).unwrap_or(option))
}

/// Serde adapter storing a path as a JSON Pointer string.
mod pointer {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::types::{path_to_pointer, pointer_to_path, PathSegment};

    pub fn serialize<S: Serializer>(path: &[PathSegment], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&path_to_pointer(path))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<PathSegment>, D::Error> {
        let pointer = String::deserialize(deserializer)?;
        Ok(pointer_to_path(&pointer))
    }
}
