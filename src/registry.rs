//! The capability bundle threaded through rendering.
//!
//! A [`Registry`] is built once per form: custom fields, per-item uiSchema
//! generators, the translation function, the validator and the form options.
//! It is only ever read while rendering. [`SchemaUtils`] binds it to a root
//! schema and exposes the schema utilities fields call, and [`Context`] is
//! the immutable bundle passed by reference through every recursive call.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::composition::{closest_matching_option, sanitize_data_for_new_schema};
use crate::defaults::get_default_form_state;
use crate::error::ResolveError;
use crate::error_schema::ErrorSchema;
use crate::options::FormOptions;
use crate::render::Field;
use crate::resolver::{is_select, primary_type, SchemaResolver};
use crate::translate::{english_strings, TranslateFn};
use crate::ui::UiOptions;
use crate::validator::{JsonSchemaValidator, SchemaValidator};

/// Error type returned by user-supplied callbacks.
pub type CallbackError = Box<dyn Error + Send + Sync>;

/// Builds the uiSchema of one array item from its index, its value and the
/// whole array.
pub type ItemUiGenerator =
    Arc<dyn Fn(usize, &Value, &Value) -> Result<Value, CallbackError> + Send + Sync>;

/// Read-only capabilities shared by every field of a form.
pub struct Registry {
    fields: BTreeMap<String, Arc<dyn Field>>,
    item_ui_generators: BTreeMap<String, ItemUiGenerator>,
    translate: TranslateFn,
    validator: Arc<dyn SchemaValidator>,
    options: FormOptions,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            item_ui_generators: BTreeMap::new(),
            translate: english_strings,
            validator: Arc::new(JsonSchemaValidator),
            options: FormOptions::default(),
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field(
                "item_ui_generators",
                &self.item_ui_generators.keys().collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom field, selectable by `ui:field` or by a schema `$id`.
    pub fn with_field(mut self, name: impl Into<String>, field: impl Field + 'static) -> Self {
        self.fields.insert(name.into(), Arc::new(field));
        self
    }

    /// Register a per-item uiSchema generator, selected with `ui:itemsGenerator`.
    pub fn with_item_ui_generator<F>(mut self, name: impl Into<String>, generator: F) -> Self
    where
        F: Fn(usize, &Value, &Value) -> Result<Value, CallbackError> + Send + Sync + 'static,
    {
        self.item_ui_generators
            .insert(name.into(), Arc::new(generator));
        self
    }

    pub fn with_translate(mut self, translate: TranslateFn) -> Self {
        self.translate = translate;
        self
    }

    pub fn with_validator(mut self, validator: impl SchemaValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn with_options(mut self, options: FormOptions) -> Self {
        self.options = options;
        self
    }

    pub fn field(&self, name: &str) -> Option<&dyn Field> {
        self.fields.get(name).map(|f| f.as_ref())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn item_ui_generator(&self, name: &str) -> Option<&ItemUiGenerator> {
        self.item_ui_generators.get(name)
    }

    pub fn translate(&self) -> TranslateFn {
        self.translate
    }

    pub fn validator(&self) -> &dyn SchemaValidator {
        self.validator.as_ref()
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    /// Schema utilities bound to `root`.
    pub fn utils<'a>(&'a self, root: &'a Value) -> SchemaUtils<'a> {
        SchemaUtils {
            resolver: SchemaResolver::new(root, self.validator()),
            options: &self.options,
        }
    }
}

/// Schema utilities bound to one root schema.
#[derive(Clone, Copy)]
pub struct SchemaUtils<'a> {
    resolver: SchemaResolver<'a>,
    options: &'a FormOptions,
}

impl<'a> SchemaUtils<'a> {
    pub fn resolver(&self) -> &SchemaResolver<'a> {
        &self.resolver
    }

    pub fn root_schema(&self) -> &'a Value {
        self.resolver.root()
    }

    pub fn retrieve_schema(&self, schema: &Value, data: Option<&Value>) -> Result<Value, ResolveError> {
        self.resolver.resolve(schema, data)
    }

    pub fn get_default_form_state(
        &self,
        schema: &Value,
        data: Option<&Value>,
    ) -> Result<Option<Value>, ResolveError> {
        get_default_form_state(&self.resolver, schema, data, &self.options.defaults)
    }

    /// An array of unique items drawn from a fixed set of choices.
    pub fn is_multi_select(&self, schema: &Value) -> bool {
        if schema.get("uniqueItems").and_then(Value::as_bool) != Some(true) {
            return false;
        }
        match schema.get("items") {
            Some(items) if items.is_object() => self
                .resolver
                .resolve(items, None)
                .is_ok_and(|items| is_select(&items)),
            _ => false,
        }
    }

    /// An array of uploaded files: a `files` widget, or string items in
    /// `data-url` format.
    pub fn is_files_array(&self, schema: &Value, ui_schema: &Value) -> bool {
        if ui_schema.get("ui:widget").and_then(Value::as_str) == Some("files") {
            return true;
        }
        match schema.get("items") {
            Some(items) if items.is_object() => {
                self.resolver.resolve(items, None).is_ok_and(|items| {
                    items.get("type").and_then(Value::as_str) == Some("string")
                        && items.get("format").and_then(Value::as_str) == Some("data-url")
                })
            }
            _ => false,
        }
    }

    pub fn get_closest_matching_option(
        &self,
        data: Option<&Value>,
        options: &[Value],
        selected: Option<usize>,
        discriminator: Option<&str>,
    ) -> Result<usize, ResolveError> {
        closest_matching_option(&self.resolver, data, options, selected, discriminator)
    }

    pub fn sanitize_data_for_new_schema(
        &self,
        new_option: &Value,
        old_option: Option<&Value>,
        data: Option<&Value>,
    ) -> Result<Option<Value>, ResolveError> {
        sanitize_data_for_new_schema(&self.resolver, new_option, old_option, data)
    }

    /// Whether a field renders its own label.
    ///
    /// Objects never do; arrays only as a multi-select, a file list or a
    /// custom widget; booleans only with an explicit widget; nothing with
    /// a custom `ui:field`.
    pub fn get_display_label(&self, schema: &Value, ui_schema: &Value) -> bool {
        let ui = UiOptions::from_ui_schema(ui_schema);
        let mut display = ui.label(&self.options.global_ui);
        match primary_type(schema).as_deref() {
            Some("array") => {
                let custom_widget = ui.widget.as_deref().is_some_and(|w| w != "hidden");
                display = display
                    && (self.is_multi_select(schema)
                        || self.is_files_array(schema, ui_schema)
                        || custom_widget);
            }
            Some("object") => display = false,
            Some("boolean") if ui.widget.is_none() => display = false,
            _ => {}
        }
        display && ui.field.is_none()
    }
}

/// Everything a field needs to render, passed by reference through every
/// recursive call.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub registry: &'a Registry,
    pub utils: SchemaUtils<'a>,
    /// The full form data, as seen by item uiSchema generators.
    pub form_data: &'a Value,
    pub error_schema: &'a ErrorSchema,
}

impl<'a> Context<'a> {
    pub fn new(
        registry: &'a Registry,
        root_schema: &'a Value,
        form_data: &'a Value,
        error_schema: &'a ErrorSchema,
    ) -> Self {
        Self {
            registry,
            utils: registry.utils(root_schema),
            form_data,
            error_schema,
        }
    }

    pub fn options(&self) -> &'a FormOptions {
        self.registry.options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn multi_select_needs_unique_enum_items() {
        let root = json!({});
        let registry = Registry::new();
        let utils = registry.utils(&root);
        let choices = json!({
            "type": "array",
            "uniqueItems": true,
            "items": { "type": "string", "enum": ["a", "b"] }
        });
        assert!(utils.is_multi_select(&choices));

        let mut not_unique = choices.clone();
        not_unique["uniqueItems"] = json!(false);
        assert!(!utils.is_multi_select(&not_unique));
        assert!(!utils.is_multi_select(&json!({ "type": "array", "uniqueItems": true, "items": { "type": "string" } })));
    }

    #[test]
    fn multi_select_through_ref() {
        let root = json!({
            "definitions": { "choice": { "type": "string", "enum": ["x"] } }
        });
        let registry = Registry::new();
        let schema = json!({
            "type": "array",
            "uniqueItems": true,
            "items": { "$ref": "#/definitions/choice" }
        });
        assert!(registry.utils(&root).is_multi_select(&schema));
    }

    #[test]
    fn files_array_by_format_or_widget() {
        let root = json!({});
        let registry = Registry::new();
        let utils = registry.utils(&root);
        let files = json!({ "type": "array", "items": { "type": "string", "format": "data-url" } });
        assert!(utils.is_files_array(&files, &json!({})));

        let plain = json!({ "type": "array", "items": { "type": "string" } });
        assert!(!utils.is_files_array(&plain, &json!({})));
        assert!(utils.is_files_array(&plain, &json!({ "ui:widget": "files" })));
    }

    #[test]
    fn display_label_rules() {
        let root = json!({});
        let registry = Registry::new();
        let utils = registry.utils(&root);
        let none = json!({});

        assert!(utils.get_display_label(&json!({ "type": "string" }), &none));
        assert!(!utils.get_display_label(&json!({ "type": "object" }), &none));
        assert!(!utils.get_display_label(&json!({ "type": "boolean" }), &none));
        assert!(utils.get_display_label(&json!({ "type": "boolean" }), &json!({ "ui:widget": "select" })));
        assert!(!utils.get_display_label(&json!({ "type": "array", "items": { "type": "string" } }), &none));
        assert!(!utils.get_display_label(&json!({ "type": "string" }), &json!({ "ui:label": false })));
        assert!(!utils.get_display_label(&json!({ "type": "string" }), &json!({ "ui:field": "x" })));
    }

    #[test]
    fn global_label_option() {
        let root = json!({});
        let mut options = FormOptions::default();
        options.global_ui.label = false;
        let registry = Registry::new().with_options(options);
        assert!(!registry.utils(&root).get_display_label(&json!({ "type": "string" }), &json!({})));
    }

    #[test]
    fn generators_are_looked_up_by_name() {
        let registry = Registry::new().with_item_ui_generator("rows", |index, _, _| {
            Ok(json!({ "ui:title": format!("Row {}", index) }))
        });
        let generator = registry.item_ui_generator("rows").unwrap();
        assert_eq!(
            generator(2, &json!(null), &json!([])).unwrap(),
            json!({ "ui:title": "Row 2" })
        );
        assert!(registry.item_ui_generator("missing").is_none());
    }
}
