//! Schema Form
//!
//! The toolkit-independent core of a JSON Schema driven form: schema
//! resolution, field dispatch, `anyOf`/`oneOf` branch selection, stable
//! identity for array items, and error-schema remapping after structural
//! array edits.
//!
//! A [`Form`] takes a schema, a uiSchema and optional data, and produces a
//! [`RenderNode`] description tree that a UI layer can mount. User actions go
//! through [`Form::apply`], which emits exactly one [`FormChange`].
//!
//! # Example
//!
//! ```
//! use schema_form::{ArrayOperation, Form, FormAction, PathSegment, Registry};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "type": "object",
//!     "properties": {
//!         "tags": { "type": "array", "items": { "type": "string" } }
//!     }
//! });
//! let data = json!({ "tags": ["a", "b"] });
//!
//! let mut form = Form::new(schema, json!({}), Some(data), Registry::new()).unwrap();
//! let tree = form.render();
//! assert!(tree.find("ArrayField", "root_tags").is_some());
//!
//! let change = form
//!     .apply(FormAction::Array {
//!         path: vec![PathSegment::from("tags")],
//!         operation: ArrayOperation::Move { from: 1, to: 0 },
//!     })
//!     .unwrap();
//! assert_eq!(change.id, "root_tags");
//! assert_eq!(form.data().unwrap()["tags"], json!(["b", "a"]));
//! ```
//!
//! # Field dispatch
//!
//! | Input | Field kind |
//! |-------|------------|
//! | `ui:field` naming a built-in or registered field | that field |
//! | schema `$id` registered as a custom field | that field |
//! | `type` (first entry of a type array) | `ArrayField`, `BooleanField`, `NumberField`, `ObjectField`, `StringField`, `NullField` |
//! | no `type`, `anyOf`/`oneOf` present | `MultiSchemaField` |
//! | anything else | `FallbackField` |
//!
//! # Error schema remapping
//!
//! | Operation | Errors at index `k` move to |
//! |-----------|-----------------------------|
//! | insert at `i` | `k + 1` for `k >= i` |
//! | remove `i` | dropped for `k == i`, `k - 1` for `k > i` |
//! | copy `i` | `k + 1` for `k > i`; the copy starts clean |
//! | move `i` to `j` | `i` and `j` swap |

mod array;
mod composition;
mod defaults;
mod dispatch;
mod error;
mod error_schema;
mod form;
mod keyed;
mod lint;
mod loader;
mod merge;
mod object;
mod options;
mod registry;
mod remap;
mod render;
mod resolver;
mod translate;
mod types;
mod ui;
mod validator;

pub use array::{apply_operation, item_ui, ArrayCapabilities, ArrayEdit, ItemControls, ItemLayout};
pub use composition::{
    closest_matching_option, discriminator_field, on_branch_change, option_label,
    option_matching_discriminator, sanitize_data_for_new_schema, CompositionKeyword,
};
pub use defaults::{get_default_form_state, new_item_value, shallow_defaults};
pub use dispatch::{dispatch, FieldKind};
pub use error::{FormError, ResolveError, SchemaError, ValidateError};
pub use error_schema::ErrorSchema;
pub use form::{ChangeListener, Form, FormAction, FormChange};
pub use keyed::{fingerprint, generate_key, reconcile, KeyedItem, KeyedList};
pub use lint::{lint, lint_files, Diagnostic, LintResult, LintStatus, Severity};
pub use loader::{is_url, load_json, load_json_auto, load_json_str, navigate_fragment};
pub use merge::{merge_schemas, MergeConflict};
pub use object::{add_property, available_key, can_expand, default_value_for_type, rename_property};
pub use options::{ArrayMinItems, DefaultsBehavior, EmptyObjectFields, FormOptions, GlobalUiOptions};
pub use registry::{CallbackError, Context, ItemUiGenerator, Registry, SchemaUtils};
pub use remap::{remap, ArrayOperation};
pub use render::{Field, FieldInput, FieldProps, FieldState, RenderNode, Renderer};
pub use resolver::{is_select, primary_type, resolve, schema_type, SchemaResolver};
pub use translate::{english_strings, replace_params, TranslatableString, TranslateFn};
pub use types::{
    apply_change, guess_type, json_type_name, path_to_pointer, pointer_to_path, value_at,
    ChangeValue, FieldPathId, PathSegment, ADDITIONAL_PROPERTY_FLAG, ANY_OF_SELECT, ERRORS_KEY,
    ONE_OF_SELECT,
};
pub use ui::{item_ui_schema, order_properties, property_ui_schema, UiField, UiOptions};
pub use validator::{validate_form_data, JsonSchemaValidator, SchemaValidator};

#[cfg(feature = "remote")]
pub use loader::load_json_url;
