//! Form-wide configuration.

use serde::{Deserialize, Serialize};

/// Whether arrays with `minItems` are padded with default items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrayMinItems {
    #[default]
    Populate,
    Never,
}

/// Which object properties receive their schema defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmptyObjectFields {
    #[default]
    PopulateAllDefaults,
    PopulateRequiredDefaults,
    SkipDefaults,
}

/// How default values are computed for new or empty data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultsBehavior {
    pub array_min_items: ArrayMinItems,
    pub empty_object_fields: EmptyObjectFields,
}

/// UI options applied to every field unless its uiSchema overrides them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalUiOptions {
    pub label: bool,
    pub addable: bool,
    pub removable: bool,
    pub orderable: bool,
    pub copyable: bool,
    pub disabled: bool,
    pub readonly: bool,
}

impl Default for GlobalUiOptions {
    fn default() -> Self {
        Self {
            label: true,
            addable: true,
            removable: true,
            orderable: true,
            copyable: false,
            disabled: false,
            readonly: false,
        }
    }
}

/// Options for building a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormOptions {
    /// First segment of every generated field id.
    pub id_prefix: String,
    /// Joins id segments, e.g. `root_list_0`.
    pub id_separator: String,
    /// Joins a duplicated additional-property key and its counter.
    pub duplicate_key_suffix_separator: String,
    pub defaults: DefaultsBehavior,
    pub global_ui: GlobalUiOptions,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            id_prefix: "root".to_string(),
            id_separator: "_".to_string(),
            duplicate_key_suffix_separator: "-".to_string(),
            defaults: DefaultsBehavior::default(),
            global_ui: GlobalUiOptions::default(),
        }
    }
}

impl FormOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the id prefix and separator.
    pub fn ids(mut self, prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self.id_separator = separator.into();
        self
    }

    pub fn duplicate_key_suffix_separator(mut self, separator: impl Into<String>) -> Self {
        self.duplicate_key_suffix_separator = separator.into();
        self
    }

    pub fn defaults(mut self, defaults: DefaultsBehavior) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn global_ui(mut self, global_ui: GlobalUiOptions) -> Self {
        self.global_ui = global_ui;
        self
    }
}
