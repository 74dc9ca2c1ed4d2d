//! User-facing strings produced by the core.

/// Every string the core may need to show or use as a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslatableString {
    /// Value given to a freshly inserted string item.
    NewStringDefault,
    /// Title of an array insert control.
    AddItemButton,
    /// Title of a remove control.
    RemoveButton,
    /// Title of a copy control.
    CopyButton,
    MoveUpButton,
    MoveDownButton,
    /// Label of an anyOf/oneOf choice without a title. `%1` is the 1-based index.
    OptionPrefix,
    /// Title of a composition selector.
    SelectLabel,
    /// Key used for a new additional property.
    NewKeyDefault,
    /// `%1` is the schema type that has no field.
    UnsupportedFieldWithReason,
}

/// Produces the text for a string, substituting `%1`, `%2`, ... with params.
pub type TranslateFn = fn(TranslatableString, &[&str]) -> String;

/// Default English strings.
pub fn english_strings(string: TranslatableString, params: &[&str]) -> String {
    let template = match string {
        TranslatableString::NewStringDefault => "",
        TranslatableString::AddItemButton => "Add Item",
        TranslatableString::RemoveButton => "Remove",
        TranslatableString::CopyButton => "Copy",
        TranslatableString::MoveUpButton => "Move up",
        TranslatableString::MoveDownButton => "Move down",
        TranslatableString::OptionPrefix => "Option %1",
        TranslatableString::SelectLabel => "Select an option",
        TranslatableString::NewKeyDefault => "newKey",
        TranslatableString::UnsupportedFieldWithReason => "Unsupported field schema: %1",
    };
    replace_params(template, params)
}

/// Replace `%1`..`%n` placeholders, highest index first so `%1` never eats `%10`.
pub fn replace_params(template: &str, params: &[&str]) -> String {
    params
        .iter()
        .enumerate()
        .rev()
        .fold(template.to_string(), |text, (i, param)| {
            text.replace(&format!("%{}", i + 1), param)
        })
}
