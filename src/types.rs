//! Core types shared by the resolver, the field tree and the form pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field id suffix used when a `oneOf` selector changes branch.
pub const ONE_OF_SELECT: &str = "__oneof_select";

/// Field id suffix used when an `anyOf` selector changes branch.
pub const ANY_OF_SELECT: &str = "__anyof_select";

/// Marker set on properties stubbed in from `additionalProperties`.
pub const ADDITIONAL_PROPERTY_FLAG: &str = "__additional_property";

/// Key holding the error messages of an error schema node.
pub const ERRORS_KEY: &str = "__errors";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Guess the schema type of a data value. Integers report `integer`.
pub fn guess_type(value: &Value) -> &'static str {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        other => json_type_name(other),
    }
}

/// One step in a data path: an object property or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Key(k) => write!(f, "{}", k),
        }
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

/// Render a path as a JSON Pointer (RFC 6901).
pub fn path_to_pointer(path: &[PathSegment]) -> String {
    let mut pointer = String::new();
    for segment in path {
        pointer.push('/');
        pointer.push_str(&segment.to_string().replace('~', "~0").replace('/', "~1"));
    }
    pointer
}

/// Parse a JSON Pointer into path segments.
///
/// Segments made only of digits are treated as array indices.
pub fn pointer_to_path(pointer: &str) -> Vec<PathSegment> {
    let trimmed = pointer.trim_start_matches('#');
    if trimmed.is_empty() || trimmed == "/" {
        return Vec::new();
    }
    trimmed
        .trim_start_matches('/')
        .split('/')
        .map(|part| {
            let key = part.replace("~1", "/").replace("~0", "~");
            match key.parse::<usize>() {
                Ok(i) if !key.is_empty() && key.chars().all(|c| c.is_ascii_digit()) => {
                    PathSegment::Index(i)
                }
                _ => PathSegment::Key(key),
            }
        })
        .collect()
}

/// Position of a node within the overall data tree.
///
/// The id is derived deterministically from the path: the id prefix followed
/// by every segment, joined by the id separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FieldPathId {
    #[serde(rename = "$id")]
    pub id: String,
    pub path: Vec<PathSegment>,
    #[serde(skip)]
    separator: String,
}

impl FieldPathId {
    /// The root of a form.
    pub fn root(prefix: &str, separator: &str) -> Self {
        Self {
            id: prefix.to_string(),
            path: Vec::new(),
            separator: separator.to_string(),
        }
    }

    /// Build the id for an arbitrary path below the root.
    pub fn from_path(prefix: &str, separator: &str, path: &[PathSegment]) -> Self {
        path.iter().fold(Self::root(prefix, separator), |id, seg| {
            id.child(seg.clone())
        })
    }

    /// Child id: parent path plus one segment.
    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let segment = segment.into();
        let mut path = self.path.clone();
        let id = format!("{}{}{}", self.id, self.separator, segment);
        path.push(segment);
        Self {
            id,
            path,
            separator: self.separator.clone(),
        }
    }

    /// Sibling id with a suffix, e.g. `root_pet__oneof_select`.
    pub fn suffixed(&self, suffix: &str) -> String {
        format!("{}{}", self.id, suffix)
    }

    pub fn pointer(&self) -> String {
        path_to_pointer(&self.path)
    }
}

/// A change emitted for one field.
///
/// `Remove` deletes the key from its parent object; it is never encoded as
/// `null`, which stays a legitimate value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ChangeValue {
    Set(Value),
    Remove,
}

impl ChangeValue {
    pub fn from_option(value: Option<Value>) -> Self {
        match value {
            Some(v) => ChangeValue::Set(v),
            None => ChangeValue::Remove,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ChangeValue::Set(v) => Some(v),
            ChangeValue::Remove => None,
        }
    }
}

/// Read the value at `path`, if present.
pub fn value_at<'a>(root: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(root, |current, segment| match segment {
        PathSegment::Index(i) => current.as_array().and_then(|arr| arr.get(*i)),
        PathSegment::Key(k) => current.get(k),
    })
}

/// Apply a change at `path`, creating intermediate objects as needed.
///
/// Returns false when an intermediate node has the wrong shape.
pub fn apply_change(root: &mut Value, path: &[PathSegment], change: ChangeValue) -> bool {
    let Some((last, parents)) = path.split_last() else {
        *root = match change {
            ChangeValue::Set(v) => v,
            ChangeValue::Remove => Value::Null,
        };
        return true;
    };

    let mut current = root;
    for segment in parents {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        let next = match segment {
            PathSegment::Index(i) => current.as_array_mut().and_then(|arr| arr.get_mut(*i)),
            PathSegment::Key(k) => current
                .as_object_mut()
                .map(|obj| obj.entry(k.clone()).or_insert(Value::Null)),
        };
        match next {
            Some(next) => current = next,
            None => return false,
        }
    }

    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match (current, last, change) {
        (Value::Object(obj), PathSegment::Key(k), ChangeValue::Set(v)) => {
            obj.insert(k.clone(), v);
            true
        }
        (Value::Object(obj), PathSegment::Key(k), ChangeValue::Remove) => {
            obj.shift_remove(k);
            true
        }
        (Value::Array(arr), PathSegment::Index(i), ChangeValue::Set(v)) if *i < arr.len() => {
            arr[*i] = v;
            true
        }
        (Value::Array(arr), PathSegment::Index(i), ChangeValue::Set(v)) if *i == arr.len() => {
            arr.push(v);
            true
        }
        (Value::Array(arr), PathSegment::Index(i), ChangeValue::Remove) if *i < arr.len() => {
            arr.remove(*i);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn child_id_extends_parent() {
        let root = FieldPathId::root("root", "_");
        let list = root.child("list");
        let item = list.child(2);

        assert_eq!(list.id, "root_list");
        assert_eq!(item.id, "root_list_2");
        assert_eq!(
            item.path,
            vec![PathSegment::Key("list".into()), PathSegment::Index(2)]
        );
    }

    #[test]
    fn ids_are_derived_from_path() {
        let path = vec![PathSegment::Key("a".into()), PathSegment::Index(0)];
        let id = FieldPathId::from_path("form", ".", &path);
        assert_eq!(id.id, "form.a.0");
        assert_eq!(id, FieldPathId::root("form", ".").child("a").child(0));
    }

    #[test]
    fn pointer_round_trip_escapes() {
        let path = vec![PathSegment::Key("a/b".into()), PathSegment::Index(3)];
        let pointer = path_to_pointer(&path);
        assert_eq!(pointer, "/a~1b/3");
        assert_eq!(pointer_to_path(&pointer), path);
        assert!(pointer_to_path("").is_empty());
    }

    #[test]
    fn value_at_walks_objects_and_arrays() {
        let data = json!({ "list": [{ "text": "x" }] });
        let path = pointer_to_path("/list/0/text");
        assert_eq!(value_at(&data, &path), Some(&json!("x")));
        assert_eq!(value_at(&data, &pointer_to_path("/list/4")), None);
    }

    #[test]
    fn apply_change_sets_and_removes() {
        let mut data = json!({ "a": { "b": 1 } });
        assert!(apply_change(
            &mut data,
            &pointer_to_path("/a/c"),
            ChangeValue::Set(json!(null))
        ));
        assert_eq!(data, json!({ "a": { "b": 1, "c": null } }));

        assert!(apply_change(
            &mut data,
            &pointer_to_path("/a/b"),
            ChangeValue::Remove
        ));
        assert_eq!(data, json!({ "a": { "c": null } }));
    }

    #[test]
    fn apply_change_creates_missing_objects() {
        let mut data = Value::Null;
        assert!(apply_change(
            &mut data,
            &pointer_to_path("/x/y"),
            ChangeValue::Set(json!(true))
        ));
        assert_eq!(data, json!({ "x": { "y": true } }));
    }

    #[test]
    fn guess_type_distinguishes_integers() {
        assert_eq!(guess_type(&json!(3)), "integer");
        assert_eq!(guess_type(&json!(3.5)), "number");
        assert_eq!(guess_type(&json!("a")), "string");
    }
}
