//! The sparse error tree exchanged with the validator.
//!
//! Wire shape: every node is an object whose `__errors` key holds the
//! messages for that node and whose other keys name properties or array
//! positions:
//!
//! ```json
//! { "0": { "text": { "__errors": ["must have required property 'text'"] } } }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ResolveError, SchemaError};
use crate::types::{json_type_name, path_to_pointer, PathSegment, ERRORS_KEY};

/// One node of an error schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ErrorSchema {
    errors: Option<Vec<String>>,
    children: BTreeMap<String, ErrorSchema>,
}

impl ErrorSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages attached directly to this node.
    pub fn errors(&self) -> &[String] {
        self.errors.as_deref().unwrap_or_default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.get_or_insert_with(Vec::new).push(message.into());
    }

    pub fn child(&self, key: &str) -> Option<&ErrorSchema> {
        self.children.get(key)
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &ErrorSchema)> {
        self.children.iter()
    }

    pub fn insert_child(&mut self, key: impl Into<String>, child: ErrorSchema) {
        self.children.insert(key.into(), child);
    }

    pub fn remove_child(&mut self, key: &str) -> Option<ErrorSchema> {
        self.children.remove(key)
    }

    /// Take every child out, leaving only this node's own messages.
    pub(crate) fn take_children(&mut self) -> BTreeMap<String, ErrorSchema> {
        std::mem::take(&mut self.children)
    }

    /// True when the node holds no messages anywhere in its subtree.
    pub fn is_empty(&self) -> bool {
        self.errors().is_empty() && self.children.values().all(ErrorSchema::is_empty)
    }

    /// Total number of messages in the subtree.
    pub fn error_count(&self) -> usize {
        self.errors().len()
            + self
                .children
                .values()
                .map(ErrorSchema::error_count)
                .sum::<usize>()
    }

    pub fn at_path(&self, path: &[PathSegment]) -> Option<&ErrorSchema> {
        path.iter()
            .try_fold(self, |node, segment| node.child(&segment.to_string()))
    }

    fn at_path_mut(&mut self, path: &[PathSegment]) -> &mut ErrorSchema {
        path.iter().fold(self, |node, segment| {
            node.children.entry(segment.to_string()).or_default()
        })
    }

    /// Append a message at `path`, creating intermediate nodes.
    pub fn add_error_at(&mut self, path: &[PathSegment], message: impl Into<String>) {
        self.at_path_mut(path).add_error(message);
    }

    /// Replace (or clear, with `None`) the subtree at `path`.
    pub fn set_at_path(&mut self, path: &[PathSegment], subtree: Option<ErrorSchema>) {
        let Some((last, parents)) = path.split_last() else {
            *self = subtree.unwrap_or_default();
            return;
        };
        match subtree {
            Some(node) => {
                self.at_path_mut(parents)
                    .children
                    .insert(last.to_string(), node);
            }
            None => {
                let parent = parents
                    .iter()
                    .try_fold(self, |node, segment| node.children.get_mut(&segment.to_string()));
                if let Some(parent) = parent {
                    parent.children.remove(&last.to_string());
                }
            }
        }
    }

    /// Flatten the tree into pointer-addressed messages.
    pub fn to_schema_errors(&self) -> Vec<SchemaError> {
        let mut out = Vec::new();
        self.collect_errors(&mut Vec::new(), &mut out);
        out
    }

    fn collect_errors(&self, path: &mut Vec<PathSegment>, out: &mut Vec<SchemaError>) {
        for message in self.errors() {
            out.push(SchemaError {
                path: path_to_pointer(path),
                message: message.clone(),
            });
        }
        for (key, child) in &self.children {
            path.push(PathSegment::Key(key.clone()));
            child.collect_errors(path, out);
            path.pop();
        }
    }
}

impl TryFrom<Value> for ErrorSchema {
    type Error = ResolveError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(map) = value else {
            return Err(ResolveError::InvalidSchema {
                message: format!(
                    "error schema node must be an object, got {}",
                    json_type_name(&value)
                ),
            });
        };

        let mut node = ErrorSchema::new();
        for (key, child) in map {
            if key == ERRORS_KEY {
                let Value::Array(messages) = child else {
                    return Err(ResolveError::InvalidSchema {
                        message: format!("{} must be an array of strings", ERRORS_KEY),
                    });
                };
                let messages = messages
                    .into_iter()
                    .map(|m| match m {
                        Value::String(s) => Ok(s),
                        other => Err(ResolveError::InvalidSchema {
                            message: format!(
                                "{} entries must be strings, got {}",
                                ERRORS_KEY,
                                json_type_name(&other)
                            ),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                node.errors = Some(messages);
            } else {
                node.children.insert(key, ErrorSchema::try_from(child)?);
            }
        }
        Ok(node)
    }
}

impl From<ErrorSchema> for Value {
    fn from(node: ErrorSchema) -> Self {
        let mut map = Map::new();
        if let Some(errors) = node.errors {
            map.insert(
                ERRORS_KEY.to_string(),
                Value::Array(errors.into_iter().map(Value::String).collect()),
            );
        }
        for (key, child) in node.children {
            map.insert(key, Value::from(child));
        }
        Value::Object(map)
    }
}
