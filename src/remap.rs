//! Re-keying an array's error schema after a structural edit.
//!
//! Numeric keys of an error schema name array positions in the current
//! layout, so every insert, removal, copy or move has to move the errors
//! along with the items they belong to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error_schema::ErrorSchema;

/// A structural edit of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ArrayOperation {
    /// Insert a new item at `index`; `None` appends.
    Insert { index: Option<usize> },
    Remove { index: usize },
    /// Copy the item at `index` into `index + 1`.
    Duplicate { index: usize },
    Move { from: usize, to: usize },
}

impl ArrayOperation {
    /// Parse the CLI form: `insert`, `insert:1`, `remove:1`, `copy:1`, `move:1:0`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(':');
        let name = parts.next()?;
        let numbers: Vec<usize> = parts.map(str::parse::<usize>).collect::<Result<_, _>>().ok()?;
        match (name, numbers.as_slice()) {
            ("insert", []) => Some(ArrayOperation::Insert { index: None }),
            ("insert", [i]) => Some(ArrayOperation::Insert { index: Some(*i) }),
            ("remove", [i]) => Some(ArrayOperation::Remove { index: *i }),
            ("copy" | "duplicate", [i]) => Some(ArrayOperation::Duplicate { index: *i }),
            ("move", [from, to]) => Some(ArrayOperation::Move {
                from: *from,
                to: *to,
            }),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArrayOperation::Insert { .. } => "insert",
            ArrayOperation::Remove { .. } => "remove",
            ArrayOperation::Duplicate { .. } => "copy",
            ArrayOperation::Move { .. } => "move",
        }
    }

    /// New position of the errors found at `idx`, or `None` when they are dropped.
    ///
    /// `len` is the array length before the edit; it only matters for an
    /// insert without an index.
    pub fn remap_index(&self, idx: usize, len: usize) -> Option<usize> {
        match *self {
            ArrayOperation::Insert { index } => {
                let at = index.unwrap_or(len);
                Some(if idx < at { idx } else { idx + 1 })
            }
            ArrayOperation::Remove { index } => match idx {
                i if i < index => Some(i),
                i if i == index => None,
                i => Some(i - 1),
            },
            ArrayOperation::Duplicate { index } => Some(if idx <= index { idx } else { idx + 1 }),
            // Pairwise swap: only the two named positions trade places.
            ArrayOperation::Move { from, to } => Some(if idx == from {
                to
            } else if idx == to {
                from
            } else {
                idx
            }),
        }
    }

    /// New position of the item at `idx`, or `None` when it is removed.
    ///
    /// Same as [`remap_index`](Self::remap_index) except for a move, which
    /// shifts the items between the two positions by one.
    pub fn item_index(&self, idx: usize, len: usize) -> Option<usize> {
        match *self {
            ArrayOperation::Move { from, to } => Some(if idx == from {
                to
            } else if from < to && idx > from && idx <= to {
                idx - 1
            } else if to < from && idx >= to && idx < from {
                idx + 1
            } else {
                idx
            }),
            _ => self.remap_index(idx, len),
        }
    }
}

/// Produce the error schema of an array after `operation`.
///
/// Only top-level numeric keys move; their nested content is carried over
/// untouched, and every other key (such as the array's own `__errors`) is
/// left where it is.
pub fn remap(previous: &ErrorSchema, operation: ArrayOperation, len: usize) -> ErrorSchema {
    let mut next = previous.clone();
    let children = next.take_children();

    let mut moved: BTreeMap<usize, ErrorSchema> = BTreeMap::new();
    for (key, child) in children {
        match parse_index(&key) {
            Some(idx) => {
                if let Some(new_idx) = operation.remap_index(idx, len) {
                    moved.insert(new_idx, child);
                }
            }
            None => next.insert_child(key, child),
        }
    }
    for (idx, child) in moved {
        next.insert_child(idx.to_string(), child);
    }
    next
}

fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}
