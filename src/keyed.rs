//! Stable identity for array items.
//!
//! Every item of an array field is paired with an opaque key that survives
//! edits to the item's contents and travels with the item when it moves.
//! Renderers use the key to keep per-row state across structural edits.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// An array element paired with its identity key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyedItem {
    pub key: String,
    pub value: Value,
}

impl KeyedItem {
    /// A new item with a freshly generated key.
    pub fn fresh(value: Value) -> Self {
        Self {
            key: generate_key(),
            value,
        }
    }
}

/// Generate a unique opaque key.
pub fn generate_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Deterministic digest of a value's full structural contents.
///
/// `serde_json` writes maps in insertion order, so two values with the same
/// keys in a different order fingerprint differently. That only costs a
/// positional re-key, never a wrong key.
pub fn fingerprint(values: &[Value]) -> String {
    let mut hasher = Sha256::new();
    for value in values {
        hasher.update(value.to_string().as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// The keyed items of one array field plus the fingerprint they were built from.
///
/// Cloning is cheap and clones share the item list, so callers can tell an
/// unchanged list apart with [`KeyedList::same_items`].
#[derive(Debug, Clone)]
pub struct KeyedList {
    fingerprint: String,
    items: Arc<Vec<KeyedItem>>,
}

impl Default for KeyedList {
    fn default() -> Self {
        Self::from_items(Vec::new())
    }
}

impl KeyedList {
    fn from_items(items: Vec<KeyedItem>) -> Self {
        let values: Vec<Value> = items.iter().map(|item| item.value.clone()).collect();
        Self {
            fingerprint: fingerprint(&values),
            items: Arc::new(items),
        }
    }

    /// Key every value freshly.
    pub fn fresh(values: &[Value]) -> Self {
        Self::from_items(values.iter().cloned().map(KeyedItem::fresh).collect())
    }

    pub fn items(&self) -> &[KeyedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn keys(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.key.as_str()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.items.iter().map(|item| item.value.clone()).collect()
    }

    /// True when both lists share the same item allocation.
    pub fn same_items(&self, other: &KeyedList) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }

    /// Insert `value` with a fresh key at `index` (end when `None`).
    ///
    /// An index past the end appends.
    pub fn insert(&self, index: Option<usize>, value: Value) -> Self {
        let mut items = self.items.as_ref().clone();
        let at = index.unwrap_or(items.len()).min(items.len());
        items.insert(at, KeyedItem::fresh(value));
        Self::from_items(items)
    }

    /// Copy the item at `index` into a fresh key right after it.
    ///
    /// Returns `None` if `index` is out of range.
    pub fn duplicate(&self, index: usize) -> Option<Self> {
        let copy = self.items.get(index)?.value.clone();
        let mut items = self.items.as_ref().clone();
        items.insert(index + 1, KeyedItem::fresh(copy));
        Some(Self::from_items(items))
    }

    /// Remove the item at `index`; the others keep their keys.
    ///
    /// Returns `None` if `index` is out of range.
    pub fn remove(&self, index: usize) -> Option<Self> {
        if index >= self.items.len() {
            return None;
        }
        let mut items = self.items.as_ref().clone();
        items.remove(index);
        Some(Self::from_items(items))
    }

    /// Move the item at `from` to position `to`, key included.
    ///
    /// Returns `None` if either index is out of range.
    pub fn move_item(&self, from: usize, to: usize) -> Option<Self> {
        if from >= self.items.len() || to >= self.items.len() {
            return None;
        }
        let mut items = self.items.as_ref().clone();
        let item = items.remove(from);
        items.insert(to, item);
        Some(Self::from_items(items))
    }

    /// Replace the value at `index`, keeping its key.
    pub fn set_value(&self, index: usize, value: Value) -> Option<Self> {
        if index >= self.items.len() {
            return None;
        }
        let mut items = self.items.as_ref().clone();
        items[index].value = value;
        Some(Self::from_items(items))
    }
}

/// Bring `previous` in line with `values`.
///
/// - same fingerprint: `previous` itself is returned,
/// - same length: keys are kept position by position, values replaced,
/// - otherwise every value gets a fresh key.
pub fn reconcile(previous: Option<&KeyedList>, values: &[Value]) -> KeyedList {
    let Some(previous) = previous else {
        return KeyedList::fresh(values);
    };
    let print = fingerprint(values);
    if print == previous.fingerprint {
        return previous.clone();
    }
    if values.len() != previous.len() {
        return KeyedList::fresh(values);
    }

    let items = previous
        .items
        .iter()
        .zip(values)
        .map(|(item, value)| KeyedItem {
            key: item.key.clone(),
            value: value.clone(),
        })
        .collect();
    KeyedList {
        fingerprint: print,
        items: Arc::new(items),
    }
}
