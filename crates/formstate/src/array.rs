//! Positional array operations and stable row keys.
//!
//! An array field keeps a sequence of synthetic keys, one per element. Every
//! positional op is applied to the value and to the key sequence alike, so a
//! row keeps its key when it moves. Keys come from one counter per array and
//! are never handed out twice.

use formstate_tree::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One positional change to an array value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ArrayOp {
    /// Insert `item` before `index`. Indices past the end append.
    Insert { index: usize, item: Value },
    Remove { index: usize },
    /// Take the element at `from` out and reinsert it at `to`.
    Move { from: usize, to: usize },
    Swap { from: usize, to: usize },
    /// Replace the element at `index`; its key is kept.
    Replace { index: usize, item: Value },
}

impl ArrayOp {
    pub fn insert(index: usize, item: Value) -> Self {
        ArrayOp::Insert { index, item }
    }

    pub fn remove(index: usize) -> Self {
        ArrayOp::Remove { index }
    }

    pub fn move_item(from: usize, to: usize) -> Self {
        ArrayOp::Move { from, to }
    }

    pub fn swap(from: usize, to: usize) -> Self {
        ArrayOp::Swap { from, to }
    }

    pub fn replace(index: usize, item: Value) -> Self {
        ArrayOp::Replace { index, item }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArrayOp::Insert { .. } => "insert",
            ArrayOp::Remove { .. } => "remove",
            ArrayOp::Move { .. } => "move",
            ArrayOp::Swap { .. } => "swap",
            ArrayOp::Replace { .. } => "replace",
        }
    }

    /// The op that undoes `self` when applied to the array it produced.
    ///
    /// `before` is the array as it was before `self` ran. Returns `None` when
    /// `self` would not change `before`.
    pub fn inverse(&self, before: &[Value]) -> Option<ArrayOp> {
        let len = before.len();
        match self {
            ArrayOp::Insert { index, .. } => Some(ArrayOp::Remove {
                index: (*index).min(len),
            }),
            ArrayOp::Remove { index } => before.get(*index).map(|item| ArrayOp::Insert {
                index: *index,
                item: item.clone(),
            }),
            ArrayOp::Move { from, to } if *from < len && *to < len => Some(ArrayOp::Move {
                from: *to,
                to: *from,
            }),
            ArrayOp::Swap { from, to } if *from < len && *to < len => {
                Some(ArrayOp::Swap { from: *from, to: *to })
            }
            ArrayOp::Replace { index, .. } => before.get(*index).map(|item| ArrayOp::Replace {
                index: *index,
                item: item.clone(),
            }),
            ArrayOp::Move { .. } | ArrayOp::Swap { .. } => None,
        }
    }

    /// Apply to `items`. Returns false and leaves `items` alone when an index
    /// is out of range.
    pub fn apply_to<T>(&self, items: &mut Vec<T>, inserted: impl FnOnce() -> T) -> bool {
        let len = items.len();
        match self {
            ArrayOp::Insert { index, .. } => {
                items.insert((*index).min(len), inserted());
                true
            }
            ArrayOp::Remove { index } if *index < len => {
                items.remove(*index);
                true
            }
            ArrayOp::Move { from, to } if *from < len && *to < len => {
                let item = items.remove(*from);
                items.insert(*to, item);
                true
            }
            ArrayOp::Swap { from, to } if *from < len && *to < len => {
                items.swap(*from, *to);
                true
            }
            ArrayOp::Replace { index, .. } => *index < len,
            _ => false,
        }
    }
}

/// One row of an array field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayRow {
    /// Stable identity of the element at this index.
    pub key: u64,
    /// Path of the element, `<array>.<index>`.
    pub path: Path,
}

/// Stable keys for one array path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ArrayKeyManager {
    next_id: u64,
    keys: Vec<u64>,
}

impl ArrayKeyManager {
    fn fresh(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> &[u64] {
        &self.keys
    }

    /// Bring the key sequence to `len`, minting keys for new tail rows and
    /// dropping keys past the end.
    pub(crate) fn sync_len(&mut self, len: usize) {
        self.keys.truncate(len);
        while self.keys.len() < len {
            let id = self.fresh();
            self.keys.push(id);
        }
    }

    /// Apply `op` to the key sequence. The caller syncs to the array length
    /// first.
    pub(crate) fn apply(&mut self, op: &ArrayOp) -> bool {
        let mut keys = std::mem::take(&mut self.keys);
        let changed = op.apply_to(&mut keys, || self.fresh());
        self.keys = keys;
        changed
    }

    pub(crate) fn rows(&mut self, array: &Path, len: usize) -> Vec<ArrayRow> {
        self.sync_len(len);
        self.keys
            .iter()
            .enumerate()
            .map(|(i, key)| ArrayRow {
                key: *key,
                path: array.with_segment(i),
            })
            .collect()
    }
}

/// Apply `op` to an array value. Returns the new array, or `None` when the op
/// is out of range.
pub(crate) fn apply_to_value(items: &[Value], op: &ArrayOp) -> Option<Vec<Value>> {
    let mut next = items.to_vec();
    let inserted = match op {
        ArrayOp::Insert { item, .. } => item.clone(),
        _ => Value::Null,
    };
    if !op.apply_to(&mut next, || inserted) {
        return None;
    }
    if let ArrayOp::Replace { index, item } = op {
        next[*index] = item.clone();
    }
    Some(next)
}
