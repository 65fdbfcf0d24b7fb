//! Read API: field meta, flags and the form summary.

use super::state::FormState;
use super::Form;
use crate::array::ArrayRow;
use formstate_tree::{get, Map, Path, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Snapshot of one field's value and meta-state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMeta {
    pub name: Path,
    pub value: Option<Value>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub touched: bool,
    pub dirty: bool,
    pub validating: bool,
    pub validated: bool,
}

/// Form-wide summary.
#[derive(Debug, Clone, PartialEq)]
pub struct FormStatus {
    pub errors: BTreeMap<Path, Vec<String>>,
    pub warnings: BTreeMap<Path, Vec<String>>,
    pub initial_values: Arc<Value>,
    pub values: Arc<Value>,
    pub is_dirty: bool,
    pub is_valid: bool,
    pub is_validating: bool,
}

impl FormState {
    pub(crate) fn field_meta(&self, path: &Path) -> FieldMeta {
        FieldMeta {
            name: path.clone(),
            value: self.value_at(path),
            errors: self.errors.get(path).cloned().unwrap_or_default(),
            warnings: self.warnings.get(path).cloned().unwrap_or_default(),
            touched: self.touched.contains(path),
            dirty: self.dirty.contains(path),
            validating: self.validating.contains(path),
            validated: self.validated.contains(path),
        }
    }

    pub(crate) fn registered_metas(&self) -> Vec<FieldMeta> {
        self.fields.iter().map(|f| self.field_meta(&f.name)).collect()
    }
}

fn any_flag(set: &BTreeSet<Path>, paths: &[Path]) -> bool {
    if paths.is_empty() {
        !set.is_empty()
    } else {
        paths.iter().any(|p| set.contains(p))
    }
}

fn pick(map: &BTreeMap<Path, Vec<String>>, paths: &[Path]) -> BTreeMap<Path, Vec<String>> {
    if paths.is_empty() {
        return map.clone();
    }
    paths
        .iter()
        .map(|p| (p.clone(), map.get(p).cloned().unwrap_or_default()))
        .collect()
}

impl Form {
    /// Current value tree.
    pub fn values(&self) -> Arc<Value> {
        self.with_state(|st| st.store.clone())
    }

    pub fn initial_values(&self) -> Arc<Value> {
        self.with_state(|st| st.initial.clone())
    }

    pub fn get_field_value(&self, path: impl Into<Path>) -> Option<Value> {
        let path = path.into();
        self.with_state(|st| st.value_at(&path))
    }

    /// Values of `paths` keyed by their canonical text, or the whole tree
    /// when `paths` is empty.
    pub fn get_fields_value(&self, paths: &[Path]) -> Value {
        self.with_state(|st| {
            if paths.is_empty() {
                return (*st.store).clone();
            }
            let flat: Map<String, Value> = paths
                .iter()
                .map(|p| (p.to_string(), st.value_at(p).unwrap_or(Value::Null)))
                .collect();
            Value::Object(flat)
        })
    }

    pub fn initial_value(&self, path: impl Into<Path>) -> Option<Value> {
        let path = path.into();
        self.with_state(|st| get(&st.initial, &path).cloned())
    }

    pub fn get_field(&self, path: impl Into<Path>) -> FieldMeta {
        let path = path.into();
        self.with_state(|st| st.field_meta(&path))
    }

    /// Meta for `paths`, or for every registered field in registration
    /// order when `paths` is empty.
    pub fn get_fields(&self, paths: &[Path]) -> Vec<FieldMeta> {
        self.with_state(|st| {
            if paths.is_empty() {
                st.registered_metas()
            } else {
                paths.iter().map(|p| st.field_meta(p)).collect()
            }
        })
    }

    pub fn get_field_error(&self, path: impl Into<Path>) -> Vec<String> {
        let path = path.into();
        self.with_state(|st| st.errors.get(&path).cloned().unwrap_or_default())
    }

    pub fn get_fields_error(&self, paths: &[Path]) -> BTreeMap<Path, Vec<String>> {
        self.with_state(|st| pick(&st.errors, paths))
    }

    pub fn get_field_warning(&self, path: impl Into<Path>) -> Vec<String> {
        let path = path.into();
        self.with_state(|st| st.warnings.get(&path).cloned().unwrap_or_default())
    }

    pub fn get_fields_warning(&self, paths: &[Path]) -> BTreeMap<Path, Vec<String>> {
        self.with_state(|st| pick(&st.warnings, paths))
    }

    pub fn is_field_touched(&self, path: impl Into<Path>) -> bool {
        let path = path.into();
        self.with_state(|st| st.touched.contains(&path))
    }

    /// True if any of `paths` (any field at all when empty) is touched.
    pub fn is_fields_touched(&self, paths: &[Path]) -> bool {
        self.with_state(|st| any_flag(&st.touched, paths))
    }

    pub fn is_field_dirty(&self, path: impl Into<Path>) -> bool {
        let path = path.into();
        self.with_state(|st| st.dirty.contains(&path))
    }

    pub fn is_fields_dirty(&self, paths: &[Path]) -> bool {
        self.with_state(|st| any_flag(&st.dirty, paths))
    }

    pub fn is_field_validating(&self, path: impl Into<Path>) -> bool {
        let path = path.into();
        self.with_state(|st| st.validating.contains(&path))
    }

    pub fn is_fields_validating(&self, paths: &[Path]) -> bool {
        self.with_state(|st| any_flag(&st.validating, paths))
    }

    pub fn is_field_validated(&self, path: impl Into<Path>) -> bool {
        let path = path.into();
        self.with_state(|st| st.validated.contains(&path))
    }

    pub fn is_fields_validated(&self, paths: &[Path]) -> bool {
        self.with_state(|st| any_flag(&st.validated, paths))
    }

    pub fn form_status(&self) -> FormStatus {
        self.with_state(|st| FormStatus {
            errors: st.errors.clone(),
            warnings: st.warnings.clone(),
            initial_values: st.initial.clone(),
            values: st.store.clone(),
            is_dirty: !st.dirty.is_empty(),
            is_valid: st.errors.values().all(Vec::is_empty),
            is_validating: !st.validating.is_empty(),
        })
    }

    /// Exclude `path` and everything under it from the submitted payload.
    pub fn set_disabled(&self, path: impl Into<Path>, disabled: bool) {
        let path = path.into();
        self.with_state(|st| {
            if disabled {
                st.disabled.insert(path);
            } else {
                st.disabled.remove(&path);
            }
        });
    }

    pub fn is_disabled(&self, path: impl Into<Path>) -> bool {
        let path = path.into();
        self.with_state(|st| st.disabled.contains(&path))
    }

    pub fn set_hidden(&self, path: impl Into<Path>, hidden: bool) {
        let path = path.into();
        self.with_state(|st| {
            if hidden {
                st.hidden.insert(path);
            } else {
                st.hidden.remove(&path);
            }
        });
    }

    pub fn is_hidden(&self, path: impl Into<Path>) -> bool {
        let path = path.into();
        self.with_state(|st| st.hidden.contains(&path))
    }

    /// One `{ key, path }` row per element of the array at `path`.
    ///
    /// Rows that have no key yet get one; keys already handed out stay bound
    /// to their elements across array operations.
    pub fn array_fields(&self, path: impl Into<Path>) -> Vec<ArrayRow> {
        let path = path.into();
        self.with_state(|st| st.array_rows(&path))
    }
}
