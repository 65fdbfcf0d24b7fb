//! Form submission: validate, prune, transform, report.

use crate::form::Form;
use crate::validation::ValidateOptions;
use chrono::{DateTime, Utc};
use formstate_tree::{Map, Path, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// Transform applied to the success payload before `on_finish`.
pub type PreSubmit = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// State of one field that failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldFailure {
    pub name: Path,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub touched: bool,
    pub validating: bool,
    pub value: Option<Value>,
}

/// Why a submission did not go through.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("form submission failed: {error_count} field(s) with errors")]
pub struct SubmitFailure {
    /// Failing fields, registered fields first in registration order.
    pub error_fields: Vec<FieldFailure>,
    pub error_map: BTreeMap<Path, Vec<String>>,
    pub warning_map: BTreeMap<Path, Vec<String>>,
    /// The field to focus: first entry of `error_fields`.
    pub first_error: Option<Path>,
    pub error_count: usize,
    pub values: Value,
    pub submitted_at: DateTime<Utc>,
}

impl Form {
    /// Validate and submit the form.
    ///
    /// Validates every registered field (only dirty ones when the form is
    /// configured with `submit_dirty_only`). On success the value tree minus
    /// disabled and hidden subtrees is passed through the pre-submit
    /// transforms, handed to `on_finish` and returned. On failure the
    /// failure report goes to `on_finish_failed` and is returned as `Err`.
    pub async fn submit(&self) -> Result<Value, SubmitFailure> {
        let mut opts = ValidateOptions::default();
        if self.config().submit_dirty_only {
            opts = opts.dirty_only();
        }
        let ok = self.validate_fields(None, opts).await;

        if ok {
            let (payload, transforms, on_finish) = self.with_state(|st| {
                let blocked: BTreeSet<Path> = st.disabled.union(&st.hidden).cloned().collect();
                (
                    prune(&st.store, &blocked),
                    st.pre_submit.clone(),
                    st.callbacks.on_finish.clone(),
                )
            });
            let payload = transforms.iter().fold(payload, |acc, f| f(acc));
            tracing::debug!(transforms = transforms.len(), "form submitted");
            if let Some(cb) = on_finish {
                cb(&payload);
            }
            Ok(payload)
        } else {
            let (failure, on_failed) =
                self.with_state(|st| (st.failure_report(), st.callbacks.on_finish_failed.clone()));
            tracing::debug!(
                errors = failure.error_count,
                first = ?failure.first_error.as_ref().map(ToString::to_string),
                "form submission failed"
            );
            if let Some(cb) = on_failed {
                cb(&failure);
            }
            Err(failure)
        }
    }
}

impl crate::form::FormState {
    pub(crate) fn failure_report(&self) -> SubmitFailure {
        let mut order: Vec<&Path> = self
            .fields
            .iter()
            .map(|f| &f.name)
            .filter(|name| self.errors.contains_key(*name))
            .collect();
        for name in self.errors.keys() {
            if !order.contains(&name) {
                order.push(name);
            }
        }

        let error_fields: Vec<FieldFailure> = order
            .into_iter()
            .map(|name| FieldFailure {
                name: name.clone(),
                errors: self.errors.get(name).cloned().unwrap_or_default(),
                warnings: self.warnings.get(name).cloned().unwrap_or_default(),
                touched: self.touched.contains(name),
                validating: self.validating.contains(name),
                value: self.value_at(name),
            })
            .collect();

        SubmitFailure {
            first_error: error_fields.first().map(|f| f.name.clone()),
            error_count: error_fields.len(),
            error_fields,
            error_map: self.errors.clone(),
            warning_map: self.warnings.clone(),
            values: (*self.store).clone(),
            submitted_at: Utc::now(),
        }
    }
}

/// Copy of `values` without the subtrees under any `blocked` path.
/// Array elements that are pruned are dropped, shifting the rest down.
pub(crate) fn prune(values: &Value, blocked: &BTreeSet<Path>) -> Value {
    if blocked.is_empty() {
        return values.clone();
    }
    prune_at(values, Path::root(), blocked).unwrap_or_else(|| Value::Object(Map::new()))
}

fn prune_at(node: &Value, at: Path, blocked: &BTreeSet<Path>) -> Option<Value> {
    if !at.is_empty() && blocked.iter().any(|b| at.is_under(b)) {
        return None;
    }
    match node {
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| prune_at(item, at.clone().index(i), blocked))
                .collect(),
        )),
        Value::Object(map) => Some(Value::Object(
            map.iter()
                .filter_map(|(k, v)| {
                    prune_at(v, at.clone().key(k.as_str()), blocked).map(|v| (k.clone(), v))
                })
                .collect(),
        )),
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blocked(paths: &[&str]) -> BTreeSet<Path> {
        paths.iter().map(|p| Path::from(*p)).collect()
    }

    #[test]
    fn test_prune_removes_subtrees() {
        let values = json!({"a": {"b": 1, "c": 2}, "d": 3});
        assert_eq!(prune(&values, &blocked(&["a.b", "d"])), json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_prune_is_segment_wise() {
        let values = json!({"ab": 1, "a": 2});
        assert_eq!(prune(&values, &blocked(&["a"])), json!({"ab": 1}));
    }

    #[test]
    fn test_prune_drops_array_items() {
        let values = json!({"items": ["x", "y", "z"]});
        assert_eq!(prune(&values, &blocked(&["items.1"])), json!({"items": ["x", "z"]}));
    }

    #[test]
    fn test_failure_serializes_paths_as_keys() {
        let failure = SubmitFailure {
            error_fields: vec![],
            error_map: [(Path::from("a.b"), vec!["bad".to_owned()])].into_iter().collect(),
            warning_map: BTreeMap::new(),
            first_error: Some(Path::from("a.b")),
            error_count: 1,
            values: json!({}),
            submitted_at: Utc::now(),
        };
        let wire = serde_json::to_value(&failure).unwrap();
        assert_eq!(wire["error_map"], json!({"a.b": ["bad"]}));
        assert_eq!(wire["first_error"], json!("a.b"));
    }
}
