use super::meta::FieldMeta;
use crate::submit::SubmitFailure;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub type ValuesChangeFn = Arc<dyn Fn(&Value, &Value) + Send + Sync>;
pub type FieldsChangeFn = Arc<dyn Fn(&[FieldMeta], &[FieldMeta]) + Send + Sync>;
pub type FinishFn = Arc<dyn Fn(&Value) + Send + Sync>;
pub type FinishFailedFn = Arc<dyn Fn(&SubmitFailure) + Send + Sync>;

/// Form-level callbacks.
///
/// All callbacks run after the form lock is released, so they may call back
/// into the form.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// `(changed, all_values)`; `changed` holds only the written subtree.
    pub on_values_change: Option<ValuesChangeFn>,
    /// `(changed_fields, all_registered_fields)`.
    pub on_fields_change: Option<FieldsChangeFn>,
    pub on_finish: Option<FinishFn>,
    pub on_finish_failed: Option<FinishFailedFn>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_values_change", &self.on_values_change.is_some())
            .field("on_fields_change", &self.on_fields_change.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .field("on_finish_failed", &self.on_finish_failed.is_some())
            .finish()
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_values_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.on_values_change = Some(Arc::new(f));
        self
    }

    pub fn on_fields_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&[FieldMeta], &[FieldMeta]) + Send + Sync + 'static,
    {
        self.on_fields_change = Some(Arc::new(f));
        self
    }

    pub fn on_finish<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on_finish = Some(Arc::new(f));
        self
    }

    pub fn on_finish_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&SubmitFailure) + Send + Sync + 'static,
    {
        self.on_finish_failed = Some(Arc::new(f));
        self
    }
}
