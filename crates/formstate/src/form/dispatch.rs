//! Action dispatch and the async facade built on it.

use super::Form;
use crate::action::{Action, DispatchOutcome};
use crate::array::ArrayOp;
use crate::middleware::{MiddlewareContext, Next};
use crate::validation::{ValidateOptions, ValidationStatus};
use formstate_tree::{Path, Value};
use futures::future::BoxFuture;

impl Form {
    /// Send `action` through the middleware pipeline to the base handler.
    pub fn dispatch(&self, action: Action) -> BoxFuture<'static, DispatchOutcome> {
        let form = self.clone();
        Box::pin(async move {
            let pipeline = form.pipeline();
            tracing::trace!(
                action = action.kind(),
                middlewares = pipeline.len(),
                "dispatching action"
            );
            let ctx = MiddlewareContext::new(form);
            Next::new(pipeline.chain(), &ctx).run(action).await
        })
    }

    /// Base handler at the end of the pipeline.
    pub(crate) async fn apply(&self, action: Action) -> DispatchOutcome {
        match action {
            Action::SetFieldValue {
                path,
                value,
                validate,
            } => {
                let changed = self.with_state(|st| st.set_field_value(&path, value));
                if changed && validate {
                    self.dispatch(Action::ValidateField {
                        path,
                        opts: ValidateOptions::default(),
                    })
                    .await;
                }
                DispatchOutcome::Applied
            }
            Action::SetFieldsValue { values, validate } => {
                let written = self.with_state(|st| st.set_fields_value(&values));
                if validate && !written.is_empty() {
                    self.dispatch(Action::ValidateFields {
                        paths: Some(written),
                        opts: ValidateOptions::default(),
                    })
                    .await;
                }
                DispatchOutcome::Applied
            }
            Action::Reset { paths } => {
                self.with_state(|st| st.reset(&paths));
                DispatchOutcome::Applied
            }
            Action::ValidateField { path, opts } => {
                DispatchOutcome::Field(self.run_field_validation(path, opts).await)
            }
            Action::ValidateFields { paths, opts } => {
                DispatchOutcome::Fields(self.run_fields_validation(paths, opts).await)
            }
            Action::ArrayOp { path, op } => {
                self.with_state(|st| st.array_op(&path, &op));
                DispatchOutcome::Applied
            }
            Action::SetExternalErrors { entries } => {
                self.with_state(|st| st.set_external_errors(entries));
                DispatchOutcome::Applied
            }
        }
    }

    // ---- values ----

    pub async fn set_field_value(&self, path: impl Into<Path>, value: Value) {
        self.dispatch(Action::SetFieldValue {
            path: path.into(),
            value,
            validate: false,
        })
        .await;
    }

    /// Set a value and validate the field if it changed.
    pub async fn set_field_value_validated(&self, path: impl Into<Path>, value: Value) {
        self.dispatch(Action::SetFieldValue {
            path: path.into(),
            value,
            validate: true,
        })
        .await;
    }

    /// Deep-merge `values` into the store. Every key path in `values` is
    /// notified.
    pub async fn set_fields_value(&self, values: Value) {
        self.dispatch(Action::SetFieldsValue {
            values,
            validate: false,
        })
        .await;
    }

    pub async fn set_fields_value_validated(&self, values: Value) {
        self.dispatch(Action::SetFieldsValue {
            values,
            validate: true,
        })
        .await;
    }

    /// Restore `paths` (the whole form when empty) to their initial values
    /// and clear their meta-state.
    pub async fn reset_fields(&self, paths: &[Path]) {
        self.dispatch(Action::Reset {
            paths: paths.to_vec(),
        })
        .await;
    }

    pub async fn set_external_errors(&self, entries: Vec<(Path, Vec<String>)>) {
        self.dispatch(Action::SetExternalErrors { entries }).await;
    }

    // ---- validation ----

    pub async fn validate_field(&self, path: impl Into<Path>, opts: ValidateOptions) -> ValidationStatus {
        let path = path.into();
        match self
            .dispatch(Action::ValidateField {
                path: path.clone(),
                opts,
            })
            .await
        {
            DispatchOutcome::Field(status) => status,
            _ if self.get_field_error(&path).is_empty() => ValidationStatus::Valid,
            _ => ValidationStatus::Invalid,
        }
    }

    /// Validate `paths`, or every registered field when `None`. True when
    /// every target ended valid.
    pub async fn validate_fields(&self, paths: Option<Vec<Path>>, opts: ValidateOptions) -> bool {
        match self.dispatch(Action::ValidateFields { paths, opts }).await {
            DispatchOutcome::Fields(ok) => ok,
            DispatchOutcome::Field(status) => status.is_valid(),
            DispatchOutcome::Applied => self.form_status().is_valid,
        }
    }

    // ---- arrays ----

    pub async fn array_op(&self, path: impl Into<Path>, op: ArrayOp) {
        self.dispatch(Action::ArrayOp {
            path: path.into(),
            op,
        })
        .await;
    }

    pub async fn insert(&self, path: impl Into<Path>, index: usize, item: Value) {
        self.array_op(path, ArrayOp::insert(index, item)).await;
    }

    pub async fn append(&self, path: impl Into<Path>, item: Value) {
        self.array_op(path, ArrayOp::insert(usize::MAX, item)).await;
    }

    pub async fn remove(&self, path: impl Into<Path>, index: usize) {
        self.array_op(path, ArrayOp::remove(index)).await;
    }

    pub async fn move_item(&self, path: impl Into<Path>, from: usize, to: usize) {
        self.array_op(path, ArrayOp::move_item(from, to)).await;
    }

    pub async fn swap(&self, path: impl Into<Path>, from: usize, to: usize) {
        self.array_op(path, ArrayOp::swap(from, to)).await;
    }

    pub async fn replace(&self, path: impl Into<Path>, index: usize, item: Value) {
        self.array_op(path, ArrayOp::replace(index, item)).await;
    }
}
