use super::{Callbacks, Form, TransactionGuard};
use crate::action::{Action, DispatchOutcome};
use crate::array::ArrayOp;
use crate::error::{FormError, FormResult};
use crate::graph::{compute_fn, effect_fn, NodeId, ReactiveContext};
use formstate_tree::{Path, Value};
use futures::future::BoxFuture;

/// Privileged, synchronous access to the engine.
///
/// Writes made here skip the middleware pipeline, so middlewares can use
/// them to apply changes without seeing their own actions again. Dependency
/// propagation and notifications still happen as usual.
#[derive(Clone, Debug)]
pub struct FormHooks {
    form: Form,
}

impl FormHooks {
    pub(crate) fn new(form: Form) -> Self {
        Self { form }
    }

    pub fn set_field_value(&self, path: impl Into<Path>, value: Value) -> bool {
        let path = path.into();
        self.form.with_state(|st| st.set_field_value(&path, value))
    }

    /// Returns every key path that was written.
    pub fn set_fields_value(&self, values: &Value) -> Vec<Path> {
        self.form.with_state(|st| st.set_fields_value(values))
    }

    pub fn array_op(&self, path: impl Into<Path>, op: &ArrayOp) -> bool {
        let path = path.into();
        self.form.with_state(|st| st.array_op(&path, op))
    }

    pub fn reset_fields(&self, paths: &[Path]) {
        self.form.with_state(|st| st.reset(paths));
    }

    pub fn set_external_errors(&self, entries: Vec<(Path, Vec<String>)>) {
        self.form.with_state(|st| st.set_external_errors(entries));
    }

    /// Dispatch through the full pipeline.
    pub fn dispatch(&self, action: Action) -> BoxFuture<'static, DispatchOutcome> {
        self.form.dispatch(action)
    }

    /// Derive the value at `path` from `deps`.
    ///
    /// The compute function runs whenever a path overlapping one of `deps`
    /// changes; its result is written like any other field value. It does
    /// not run at registration. Registering a path again replaces the
    /// previous compute function.
    ///
    /// With `strict_dependencies` configured, a registration that closes a
    /// cycle is undone and reported as [`FormError::DependencyCycle`].
    pub fn register_computed<F>(
        &self,
        path: impl Into<Path>,
        deps: impl IntoIterator<Item = Path>,
        compute: F,
    ) -> FormResult<NodeId>
    where
        F: Fn(&ReactiveContext<'_>) -> Value + Send + Sync + 'static,
    {
        let path = path.into();
        if path.is_empty() {
            return Err(FormError::invalid_operation(
                "a computed field needs a non-root path",
            ));
        }
        let deps: Vec<Path> = deps.into_iter().collect();
        let strict = self.form.config().strict_dependencies;
        self.form.with_state(|st| {
            let id = st.graph.add_computed(path.clone(), deps, compute_fn(compute));
            if strict {
                if let Some(at) = st.graph.find_cycle() {
                    st.graph.remove(&id);
                    tracing::warn!(path = %path, cycle_at = %at, "computed field rejected");
                    return Err(FormError::dependency_cycle(path));
                }
            }
            tracing::debug!(path = %path, nodes = st.graph.len(), "computed field registered");
            Ok(id)
        })
    }

    /// Run `effect` whenever a path overlapping one of `deps` changes.
    pub fn register_effect<F>(&self, deps: impl IntoIterator<Item = Path>, effect: F) -> NodeId
    where
        F: Fn(&ReactiveContext<'_>) + Send + Sync + 'static,
    {
        let deps: Vec<Path> = deps.into_iter().collect();
        self.form
            .with_state(|st| st.graph.add_effect(deps, effect_fn(effect)))
    }

    pub fn remove_node(&self, id: &NodeId) -> bool {
        self.form.with_state(|st| st.graph.remove(id).is_some())
    }

    pub fn begin(&self) {
        self.form.begin();
    }

    pub fn commit(&self) {
        self.form.commit();
    }

    pub fn rollback(&self) {
        self.form.rollback();
    }

    pub fn transaction_guard(&self) -> TransactionGuard {
        self.form.transaction_guard()
    }

    pub fn transaction<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        self.form.transaction(f)
    }

    pub fn set_callbacks(&self, callbacks: Callbacks) {
        self.form.set_callbacks(callbacks);
    }

    pub fn set_initial_values(&self, values: Value) {
        self.form.set_initial_values(values);
    }

    pub fn set_preserve(&self, preserve: bool) {
        self.form.set_preserve(preserve);
    }

    pub fn destroy(&self, clear_store: bool) {
        self.form.destroy(clear_store);
    }
}
