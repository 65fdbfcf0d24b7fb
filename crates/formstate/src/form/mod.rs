//! The form engine handle.
//!
//! A [`Form`] is a cheap, clonable handle to one engine instance. All state
//! lives behind a single lock; listeners, callbacks and effects are queued
//! while the lock is held and run after it is released, so they may call
//! back into the form.

mod callbacks;
mod dispatch;
mod hooks;
mod meta;
mod state;
mod validate;

pub use callbacks::{Callbacks, FieldsChangeFn, FinishFailedFn, FinishFn, ValuesChangeFn};
pub use hooks::FormHooks;
pub use meta::{FieldMeta, FormStatus};
pub(crate) use state::FormState;

use crate::config::{FlushPolicy, FormConfig};
use crate::listener::{FieldEvent, Listener, ListenerKey, SubscribeOptions};
use crate::mask::ChangeMask;
use crate::middleware::{Middleware, Pipeline};
use crate::validation::{Rule, RuleChecker};
use formstate_tree::{Path, Value};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub(crate) struct Shared {
    state: Mutex<FormState>,
    pipeline: Mutex<Pipeline>,
    checker: RuleChecker,
    config: FormConfig,
}

/// A flush spawned under [`FlushPolicy::Deferred`]. Dropped without
/// running (runtime shutdown), it releases the scheduled flag so the next
/// change can spawn another flush.
struct DeferredFlush(Option<Weak<Shared>>);

impl DeferredFlush {
    fn run(mut self) {
        if let Some(shared) = self.0.take().and_then(|weak| weak.upgrade()) {
            Form { shared }.flush();
        }
    }
}

impl Drop for DeferredFlush {
    fn drop(&mut self) {
        if let Some(shared) = self.0.take().and_then(|weak| weak.upgrade()) {
            Form { shared }.lock().scheduler.release();
        }
    }
}

/// Handle to a form engine instance.
///
/// # Example
///
/// ```
/// use formstate::{FieldEntity, FlushPolicy, Form, FormConfig, Rule};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let form = Form::new(
///     FormConfig::default()
///         .with_initial_values(json!({"phone": ""}))
///         .with_default_debounce_ms(0)
///         .with_flush_policy(FlushPolicy::Manual),
/// );
/// let _phone = form.register_field(FieldEntity::new("phone").with_rules(vec![Rule::required()]));
///
/// assert!(!form.validate_field("phone", Default::default()).await.is_valid());
/// assert_eq!(form.get_field_error("phone"), vec!["This field is required"]);
///
/// form.set_field_value("phone", json!("13800000000")).await;
/// assert!(form.validate_field("phone", Default::default()).await.is_valid());
/// # }
/// ```
#[derive(Clone)]
pub struct Form {
    shared: Arc<Shared>,
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Default for Form {
    fn default() -> Self {
        Self::new(FormConfig::default())
    }
}

impl Form {
    pub fn new(config: FormConfig) -> Self {
        Self::with_checker(config, RuleChecker::default())
    }

    /// Create a form whose rules are checked by `checker`, e.g. one with
    /// extra rule types registered.
    pub fn with_checker(config: FormConfig, checker: RuleChecker) -> Self {
        let state = FormState::new(config.initial_values.clone(), config.preserve);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                pipeline: Mutex::new(Pipeline::default()),
                checker,
                config,
            }),
        }
    }

    pub fn config(&self) -> &FormConfig {
        &self.shared.config
    }

    pub(crate) fn checker(&self) -> &RuleChecker {
        &self.shared.checker
    }

    /// Privileged operations that bypass the middleware pipeline.
    pub fn hooks(&self) -> FormHooks {
        FormHooks::new(self.clone())
    }

    fn lock(&self) -> MutexGuard<'_, FormState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the lock, then run whatever it queued and schedule a
    /// flush if notifications became pending.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut FormState) -> R) -> R {
        let (result, deferred, flush) = {
            let mut st = self.lock();
            let result = f(&mut st);
            let deferred = std::mem::take(&mut st.outbox);
            (result, deferred, st.scheduler.claim())
        };
        for job in deferred {
            job();
        }
        if flush {
            self.schedule_flush();
        }
        result
    }

    fn schedule_flush(&self) {
        match self.shared.config.flush_policy {
            FlushPolicy::Manual => {}
            FlushPolicy::Immediate => self.flush(),
            FlushPolicy::Deferred => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let task = DeferredFlush(Some(Arc::downgrade(&self.shared)));
                    handle.spawn(async move {
                        tokio::task::yield_now().await;
                        task.run();
                    });
                }
                Err(_) => self.flush(),
            },
        }
    }

    /// Deliver every pending notification now.
    ///
    /// Exact-path listeners fire first, in pending order; prefix listeners
    /// then fire once each with the combined mask of the paths under them.
    pub fn flush(&self) {
        let deliveries = {
            let mut st = self.lock();
            let pending = st.scheduler.drain();
            if pending.is_empty() {
                return;
            }
            tracing::trace!(paths = pending.len(), "flushing field notifications");
            st.listeners.plan(pending, &st.store)
        };
        for delivery in deliveries {
            delivery.deliver();
        }
    }

    // ---- transactions ----

    /// Open a (nestable) transaction. Notifications are held back until the
    /// outermost transaction commits.
    pub fn begin(&self) {
        self.with_state(FormState::begin);
    }

    pub fn commit(&self) {
        self.with_state(FormState::commit);
    }

    /// Discard held-back notifications and close every open transaction.
    /// Value changes already made are kept.
    pub fn rollback(&self) {
        self.with_state(FormState::rollback);
    }

    /// Open a transaction that commits when the guard is dropped, or rolls
    /// back if the thread is panicking.
    pub fn transaction_guard(&self) -> TransactionGuard {
        self.begin();
        TransactionGuard {
            form: self.clone(),
            done: false,
        }
    }

    /// Run `f` in a transaction, rolling back its notifications if it fails.
    pub fn transaction<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let guard = self.transaction_guard();
        match f() {
            Ok(value) => {
                guard.commit();
                Ok(value)
            }
            Err(e) => {
                guard.rollback();
                Err(e)
            }
        }
    }

    /// Async form of [`Form::transaction`]. The transaction stays open across
    /// every suspension point of `fut`.
    pub async fn transaction_async<T, E, Fut>(&self, fut: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.transaction_guard();
        match fut.await {
            Ok(value) => {
                guard.commit();
                Ok(value)
            }
            Err(e) => {
                guard.rollback();
                Err(e)
            }
        }
    }

    // ---- subscriptions and registration ----

    /// Listen for changes at `paths`.
    ///
    /// With `include_children` a listener also fires, once per flush, for
    /// changes below its path. An empty `paths` listens to the whole form.
    pub fn subscribe_field<F>(&self, paths: &[Path], options: SubscribeOptions, f: F) -> Subscription
    where
        F: Fn(&FieldEvent) + Send + Sync + 'static,
    {
        let callback: Listener = Arc::new(f);
        let keys = self.with_state(|st| {
            if paths.is_empty() {
                vec![st
                    .listeners
                    .add(Path::root(), options.with_children(), callback)]
            } else {
                paths
                    .iter()
                    .map(|p| st.listeners.add(p.clone(), options, callback.clone()))
                    .collect()
            }
        });
        Subscription {
            form: Arc::downgrade(&self.shared),
            keys,
        }
    }

    /// Register a field. Dropping the returned handle unregisters it.
    pub fn register_field(&self, entity: FieldEntity) -> FieldRegistration {
        let FieldEntity {
            name,
            initial_value,
            preserve,
            rules,
            on_change,
        } = entity;
        let (preserve, listener) = self.with_state(|st| {
            let preserve = preserve.unwrap_or(st.preserve);
            st.register_field(&name, initial_value);
            if let Some(rules) = rules {
                st.rules.insert(name.clone(), rules);
            }
            let listener = on_change.map(|cb| {
                st.listeners
                    .add(name.clone(), SubscribeOptions::mask(ChangeMask::VALUE), cb)
            });
            (preserve, listener)
        });
        FieldRegistration {
            form: Arc::downgrade(&self.shared),
            name,
            preserve,
            listener,
            active: true,
        }
    }

    /// Replace the rules of `path`.
    pub fn set_rules(&self, path: impl Into<Path>, rules: Vec<Rule>) {
        let path = path.into();
        self.with_state(|st| {
            if rules.is_empty() {
                st.rules.remove(&path);
            } else {
                st.rules.insert(path, rules);
            }
        });
    }

    pub fn rules(&self, path: impl Into<Path>) -> Vec<Rule> {
        let path = path.into();
        self.with_state(|st| st.rules.get(&path).cloned().unwrap_or_default())
    }

    pub fn set_callbacks(&self, callbacks: Callbacks) {
        self.with_state(|st| st.callbacks = callbacks);
    }

    /// Add a transform for the submitted payload. Transforms run in the
    /// order they were added.
    pub fn use_pre_submit<F>(&self, f: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.with_state(|st| st.pre_submit.push(Arc::new(f)));
    }

    /// Append a middleware. The first one added sees actions first.
    pub fn use_middleware(&self, middleware: impl Middleware + 'static) {
        self.use_middleware_arc(Arc::new(middleware));
    }

    pub fn use_middleware_arc(&self, middleware: Arc<dyn Middleware>) {
        tracing::debug!(middleware = middleware.id(), "middleware registered");
        self.shared
            .pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(middleware);
    }

    /// Remove every middleware with the given id.
    pub fn remove_middleware(&self, id: &str) -> bool {
        self.shared
            .pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub(crate) fn pipeline(&self) -> Pipeline {
        self.shared
            .pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the initial snapshot. Current values are kept where set.
    pub fn set_initial_values(&self, values: Value) {
        self.with_state(|st| st.set_initial_values(values));
    }

    /// Default `preserve` for fields registered from now on.
    pub fn set_preserve(&self, preserve: bool) {
        self.with_state(|st| st.preserve = preserve);
    }

    /// Tear the form down: meta-state, listeners, pending notifications and
    /// open transactions are dropped. With `clear_store` the value tree is
    /// emptied too.
    pub fn destroy(&self, clear_store: bool) {
        self.with_state(|st| st.destroy(clear_store));
    }
}

/// Guard for an open transaction; see [`Form::transaction_guard`].
#[must_use = "dropping the guard commits the transaction immediately"]
pub struct TransactionGuard {
    form: Form,
    done: bool,
}

impl TransactionGuard {
    pub fn commit(mut self) {
        self.done = true;
        self.form.commit();
    }

    pub fn rollback(mut self) {
        self.done = true;
        self.form.rollback();
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if std::thread::panicking() {
            self.form.rollback();
        } else {
            self.form.commit();
        }
    }
}

/// Listener registration; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    form: Weak<Shared>,
    keys: Vec<ListenerKey>,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    /// Keep the listener for the lifetime of the form.
    pub fn detach(mut self) {
        self.keys.clear();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.keys.is_empty() {
            return;
        }
        if let Some(shared) = self.form.upgrade() {
            let keys = std::mem::take(&mut self.keys);
            Form { shared }.with_state(|st| {
                for key in &keys {
                    st.listeners.remove(key);
                }
            });
        }
    }
}

/// A logical field: its path, initial value, unregistration policy and an
/// optional value listener.
#[derive(Clone)]
pub struct FieldEntity {
    pub name: Path,
    /// Used when the form has no initial value at `name`.
    pub initial_value: Option<Value>,
    /// Keep the value when unregistered. Falls back to the form's setting.
    pub preserve: Option<bool>,
    pub rules: Option<Vec<Rule>>,
    /// Called with the field's new value on every value change.
    pub on_change: Option<Listener>,
}

impl fmt::Debug for FieldEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldEntity")
            .field("name", &self.name)
            .field("initial_value", &self.initial_value)
            .field("preserve", &self.preserve)
            .field("rules", &self.rules)
            .field("on_change", &self.on_change.is_some())
            .finish()
    }
}

impl FieldEntity {
    pub fn new(name: impl Into<Path>) -> Self {
        Self {
            name: name.into(),
            initial_value: None,
            preserve: None,
            rules: None,
            on_change: None,
        }
    }

    pub fn with_initial_value(mut self, value: Value) -> Self {
        self.initial_value = Some(value);
        self
    }

    pub fn with_preserve(mut self, preserve: bool) -> Self {
        self.preserve = Some(preserve);
        self
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn on_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&FieldEvent) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(f));
        self
    }
}

/// Handle for a registered field; dropping it unregisters the field.
///
/// Unregistering removes the field's listener and meta-state. Unless the
/// field preserves its value, its value, initial value and array keys go
/// too.
#[must_use = "dropping a FieldRegistration unregisters the field"]
pub struct FieldRegistration {
    form: Weak<Shared>,
    name: Path,
    preserve: bool,
    listener: Option<ListenerKey>,
    active: bool,
}

impl FieldRegistration {
    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn unregister(self) {}

    /// Keep the field registered for the lifetime of the form.
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for FieldRegistration {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(shared) = self.form.upgrade() {
            let listener = self.listener.take();
            let name = self.name.clone();
            let preserve = self.preserve;
            Form { shared }.with_state(|st| {
                if let Some(key) = &listener {
                    st.listeners.remove(key);
                }
                st.unregister_field(&name, preserve);
            });
        }
    }
}
