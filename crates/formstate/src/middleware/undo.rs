//! Undo/redo history captured from dispatched actions.

use super::{Middleware, MiddlewareContext, Next};
use crate::action::{Action, DispatchOutcome};
use crate::array::ArrayOp;
use crate::form::Form;
use async_trait::async_trait;
use formstate_tree::{get, Path, Value};
use std::sync::{Arc, Mutex, PoisonError};

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Clone)]
enum Change {
    Value {
        path: Path,
        prev: Value,
        next: Value,
    },
    Array {
        path: Path,
        op: ArrayOp,
        inverse: ArrayOp,
    },
}

type Batch = Vec<Change>;

#[derive(Debug, Default)]
struct History {
    undo: Vec<Batch>,
    redo: Vec<Batch>,
}

/// Records value writes and array operations so they can be undone and
/// redone.
///
/// Register a clone with [`Form::use_middleware`] and keep one to call
/// [`UndoRedo::undo`] and [`UndoRedo::redo`]. Each recorded action becomes
/// one batch; a new batch clears the redo stack. Replays go through
/// [`crate::FormHooks`] in one transaction and are not recorded again.
#[derive(Debug, Clone)]
pub struct UndoRedo {
    history: Arc<Mutex<History>>,
    limit: usize,
}

impl Default for UndoRedo {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoRedo {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }

    /// Keep at most `limit` undo batches; the oldest are dropped first.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            history: Arc::new(Mutex::new(History::default())),
            limit: limit.max(1),
        }
    }

    fn history(&self) -> std::sync::MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn can_undo(&self) -> bool {
        !self.history().undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.history().redo.is_empty()
    }

    pub fn clear(&self) {
        let mut history = self.history();
        history.undo.clear();
        history.redo.clear();
    }

    fn record(&self, batch: Batch) {
        if batch.is_empty() {
            return;
        }
        let mut history = self.history();
        history.undo.push(batch);
        if history.undo.len() > self.limit {
            history.undo.remove(0);
        }
        history.redo.clear();
    }

    /// Revert the most recent batch. Returns false when there is nothing to
    /// undo.
    pub fn undo(&self, form: &Form) -> bool {
        let Some(batch) = self.history().undo.pop() else {
            return false;
        };
        replay(form, batch.iter().rev(), Direction::Back);
        self.history().redo.push(batch);
        true
    }

    /// Re-apply the most recently undone batch.
    pub fn redo(&self, form: &Form) -> bool {
        let Some(batch) = self.history().redo.pop() else {
            return false;
        };
        replay(form, batch.iter(), Direction::Forward);
        self.history().undo.push(batch);
        true
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Back,
    Forward,
}

fn replay<'a>(form: &Form, changes: impl Iterator<Item = &'a Change>, direction: Direction) {
    let hooks = form.hooks();
    let _tx = hooks.transaction_guard();
    for change in changes {
        match (change, direction) {
            (Change::Value { path, prev, .. }, Direction::Back) => {
                hooks.set_field_value(path.clone(), prev.clone());
            }
            (Change::Value { path, next, .. }, Direction::Forward) => {
                hooks.set_field_value(path.clone(), next.clone());
            }
            (Change::Array { path, inverse, .. }, Direction::Back) => {
                hooks.array_op(path.clone(), inverse);
            }
            (Change::Array { path, op, .. }, Direction::Forward) => {
                hooks.array_op(path.clone(), op);
            }
        }
    }
}

fn value_or_null(values: &Value, path: &Path) -> Value {
    get(values, path).cloned().unwrap_or(Value::Null)
}

#[async_trait]
impl Middleware for UndoRedo {
    fn id(&self) -> &str {
        "undo_redo"
    }

    async fn handle(&self, ctx: &MiddlewareContext, action: Action, next: Next<'_>) -> DispatchOutcome {
        match &action {
            Action::SetFieldValue { path, .. } => {
                let path = path.clone();
                let prev = value_or_null(&ctx.get_state(), &path);
                let outcome = next.run(action).await;
                let after = value_or_null(&ctx.get_state(), &path);
                if prev != after {
                    self.record(vec![Change::Value {
                        path,
                        prev,
                        next: after,
                    }]);
                }
                outcome
            }
            Action::SetFieldsValue { values, .. } => {
                let keys: Vec<Path> = match values {
                    Value::Object(map) => map.keys().map(|k| Path::root().key(k.as_str())).collect(),
                    _ => Vec::new(),
                };
                let before = ctx.get_state();
                let outcome = next.run(action).await;
                let after = ctx.get_state();
                let batch = keys
                    .into_iter()
                    .filter_map(|path| {
                        let prev = value_or_null(&before, &path);
                        let next = value_or_null(&after, &path);
                        (prev != next).then_some(Change::Value { path, prev, next })
                    })
                    .collect();
                self.record(batch);
                outcome
            }
            Action::ArrayOp { path, op } => {
                let inverse = match get(&ctx.get_state(), path) {
                    Some(Value::Array(items)) => op.inverse(items),
                    _ => None,
                };
                let (path, op) = (path.clone(), op.clone());
                let outcome = next.run(action).await;
                if let Some(inverse) = inverse {
                    self.record(vec![Change::Array { path, op, inverse }]);
                }
                outcome
            }
            _ => next.run(action).await,
        }
    }
}
