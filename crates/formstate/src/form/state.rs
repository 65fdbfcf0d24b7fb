//! Engine state and the synchronous mutations applied under the form lock.

use super::callbacks::Callbacks;
use crate::array::{self, ArrayKeyManager, ArrayOp, ArrayRow};
use crate::graph::{DependencyGraph, NodeId, NodeKind, ReactiveContext};
use crate::listener::{value_at, ListenerRegistry};
use crate::mask::ChangeMask;
use crate::scheduler::{PendingKey, Scheduler};
use crate::submit::PreSubmit;
use crate::transaction::TransactionState;
use crate::validation::Rule;
use formstate_tree::{
    collect_deep_keys, deep_merge, deep_merge_in, get, set, set_in, unset_in, values_equal, Map,
    Path, Value,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Work queued under the lock and run after it is released.
pub(crate) type Deferred = Box<dyn FnOnce() + Send>;

const RESET_MASK: ChangeMask = ChangeMask::RESET
    .union(ChangeMask::VALUE)
    .union(ChangeMask::TOUCHED)
    .union(ChangeMask::DIRTY)
    .union(ChangeMask::ERRORS)
    .union(ChangeMask::WARNINGS);

#[derive(Debug, Clone)]
pub(crate) struct FieldSlot {
    pub(crate) name: Path,
}

pub(crate) struct FormState {
    pub(crate) store: Arc<Value>,
    pub(crate) initial: Arc<Value>,
    pub(crate) preserve: bool,
    pub(crate) fields: Vec<FieldSlot>,
    pub(crate) rules: HashMap<Path, Vec<Rule>>,

    pub(crate) touched: BTreeSet<Path>,
    pub(crate) dirty: BTreeSet<Path>,
    pub(crate) validating: BTreeSet<Path>,
    pub(crate) validated: BTreeSet<Path>,
    pub(crate) errors: BTreeMap<Path, Vec<String>>,
    pub(crate) warnings: BTreeMap<Path, Vec<String>>,
    pub(crate) disabled: BTreeSet<Path>,
    pub(crate) hidden: BTreeSet<Path>,

    pub(crate) tokens: HashMap<Path, u64>,
    pub(crate) debounces: HashMap<Path, CancellationToken>,
    pub(crate) array_keys: HashMap<Path, ArrayKeyManager>,

    pub(crate) listeners: ListenerRegistry,
    pub(crate) scheduler: Scheduler,
    pub(crate) tx: TransactionState,
    pub(crate) graph: DependencyGraph,
    pub(crate) callbacks: Callbacks,
    pub(crate) pre_submit: Vec<PreSubmit>,
    pub(crate) outbox: Vec<Deferred>,
}

impl FormState {
    pub(crate) fn new(initial: Value, preserve: bool) -> Self {
        let initial = Arc::new(initial);
        Self {
            store: initial.clone(),
            initial,
            preserve,
            fields: Vec::new(),
            rules: HashMap::new(),
            touched: BTreeSet::new(),
            dirty: BTreeSet::new(),
            validating: BTreeSet::new(),
            validated: BTreeSet::new(),
            errors: BTreeMap::new(),
            warnings: BTreeMap::new(),
            disabled: BTreeSet::new(),
            hidden: BTreeSet::new(),
            tokens: HashMap::new(),
            debounces: HashMap::new(),
            array_keys: HashMap::new(),
            listeners: ListenerRegistry::default(),
            scheduler: Scheduler::default(),
            tx: TransactionState::default(),
            graph: DependencyGraph::default(),
            callbacks: Callbacks::default(),
            pre_submit: Vec::new(),
            outbox: Vec::new(),
        }
    }

    // ---- notification plumbing ----

    pub(crate) fn enqueue_key(&mut self, key: PendingKey, mask: ChangeMask) {
        if self.tx.is_open() {
            self.tx.buffer(key, mask);
        } else {
            self.scheduler.pending.mark(key, mask);
        }
    }

    pub(crate) fn enqueue(&mut self, path: &Path, mask: ChangeMask) {
        self.enqueue_key(PendingKey::Path(path.clone()), mask);
    }

    pub(crate) fn begin(&mut self) {
        self.tx.begin();
    }

    pub(crate) fn commit(&mut self) {
        if let Some(buffered) = self.tx.commit() {
            self.scheduler.pending.merge(buffered);
        }
    }

    pub(crate) fn rollback(&mut self) {
        self.tx.rollback();
    }

    fn values_changed(&mut self, changed: impl FnOnce() -> Value) {
        if let Some(cb) = self.callbacks.on_values_change.clone() {
            let changed = changed();
            let all = self.store.clone();
            self.outbox.push(Box::new(move || cb(&changed, &all)));
        }
    }

    pub(crate) fn fields_changed(&mut self, paths: &[Path]) {
        let Some(cb) = self.callbacks.on_fields_change.clone() else {
            return;
        };
        let all = self.registered_metas();
        let changed: Vec<_> = all
            .iter()
            .filter(|meta| paths.contains(&meta.name))
            .cloned()
            .collect();
        self.outbox.push(Box::new(move || cb(&changed, &all)));
    }

    // ---- reads ----

    pub(crate) fn lookup(&self, path: &Path) -> Option<&Value> {
        if path.is_empty() {
            Some(&self.store)
        } else {
            get(&self.store, path)
        }
    }

    pub(crate) fn value_at(&self, path: &Path) -> Option<Value> {
        value_at(&self.store, path)
    }

    fn initial_at(&self, path: &Path) -> Option<&Value> {
        if path.is_empty() {
            Some(&self.initial)
        } else {
            get(&self.initial, path)
        }
    }

    /// Current value at `path` differs from the initial one. Absent and
    /// `null` compare equal.
    fn differs_from_initial(&self, path: &Path) -> bool {
        match (self.lookup(path), self.initial_at(path)) {
            (Some(current), Some(initial)) => !values_equal(current, initial),
            (Some(only), None) | (None, Some(only)) => !only.is_null(),
            (None, None) => false,
        }
    }

    pub(crate) fn is_registered(&self, path: &Path) -> bool {
        self.fields.iter().any(|f| &f.name == path)
    }

    // ---- value mutation ----

    fn write_store(&mut self, path: &Path, value: Value) -> bool {
        set_in(Arc::make_mut(&mut self.store), path, value)
    }

    /// Recompute the dirty flag of `path` from the store. Returns true if
    /// it flipped.
    fn sync_dirty(&mut self, path: &Path) -> bool {
        if self.differs_from_initial(path) {
            self.dirty.insert(path.clone())
        } else {
            self.dirty.remove(path)
        }
    }

    /// Recompute dirty for every tracked path above or below `path` (the
    /// path itself excluded) and notify the ones that flipped.
    fn sync_related_dirty(&mut self, path: &Path) {
        let related: BTreeSet<Path> = self
            .fields
            .iter()
            .map(|f| &f.name)
            .chain(self.touched.iter())
            .chain(self.dirty.iter())
            .filter(|p| *p != path && p.overlaps(path))
            .cloned()
            .collect();
        for p in related {
            if self.sync_dirty(&p) {
                self.enqueue(&p, ChangeMask::DIRTY);
            }
        }
    }

    /// Touched, dirty and validated bookkeeping after the store changed at
    /// `path`. Notifies `path` first, then any related path whose dirty
    /// flag flipped.
    fn update_meta(&mut self, path: &Path) {
        let mut mask = ChangeMask::VALUE;
        if self.touched.insert(path.clone()) {
            mask |= ChangeMask::TOUCHED;
        }
        if self.sync_dirty(path) {
            mask |= ChangeMask::DIRTY;
        }
        self.validated.remove(path);
        self.enqueue(path, mask);
        self.sync_related_dirty(path);
    }

    /// Write one field without dependency propagation. Returns false when
    /// the value is unchanged or the write was refused.
    pub(crate) fn write_field(&mut self, path: &Path, value: Value) -> bool {
        if self
            .lookup(path)
            .is_some_and(|current| values_equal(current, &value))
        {
            return false;
        }
        if !self.write_store(path, value.clone()) {
            return false;
        }
        self.update_meta(path);
        self.values_changed(|| set(&Value::Object(Map::new()), path, value));
        self.fields_changed(std::slice::from_ref(path));
        true
    }

    pub(crate) fn set_field_value(&mut self, path: &Path, value: Value) -> bool {
        let changed = self.write_field(path, value);
        if changed {
            self.propagate(std::slice::from_ref(path));
        }
        changed
    }

    /// Merge `values` into the store, notifying every key it names
    /// (containers and array elements included). Returns those keys.
    pub(crate) fn set_fields_value(&mut self, values: &Value) -> Vec<Path> {
        if !values.is_object() {
            tracing::debug!("set_fields_value expects an object; ignored");
            return Vec::new();
        }
        let mut entries = Vec::new();
        walk_keys(values, &Path::root(), &mut entries);
        entries.retain(|(path, _)| !path.has_unsafe_segment());

        let paths: Vec<Path> = entries.into_iter().map(|(p, _)| p).collect();

        self.begin();
        deep_merge_in(Arc::make_mut(&mut self.store), values);
        for path in &paths {
            self.update_meta(path);
        }

        self.values_changed(|| values.clone());
        self.fields_changed(&paths);
        self.propagate(&paths);
        self.commit();
        paths
    }

    /// Replace the initial snapshot. Current values win over the new initial
    /// ones; dirty flags are recomputed against the new snapshot.
    pub(crate) fn set_initial_values(&mut self, values: Value) {
        self.initial = Arc::new(values);
        self.store = Arc::new(deep_merge(&self.initial, &self.store));

        let tracked: BTreeSet<Path> = self
            .fields
            .iter()
            .map(|f| f.name.clone())
            .chain(self.touched.iter().cloned())
            .chain(self.dirty.iter().cloned())
            .collect();
        for path in tracked {
            if self.sync_dirty(&path) {
                self.enqueue(&path, ChangeMask::DIRTY);
            }
        }
    }

    /// Reset `paths` (everything when empty) to the initial snapshot and
    /// clear their meta-state. In-flight validations of reset paths become
    /// stale.
    pub(crate) fn reset(&mut self, paths: &[Path]) {
        if paths.is_empty() {
            self.cancel_validations(None);
            self.store = self.initial.clone();
            self.touched.clear();
            self.dirty.clear();
            self.errors.clear();
            self.warnings.clear();
            self.validating.clear();
            self.enqueue_key(PendingKey::All, RESET_MASK);
            self.propagate(&[Path::root()]);
            return;
        }

        let mut reset_keys: Vec<Path> = Vec::new();
        for path in paths {
            self.cancel_validations(Some(path));
            let initial = get(&self.initial, path).cloned();

            let mut group = vec![path.clone()];
            if let Some(initial) = &initial {
                group.extend(collect_deep_keys(initial, path));
            }
            group.extend(
                self.touched
                    .iter()
                    .chain(self.dirty.iter())
                    .chain(self.errors.keys())
                    .chain(self.warnings.keys())
                    .chain(self.validating.iter())
                    .filter(|p| p.is_under(path))
                    .cloned(),
            );

            for key in group {
                if reset_keys.contains(&key) {
                    continue;
                }
                self.clear_meta(&key, false);
                self.enqueue(&key, RESET_MASK);
                reset_keys.push(key);
            }

            match initial {
                Some(value) => {
                    self.write_store(path, value);
                }
                None => {
                    unset_in(Arc::make_mut(&mut self.store), path);
                }
            }
            self.sync_related_dirty(path);
        }
        self.propagate(&reset_keys);
    }

    fn clear_meta(&mut self, path: &Path, validated: bool) {
        self.touched.remove(path);
        self.dirty.remove(path);
        self.errors.remove(path);
        self.warnings.remove(path);
        self.validating.remove(path);
        if validated {
            self.validated.remove(path);
        }
    }

    /// Make in-flight validations at or under `under` (all when `None`)
    /// stale and cancel their pending debounces.
    pub(crate) fn cancel_validations(&mut self, under: Option<&Path>) {
        let hit = |path: &Path| under.map_or(true, |u| path.is_under(u));
        for (path, token) in self.tokens.iter_mut() {
            if hit(path) {
                *token += 1;
            }
        }
        self.debounces.retain(|path, cancel| {
            if hit(path) {
                cancel.cancel();
                false
            } else {
                true
            }
        });
    }

    // ---- arrays ----

    pub(crate) fn array_op(&mut self, path: &Path, op: &ArrayOp) -> bool {
        let (len, next) = match self.lookup(path) {
            Some(Value::Array(items)) => (items.len(), array::apply_to_value(items, op)),
            _ => {
                tracing::debug!(path = %path, op = op.name(), "array op on a non-array value ignored");
                return false;
            }
        };
        let Some(next) = next else {
            tracing::debug!(path = %path, op = op.name(), len, "array op index out of range ignored");
            return false;
        };

        let next = Value::Array(next);
        if !self.write_store(path, next.clone()) {
            return false;
        }
        let keys = self.array_keys.entry(path.clone()).or_default();
        keys.sync_len(len);
        keys.apply(op);

        self.update_meta(path);
        self.values_changed(|| set(&Value::Object(Map::new()), path, next));
        self.fields_changed(std::slice::from_ref(path));
        self.propagate(std::slice::from_ref(path));
        true
    }

    pub(crate) fn array_rows(&mut self, path: &Path) -> Vec<ArrayRow> {
        let len = match self.lookup(path) {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        };
        self.array_keys
            .entry(path.clone())
            .or_default()
            .rows(path, len)
    }

    // ---- errors ----

    pub(crate) fn set_external_errors(&mut self, entries: Vec<(Path, Vec<String>)>) {
        self.begin();
        if entries.is_empty() {
            let mut cleared: Vec<Path> = self.fields.iter().map(|f| f.name.clone()).collect();
            for path in std::mem::take(&mut self.errors).into_keys() {
                if !cleared.contains(&path) {
                    cleared.push(path);
                }
            }
            for path in &cleared {
                self.enqueue(path, ChangeMask::ERRORS);
            }
        } else {
            for (path, messages) in entries {
                if messages.is_empty() {
                    self.errors.remove(&path);
                } else {
                    self.errors.insert(path.clone(), messages);
                }
                self.enqueue(&path, ChangeMask::ERRORS);
            }
        }
        self.commit();
    }

    // ---- registration ----

    pub(crate) fn register_field(&mut self, name: &Path, initial_value: Option<Value>) {
        if self.is_registered(name) {
            return;
        }
        self.fields.push(FieldSlot { name: name.clone() });
        let missing = get(&self.initial, name).map_or(true, Value::is_null);
        if let (true, Some(value)) = (missing, initial_value) {
            self.write_store(name, value.clone());
            set_in(Arc::make_mut(&mut self.initial), name, value);
        }
    }

    pub(crate) fn unregister_field(&mut self, name: &Path, preserve: bool) {
        if !preserve {
            self.fields.retain(|f| &f.name != name);
            unset_in(Arc::make_mut(&mut self.initial), name);
            unset_in(Arc::make_mut(&mut self.store), name);
            self.array_keys.remove(name);
        }
        self.clear_meta(name, true);
    }

    pub(crate) fn destroy(&mut self, clear_store: bool) {
        if clear_store {
            self.store = Arc::new(Value::Object(Map::new()));
        }
        self.cancel_validations(None);
        self.touched.clear();
        self.dirty.clear();
        self.errors.clear();
        self.warnings.clear();
        self.validating.clear();
        self.validated.clear();
        self.listeners.clear();
        self.scheduler.drain();
        self.tx.rollback();
    }

    // ---- dependency propagation ----

    /// Recompute every computed field and run every effect that depends on
    /// `changed`, in one transaction.
    ///
    /// Nodes are leveled so a computed field runs after the computed fields
    /// it reads. Nodes caught in a cycle never level and keep their previous
    /// value.
    pub(crate) fn propagate(&mut self, changed: &[Path]) {
        if self.graph.len() == 0 || changed.is_empty() {
            return;
        }
        let targets = self.graph.collect_dependents(changed);
        if targets.is_empty() {
            return;
        }
        let leveling = self.graph.level(&targets);
        if !leveling.stalled.is_empty() {
            tracing::warn!(
                stalled = leveling.stalled.len(),
                rounds = self.graph.len(),
                "dependency propagation hit its round cap; cyclic computed fields left stale"
            );
        }

        self.begin();
        for id in &leveling.order {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            match (&node.kind, id) {
                (NodeKind::Computed(compute), NodeId::Computed(output)) => {
                    let compute = compute.clone();
                    let next = compute(&ReactiveContext::new(&self.store));
                    let output = output.clone();
                    self.write_field(&output, next);
                }
                (NodeKind::Effect(effect), _) => {
                    let effect = effect.clone();
                    let snapshot = self.store.clone();
                    self.outbox
                        .push(Box::new(move || effect(&ReactiveContext::new(&snapshot))));
                }
                _ => {}
            }
        }
        self.commit();
    }
}

fn walk_keys<'a>(node: &'a Value, at: &Path, out: &mut Vec<(Path, &'a Value)>) {
    match node {
        Value::Object(map) => {
            for (k, v) in map {
                let path = at.clone().key(k.as_str());
                out.push((path.clone(), v));
                if v.is_object() || v.is_array() {
                    walk_keys(v, &path, out);
                }
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                let path = at.clone().index(i);
                out.push((path.clone(), v));
                if v.is_object() || v.is_array() {
                    walk_keys(v, &path, out);
                }
            }
        }
        _ => {}
    }
}
