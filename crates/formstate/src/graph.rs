//! Dependency graph for computed fields and effects.
//!
//! A computed field owns a path and derives its value from other paths; an
//! effect reacts to paths without writing anything. A changed path reaches a
//! node when it overlaps one of the node's dependencies (equal, ancestor or
//! descendant), and reaches transitively through computed outputs.

use formstate_tree::{get, Path};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Read-only view of the form values given to compute and effect callbacks.
pub struct ReactiveContext<'a> {
    values: &'a Value,
}

impl<'a> ReactiveContext<'a> {
    pub(crate) fn new(values: &'a Value) -> Self {
        Self { values }
    }

    /// Value at `path`, if any.
    pub fn get(&self, path: impl Into<Path>) -> Option<&'a Value> {
        get(self.values, &path.into())
    }

    /// Numeric value at `path`, or `0.0`.
    pub fn number(&self, path: impl Into<Path>) -> f64 {
        self.get(path).and_then(Value::as_f64).unwrap_or(0.0)
    }

    /// The whole value tree.
    pub fn values(&self) -> &'a Value {
        self.values
    }
}

/// Derives a computed field's value.
pub type ComputeFn = Arc<dyn Fn(&ReactiveContext<'_>) -> Value + Send + Sync>;
/// Reacts to dependency changes.
pub type EffectFn = Arc<dyn Fn(&ReactiveContext<'_>) + Send + Sync>;

pub(crate) fn compute_fn<F>(f: F) -> ComputeFn
where
    F: Fn(&ReactiveContext<'_>) -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn effect_fn<F>(f: F) -> EffectFn
where
    F: Fn(&ReactiveContext<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identity of a reactive node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// A computed field, named by the path it writes.
    Computed(Path),
    /// An effect, by registration number.
    Effect(u64),
}

#[derive(Clone)]
pub(crate) enum NodeKind {
    Computed(ComputeFn),
    Effect(EffectFn),
}

#[derive(Clone)]
pub(crate) struct ReactiveNode {
    pub(crate) deps: Vec<Path>,
    pub(crate) kind: NodeKind,
}

/// Result of ordering a set of nodes for evaluation.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Leveling {
    /// Evaluation order; dependencies come before dependents.
    pub(crate) order: Vec<NodeId>,
    /// Nodes still waiting when the round cap was hit.
    pub(crate) stalled: Vec<NodeId>,
}

#[derive(Default)]
pub(crate) struct DependencyGraph {
    nodes: HashMap<NodeId, ReactiveNode>,
    /// Registration order, for deterministic traversal.
    order: Vec<NodeId>,
    /// Dependency path -> nodes that read it.
    index: HashMap<Path, Vec<NodeId>>,
    next_effect: u64,
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("nodes", &self.order)
            .finish()
    }
}

impl DependencyGraph {
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, id: &NodeId) -> Option<&ReactiveNode> {
        self.nodes.get(id)
    }

    /// Register (or replace) the computed field at `path`.
    pub(crate) fn add_computed(&mut self, path: Path, deps: Vec<Path>, compute: ComputeFn) -> NodeId {
        let id = NodeId::Computed(path);
        self.insert(
            id.clone(),
            ReactiveNode {
                deps,
                kind: NodeKind::Computed(compute),
            },
        );
        id
    }

    pub(crate) fn add_effect(&mut self, deps: Vec<Path>, effect: EffectFn) -> NodeId {
        self.next_effect += 1;
        let id = NodeId::Effect(self.next_effect);
        self.insert(
            id.clone(),
            ReactiveNode {
                deps,
                kind: NodeKind::Effect(effect),
            },
        );
        id
    }

    fn insert(&mut self, id: NodeId, node: ReactiveNode) {
        self.remove(&id);
        for dep in &node.deps {
            let readers = self.index.entry(dep.clone()).or_default();
            if !readers.contains(&id) {
                readers.push(id.clone());
            }
        }
        self.order.push(id.clone());
        self.nodes.insert(id, node);
    }

    pub(crate) fn remove(&mut self, id: &NodeId) -> Option<ReactiveNode> {
        let node = self.nodes.remove(id)?;
        for dep in &node.deps {
            if let Some(readers) = self.index.get_mut(dep) {
                readers.retain(|r| r != id);
                if readers.is_empty() {
                    self.index.remove(dep);
                }
            }
        }
        self.order.retain(|r| r != id);
        Some(node)
    }

    fn readers_of<'a>(&'a self, changed: &'a Path) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.index
            .iter()
            .filter(move |(dep, _)| dep.overlaps(changed))
            .flat_map(|(_, readers)| readers.iter())
    }

    /// Every node reachable from `changed`, in discovery order.
    pub(crate) fn collect_dependents(&self, changed: &[Path]) -> Vec<NodeId> {
        let mut queue: VecDeque<Path> = changed.iter().cloned().collect();
        let mut seen_paths: HashSet<Path> = changed.iter().cloned().collect();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut out = Vec::new();

        while let Some(path) = queue.pop_front() {
            let mut found: Vec<&NodeId> = self.readers_of(&path).collect();
            found.sort_by_key(|id| self.position(id));
            for id in found {
                if !seen.insert(id.clone()) {
                    continue;
                }
                out.push(id.clone());
                if let NodeId::Computed(output) = id {
                    if seen_paths.insert(output.clone()) {
                        queue.push_back(output.clone());
                    }
                }
            }
        }
        out
    }

    fn position(&self, id: &NodeId) -> usize {
        self.order.iter().position(|o| o == id).unwrap_or(usize::MAX)
    }

    /// Order `targets` so that a node runs after every target it reads.
    ///
    /// Each round evaluates the nodes none of whose dependencies is still
    /// waiting. Rounds are capped at the number of registered nodes (at
    /// least one); whatever remains after that is reported as stalled.
    pub(crate) fn level(&self, targets: &[NodeId]) -> Leveling {
        let max_rounds = self.nodes.len().max(1);
        let mut frontier: Vec<NodeId> = targets.to_vec();
        let mut leveling = Leveling::default();

        for _ in 0..max_rounds {
            if frontier.is_empty() {
                break;
            }
            let waiting: HashSet<&NodeId> = frontier.iter().collect();
            let mut ready = Vec::new();
            let mut deferred = Vec::new();
            for id in &frontier {
                let Some(node) = self.nodes.get(id) else {
                    continue;
                };
                let own = match id {
                    NodeId::Computed(p) => Some(p),
                    NodeId::Effect(_) => None,
                };
                let blocked = node.deps.iter().any(|dep| {
                    waiting.iter().any(|other| match other {
                        NodeId::Computed(out) => Some(out) != own && out.overlaps(dep),
                        NodeId::Effect(_) => false,
                    })
                });
                if blocked {
                    deferred.push(id.clone());
                } else {
                    ready.push(id.clone());
                }
            }
            leveling.order.extend(ready);
            frontier = deferred;
        }
        leveling.stalled = frontier;
        leveling
    }

    /// A computed field whose dependency chain leads back to itself.
    pub(crate) fn find_cycle(&self) -> Option<Path> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let computed: Vec<&Path> = self
            .order
            .iter()
            .filter_map(|id| match id {
                NodeId::Computed(p) => Some(p),
                NodeId::Effect(_) => None,
            })
            .collect();
        let mut marks: HashMap<&Path, Mark> = HashMap::new();

        // Edges run from a computed output to the computed fields reading it.
        fn visit<'a>(
            graph: &'a DependencyGraph,
            at: &'a Path,
            marks: &mut HashMap<&'a Path, Mark>,
        ) -> Option<Path> {
            match marks.get(at) {
                Some(Mark::Visiting) => return Some(at.clone()),
                Some(Mark::Done) => return None,
                None => {}
            }
            marks.insert(at, Mark::Visiting);
            for reader in graph.readers_of(at) {
                if let NodeId::Computed(next) = reader {
                    if let Some(found) = visit(graph, next, marks) {
                        return Some(found);
                    }
                }
            }
            marks.insert(at, Mark::Done);
            None
        }

        computed.into_iter().find_map(|p| visit(self, p, &mut marks))
    }
}
