//! Field listeners and flush delivery planning.

use crate::mask::ChangeMask;
use crate::scheduler::{PendingChanges, PendingKey};
use formstate_tree::{get, Path};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Callback invoked with a delivered change.
pub type Listener = Arc<dyn Fn(&FieldEvent) + Send + Sync>;

/// A delivered change notification.
#[derive(Debug, Clone)]
pub struct FieldEvent {
    /// The path the listener subscribed to.
    pub path: Path,
    /// Current value at `path`, if any.
    pub value: Option<Value>,
    /// Snapshot of the whole store at flush time.
    pub values: Arc<Value>,
    /// What changed.
    pub mask: ChangeMask,
}

/// Options for [`crate::Form::subscribe_field`].
#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    /// Categories to hear about.
    pub mask: ChangeMask,
    /// Also hear about changes anywhere beneath the path.
    pub include_children: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            mask: ChangeMask::ALL,
            include_children: false,
        }
    }
}

impl SubscribeOptions {
    pub fn mask(mask: ChangeMask) -> Self {
        Self {
            mask,
            ..Self::default()
        }
    }

    pub fn with_children(mut self) -> Self {
        self.include_children = true;
        self
    }
}

/// Identity of a registered listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ListenerKey {
    id: u64,
    path: Path,
    prefix: bool,
}

struct ListenerEntry {
    id: u64,
    mask: ChangeMask,
    callback: Listener,
}

/// A listener call ready to be made once the state lock is released.
pub(crate) struct Delivery {
    pub(crate) callback: Listener,
    pub(crate) event: FieldEvent,
}

impl Delivery {
    pub(crate) fn deliver(self) {
        (self.callback)(&self.event);
    }
}

/// Exact listeners keyed by path, and prefix listeners in registration order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    exact: BTreeMap<Path, Vec<ListenerEntry>>,
    prefix: Vec<(Path, Vec<ListenerEntry>)>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("exact", &self.exact.keys().collect::<Vec<_>>())
            .field(
                "prefix",
                &self.prefix.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ListenerRegistry {
    pub(crate) fn add(
        &mut self,
        path: Path,
        options: SubscribeOptions,
        callback: Listener,
    ) -> ListenerKey {
        self.next_id += 1;
        let entry = ListenerEntry {
            id: self.next_id,
            mask: options.mask,
            callback,
        };
        let key = ListenerKey {
            id: self.next_id,
            path: path.clone(),
            prefix: options.include_children,
        };
        if options.include_children {
            match self.prefix.iter_mut().find(|(p, _)| *p == path) {
                Some((_, bucket)) => bucket.push(entry),
                None => self.prefix.push((path, vec![entry])),
            }
        } else {
            self.exact.entry(path).or_default().push(entry);
        }
        key
    }

    /// Remove one listener. Empty buckets are dropped.
    pub(crate) fn remove(&mut self, key: &ListenerKey) -> bool {
        if key.prefix {
            let Some(pos) = self.prefix.iter().position(|(p, _)| *p == key.path) else {
                return false;
            };
            let bucket = &mut self.prefix[pos].1;
            let before = bucket.len();
            bucket.retain(|e| e.id != key.id);
            let removed = bucket.len() != before;
            if bucket.is_empty() {
                self.prefix.remove(pos);
            }
            removed
        } else {
            let Some(bucket) = self.exact.get_mut(&key.path) else {
                return false;
            };
            let before = bucket.len();
            bucket.retain(|e| e.id != key.id);
            let removed = bucket.len() != before;
            if bucket.is_empty() {
                self.exact.remove(&key.path);
            }
            removed
        }
    }

    pub(crate) fn clear(&mut self) {
        self.exact.clear();
        self.prefix.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.exact.values().map(Vec::len).sum::<usize>()
            + self.prefix.iter().map(|(_, b)| b.len()).sum::<usize>()
    }

    /// Turn drained pending changes into listener calls.
    ///
    /// Exact listeners fire once per pending path whose mask they want.
    /// Prefix listeners fire once per flush with the OR of every pending
    /// mask at or beneath their prefix. A pending "everything" entry fires
    /// every listener with [`ChangeMask::ALL`].
    pub(crate) fn plan(&self, pending: PendingChanges, values: &Arc<Value>) -> Vec<Delivery> {
        let entries = pending.into_entries();
        let mut out = Vec::new();
        if entries.is_empty() {
            return out;
        }

        if entries.iter().any(|(k, _)| *k == PendingKey::All) {
            for (path, bucket) in &self.exact {
                push_bucket(&mut out, path, bucket, ChangeMask::ALL, values);
            }
            for (path, bucket) in &self.prefix {
                push_bucket(&mut out, path, bucket, ChangeMask::ALL, values);
            }
            return out;
        }

        for (key, mask) in &entries {
            let PendingKey::Path(path) = key else {
                continue;
            };
            if let Some(bucket) = self.exact.get(path) {
                push_bucket(&mut out, path, bucket, *mask, values);
            }
        }

        for (prefix, bucket) in &self.prefix {
            let combined = entries
                .iter()
                .filter_map(|(key, mask)| match key {
                    PendingKey::Path(p) if p.is_under(prefix) => Some(*mask),
                    _ => None,
                })
                .fold(ChangeMask::empty(), |acc, m| acc | m);
            if !combined.is_empty() {
                push_bucket(&mut out, prefix, bucket, combined, values);
            }
        }
        out
    }
}

fn push_bucket(
    out: &mut Vec<Delivery>,
    path: &Path,
    bucket: &[ListenerEntry],
    mask: ChangeMask,
    values: &Arc<Value>,
) {
    let wanted: Vec<&ListenerEntry> = bucket.iter().filter(|e| e.mask.wants(mask)).collect();
    if wanted.is_empty() {
        return;
    }
    let value = value_at(values, path);
    for entry in wanted {
        out.push(Delivery {
            callback: entry.callback.clone(),
            event: FieldEvent {
                path: path.clone(),
                value: value.clone(),
                values: values.clone(),
                mask,
            },
        });
    }
}

pub(crate) fn value_at(values: &Value, path: &Path) -> Option<Value> {
    if path.is_empty() {
        Some(values.clone())
    } else {
        get(values, path).cloned()
    }
}
