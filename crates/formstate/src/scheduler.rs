//! Pending change bookkeeping.
//!
//! Changes are not delivered when they happen. They accumulate here, keyed
//! by path with masks OR-combined, and are drained by a flush.

use crate::mask::ChangeMask;
use formstate_tree::Path;
use std::collections::HashMap;

/// Key of a pending notification.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum PendingKey {
    /// "Everything changed"; every listener hears [`ChangeMask::ALL`].
    All,
    Path(Path),
}

/// Insertion-ordered map of pending changes.
#[derive(Debug, Default)]
pub(crate) struct PendingChanges {
    order: Vec<PendingKey>,
    masks: HashMap<PendingKey, ChangeMask>,
}

impl PendingChanges {
    pub(crate) fn mark(&mut self, key: PendingKey, mask: ChangeMask) {
        if mask.is_empty() {
            return;
        }
        match self.masks.get_mut(&key) {
            Some(existing) => *existing |= mask,
            None => {
                self.order.push(key.clone());
                self.masks.insert(key, mask);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn mark_path(&mut self, path: &Path, mask: ChangeMask) {
        self.mark(PendingKey::Path(path.clone()), mask);
    }

    pub(crate) fn merge(&mut self, other: PendingChanges) {
        for (key, mask) in other.into_entries() {
            self.mark(key, mask);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.masks.clear();
    }

    pub(crate) fn take(&mut self) -> PendingChanges {
        std::mem::take(self)
    }

    pub(crate) fn into_entries(mut self) -> Vec<(PendingKey, ChangeMask)> {
        let masks = &mut self.masks;
        self.order
            .drain(..)
            .filter_map(|key| masks.remove(&key).map(|mask| (key, mask)))
            .collect()
    }
}

/// Pending queue plus the "a flush is already on its way" flag.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    pub(crate) pending: PendingChanges,
    scheduled: bool,
}

impl Scheduler {
    /// Claim the right to schedule a flush. Returns `false` if one is
    /// already scheduled or nothing is pending.
    pub(crate) fn claim(&mut self) -> bool {
        if self.scheduled || self.pending.is_empty() {
            return false;
        }
        self.scheduled = true;
        true
    }

    /// Give up a claim whose flush will never run.
    pub(crate) fn release(&mut self) {
        self.scheduled = false;
    }

    /// Take everything pending and clear the scheduled flag.
    pub(crate) fn drain(&mut self) -> PendingChanges {
        self.scheduled = false;
        self.pending.take()
    }
}
