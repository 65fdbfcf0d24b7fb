//! Transaction bookkeeping for batched notifications.
//!
//! While a transaction is open, enqueued changes go to a private buffer. The
//! buffer joins the pending queue when the outermost transaction commits and
//! is discarded on rollback. Store mutations are never reverted.

use crate::mask::ChangeMask;
use crate::scheduler::{PendingChanges, PendingKey};

#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    depth: usize,
    buffer: PendingChanges,
}

impl TransactionState {
    pub(crate) fn is_open(&self) -> bool {
        self.depth > 0
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn begin(&mut self) {
        self.depth += 1;
    }

    /// Close one level. Returns the buffered changes when the outermost
    /// level closes.
    pub(crate) fn commit(&mut self) -> Option<PendingChanges> {
        if self.depth == 0 {
            return None;
        }
        self.depth -= 1;
        if self.depth == 0 && !self.buffer.is_empty() {
            Some(self.buffer.take())
        } else {
            None
        }
    }

    /// Drop every buffered change and close all levels.
    pub(crate) fn rollback(&mut self) {
        self.buffer.clear();
        self.depth = 0;
    }

    pub(crate) fn buffer(&mut self, key: PendingKey, mask: ChangeMask) {
        self.buffer.mark(key, mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formstate_tree::Path;

    #[test]
    fn test_nested_commit_releases_at_outermost() {
        let mut tx = TransactionState::default();
        tx.begin();
        tx.begin();
        tx.buffer(PendingKey::Path(Path::from("a")), ChangeMask::VALUE);
        assert!(tx.commit().is_none());
        let released = tx.commit().expect("outermost commit releases buffer");
        assert_eq!(released.len(), 1);
        assert!(!tx.is_open());
    }

    #[test]
    fn test_rollback_discards_and_resets_depth() {
        let mut tx = TransactionState::default();
        tx.begin();
        tx.begin();
        tx.buffer(PendingKey::All, ChangeMask::ALL);
        tx.rollback();
        assert_eq!(tx.depth(), 0);
        assert!(tx.commit().is_none());
    }

    #[test]
    fn test_commit_without_begin_is_noop() {
        let mut tx = TransactionState::default();
        assert!(tx.commit().is_none());
        assert_eq!(tx.depth(), 0);
    }
}
