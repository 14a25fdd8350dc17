//! Bounded, linear undo/redo history.
//!
//! Snapshots are opaque values.  The manager only clones them in and out and
//! never looks inside.

use std::collections::VecDeque;

use tracing::debug;

/// Default number of snapshots kept.
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Sliding-window undo/redo stack.
#[derive(Debug, Clone)]
pub struct HistoryManager<S: Clone> {
    entries: VecDeque<S>,
    /// Index of the current snapshot, `None` while empty.
    cursor: Option<usize>,
    max_size: usize,
}

impl<S: Clone> HistoryManager<S> {
    /// Create a history holding at most `max_size` snapshots (minimum 1).
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: VecDeque::with_capacity(max_size.min(DEFAULT_HISTORY_SIZE)),
            cursor: None,
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Push a snapshot, discarding any redo tail first.
    ///
    /// When the window is full the oldest snapshot is evicted and the cursor
    /// stays where it is (it already points at the new tail).
    pub fn snapshot(&mut self, state: &S) {
        if let Some(cursor) = self.cursor {
            self.entries.truncate(cursor + 1);
        }
        self.entries.push_back(state.clone());

        if self.entries.len() > self.max_size {
            self.entries.pop_front();
        } else {
            self.cursor = Some(self.cursor.map_or(0, |c| c + 1));
        }
        debug!(len = self.entries.len(), cursor = ?self.cursor, "history snapshot");
    }

    /// Step back.  `None` means there is nothing to undo.
    pub fn undo(&mut self) -> Option<S> {
        let cursor = self.cursor.filter(|&c| c > 0)?;
        self.cursor = Some(cursor - 1);
        self.entries.get(cursor - 1).cloned()
    }

    /// Step forward.  `None` means there is nothing to redo.
    pub fn redo(&mut self) -> Option<S> {
        let cursor = self.cursor.filter(|&c| c + 1 < self.entries.len())?;
        self.cursor = Some(cursor + 1);
        self.entries.get(cursor + 1).cloned()
    }

    /// The snapshot at the cursor.
    pub fn current(&self) -> Option<S> {
        self.cursor.and_then(|c| self.entries.get(c)).cloned()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.entries.len())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the cursor, if any.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }
}

impl<S: Clone> Default for HistoryManager<S> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_history_has_sentinels() {
        let mut h: HistoryManager<u32> = HistoryManager::default();
        assert!(h.is_empty());
        assert_eq!(h.current(), None);
        assert_eq!(h.undo(), None);
        assert_eq!(h.redo(), None);
        assert!(!h.can_undo());
        assert!(!h.can_redo());
    }

    #[test]
    fn undo_then_redo_returns_to_same_state() {
        let mut h = HistoryManager::new(10);
        for s in 1..=3 {
            h.snapshot(&s);
        }
        assert_eq!(h.current(), Some(3));
        assert_eq!(h.undo(), Some(2));
        assert_eq!(h.redo(), Some(3));
        assert_eq!(h.redo(), None);
        assert_eq!(h.current(), Some(3));
    }

    #[test]
    fn undo_stops_at_first_entry() {
        let mut h = HistoryManager::new(10);
        h.snapshot(&"a");
        h.snapshot(&"b");
        assert_eq!(h.undo(), Some("a"));
        assert_eq!(h.undo(), None);
        assert_eq!(h.current(), Some("a"));
    }

    #[test]
    fn snapshot_after_undo_drops_redo_tail() {
        let mut h = HistoryManager::new(10);
        for s in ["a", "b", "c"] {
            h.snapshot(&s);
        }
        h.undo();
        h.undo();
        h.snapshot(&"d");
        assert_eq!(h.len(), 2);
        assert!(!h.can_redo());
        assert_eq!(h.undo(), Some("a"));
        assert_eq!(h.redo(), Some("d"));
    }

    #[test]
    fn full_window_evicts_oldest() {
        let mut h = HistoryManager::new(3);
        for s in 1..=4 {
            h.snapshot(&s);
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.cursor(), Some(2));
        assert_eq!(h.current(), Some(4));
        assert_eq!(h.undo(), Some(3));
        assert_eq!(h.undo(), Some(2));
        assert_eq!(h.undo(), None);
    }

    #[test]
    fn zero_size_is_clamped() {
        let mut h = HistoryManager::new(0);
        h.snapshot(&1);
        h.snapshot(&2);
        assert_eq!(h.max_size(), 1);
        assert_eq!(h.len(), 1);
        assert_eq!(h.current(), Some(2));
    }

    #[test]
    fn clear_resets_cursor() {
        let mut h = HistoryManager::new(5);
        h.snapshot(&1);
        h.clear();
        assert_eq!(h.cursor(), None);
        assert_eq!(h.current(), None);
    }

    proptest! {
        #[test]
        fn first_snapshot_unreachable_after_overflow(max in 1usize..20) {
            let mut h = HistoryManager::new(max);
            for s in 0..=max {
                h.snapshot(&s);
            }
            prop_assert_eq!(h.len(), max);

            let mut seen = vec![h.current()];
            while let Some(s) = h.undo() {
                seen.push(Some(s));
            }
            prop_assert!(!seen.contains(&Some(0)));
        }

        #[test]
        fn redo_undoes_undo(pushes in 2usize..15, undos in 1usize..5) {
            let mut h = HistoryManager::new(50);
            for s in 0..pushes {
                h.snapshot(&s);
            }
            for _ in 0..undos.min(pushes - 1) {
                h.undo();
            }
            let before = h.current();
            if h.undo().is_some() {
                prop_assert_eq!(h.redo(), before);
            }
        }
    }
}
