//! Versioned State Store
//!
//! Holds the current dataset and a bounded undo/redo history of snapshots. Committing while the
//! cursor is behind the newest entry prunes the redo branch first. When the history overflows,
//! the oldest entry is evicted and the cursor shifts so it still points at the same snapshot.

use crate::config::MAX_HISTORY;
use crate::dataset::Dataset;

#[derive(Debug, Clone)]
pub struct VersionedStore {
    history: Vec<Dataset>,
    /// `None` only while the history is empty.
    cursor: Option<usize>,
    current: Dataset,
    max_history: usize,
    /// Bumped by every commit, load, undo and redo.
    revision: u64,
}

impl Default for VersionedStore {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}

impl VersionedStore {
    /// An empty store keeping at most `max_history` snapshots (at least one).
    pub fn new(max_history: usize) -> Self {
        Self {
            history: Vec::new(),
            cursor: None,
            current: Dataset::new(),
            max_history: max_history.max(1),
            revision: 0,
        }
    }

    /// Reset the history to a single snapshot of `dataset`.
    pub fn load(&mut self, dataset: Dataset) {
        self.history = vec![dataset.clone()];
        self.cursor = Some(0);
        self.current = dataset;
        self.revision += 1;
    }

    /// Make `dataset` the current version.
    pub fn commit(&mut self, dataset: Dataset) {
        if let Some(cursor) = self.cursor {
            self.history.truncate(cursor + 1);
        }
        self.history.push(dataset.clone());

        if self.history.len() > self.max_history {
            // evicting the oldest entry shifts the new one onto the old cursor
            self.history.remove(0);
        } else {
            self.cursor = Some(self.cursor.map_or(0, |c| c + 1));
        }
        self.current = dataset;
        self.revision += 1;
        log::debug!(
            "Committed version {} ({} rows, history {}/{})",
            self.revision,
            self.current.len(),
            self.history.len(),
            self.max_history
        );
    }

    /// Step back one version. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.cursor {
            Some(c) if c > 0 => self.move_to(c - 1),
            _ => false,
        }
    }

    /// Step forward one version. Returns false when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        match self.cursor {
            Some(c) if c + 1 < self.history.len() => self.move_to(c + 1),
            _ => false,
        }
    }

    fn move_to(&mut self, cursor: usize) -> bool {
        let Some(snapshot) = self.history.get(cursor) else {
            return false;
        };
        self.current = snapshot.clone();
        self.cursor = Some(cursor);
        self.revision += 1;
        true
    }

    /// The visible dataset.
    pub fn current(&self) -> &Dataset {
        &self.current
    }

    /// The snapshot before the current one, if any.
    pub fn previous(&self) -> Option<&Dataset> {
        self.cursor
            .and_then(|c| c.checked_sub(1))
            .and_then(|c| self.history.get(c))
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.history.len())
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Changes whenever the current version changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Cell, Row};

    fn table(tag: &str) -> Dataset {
        Dataset::from_rows(vec![Row::from_iter([("v", Cell::from(tag))])]).unwrap()
    }

    #[test]
    fn test_commit_undo_redo_branch() {
        let mut store = VersionedStore::default();
        store.load(table("d0"));
        assert_eq!(store.cursor(), Some(0));

        store.commit(table("d1"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.cursor(), Some(1));

        assert!(store.undo());
        assert_eq!(store.current(), &table("d0"));
        assert_eq!(store.cursor(), Some(0));

        assert!(store.redo());
        assert_eq!(store.current(), &table("d1"));
        assert_eq!(store.cursor(), Some(1));

        assert!(store.undo());
        store.commit(table("d2"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.cursor(), Some(1));
        assert_eq!(store.current(), &table("d2"));
        assert_eq!(store.previous(), Some(&table("d0")));
        assert!(!store.redo());
    }

    #[test]
    fn test_undo_redo_at_the_edges_are_no_ops() {
        let mut store = VersionedStore::default();
        assert!(!store.undo());
        assert!(!store.redo());
        assert_eq!(store.cursor(), None);

        store.load(table("d0"));
        assert!(!store.undo());
        assert!(!store.redo());
        assert!(!store.can_undo());
        assert!(!store.can_redo());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut store = VersionedStore::new(MAX_HISTORY);
        for i in 0..=MAX_HISTORY {
            store.commit(table(&i.to_string()));
        }
        assert_eq!(store.len(), MAX_HISTORY);
        assert_eq!(store.cursor(), Some(MAX_HISTORY - 1));
        assert_eq!(store.current(), &table(&MAX_HISTORY.to_string()));

        // the oldest entry was evicted
        while store.undo() {}
        assert_eq!(store.current(), &table("1"));
    }

    #[test]
    fn test_first_commit_on_empty_store() {
        let mut store = VersionedStore::new(3);
        store.commit(table("a"));
        assert_eq!(store.cursor(), Some(0));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_revision_tracks_changes() {
        let mut store = VersionedStore::default();
        let r0 = store.revision();
        store.load(table("a"));
        store.commit(table("b"));
        assert!(store.revision() > r0);
        let r1 = store.revision();
        assert!(!store.redo());
        assert_eq!(store.revision(), r1);
    }
}
