//! Editor session - the context object one open document works through.
//!
//! A session owns the [`VersionedStore`] of its document, shares the process-wide
//! [`EngineRuntime`] and optionally talks to a model service. Transformation requests are
//! serialized by an in-flight guard; a transformation whose input went stale while it ran is
//! discarded as [`TransformFailure::Superseded`] instead of being committed.
//!
//! The store lock is a plain mutex and is never held across an `.await`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::dataset::{Cell, Dataset, Position, Row};
use crate::error::TransformFailure;
use crate::executor;
use crate::history::VersionedStore;
use crate::runtime::EngineRuntime;
use crate::services::model::{ModelServiceClient, Suggestion};

/// Result of [`EditorSession::request_and_apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The model produced a snippet and it was committed.
    Applied { snippet: String, rows: usize },
    /// The model answered with text instead of code; nothing changed.
    Message(String),
}

/// Clears the in-flight flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, TransformFailure> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| InFlight(flag))
            .map_err(|_| TransformFailure::RequestInFlight)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct EditorSession {
    store: Mutex<VersionedStore>,
    runtime: Arc<EngineRuntime>,
    model: Option<ModelServiceClient>,
    in_flight: AtomicBool,
}

impl EditorSession {
    pub fn new(runtime: Arc<EngineRuntime>) -> Self {
        Self {
            store: Mutex::new(VersionedStore::default()),
            runtime,
            model: None,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Attach a model service for [`request_transform`](Self::request_transform).
    pub fn with_model(mut self, model: ModelServiceClient) -> Self {
        self.model = Some(model);
        self
    }

    /// Replace the store with an empty one bounded to `max_history` entries.
    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.store = Mutex::new(VersionedStore::new(max_history));
        self
    }

    fn store(&self) -> MutexGuard<'_, VersionedStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn runtime(&self) -> &Arc<EngineRuntime> {
        &self.runtime
    }

    pub fn model(&self) -> Option<&ModelServiceClient> {
        self.model.as_ref()
    }

    /// Whether a transformation request is running.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Start a new history from `dataset`.
    pub fn load(&self, dataset: Dataset) {
        log::info!(
            "Loaded {} rows x {} columns",
            dataset.len(),
            dataset.columns().len()
        );
        self.store().load(dataset);
    }

    /// Snapshot of the visible dataset.
    pub fn current(&self) -> Dataset {
        self.store().current().clone()
    }

    pub fn previous(&self) -> Option<Dataset> {
        self.store().previous().cloned()
    }

    pub fn undo(&self) -> bool {
        self.store().undo()
    }

    pub fn redo(&self) -> bool {
        self.store().redo()
    }

    pub fn can_undo(&self) -> bool {
        self.store().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.store().can_redo()
    }

    pub fn history_len(&self) -> usize {
        self.store().len()
    }

    pub fn revision(&self) -> u64 {
        self.store().revision()
    }

    // =========================================================================
    // Transformations
    // =========================================================================

    /// Ask the model service what to do for `instruction`.
    pub async fn request_transform(&self, instruction: &str) -> Result<Suggestion, TransformFailure> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        self.suggest(instruction).await
    }

    /// Run `snippet` against the current dataset and commit the result.
    ///
    /// Returns the committed dataset. On any failure the history is unchanged.
    pub async fn apply(&self, snippet: &str) -> Result<Dataset, TransformFailure> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        self.run(snippet).await
    }

    /// Ask the model and, when it answers with code, apply it.
    pub async fn request_and_apply(&self, instruction: &str) -> Result<Outcome, TransformFailure> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        match self.suggest(instruction).await? {
            Suggestion::Snippet(snippet) => {
                let result = self.run(&snippet).await?;
                Ok(Outcome::Applied {
                    snippet,
                    rows: result.len(),
                })
            }
            Suggestion::Message(text) => Ok(Outcome::Message(text)),
        }
    }

    async fn suggest(&self, instruction: &str) -> Result<Suggestion, TransformFailure> {
        let model = self.model.as_ref().ok_or_else(|| {
            TransformFailure::NetworkError("no model service configured".to_string())
        })?;
        let snapshot = self.current();
        let suggestion = model.suggest(&snapshot, instruction).await?;
        log::debug!("Model suggestion: {:?}", suggestion);
        Ok(suggestion)
    }

    async fn run(&self, snippet: &str) -> Result<Dataset, TransformFailure> {
        let (snapshot, revision) = {
            let store = self.store();
            (store.current().clone(), store.revision())
        };

        let result = executor::apply(&self.runtime, snippet, &snapshot).await?;

        let mut store = self.store();
        if store.revision() != revision {
            log::warn!("Discarding a transformation whose input changed while it ran");
            return Err(TransformFailure::Superseded);
        }
        store.commit(result.clone());
        Ok(result)
    }

    // =========================================================================
    // Direct edits
    // =========================================================================

    /// Apply `edit` to a copy of the current dataset and commit it if it changed anything.
    fn edit<T>(
        &self,
        edit: impl FnOnce(&mut Dataset) -> Result<(T, bool), TransformFailure>,
    ) -> Result<T, TransformFailure> {
        let mut store = self.store();
        let mut next = store.current().clone();
        let (value, changed) = edit(&mut next)?;
        if changed {
            store.commit(next);
        }
        Ok(value)
    }

    /// Set one cell. Returns whether a version was committed.
    pub fn edit_cell(&self, row: usize, column: &str, value: Cell) -> Result<bool, TransformFailure> {
        self.edit(|data| {
            let changed = data.set_cell(row, column, value)?;
            Ok((changed, changed))
        })
    }

    /// Insert an empty row. Returns its index.
    pub fn insert_row(&self, position: Position) -> Result<usize, TransformFailure> {
        self.edit(|data| Ok((data.insert_row(position)?, true)))
    }

    pub fn remove_row(&self, index: usize) -> Result<Row, TransformFailure> {
        self.edit(|data| Ok((data.remove_row(index)?, true)))
    }

    pub fn add_column(&self, name: &str, position: Position) -> Result<(), TransformFailure> {
        self.edit(|data| Ok((data.add_column(name, position)?, true)))
    }

    pub fn remove_column(&self, name: &str) -> Result<(), TransformFailure> {
        self.edit(|data| Ok((data.remove_column(name)?, true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, ExecutionLimits};
    use crate::error::ErrorKind;
    use crate::runtime::{EngineLoader, LoadError};
    use async_trait::async_trait;
    use std::time::Duration;

    fn people() -> Dataset {
        Dataset::from_rows(vec![
            Row::from_iter([("name", Cell::from("Bob")), ("age", Cell::from("30"))]),
            Row::from_iter([("name", Cell::from("Amy")), ("age", Cell::from(""))]),
        ])
        .unwrap()
    }

    fn session() -> EditorSession {
        let session = EditorSession::new(Arc::new(EngineRuntime::default()));
        session.load(people());
        session
    }

    struct SlowLoader;

    #[async_trait]
    impl EngineLoader for SlowLoader {
        async fn load(&self) -> Result<Engine, LoadError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Engine::with_standard_library(ExecutionLimits::default()))
        }
    }

    fn slow_session() -> Arc<EditorSession> {
        let session = EditorSession::new(Arc::new(EngineRuntime::new(SlowLoader)));
        session.load(people());
        Arc::new(session)
    }

    #[tokio::test]
    async fn test_apply_commits() {
        let session = session();
        let out = session.apply("df = df.dropna(subset=['age'])").await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(session.current(), out);
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.previous(), Some(people()));

        assert!(session.undo());
        assert_eq!(session.current(), people());
        assert!(session.redo());
        assert_eq!(session.current(), out);
    }

    #[tokio::test]
    async fn test_failures_leave_history_unchanged() {
        let session = session();
        for snippet in ["import os\ndf = df", "df = df['missing']", "df = df['name']"] {
            assert!(session.apply(snippet).await.is_err());
        }
        assert_eq!(session.history_len(), 1);
        assert_eq!(session.current(), people());
        assert!(!session.can_undo());
    }

    #[tokio::test]
    async fn test_apply_on_empty_session_is_no_data() {
        let session = EditorSession::new(Arc::new(EngineRuntime::default()));
        let err = session.apply("df = df.dropna()").await.unwrap_err();
        assert_eq!(err, TransformFailure::NoData);
    }

    #[tokio::test]
    async fn test_overlapping_requests_are_rejected() {
        let session = slow_session();
        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.apply("df = df.dropna()").await })
        };
        tokio::task::yield_now().await;
        assert!(session.is_busy());

        let err = session.apply("df = df.head(1)").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestInFlight);

        assert!(first.await.unwrap().is_ok());
        assert!(!session.is_busy());
        assert!(session.apply("df = df.head(1)").await.is_ok());
    }

    #[tokio::test]
    async fn test_edit_during_apply_supersedes_it() {
        let session = slow_session();
        let pending = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.apply("df = df.dropna()").await })
        };
        tokio::task::yield_now().await;

        assert!(session.edit_cell(0, "name", Cell::from("Rob")).unwrap());
        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err, TransformFailure::Superseded);
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.current().cell(0, "name"), Some(&Cell::from("Rob")));
    }

    #[test]
    fn test_unchanged_cell_edit_is_not_committed() {
        let session = session();
        assert!(!session.edit_cell(0, "name", Cell::from("Bob")).unwrap());
        assert_eq!(session.history_len(), 1);
        assert!(session.edit_cell(0, "name", Cell::from("Rob")).unwrap());
        assert_eq!(session.history_len(), 2);
    }

    #[test]
    fn test_structural_edits() {
        let session = session();
        assert_eq!(session.insert_row(Position::Start).unwrap(), 0);
        assert_eq!(session.current().len(), 3);
        session.add_column("city", Position::End).unwrap();
        assert_eq!(session.current().columns(), vec!["name", "age", "city"]);
        session.remove_column("age").unwrap();
        let removed = session.remove_row(0).unwrap();
        assert_eq!(removed.get("name"), Some(&Cell::from("")));
        assert_eq!(session.history_len(), 5);

        let err = session.remove_column("age").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEdit);
        assert_eq!(session.history_len(), 5);
    }

    #[tokio::test]
    async fn test_request_without_model_is_network_error() {
        let session = session();
        let err = session.request_transform("drop empty ages").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert!(!session.is_busy());
    }
}
