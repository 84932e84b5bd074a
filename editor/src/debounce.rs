//! Cell edit debouncing.
//!
//! Keystrokes in a cell coalesce into one history commit. Each input (re)arms a quiescence timer;
//! when it fires, the pending value is committed through [`EditorSession::edit_cell`]. Losing focus
//! commits immediately and cancels the timer, and starting to edit another cell commits the
//! previous cell first.
//!
//! Timers are tokio tasks, so [`CellEditBuffer::on_input`] must be called from within a runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::EDIT_DEBOUNCE;
use crate::dataset::Cell;
use crate::error::TransformFailure;
use crate::session::EditorSession;

#[derive(Debug, Clone, PartialEq)]
struct PendingEdit {
    row: usize,
    column: String,
    value: Cell,
}

#[derive(Debug, Default)]
struct Pending {
    edit: Option<PendingEdit>,
    /// Bumped on every input so a stale timer can tell it lost the race.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl Pending {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn commit(session: &EditorSession, edit: PendingEdit) -> Result<bool, TransformFailure> {
    let committed = session.edit_cell(edit.row, &edit.column, edit.value)?;
    if committed {
        log::debug!("Committed edit of row {} column '{}'", edit.row, edit.column);
    }
    Ok(committed)
}

#[derive(Debug)]
pub struct CellEditBuffer {
    session: Arc<EditorSession>,
    window: Duration,
    pending: Arc<Mutex<Pending>>,
}

impl CellEditBuffer {
    pub fn new(session: Arc<EditorSession>) -> Self {
        Self::with_window(session, EDIT_DEBOUNCE)
    }

    pub fn with_window(session: Arc<EditorSession>, window: Duration) -> Self {
        Self {
            session,
            window,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// The cell with an uncommitted value, if any.
    pub fn pending_cell(&self) -> Option<(usize, String)> {
        lock(&self.pending)
            .edit
            .as_ref()
            .map(|e| (e.row, e.column.clone()))
    }

    /// Record the latest value typed into a cell.
    pub fn on_input(&self, row: usize, column: &str, value: Cell) -> Result<(), TransformFailure> {
        let mut pending = lock(&self.pending);

        let other_cell = pending
            .edit
            .as_ref()
            .is_some_and(|e| e.row != row || e.column != column);
        if other_cell {
            pending.cancel_timer();
            if let Some(previous) = pending.edit.take() {
                commit(&self.session, previous)?;
            }
        }

        pending.edit = Some(PendingEdit {
            row,
            column: column.to_string(),
            value,
        });
        pending.generation += 1;
        pending.cancel_timer();

        let generation = pending.generation;
        let window = self.window;
        let shared = Arc::clone(&self.pending);
        let session = Arc::clone(&self.session);
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let edit = {
                let mut pending = lock(&shared);
                if pending.generation != generation {
                    return;
                }
                pending.timer = None;
                pending.edit.take()
            };
            if let Some(edit) = edit {
                if let Err(e) = commit(&session, edit) {
                    log::warn!("Dropped a debounced cell edit: {}", e);
                }
            }
        }));
        Ok(())
    }

    /// The cell lost focus: commit now.
    pub fn on_blur(&self) -> Result<bool, TransformFailure> {
        self.flush()
    }

    /// Commit whatever is pending. Returns whether a version was committed.
    pub fn flush(&self) -> Result<bool, TransformFailure> {
        let edit = {
            let mut pending = lock(&self.pending);
            pending.cancel_timer();
            pending.generation += 1;
            pending.edit.take()
        };
        match edit {
            Some(edit) => commit(&self.session, edit),
            None => Ok(false),
        }
    }
}

impl Drop for CellEditBuffer {
    fn drop(&mut self) {
        lock(&self.pending).cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Dataset, Row};
    use crate::runtime::EngineRuntime;

    fn session() -> Arc<EditorSession> {
        let session = EditorSession::new(Arc::new(EngineRuntime::default()));
        session.load(
            Dataset::from_rows(vec![Row::from_iter([
                ("name", Cell::from("Bob")),
                ("city", Cell::from("NYC")),
            ])])
            .unwrap(),
        );
        Arc::new(session)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_coalesce() {
        let session = session();
        let buffer = CellEditBuffer::new(Arc::clone(&session));
        for value in ["R", "Ro", "Rob"] {
            buffer.on_input(0, "name", Cell::from(value)).unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(session.history_len(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.current().cell(0, "name"), Some(&Cell::from("Rob")));
        assert!(buffer.pending_cell().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blur_commits_immediately() {
        let session = session();
        let buffer = CellEditBuffer::new(Arc::clone(&session));
        buffer.on_input(0, "city", Cell::from("LA")).unwrap();
        assert!(buffer.on_blur().unwrap());
        assert_eq!(session.history_len(), 2);

        // the cancelled timer never commits a second time
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(session.history_len(), 2);
        assert!(!buffer.flush().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_cells_flushes_previous() {
        let session = session();
        let buffer = CellEditBuffer::new(Arc::clone(&session));
        buffer.on_input(0, "name", Cell::from("Rob")).unwrap();
        buffer.on_input(0, "city", Cell::from("LA")).unwrap();
        assert_eq!(session.history_len(), 2);
        assert_eq!(buffer.pending_cell(), Some((0, "city".to_string())));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(session.history_len(), 3);
        assert_eq!(session.current().cell(0, "city"), Some(&Cell::from("LA")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_value_commits_nothing() {
        let session = session();
        let buffer = CellEditBuffer::new(Arc::clone(&session));
        buffer.on_input(0, "name", Cell::from("Bob")).unwrap();
        assert!(!buffer.on_blur().unwrap());
        assert_eq!(session.history_len(), 1);
    }
}
