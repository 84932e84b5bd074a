//! Interpreter lifecycle manager.
//!
//! The engine is created lazily, on the first transformation request, and lives for the rest of
//! the process. Its readiness is a four-state machine published on a `tokio::sync::watch`
//! channel:
//!
//! ```text
//! Uninitialized ──ensure_ready──▶ Initializing ──ok──▶ Ready
//!                                      │
//!        Failed ◀────────────err───────┘
//!        Failed ──ensure_ready──▶ Initializing
//! ```
//!
//! Leaving `Uninitialized`/`Failed` is a compare-and-set on the channel, so at most one bootstrap
//! runs at a time. Every other caller waits for the state to leave `Initializing` and reports the
//! same outcome.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::engine::{Engine, ExecutionLimits};

/// Readiness of the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// Bootstrap failure reported by an [`EngineLoader`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct LoadError(pub String);

/// Builds the engine. Implementations may do slow work (fetching, warming caches).
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<Engine, LoadError>;
}

/// Default loader: the standard library (`pd`, `np`, builtins) under the given limits.
#[derive(Debug, Clone, Default)]
pub struct StandardLibraryLoader {
    limits: ExecutionLimits,
}

impl StandardLibraryLoader {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl EngineLoader for StandardLibraryLoader {
    async fn load(&self) -> Result<Engine, LoadError> {
        Ok(Engine::with_standard_library(self.limits))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of the process-wide engine handle and its readiness state.
pub struct EngineRuntime {
    state: watch::Sender<EngineState>,
    engine: Mutex<Option<Arc<Engine>>>,
    loader: Box<dyn EngineLoader>,
    last_error: Mutex<Option<String>>,
    attempts: AtomicUsize,
    executions: AtomicUsize,
}

impl Default for EngineRuntime {
    fn default() -> Self {
        Self::new(StandardLibraryLoader::default())
    }
}

impl std::fmt::Debug for EngineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRuntime")
            .field("state", &self.state())
            .field("attempts", &self.bootstrap_attempts())
            .finish()
    }
}

/// Puts the state back to `Failed` if a bootstrap future is dropped before it finishes.
struct BootstrapGuard<'a> {
    state: &'a watch::Sender<EngineState>,
    finished: bool,
}

impl Drop for BootstrapGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("engine bootstrap was cancelled");
            self.state.send_replace(EngineState::Failed);
        }
    }
}

impl EngineRuntime {
    pub fn new(loader: impl EngineLoader + 'static) -> Self {
        let (state, _) = watch::channel(EngineState::Uninitialized);
        Self {
            state,
            engine: Mutex::new(None),
            loader: Box::new(loader),
            last_error: Mutex::new(None),
            attempts: AtomicUsize::new(0),
            executions: AtomicUsize::new(0),
        }
    }

    /// Runtime with the default loader under custom limits.
    pub fn with_limits(limits: ExecutionLimits) -> Self {
        Self::new(StandardLibraryLoader::new(limits))
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Message of the most recent failed bootstrap, cleared by a successful one.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    /// Bootstraps started so far.
    pub fn bootstrap_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Engine handles handed out for execution so far.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// Make sure the engine is ready, bootstrapping it if nobody else is.
    ///
    /// Returns whether the engine is ready. A failure is not sticky: the next call retries.
    pub async fn ensure_ready(&self) -> bool {
        if self.state() == EngineState::Ready {
            return true;
        }

        let mut claimed = false;
        self.state.send_if_modified(|state| match state {
            EngineState::Uninitialized | EngineState::Failed => {
                *state = EngineState::Initializing;
                claimed = true;
                true
            }
            EngineState::Initializing | EngineState::Ready => false,
        });
        if claimed {
            return self.bootstrap().await;
        }

        let mut rx = self.state.subscribe();
        let outcome = match rx.wait_for(|s| *s != EngineState::Initializing).await {
            Ok(state) => *state == EngineState::Ready,
            Err(_) => false,
        };
        outcome
    }

    async fn bootstrap(&self) -> bool {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("Bootstrapping execution engine (attempt {})", attempt);
        let mut guard = BootstrapGuard {
            state: &self.state,
            finished: false,
        };

        let ready = match self.loader.load().await {
            Ok(engine) => {
                *lock(&self.engine) = Some(Arc::new(engine));
                *lock(&self.last_error) = None;
                log::info!("Execution engine ready");
                true
            }
            Err(e) => {
                log::error!("Execution engine bootstrap failed: {}", e);
                *lock(&self.last_error) = Some(e.0);
                false
            }
        };

        guard.finished = true;
        self.state
            .send_replace(if ready { EngineState::Ready } else { EngineState::Failed });
        ready
    }

    /// The engine handle for one execution, when ready.
    pub fn acquire(&self) -> Option<Arc<Engine>> {
        let engine = lock(&self.engine).clone();
        if engine.is_some() {
            self.executions.fetch_add(1, Ordering::SeqCst);
        }
        engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Counts loads; fails the first `failures` of them.
    struct CountingLoader {
        loads: Arc<AtomicUsize>,
        failures: usize,
        delay: Duration,
    }

    #[async_trait]
    impl EngineLoader for CountingLoader {
        async fn load(&self) -> Result<Engine, LoadError> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if n < self.failures {
                return Err(LoadError(format!("network unreachable ({})", n)));
            }
            Ok(Engine::with_standard_library(ExecutionLimits::default()))
        }
    }

    fn runtime(failures: usize) -> (Arc<EngineRuntime>, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let loader = CountingLoader {
            loads: Arc::clone(&loads),
            failures,
            delay: Duration::from_millis(20),
        };
        (Arc::new(EngineRuntime::new(loader)), loads)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_bootstrap() {
        let (runtime, loads) = runtime(0);
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let runtime = Arc::clone(&runtime);
            tasks.spawn(async move { runtime.ensure_ready().await });
        }
        let mut outcomes = Vec::new();
        while let Some(result) = tasks.join_next().await {
            outcomes.push(result.unwrap());
        }
        assert_eq!(outcomes.len(), 16);
        assert!(outcomes.iter().all(|ready| *ready));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.bootstrap_attempts(), 1);
        assert_eq!(runtime.state(), EngineState::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_failure() {
        let (runtime, loads) = runtime(1);
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let runtime = Arc::clone(&runtime);
            tasks.spawn(async move { runtime.ensure_ready().await });
        }
        while let Some(result) = tasks.join_next().await {
            assert!(!result.unwrap());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.state(), EngineState::Failed);
    }

    #[tokio::test]
    async fn test_failure_then_retry() {
        let (runtime, _) = runtime(1);
        assert!(!runtime.ensure_ready().await);
        assert_eq!(runtime.state(), EngineState::Failed);
        assert!(runtime.last_error().unwrap().contains("network unreachable"));
        assert!(runtime.acquire().is_none());

        assert!(runtime.ensure_ready().await);
        assert_eq!(runtime.state(), EngineState::Ready);
        assert_eq!(runtime.bootstrap_attempts(), 2);
        assert!(runtime.last_error().is_none());
    }

    #[tokio::test]
    async fn test_ready_is_idempotent() {
        let (runtime, loads) = runtime(0);
        assert_eq!(runtime.state(), EngineState::Uninitialized);
        assert!(runtime.ensure_ready().await);
        assert!(runtime.ensure_ready().await);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        assert!(runtime.acquire().is_some());
        assert_eq!(runtime.executions(), 1);
    }

    #[tokio::test]
    async fn test_default_loader() {
        let runtime = EngineRuntime::default();
        assert!(runtime.ensure_ready().await);
        let engine = runtime.acquire().unwrap();
        assert!(engine.has_global("pd"));
        assert!(engine.has_global("len"));
    }
}
