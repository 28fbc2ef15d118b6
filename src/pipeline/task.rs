//! Background operations and the blocking bridge over them.
//!
//! Work submitted to a [`BackgroundExecutor`] runs on a dedicated tokio
//! runtime. The caller receives a [`PendingOperation`] handle whose
//! [`join`](PendingOperation::join) blocks the calling thread until the work
//! reaches its single terminal [`Outcome`].
//!
//! # Cancellation
//!
//! Cancellation is cooperative. [`PendingOperation::cancel`] only raises a
//! flag; the work observes it at its next [`TaskContext::checkpoint`] and
//! returns [`Error::Canceled`]. Work that finishes without reaching another
//! checkpoint completes normally. Partial reads or writes made before the
//! checkpoint are not rolled back here.
//!
//! # Blocking
//!
//! `join` never holds a lock the background work needs: it waits on a
//! `watch` channel while the runtime's own threads drive the work. Calling it
//! from inside a multi-threaded tokio runtime goes through `block_in_place`;
//! inside a current-thread runtime the wait moves to a scoped thread.

use super::task_manager::TaskManager;
use crate::{Error, Result};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tokio::sync::watch;

/// Terminal outcome of a background operation.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The work ran to completion, successfully or with an error.
    Completed(Result<T>),
    /// The work stopped at a checkpoint after a cancellation request.
    Canceled,
}

impl<T> Outcome<T> {
    /// Returns true for [`Outcome::Canceled`].
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Converts the outcome into a result, mapping cancellation to
    /// [`Error::Canceled`].
    ///
    /// # Errors
    ///
    /// Returns the work's error, or `Canceled`.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Completed(result) => result,
            Self::Canceled => Err(Error::Canceled),
        }
    }
}

/// Progress snapshot of a running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProgress {
    /// Operation id, unique per executor.
    pub id: u64,
    /// Label given when the operation was started.
    pub label: String,
    /// Latest progress text reported by the work.
    pub text: String,
    /// Progress value.
    pub value: u64,
    /// Progress maximum (0 if unknown).
    pub maximum: u64,
    /// Whether cancellation has been requested.
    pub canceled: bool,
}

/// State shared between a running operation, its handles and the manager.
#[derive(Debug)]
pub(crate) struct TaskState {
    id: u64,
    label: String,
    canceled: AtomicBool,
    value: AtomicU64,
    maximum: AtomicU64,
    text: Mutex<String>,
}

impl TaskState {
    fn new(id: u64, label: String) -> Self {
        Self {
            id,
            label,
            canceled: AtomicBool::new(false),
            value: AtomicU64::new(0),
            maximum: AtomicU64::new(0),
            text: Mutex::new(String::new()),
        }
    }

    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    pub(crate) fn snapshot(&self) -> TaskProgress {
        TaskProgress {
            id: self.id,
            label: self.label.clone(),
            text: self.text.lock().map(|t| t.clone()).unwrap_or_default(),
            value: self.value.load(Ordering::Relaxed),
            maximum: self.maximum.load(Ordering::Relaxed),
            canceled: self.is_canceled(),
        }
    }
}

/// Handed to background work: cancellation checkpoints and progress reporting.
#[derive(Debug, Clone)]
pub struct TaskContext {
    state: Arc<TaskState>,
}

impl TaskContext {
    /// Creates a context that is not attached to any executor.
    ///
    /// Useful for running importer code synchronously.
    #[must_use]
    pub fn detached(label: impl Into<String>) -> Self {
        Self {
            state: Arc::new(TaskState::new(0, label.into())),
        }
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.state.is_canceled()
    }

    /// Requests cancellation of the operation this context belongs to.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Cancellation checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Canceled`] if cancellation has been requested.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(Error::Canceled);
        }
        Ok(())
    }

    /// Sets the progress text.
    pub fn set_progress_text(&self, text: impl Into<String>) {
        if let Ok(mut guard) = self.state.text.lock() {
            *guard = text.into();
        }
    }

    /// Sets the progress maximum.
    pub fn set_progress_maximum(&self, maximum: u64) {
        self.state.maximum.store(maximum, Ordering::Relaxed);
    }

    /// Sets the progress value.
    pub fn set_progress_value(&self, value: u64) {
        self.state.value.store(value, Ordering::Relaxed);
    }

    /// Returns a progress snapshot.
    #[must_use]
    pub fn progress(&self) -> TaskProgress {
        self.state.snapshot()
    }
}

/// Handle to one in-flight background operation.
///
/// Cloning the handle does not duplicate the work; all clones observe the
/// same terminal outcome. [`join`](Self::join) is idempotent.
#[derive(Debug, Clone)]
pub struct PendingOperation<T> {
    state: Arc<TaskState>,
    receiver: watch::Receiver<Option<Outcome<T>>>,
    handle: Handle,
}

impl<T: Clone + Send + Sync + 'static> PendingOperation<T> {
    /// Operation id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.state.id()
    }

    /// Requests cooperative cancellation.
    pub fn cancel(&self) {
        tracing::debug!(task = self.state.id(), label = %self.state.label, "Cancel requested");
        self.state.cancel();
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.state.is_canceled()
    }

    /// Returns true once the operation has reached its terminal outcome.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.receiver.borrow().is_some() || self.receiver.has_changed().is_err()
    }

    /// Returns the outcome without blocking, if available.
    #[must_use]
    pub fn try_outcome(&self) -> Option<Outcome<T>> {
        self.receiver.borrow().clone()
    }

    /// Returns a progress snapshot.
    #[must_use]
    pub fn progress(&self) -> TaskProgress {
        self.state.snapshot()
    }

    /// Blocks until the operation reaches its terminal outcome.
    #[must_use]
    pub fn join(&self) -> Outcome<T> {
        if let Some(outcome) = self.try_outcome() {
            return outcome;
        }
        let mut receiver = self.receiver.clone();
        let outcome = block_on(&self.handle, async move {
            receiver
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|value| (*value).clone())
        });
        outcome.unwrap_or_else(lost_outcome)
    }

    /// Blocks until the terminal outcome or the timeout, whichever is first.
    #[must_use]
    pub fn join_timeout(&self, timeout: Duration) -> Option<Outcome<T>> {
        if let Some(outcome) = self.try_outcome() {
            return Some(outcome);
        }
        let mut receiver = self.receiver.clone();
        block_on(&self.handle, async move {
            match tokio::time::timeout(timeout, receiver.wait_for(Option::is_some)).await {
                Ok(Ok(value)) => (*value).clone(),
                Ok(Err(_)) => Some(lost_outcome()),
                Err(_) => None,
            }
        })
    }

    /// Blocks like [`join`](Self::join), logging why the caller is waiting.
    #[must_use]
    pub fn wait(&self, reason: &str) -> Outcome<T> {
        if !self.is_finished() {
            tracing::debug!(task = self.state.id(), reason, "Waiting for background operation");
        }
        self.join()
    }
}

fn lost_outcome<T>() -> Outcome<T> {
    Outcome::Completed(Err(Error::operation(
        "background_task",
        "task terminated without reporting an outcome",
    )))
}

/// Drives a future to completion on the executor's runtime from sync code.
fn block_on<F>(handle: &Handle, future: F) -> F::Output
where
    F: Future + Send,
    F::Output: Send,
{
    match Handle::try_current().map(|current| current.runtime_flavor()) {
        Err(_) => handle.block_on(future),
        // block_in_place is not available on a current-thread runtime.
        Ok(RuntimeFlavor::CurrentThread) => std::thread::scope(|scope| {
            scope
                .spawn(move || handle.block_on(future))
                .join()
                .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
        }),
        Ok(_) => tokio::task::block_in_place(|| handle.block_on(future)),
    }
}

/// Runs background operations on a dedicated tokio runtime.
pub struct BackgroundExecutor {
    runtime: Option<Runtime>,
    handle: Handle,
    tasks: Arc<TaskManager>,
    next_id: AtomicU64,
}

impl BackgroundExecutor {
    /// Creates an executor with `threads` worker threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built.
    pub fn new(threads: usize) -> Result<Self> {
        Self::with_task_manager(threads, Arc::new(TaskManager::new()))
    }

    /// Creates an executor that reports operations to the given manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built.
    pub fn with_task_manager(threads: usize, tasks: Arc<TaskManager>) -> Result<Self> {
        let threads = threads.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .max_blocking_threads(threads * 4)
            .thread_name("atomio-io")
            .enable_all()
            .build()
            .map_err(|e| Error::operation("background_executor_start", e))?;
        let handle = runtime.handle().clone();
        tracing::debug!(threads, "Background executor started");
        Ok(Self {
            runtime: Some(runtime),
            handle,
            tasks,
            next_id: AtomicU64::new(1),
        })
    }

    /// The manager tracking this executor's operations.
    #[must_use]
    pub const fn task_manager(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    /// Starts `work` in the background and returns its handle.
    ///
    /// The work returns [`Error::Canceled`] (usually via
    /// [`TaskContext::checkpoint`]) to acknowledge a cancellation request.
    /// Any other error completes the operation, even if cancellation was
    /// requested meanwhile. A panic inside the work becomes a completed
    /// `OperationFailed` error.
    pub fn spawn<T, F>(&self, label: impl Into<String>, work: F) -> PendingOperation<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&TaskContext) -> Result<T> + Send + 'static,
    {
        self.spawn_with_completion(label, work, |_| {})
    }

    /// Like [`spawn`](Self::spawn), but runs `on_complete` on the background
    /// thread with the terminal outcome before any waiter can observe it.
    ///
    /// State transitions that must be visible to whoever joins the handle
    /// belong in `on_complete`.
    pub fn spawn_with_completion<T, F, C>(
        &self,
        label: impl Into<String>,
        work: F,
        on_complete: C,
    ) -> PendingOperation<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&TaskContext) -> Result<T> + Send + 'static,
        C: FnOnce(&Outcome<T>) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(TaskState::new(id, label.into()));
        let (sender, receiver) = watch::channel(None);
        let context = TaskContext {
            state: Arc::clone(&state),
        };
        let tasks = Arc::clone(&self.tasks);
        tasks.register(Arc::clone(&state));
        let parent = tracing::Span::current();

        tracing::trace!(task = id, label = %state.label, "Starting background operation");
        self.handle.spawn_blocking(move || {
            let span = tracing::debug_span!(parent: &parent, "background_task", task = id);
            let _guard = span.enter();

            let result = std::panic::catch_unwind(AssertUnwindSafe(|| work(&context)))
                .unwrap_or_else(|_| {
                    Err(Error::operation("background_task", "background work panicked"))
                });
            let outcome = match result {
                Err(Error::Canceled) => Outcome::Canceled,
                other => Outcome::Completed(other),
            };
            tracing::trace!(task = id, canceled = outcome.is_canceled(), "Background operation finished");

            if std::panic::catch_unwind(AssertUnwindSafe(|| on_complete(&outcome))).is_err() {
                tracing::warn!(task = id, "Completion handler panicked");
            }
            tasks.unregister(id);
            let _ = sender.send(Some(outcome));
        });

        PendingOperation {
            state,
            receiver,
            handle: self.handle.clone(),
        }
    }
}

impl Drop for BackgroundExecutor {
    fn drop(&mut self) {
        self.tasks.cancel_all();
        if let Some(runtime) = self.runtime.take() {
            // Waiting for shutdown is not allowed inside an async context.
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(Duration::from_secs(2));
            }
        }
    }
}

impl std::fmt::Debug for BackgroundExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundExecutor")
            .field("active_tasks", &self.tasks.active_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_join_completed() {
        let executor = BackgroundExecutor::new(1).unwrap();
        let op = executor.spawn("answer", |_| Ok(42));
        assert!(matches!(op.join(), Outcome::Completed(Ok(42))));
        // join is idempotent
        assert!(matches!(op.join(), Outcome::Completed(Ok(42))));
        assert!(op.is_finished());
    }

    #[test]
    fn test_error_is_completed_not_canceled() {
        let executor = BackgroundExecutor::new(1).unwrap();
        let op: PendingOperation<()> =
            executor.spawn("fail", |_| Err(Error::ImportFailed("bad".into())));
        match op.join() {
            Outcome::Completed(Err(Error::ImportFailed(msg))) => assert_eq!(msg, "bad"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_cancel_at_checkpoint() {
        let executor = BackgroundExecutor::new(1).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let op = executor.spawn("spin", move |ctx: &TaskContext| -> Result<()> {
            let _ = started_tx.send(());
            loop {
                ctx.checkpoint()?;
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        started_rx.recv().unwrap();
        op.cancel();
        assert!(op.join().is_canceled());
        assert_eq!(executor.task_manager().active_count(), 0);
    }

    #[test]
    fn test_error_after_cancel_request_completes() {
        let executor = BackgroundExecutor::new(1).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let op: PendingOperation<()> = executor.spawn("late error", move |_| {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
            Err(Error::ImportFailed("bad line".into()))
        });
        started_rx.recv().unwrap();
        op.cancel();
        release_tx.send(()).unwrap();
        assert!(matches!(
            op.join(),
            Outcome::Completed(Err(Error::ImportFailed(_)))
        ));
    }

    #[tokio::test]
    async fn test_join_inside_current_thread_runtime() {
        let executor = BackgroundExecutor::new(1).unwrap();
        let op = executor.spawn("answer", |_| Ok(5));
        assert!(matches!(op.join(), Outcome::Completed(Ok(5))));
        assert!(matches!(
            op.join_timeout(Duration::from_secs(1)),
            Some(Outcome::Completed(Ok(5)))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_join_inside_multi_thread_runtime() {
        let executor = BackgroundExecutor::new(1).unwrap();
        let op = executor.spawn("answer", |_| Ok(6));
        assert!(matches!(op.join(), Outcome::Completed(Ok(6))));
    }

    #[test]
    fn test_panic_becomes_error() {
        let executor = BackgroundExecutor::new(1).unwrap();
        let op: PendingOperation<()> = executor.spawn("panic", |_| panic!("boom"));
        assert!(matches!(
            op.join(),
            Outcome::Completed(Err(Error::OperationFailed { .. }))
        ));
    }

    #[test]
    fn test_completion_runs_before_join_returns() {
        let executor = BackgroundExecutor::new(1).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let op = executor.spawn_with_completion(
            "answer",
            |_| Ok(7),
            move |outcome: &Outcome<i32>| {
                *sink.lock().unwrap() = Some(matches!(outcome, Outcome::Completed(Ok(7))));
            },
        );
        assert!(matches!(op.join(), Outcome::Completed(Ok(7))));
        assert_eq!(*seen.lock().unwrap(), Some(true));
    }

    #[test]
    fn test_join_timeout_elapses() {
        let executor = BackgroundExecutor::new(1).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let op = executor.spawn("blocked", move |_| {
            let _ = release_rx.recv();
            Ok(1)
        });
        assert!(op.join_timeout(Duration::from_millis(20)).is_none());
        release_tx.send(()).unwrap();
        assert!(matches!(op.join(), Outcome::Completed(Ok(1))));
    }

    #[test]
    fn test_progress_reported() {
        let ctx = TaskContext::detached("scan");
        ctx.set_progress_text("Scanning");
        ctx.set_progress_maximum(10);
        ctx.set_progress_value(4);
        let progress = ctx.progress();
        assert_eq!(progress.text, "Scanning");
        assert_eq!((progress.value, progress.maximum), (4, 10));
    }
}
