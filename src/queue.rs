//! # Runnable Queue
//!
//! A named, FIFO queue of [`Runnable`]s with at most one running at a time.
//!
//! ## Lifecycle
//!
//! ```text
//!   enqueue ─▶ Enqueued ─▶ Started ─▶ Progress* ─▶ Finished
//!                 │                        └─────▶ Interrupted (error, panic, cancel)
//!                 └─ cancel ─▶ Interrupted (never started)
//! ```
//!
//! Every runnable reaches exactly one terminal state. Events are published on a
//! `tokio::sync::broadcast` channel; [`RunnableQueue::subscribe`] returns a receiver
//! and dropping it unsubscribes. Sending never blocks the worker: slow subscribers
//! lag and miss events instead.
//!
//! Runnables execute as Tokio tasks, so [`RunnableQueue::enqueue`] must be called
//! from within a Tokio runtime.
//!
//! ## Example
//!
//! ```rust,no_run
//! use runweave::queue::{QueueEvent, RunnableQueue};
//! # use runweave::graph_run::GraphRun;
//! # use std::sync::Arc;
//!
//! # async fn example(run: GraphRun) {
//! let queue = RunnableQueue::new("pipelines");
//! let mut events = queue.subscribe();
//! let worker = queue.enqueue(Arc::new(run));
//!
//! while let Ok(event) = events.recv().await {
//!   if let QueueEvent::Finished { .. } | QueueEvent::Interrupted { .. } = event {
//!     break;
//!   }
//! }
//! assert!(worker.state().is_terminal());
//! # }
//! ```

use crate::error::{RunnableError, panic_message};
use crate::progress::{ProgressInfo, StatusUpdate};
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Capacity of the event channel before slow subscribers start lagging.
const EVENT_CAPACITY: usize = 1024;

/// Time a cancelled runnable gets to stop on its own before it is dropped.
pub const DEFAULT_INTERRUPT_GRACE: Duration = Duration::from_secs(5);

/// A unit of work executed by a [`RunnableQueue`].
#[async_trait]
pub trait Runnable: Send + Sync + 'static {
  /// Human-readable label of the task.
  fn task_label(&self) -> String;

  /// Progress and cancellation handle of the task. The queue cancels it when the
  /// task is cancelled and forwards its status updates as [`QueueEvent::Progress`].
  fn progress_info(&self) -> ProgressInfo;

  /// Executes the task.
  async fn run(&self) -> Result<(), RunnableError>;

  /// Called after the task finished successfully.
  fn on_finished(&self) {}

  /// Called after the task was interrupted, including cancellation while queued.
  fn on_interrupted(&self, _error: &RunnableError) {}
}

/// Identifier of an enqueued runnable, unique per queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunnableId(u64);

impl RunnableId {
  /// Returns the numeric value.
  pub fn get(self) -> u64 {
    self.0
  }
}

impl fmt::Display for RunnableId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Event published by a [`RunnableQueue`].
#[derive(Clone, Debug)]
pub enum QueueEvent {
  /// A runnable was added to the queue.
  Enqueued {
    /// Runnable
    id: RunnableId,
    /// Task label
    label: String,
  },
  /// A runnable started executing.
  Started {
    /// Runnable
    id: RunnableId,
  },
  /// The running runnable reported progress.
  Progress {
    /// Runnable
    id: RunnableId,
    /// Status update
    update: StatusUpdate,
  },
  /// A runnable finished successfully.
  Finished {
    /// Runnable
    id: RunnableId,
  },
  /// A runnable failed, panicked or was cancelled.
  Interrupted {
    /// Runnable
    id: RunnableId,
    /// Why it was interrupted
    error: Arc<RunnableError>,
  },
}

impl QueueEvent {
  /// Returns the runnable the event is about.
  pub fn id(&self) -> RunnableId {
    match self {
      QueueEvent::Enqueued { id, .. }
      | QueueEvent::Started { id }
      | QueueEvent::Progress { id, .. }
      | QueueEvent::Finished { id }
      | QueueEvent::Interrupted { id, .. } => *id,
    }
  }
}

/// Lifecycle state of a [`Worker`].
#[derive(Clone, Debug)]
pub enum WorkerState {
  /// Waiting in the queue.
  Enqueued,
  /// Executing.
  Running,
  /// Finished successfully.
  Finished,
  /// Failed, panicked or cancelled.
  Interrupted(Arc<RunnableError>),
}

impl WorkerState {
  /// Returns true for `Finished` and `Interrupted`.
  pub fn is_terminal(&self) -> bool {
    matches!(self, WorkerState::Finished | WorkerState::Interrupted(_))
  }

  /// Returns the interruption error, if any.
  pub fn error(&self) -> Option<&Arc<RunnableError>> {
    match self {
      WorkerState::Interrupted(error) => Some(error),
      _ => None,
    }
  }
}

/// Wraps the execution of one runnable.
pub struct Worker {
  id: RunnableId,
  label: String,
  runnable: Arc<dyn Runnable>,
  state: watch::Sender<WorkerState>,
  interrupt: CancellationToken,
}

impl fmt::Debug for Worker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Worker")
      .field("id", &self.id)
      .field("label", &self.label)
      .field("state", &*self.state.borrow())
      .finish_non_exhaustive()
  }
}

impl Worker {
  fn new(id: RunnableId, runnable: Arc<dyn Runnable>) -> Self {
    let (state, _) = watch::channel(WorkerState::Enqueued);
    Self {
      id,
      label: runnable.task_label(),
      runnable,
      state,
      interrupt: CancellationToken::new(),
    }
  }

  /// Returns the id.
  pub fn id(&self) -> RunnableId {
    self.id
  }

  /// Returns the task label.
  pub fn label(&self) -> &str {
    &self.label
  }

  /// Returns the runnable.
  pub fn runnable(&self) -> &Arc<dyn Runnable> {
    &self.runnable
  }

  /// Returns the current state.
  pub fn state(&self) -> WorkerState {
    self.state.borrow().clone()
  }

  /// Waits until the runnable reached a terminal state and returns it.
  pub async fn wait(&self) -> WorkerState {
    let mut receiver = self.state.subscribe();
    match receiver.wait_for(WorkerState::is_terminal).await {
      Ok(state) => state.clone(),
      // The sender lives in `self`, so the channel cannot close while we wait.
      Err(_) => self.state(),
    }
  }

  fn set_state(&self, state: WorkerState) {
    self.state.send_replace(state);
  }
}

#[derive(Default)]
struct QueueState {
  pending: VecDeque<Arc<Worker>>,
  workers: HashMap<RunnableId, Arc<Worker>>,
  current: Option<Arc<Worker>>,
}

struct QueueInner {
  name: String,
  state: Mutex<QueueState>,
  events: broadcast::Sender<QueueEvent>,
  next_id: AtomicU64,
  interrupt_grace: Duration,
}

/// FIFO queue that runs one [`Runnable`] at a time.
///
/// Cloning is cheap; clones refer to the same queue.
#[derive(Clone)]
pub struct RunnableQueue {
  inner: Arc<QueueInner>,
}

impl fmt::Debug for RunnableQueue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RunnableQueue")
      .field("name", &self.inner.name)
      .field("len", &self.len())
      .field("running", &self.is_running())
      .finish()
  }
}

impl RunnableQueue {
  /// Creates an empty queue.
  pub fn new(name: impl Into<String>) -> Self {
    Self::with_interrupt_grace(name, DEFAULT_INTERRUPT_GRACE)
  }

  /// Creates an empty queue whose cancelled runnables are dropped after `grace`
  /// if they have not stopped by then.
  pub fn with_interrupt_grace(name: impl Into<String>, grace: Duration) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      inner: Arc::new(QueueInner {
        name: name.into(),
        state: Mutex::new(QueueState::default()),
        events,
        next_id: AtomicU64::new(1),
        interrupt_grace: grace,
      }),
    }
  }

  /// Returns the queue name.
  pub fn name(&self) -> &str {
    &self.inner.name
  }

  /// Subscribes to queue events. Drop the receiver to unsubscribe.
  pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
    self.inner.events.subscribe()
  }

  /// Adds a runnable to the end of the queue and starts it if nothing is running.
  pub fn enqueue(&self, runnable: Arc<dyn Runnable>) -> Arc<Worker> {
    let id = RunnableId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
    let worker = Arc::new(Worker::new(id, runnable));
    {
      let mut state = self.lock();
      state.workers.insert(id, Arc::clone(&worker));
      state.pending.push_back(Arc::clone(&worker));
      self.emit(QueueEvent::Enqueued {
        id,
        label: worker.label.clone(),
      });
    }
    info!(queue = %self.inner.name, id = %id, label = %worker.label, "enqueued");
    self.try_dequeue();
    worker
  }

  /// Starts the next runnable unless one is running or the queue is empty.
  pub fn try_dequeue(&self) {
    let mut state = self.lock();
    if state.current.is_some() {
      return;
    }
    let Some(worker) = state.pending.pop_front() else {
      return;
    };
    state.current = Some(Arc::clone(&worker));
    worker.set_state(WorkerState::Running);
    self.emit(QueueEvent::Started { id: worker.id });
    debug!(queue = %self.inner.name, id = %worker.id, "starting");
    tokio::spawn(self.clone().run_worker(worker));
  }

  /// Cancels a runnable. Returns false if it is unknown or already finished.
  ///
  /// A queued runnable is removed and reported as interrupted before this returns.
  /// A running runnable has its progress handle cancelled and may wind down on its
  /// own; if it is still running after the queue's interrupt grace it is dropped.
  pub fn cancel(&self, id: RunnableId) -> bool {
    let mut state = self.lock();
    if let Some(worker) = state.current.as_ref().filter(|worker| worker.id == id) {
      info!(queue = %self.inner.name, id = %id, "cancelling running runnable");
      worker.runnable.progress_info().cancel();
      worker.interrupt.cancel();
      return true;
    }
    let Some(position) = state.pending.iter().position(|worker| worker.id == id) else {
      return false;
    };
    let Some(worker) = state.pending.remove(position) else {
      return false;
    };
    state.workers.remove(&id);
    let error = Arc::new(RunnableError::Cancelled);
    worker.set_state(WorkerState::Interrupted(Arc::clone(&error)));
    self.emit(QueueEvent::Interrupted {
      id,
      error: Arc::clone(&error),
    });
    drop(state);
    info!(queue = %self.inner.name, id = %id, "cancelled queued runnable");
    worker.runnable.on_interrupted(&error);
    true
  }

  /// Cancels every queued runnable, then the running one.
  pub fn cancel_all(&self) {
    let ids: Vec<RunnableId> = {
      let state = self.lock();
      state
        .pending
        .iter()
        .map(|worker| worker.id)
        .chain(state.current.as_ref().map(|worker| worker.id))
        .collect()
    };
    for id in ids {
      self.cancel(id);
    }
  }

  /// Returns the number of waiting runnables.
  pub fn len(&self) -> usize {
    self.lock().pending.len()
  }

  /// Returns true if nothing is waiting.
  pub fn is_empty(&self) -> bool {
    self.lock().pending.is_empty()
  }

  /// Returns true if a runnable is executing.
  pub fn is_running(&self) -> bool {
    self.lock().current.is_some()
  }

  /// Returns the executing runnable's worker.
  pub fn current(&self) -> Option<Arc<Worker>> {
    self.lock().current.clone()
  }

  /// Returns the worker of a queued or running runnable.
  pub fn worker(&self, id: RunnableId) -> Option<Arc<Worker>> {
    self.lock().workers.get(&id).cloned()
  }

  fn lock(&self) -> MutexGuard<'_, QueueState> {
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }

  fn emit(&self, event: QueueEvent) {
    trace!(queue = %self.inner.name, ?event, "emit");
    // No subscribers is fine.
    let _ = self.inner.events.send(event);
  }

  async fn run_worker(self, worker: Arc<Worker>) {
    let progress = worker.runnable.progress_info();
    let listener = {
      let queue = self.clone();
      let id = worker.id;
      progress.add_listener(move |update| {
        let _state = queue.lock();
        queue.emit(QueueEvent::Progress {
          id,
          update: update.clone(),
        });
      })
    };

    let mut run = Box::pin(AssertUnwindSafe(worker.runnable.run()).catch_unwind());
    let mut outcome = tokio::select! {
      outcome = &mut run => Some(outcome),
      _ = worker.interrupt.cancelled() => None,
    };
    if outcome.is_none() {
      outcome = tokio::time::timeout(self.inner.interrupt_grace, &mut run)
        .await
        .ok();
      if outcome.is_none() {
        warn!(queue = %self.inner.name, id = %worker.id, "runnable ignored cancellation, dropping it");
      }
    }
    drop(run);
    let interrupted = worker.interrupt.is_cancelled();
    let result = match outcome {
      Some(Ok(Ok(()))) if interrupted => Err(RunnableError::Cancelled),
      Some(Ok(result)) => result,
      Some(Err(panic)) => Err(RunnableError::Panicked(panic_message(panic.as_ref()))),
      None => Err(RunnableError::Cancelled),
    };

    progress.remove_listener(listener);
    self.complete(&worker, result);
    self.try_dequeue();
  }

  fn complete(&self, worker: &Arc<Worker>, result: Result<(), RunnableError>) {
    let error = {
      let mut state = self.lock();
      state.workers.remove(&worker.id);
      if state
        .current
        .as_ref()
        .is_some_and(|current| current.id == worker.id)
      {
        state.current = None;
      }
      match result {
        Ok(()) => {
          worker.set_state(WorkerState::Finished);
          self.emit(QueueEvent::Finished { id: worker.id });
          None
        }
        Err(error) => {
          let error = Arc::new(error);
          worker.set_state(WorkerState::Interrupted(Arc::clone(&error)));
          self.emit(QueueEvent::Interrupted {
            id: worker.id,
            error: Arc::clone(&error),
          });
          Some(error)
        }
      }
    };

    match error {
      None => {
        info!(queue = %self.inner.name, id = %worker.id, "finished");
        worker.runnable.on_finished();
      }
      Some(error) => {
        if error.is_cancelled() {
          info!(queue = %self.inner.name, id = %worker.id, "cancelled");
        } else {
          warn!(queue = %self.inner.name, id = %worker.id, error = %error, "interrupted");
        }
        worker.runnable.on_interrupted(&error);
      }
    }
  }
}
