//! # Progress and Cancellation
//!
//! [`ProgressInfo`] is the handle threaded through every long-running call. It
//! provides:
//!
//! - **Hierarchical logging**: [`ProgressInfo::resolve`] derives a child handle whose
//!   log lines are prefixed with the full label path (`"Run | Partition 0 | blur"`).
//!   All handles of one tree write into the same log buffer.
//! - **Progress counters**: `set_progress(current, max)`.
//! - **Cooperative cancellation**: a [`CancellationToken`] shared by the whole tree.
//! - **Status listeners**: an explicit observer list; every log line and progress
//!   change is delivered as a [`StatusUpdate`]. Listeners are removed with the
//!   [`ListenerId`] returned on registration.
//!
//! Every log line is also emitted as a `tracing` event.

use chrono::Local;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A progress or log update delivered to status listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
  /// Hierarchical label of the handle that produced the update
  pub label: String,
  /// Log message (empty for pure progress updates)
  pub message: String,
  /// Current progress
  pub progress: usize,
  /// Maximum progress
  pub max_progress: usize,
}

/// Identifies a registered status listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type StatusListener = Arc<dyn Fn(&StatusUpdate) + Send + Sync>;

struct ProgressShared {
  cancel: CancellationToken,
  log: Mutex<String>,
  progress: AtomicUsize,
  max_progress: AtomicUsize,
  listeners: RwLock<Vec<(ListenerId, StatusListener)>>,
  next_listener: AtomicU64,
}

/// Hierarchical progress, logging and cancellation handle.
///
/// Cloning is cheap; clones and resolved children share the log, the progress
/// counters, the listeners and the cancellation token.
///
/// # Example
///
/// ```rust
/// use runweave::progress::ProgressInfo;
///
/// let progress = ProgressInfo::new();
/// let child = progress.resolve("Partition 0").resolve("blur");
/// child.log("Executing");
/// assert!(progress.log_text().contains("Partition 0 | blur"));
///
/// progress.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Clone)]
pub struct ProgressInfo {
  label: String,
  shared: Arc<ProgressShared>,
}

impl std::fmt::Debug for ProgressInfo {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProgressInfo")
      .field("label", &self.label)
      .field("cancelled", &self.is_cancelled())
      .finish_non_exhaustive()
  }
}

impl Default for ProgressInfo {
  fn default() -> Self {
    Self::new()
  }
}

impl ProgressInfo {
  /// Creates a root handle with an empty label and a fresh cancellation token.
  pub fn new() -> Self {
    Self::with_token(CancellationToken::new())
  }

  /// Creates a root handle that is cancelled through the given token.
  pub fn with_token(cancel: CancellationToken) -> Self {
    Self {
      label: String::new(),
      shared: Arc::new(ProgressShared {
        cancel,
        log: Mutex::new(String::new()),
        progress: AtomicUsize::new(0),
        max_progress: AtomicUsize::new(0),
        listeners: RwLock::new(Vec::new()),
        next_listener: AtomicU64::new(0),
      }),
    }
  }

  /// Returns a child handle whose label is extended by `label`.
  pub fn resolve(&self, label: impl AsRef<str>) -> Self {
    let label = label.as_ref();
    let label = if self.label.is_empty() {
      label.to_string()
    } else {
      format!("{} | {}", self.label, label)
    };
    Self {
      label,
      shared: Arc::clone(&self.shared),
    }
  }

  /// Returns the hierarchical label.
  pub fn label(&self) -> &str {
    &self.label
  }

  /// Appends a line to the log and notifies listeners.
  pub fn log(&self, message: impl AsRef<str>) {
    let message = message.as_ref();
    info!(target: "runweave::progress", label = %self.label, "{}", message);
    {
      let mut log = self.shared.log.lock().unwrap_or_else(PoisonError::into_inner);
      let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
      if self.label.is_empty() {
        let _ = writeln!(log, "<{}> {}", timestamp, message);
      } else {
        let _ = writeln!(log, "<{}> [{}] {}", timestamp, self.label, message);
      }
    }
    self.notify(message.to_string());
  }

  /// Sets the progress counters and notifies listeners.
  pub fn set_progress(&self, progress: usize, max_progress: usize) {
    self.shared.progress.store(progress, Ordering::SeqCst);
    self.shared.max_progress.store(max_progress, Ordering::SeqCst);
    self.notify(String::new());
  }

  /// Returns `(progress, max_progress)`.
  pub fn progress(&self) -> (usize, usize) {
    (
      self.shared.progress.load(Ordering::SeqCst),
      self.shared.max_progress.load(Ordering::SeqCst),
    )
  }

  /// Returns the full log written by all handles of this tree.
  pub fn log_text(&self) -> String {
    self.shared.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Requests cancellation of the whole tree.
  pub fn cancel(&self) {
    self.shared.cancel.cancel();
  }

  /// Returns true once cancellation was requested.
  pub fn is_cancelled(&self) -> bool {
    self.shared.cancel.is_cancelled()
  }

  /// Returns a clone of the shared cancellation token.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.shared.cancel.clone()
  }

  /// Registers a status listener.
  ///
  /// Listeners are called synchronously on the thread that logs, so they must not
  /// block.
  pub fn add_listener<F>(&self, listener: F) -> ListenerId
  where
    F: Fn(&StatusUpdate) + Send + Sync + 'static,
  {
    let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::SeqCst));
    self
      .shared
      .listeners
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .push((id, Arc::new(listener)));
    id
  }

  /// Removes a status listener. Returns true if it was registered.
  pub fn remove_listener(&self, id: ListenerId) -> bool {
    let mut listeners = self
      .shared
      .listeners
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    let before = listeners.len();
    listeners.retain(|(listener_id, _)| *listener_id != id);
    listeners.len() != before
  }

  fn notify(&self, message: String) {
    let listeners: Vec<StatusListener> = self
      .shared
      .listeners
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .map(|(_, listener)| Arc::clone(listener))
      .collect();
    if listeners.is_empty() {
      return;
    }
    let (progress, max_progress) = self.progress();
    let update = StatusUpdate {
      label: self.label.clone(),
      message,
      progress,
      max_progress,
    };
    for listener in listeners {
      listener(&update);
    }
  }
}
