//! # Runnable Queue Test Suite
//!
//! Tests for [`RunnableQueue`] covering FIFO order, single concurrency, cancellation
//! of queued and running runnables, failures, panics and progress forwarding.

use crate::config::RunConfiguration;
use crate::error::RunnableError;
use crate::graph_run::GraphRun;
use crate::progress::ProgressInfo;
use crate::queue::{QueueEvent, Runnable, RunnableId, RunnableQueue, WorkerState};
use crate::test_support::chain;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, broadcast};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Behavior {
  Succeed,
  Fail,
  Panic,
  /// Waits until released through the gate.
  Gated,
  /// Never finishes on its own.
  Hang,
  /// Logs one progress line, then succeeds.
  Report,
  /// Waits for cancellation, then cleans up and stops.
  Cooperative,
}

struct TestRunnable {
  behavior: Behavior,
  progress: ProgressInfo,
  gate: Notify,
  finished: AtomicBool,
  cleaned_up: AtomicBool,
  interrupted: Mutex<Option<String>>,
}

impl TestRunnable {
  fn new(behavior: Behavior) -> Arc<Self> {
    Arc::new(Self {
      behavior,
      progress: ProgressInfo::new(),
      gate: Notify::new(),
      finished: AtomicBool::new(false),
      cleaned_up: AtomicBool::new(false),
      interrupted: Mutex::new(None),
    })
  }

  fn release(&self) {
    self.gate.notify_one();
  }
}

#[async_trait]
impl Runnable for TestRunnable {
  fn task_label(&self) -> String {
    "test".to_string()
  }

  fn progress_info(&self) -> ProgressInfo {
    self.progress.clone()
  }

  async fn run(&self) -> Result<(), RunnableError> {
    match self.behavior {
      Behavior::Succeed => Ok(()),
      Behavior::Fail => Err(RunnableError::Failed("broken".into())),
      Behavior::Panic => panic!("runnable exploded"),
      Behavior::Gated => {
        self.gate.notified().await;
        Ok(())
      }
      Behavior::Hang => {
        std::future::pending::<()>().await;
        Ok(())
      }
      Behavior::Report => {
        self.progress.log("halfway");
        Ok(())
      }
      Behavior::Cooperative => {
        self.progress.cancellation_token().cancelled().await;
        self.cleaned_up.store(true, Ordering::SeqCst);
        Err(RunnableError::Cancelled)
      }
    }
  }

  fn on_finished(&self) {
    self.finished.store(true, Ordering::SeqCst);
  }

  fn on_interrupted(&self, error: &RunnableError) {
    *self.interrupted.lock().unwrap() = Some(error.to_string());
  }
}

fn drain(events: &mut broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
  let mut drained = Vec::new();
  while let Ok(event) = events.try_recv() {
    drained.push(event);
  }
  drained
}

fn started(events: &[QueueEvent]) -> Vec<RunnableId> {
  events
    .iter()
    .filter_map(|event| match event {
      QueueEvent::Started { id } => Some(*id),
      _ => None,
    })
    .collect()
}

#[tokio::test]
async fn test_runnable_finishes() {
  let queue = RunnableQueue::new("test");
  let mut events = queue.subscribe();
  let runnable = TestRunnable::new(Behavior::Succeed);
  let worker = queue.enqueue(runnable.clone());

  assert!(matches!(worker.wait().await, WorkerState::Finished));
  assert!(runnable.finished.load(Ordering::SeqCst));
  let events = drain(&mut events);
  assert!(matches!(events[0], QueueEvent::Enqueued { id, .. } if id == worker.id()));
  assert!(matches!(events[1], QueueEvent::Started { id } if id == worker.id()));
  assert!(matches!(events.last(), Some(QueueEvent::Finished { id }) if *id == worker.id()));
  assert!(queue.worker(worker.id()).is_none());
}

#[tokio::test]
async fn test_fifo_and_single_concurrency() {
  let queue = RunnableQueue::new("test");
  let mut events = queue.subscribe();
  let first = TestRunnable::new(Behavior::Gated);
  let second = TestRunnable::new(Behavior::Succeed);
  let first_worker = queue.enqueue(first.clone());
  let second_worker = queue.enqueue(second.clone());

  assert!(queue.is_running());
  assert_eq!(queue.len(), 1);
  assert!(matches!(second_worker.state(), WorkerState::Enqueued));
  assert_eq!(queue.current().map(|worker| worker.id()), Some(first_worker.id()));

  first.release();
  first_worker.wait().await;
  second_worker.wait().await;

  let events = drain(&mut events);
  assert_eq!(started(&events), vec![first_worker.id(), second_worker.id()]);
  let first_finished = events
    .iter()
    .position(|event| matches!(event, QueueEvent::Finished { id } if *id == first_worker.id()))
    .unwrap();
  let second_started = events
    .iter()
    .position(|event| matches!(event, QueueEvent::Started { id } if *id == second_worker.id()))
    .unwrap();
  assert!(first_finished < second_started);
  assert!(!queue.is_running());
  assert!(queue.is_empty());
}

#[tokio::test]
async fn test_cancel_queued_runnable() {
  let queue = RunnableQueue::new("test");
  let mut events = queue.subscribe();
  let first = TestRunnable::new(Behavior::Gated);
  let second = TestRunnable::new(Behavior::Succeed);
  let first_worker = queue.enqueue(first.clone());
  let second_worker = queue.enqueue(second.clone());

  assert!(queue.cancel(second_worker.id()));
  // Synchronous: already interrupted when cancel returns.
  match second_worker.state() {
    WorkerState::Interrupted(error) => assert!(error.is_cancelled()),
    other => panic!("unexpected state {:?}", other),
  }
  assert_eq!(second.interrupted.lock().unwrap().as_deref(), Some("cancelled"));
  assert!(!queue.cancel(second_worker.id()));

  first.release();
  first_worker.wait().await;
  tokio::time::sleep(Duration::from_millis(10)).await;
  let events = drain(&mut events);
  assert_eq!(started(&events), vec![first_worker.id()]);
  assert!(!second.finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_cancel_running_runnable() {
  let queue = RunnableQueue::with_interrupt_grace("test", Duration::from_millis(10));
  let runnable = TestRunnable::new(Behavior::Hang);
  let worker = queue.enqueue(runnable.clone());
  tokio::task::yield_now().await;

  assert!(queue.cancel(worker.id()));
  let state = worker.wait().await;
  assert!(state.error().is_some_and(|error| error.is_cancelled()));
  assert!(runnable.progress.is_cancelled());
  assert!(!queue.is_running());
}

#[tokio::test]
async fn test_cancelled_runnable_winds_down() {
  let queue = RunnableQueue::new("test");
  let runnable = TestRunnable::new(Behavior::Cooperative);
  let worker = queue.enqueue(runnable.clone());
  tokio::task::yield_now().await;

  assert!(queue.cancel(worker.id()));
  let state = worker.wait().await;
  assert!(state.error().is_some_and(|error| error.is_cancelled()));
  assert!(runnable.cleaned_up.load(Ordering::SeqCst));
  assert_eq!(runnable.interrupted.lock().unwrap().as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn test_cancel_unknown_returns_false() {
  let queue = RunnableQueue::new("test");
  let worker = queue.enqueue(TestRunnable::new(Behavior::Succeed));
  worker.wait().await;
  assert!(!queue.cancel(worker.id()));
}

#[tokio::test]
async fn test_cancel_all() {
  let queue = RunnableQueue::with_interrupt_grace("test", Duration::from_millis(10));
  let workers: Vec<_> = (0..3)
    .map(|_| queue.enqueue(TestRunnable::new(Behavior::Hang)))
    .collect();
  queue.cancel_all();
  for worker in workers {
    let state = worker.wait().await;
    assert!(state.error().is_some_and(|error| error.is_cancelled()));
  }
  assert!(queue.is_empty());
}

#[tokio::test]
async fn test_failure_is_interrupted() {
  let queue = RunnableQueue::new("test");
  let runnable = TestRunnable::new(Behavior::Fail);
  let worker = queue.enqueue(runnable.clone());
  let state = worker.wait().await;
  assert!(matches!(
    state.error().map(|error| error.as_ref()),
    Some(RunnableError::Failed(_))
  ));
  assert!(runnable.interrupted.lock().unwrap().is_some());
}

#[tokio::test]
async fn test_panic_is_interrupted() {
  let queue = RunnableQueue::new("test");
  let worker = queue.enqueue(TestRunnable::new(Behavior::Panic));
  let state = worker.wait().await;
  match state.error().map(|error| error.as_ref()) {
    Some(RunnableError::Panicked(message)) => assert!(message.contains("runnable exploded")),
    other => panic!("unexpected error {:?}", other),
  }

  // The queue keeps working after a panic.
  let next = queue.enqueue(TestRunnable::new(Behavior::Succeed));
  assert!(matches!(next.wait().await, WorkerState::Finished));
}

#[tokio::test]
async fn test_progress_is_forwarded() {
  let queue = RunnableQueue::new("test");
  let mut events = queue.subscribe();
  let worker = queue.enqueue(TestRunnable::new(Behavior::Report));
  worker.wait().await;
  let events = drain(&mut events);
  let progress = events
    .iter()
    .position(|event| matches!(event, QueueEvent::Progress { update, .. } if update.message == "halfway"))
    .unwrap();
  let finished = events
    .iter()
    .position(|event| matches!(event, QueueEvent::Finished { .. }))
    .unwrap();
  assert!(progress < finished);
}

#[tokio::test]
async fn test_graph_run_through_queue() {
  let queue = RunnableQueue::new("pipelines");
  let run = Arc::new(GraphRun::new(&chain([Some("p1"), Some("p2"), Some("p1")]), RunConfiguration::default()));
  let worker = queue.enqueue(run.clone());
  assert_eq!(worker.label(), "Pipeline run");
  assert!(matches!(worker.wait().await, WorkerState::Finished));
  assert_eq!(run.report().unwrap().partition_count(), 3);
}
