//! Bounded background execution for derived effects.
//!
//! Jobs go onto a fixed-capacity queue drained by a fixed pool of workers.
//! Submitting never waits: a full queue dead-letters the job on the spot.
//! Each job runs under a timeout; errors and timeouts are logged under
//! [`DEAD_LETTER_TARGET`] and kept in a small in-memory ring for inspection.
//! Nothing is retried.

use std::{
  collections::VecDeque,
  future::Future,
  pin::Pin,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
  sync::mpsc::{self, error::TrySendError},
  task::JoinHandle,
};

use crate::{EffectError, PipelineConfig};

/// `tracing` target for failed derived effects.
pub const DEAD_LETTER_TARGET: &str = "engage::dead_letter";

type Job = Pin<Box<dyn Future<Output = Result<(), EffectError>> + Send>>;

struct Task {
  label: String,
  job:   Job,
}

/// A derived effect that did not complete.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
  pub label:  String,
  pub reason: String,
  pub at:     DateTime<Utc>,
}

struct Shared {
  sender:        Mutex<Option<mpsc::Sender<Task>>>,
  workers:       Mutex<Vec<JoinHandle<()>>>,
  dead:          Mutex<VecDeque<DeadLetter>>,
  dead_capacity: usize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

impl Shared {
  fn dead_letter(&self, label: String, reason: String) {
    tracing::error!(target: DEAD_LETTER_TARGET, task = %label, %reason, "derived effect failed");

    if self.dead_capacity == 0 {
      return;
    }
    let mut dead = lock(&self.dead);
    if dead.len() == self.dead_capacity {
      dead.pop_front();
    }
    dead.push_back(DeadLetter { label, reason, at: Utc::now() });
  }
}

/// Handle to the worker pool. Cloning is cheap; all clones share one queue.
#[derive(Clone)]
pub struct BackgroundTasks {
  shared: Arc<Shared>,
}

impl BackgroundTasks {
  /// Start the worker pool. Must be called from within a tokio runtime.
  pub fn start(config: &PipelineConfig) -> Self {
    let (sender, receiver) = mpsc::channel::<Task>(config.queue_capacity.max(1));
    let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

    let shared = Arc::new(Shared {
      sender:        Mutex::new(Some(sender)),
      workers:       Mutex::new(Vec::new()),
      dead:          Mutex::new(VecDeque::new()),
      dead_capacity: config.dead_letter_capacity,
    });

    let timeout = config.effect_timeout();
    let handles = (0..config.workers.max(1))
      .map(|id| {
        let receiver = Arc::clone(&receiver);
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
          loop {
            let next = receiver.lock().await.recv().await;
            let Some(task) = next else { break };
            run(&shared, task, timeout).await;
          }
          tracing::debug!(worker = id, "background worker stopped");
        })
      })
      .collect();
    *lock(&shared.workers) = handles;

    Self { shared }
  }

  /// Queue a job. Never blocks; if the queue is full or closed the job is
  /// dead-lettered immediately.
  pub fn submit<F>(&self, label: impl Into<String>, job: F)
  where
    F: Future<Output = Result<(), EffectError>> + Send + 'static,
  {
    let task = Task { label: label.into(), job: Box::pin(job) };
    let sender = lock(&self.shared.sender).clone();

    let Some(sender) = sender else {
      self.shared.dead_letter(task.label, "queue closed".to_owned());
      return;
    };

    match sender.try_send(task) {
      Ok(()) => {}
      Err(TrySendError::Full(task)) => {
        self.shared.dead_letter(task.label, "queue full".to_owned());
      }
      Err(TrySendError::Closed(task)) => {
        self.shared.dead_letter(task.label, "queue closed".to_owned());
      }
    }
  }

  /// Snapshot of the dead-letter ring, oldest first.
  pub fn dead_letters(&self) -> Vec<DeadLetter> {
    lock(&self.shared.dead).iter().cloned().collect()
  }

  /// Stop accepting jobs and wait for the workers to drain what is queued.
  pub async fn shutdown(&self) {
    lock(&self.shared.sender).take();
    let workers = std::mem::take(&mut *lock(&self.shared.workers));
    for worker in workers {
      if let Err(e) = worker.await {
        tracing::warn!(error = %e, "background worker panicked");
      }
    }
  }
}

async fn run(shared: &Shared, task: Task, timeout: Duration) {
  let Task { label, job } = task;
  match tokio::time::timeout(timeout, job).await {
    Ok(Ok(())) => tracing::trace!(task = %label, "derived effect done"),
    Ok(Err(e)) => shared.dead_letter(label, e.to_string()),
    Err(_) => shared.dead_letter(label, format!("timed out after {timeout:?}")),
  }
}
