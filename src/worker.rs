use crate::error::ExecutionError;
use crate::guard::{AdmitPermit, Refusal};
use crate::job::{JobContext, Trigger};
use crate::metrics::SchedulerMetrics;
use crate::registry::JobRegistry;

use std::any::Any;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};

/// What happened to a request to run a job once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
  /// Admitted and spawned as its own task.
  Spawned,
  /// Another execution of the job is still in flight.
  Skipped,
  /// The job is not registered (any more).
  NotFound,
  /// The scheduler is stopping; nothing new is admitted.
  ShuttingDown,
}

/// Turns admitted executions into tracked Tokio tasks.
///
/// Shared by the timer loop and the manual-trigger path; every execution, whatever
/// its trigger, passes through the same guard and reports through the same permit.
#[derive(Debug, Clone)]
pub(crate) struct Worker {
  registry: Arc<JobRegistry>,
  metrics: SchedulerMetrics,
  tracker: TaskTracker,
  cancel: CancellationToken,
}

impl Worker {
  pub fn new(
    registry: Arc<JobRegistry>,
    metrics: SchedulerMetrics,
    tracker: TaskTracker,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      registry,
      metrics,
      tracker,
      cancel,
    }
  }

  /// Asks the guard to admit one execution of `name` and, if admitted, spawns it.
  /// Returns without waiting for the execution.
  pub fn dispatch(&self, name: &str, trigger: Trigger) -> Dispatch {
    if self.cancel.is_cancelled() {
      debug!(job = name, %trigger, "Scheduler is stopping, not dispatching.");
      return Dispatch::ShuttingDown;
    }
    let now = Utc::now();
    let permit = match self.registry.try_admit(name, now) {
      Ok(permit) => permit,
      Err(Refusal::AlreadyRunning { since }) => {
        info!(job = name, %trigger, running_since = %since, "Job is already running, skipping.");
        return Dispatch::Skipped;
      }
      Err(Refusal::NotFound) => {
        debug!(job = name, %trigger, "Job not registered, nothing to dispatch.");
        return Dispatch::NotFound;
      }
    };

    self
      .metrics
      .executions_admitted
      .fetch_add(1, AtomicOrdering::Relaxed);

    let definition = permit.definition().clone();
    let run_token = self.cancel.child_token();
    let ctx = JobContext::new(
      definition.name.clone(),
      definition.id,
      trigger,
      now,
      run_token.clone(),
    );
    let job_span = tracing::info_span!(
      "job_exec",
      job = %definition.name,
      job_id = %definition.id,
      run_id = %ctx.run_id(),
      %trigger
    );

    self
      .tracker
      .spawn(execute(permit, ctx, run_token, self.metrics.clone()).instrument(job_span));
    Dispatch::Spawned
  }
}

/// Runs the callback in its own task so that panics surface as a `JoinError`,
/// then settles the permit with the outcome.
///
/// If the callback outlives the job's timeout, `run_token` is cancelled and the
/// attempt counts as timed out once the callback returns.
async fn execute(
  permit: AdmitPermit,
  ctx: JobContext,
  run_token: CancellationToken,
  metrics: SchedulerMetrics,
) {
  let timeout = permit.definition().timeout;
  info!(started_at = %permit.started_at(), ?timeout, "Running job.");
  let started = Instant::now();

  let definition = permit.definition().clone();
  let mut task = tokio::spawn(async move { (definition.run_fn)(ctx).await });

  let within_deadline = tokio::time::timeout(timeout, &mut task).await;
  let (joined, timed_out) = match within_deadline {
    Ok(joined) => (joined, false),
    Err(_) => {
      warn!(?timeout, "Job exceeded its timeout, cancelling its context.");
      run_token.cancel();
      (task.await, true)
    }
  };

  let outcome = match joined {
    Err(join_error) if join_error.is_panic() => {
      metrics
        .executions_panicked
        .fetch_add(1, AtomicOrdering::Relaxed);
      Err(ExecutionError::Panicked(panic_message(join_error.into_panic())))
    }
    _ if timed_out => {
      metrics
        .executions_timed_out
        .fetch_add(1, AtomicOrdering::Relaxed);
      Err(ExecutionError::TimedOut(timeout))
    }
    Ok(Ok(())) => {
      metrics
        .executions_succeeded
        .fetch_add(1, AtomicOrdering::Relaxed);
      Ok(())
    }
    Ok(Err(err)) => {
      metrics
        .executions_failed
        .fetch_add(1, AtomicOrdering::Relaxed);
      Err(ExecutionError::Failed(format!("{err:#}")))
    }
    // Only happens when the runtime itself is shutting down.
    Err(_) => Err(ExecutionError::Abandoned),
  };

  let duration = started.elapsed();
  metrics.execution_duration.record(duration);

  match &outcome {
    Ok(()) => {
      let next_run = permit.definition().schedule.next_after(Utc::now());
      info!(
        duration_ms = duration.as_millis() as u64,
        next_run = ?next_run,
        "Job completed successfully."
      );
    }
    Err(e) => error!(duration_ms = duration.as_millis() as u64, error = %e, "Job failed."),
  }

  if let Some(record) = permit.complete(outcome) {
    debug!(
      run_count = record.run_count,
      error_count = record.error_count,
      "Recorded job outcome."
    );
  }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  if let Some(message) = payload.downcast_ref::<&'static str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::job::test_definition;

  #[test]
  fn test_dispatch_refused_once_shutdown_begins() {
    let registry = Arc::new(JobRegistry::new());
    registry.register(test_definition("purge_notifications")).unwrap();
    let cancel = CancellationToken::new();
    let worker = Worker::new(registry.clone(), SchedulerMetrics::new(), TaskTracker::new(), cancel.clone());

    cancel.cancel();
    assert_eq!(worker.dispatch("purge_notifications", Trigger::Manual), Dispatch::ShuttingDown);
    assert!(registry.running_names().is_empty());
    assert_eq!(worker.metrics.snapshot().executions_admitted, 0);
  }
}
