//! tests/panic.rs
//! Failing and panicking jobs are recorded, counted and do not take the scheduler down.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::common::{build_scheduler, counting_job, failing_job, panicking_job, setup_tracing, wait_for};
use anyhow::Context;
use ticketkeeper::{job_fn, ExecutionError, JobState};

#[tokio::test(flavor = "multi_thread")]
async fn test_error_is_recorded_and_counted() {
  setup_tracing();
  let scheduler = build_scheduler();
  let counter = Arc::new(AtomicUsize::new(0));

  scheduler
    .register_job("send_digest", "@yearly", "", failing_job(counter.clone(), "smtp unreachable"))
    .unwrap();
  scheduler.run_job_manually("send_digest").unwrap();

  assert!(
    wait_for(StdDuration::from_secs(2), || {
      scheduler.get_job_status("send_digest").is_some_and(|s| s.run_count == 1)
    })
    .await
  );

  let status = scheduler.get_job_status("send_digest").unwrap();
  assert_eq!(status.error_count, 1);
  assert_eq!(status.state, JobState::Error);
  assert_eq!(
    status.last_error,
    Some(ExecutionError::Failed("smtp unreachable".to_string()))
  );
  assert!(!status.is_running);
  assert_eq!(scheduler.metrics_snapshot().executions_failed, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_panic_is_caught_and_counted() {
  setup_tracing();
  let scheduler = build_scheduler();
  let counter = Arc::new(AtomicUsize::new(0));

  scheduler
    .register_job("explode", "@yearly", "", panicking_job(counter.clone()))
    .unwrap();
  scheduler.run_job_manually("explode").unwrap();

  assert!(
    wait_for(StdDuration::from_secs(2), || {
      scheduler.get_job_status("explode").is_some_and(|s| s.run_count == 1)
    })
    .await
  );

  let status = scheduler.get_job_status("explode").unwrap();
  assert_eq!(status.error_count, 1);
  assert!(!status.is_running, "Running flag must be cleared after a panic");
  assert_eq!(
    status.last_error,
    Some(ExecutionError::Panicked("Job forced panic!".to_string()))
  );
  assert_eq!(scheduler.metrics_snapshot().executions_panicked, 1);

  // The job can run again afterwards.
  scheduler.run_job_manually("explode").unwrap();
  assert!(
    wait_for(StdDuration::from_secs(2), || {
      scheduler.get_job_status("explode").is_some_and(|s| s.run_count == 2)
    })
    .await
  );
  assert_eq!(counter.load(Ordering::SeqCst), 2);
  assert!(scheduler.is_healthy());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_success_clears_previous_error() {
  setup_tracing();
  let scheduler = build_scheduler();
  let attempts = Arc::new(AtomicUsize::new(0));

  scheduler
    .register_job(
      "flaky_import",
      "@yearly",
      "Fails on first attempt only",
      job_fn! {
        |ctx|
        { let attempts = attempts.clone(); }
        {
          let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
          if attempt == 1 {
            return Err(anyhow::anyhow!("connection reset")).context(format!("import via {}", ctx.job_name()));
          }
          Ok(())
        }
      },
    )
    .unwrap();

  scheduler.run_job_manually("flaky_import").unwrap();
  assert!(
    wait_for(StdDuration::from_secs(2), || {
      scheduler.get_job_status("flaky_import").is_some_and(|s| s.run_count == 1)
    })
    .await
  );
  let failed = scheduler.get_job_status("flaky_import").unwrap();
  assert_eq!(
    failed.last_error,
    Some(ExecutionError::Failed("import via flaky_import: connection reset".to_string()))
  );

  scheduler.run_job_manually("flaky_import").unwrap();
  assert!(
    wait_for(StdDuration::from_secs(2), || {
      scheduler.get_job_status("flaky_import").is_some_and(|s| s.run_count == 2)
    })
    .await
  );
  let recovered = scheduler.get_job_status("flaky_import").unwrap();
  assert_eq!(recovered.state, JobState::Success);
  assert!(recovered.last_error.is_none());
  assert_eq!(recovered.error_count, 1, "Error count is monotonic");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_other_jobs_unaffected_by_panic() {
  setup_tracing();
  let scheduler = build_scheduler();
  let panics = Arc::new(AtomicUsize::new(0));
  let counter = Arc::new(AtomicUsize::new(0));

  scheduler
    .register_job("bad", "@every 100ms", "", panicking_job(panics.clone()))
    .unwrap();
  scheduler
    .register_job("good", "@every 100ms", "", counting_job(counter.clone(), StdDuration::ZERO))
    .unwrap();
  scheduler.start().unwrap();

  assert!(wait_for(StdDuration::from_secs(3), || counter.load(Ordering::SeqCst) >= 3).await);
  assert!(panics.load(Ordering::SeqCst) >= 1);
  assert!(scheduler.is_running());

  scheduler.stop(StdDuration::from_secs(5)).await;
}
