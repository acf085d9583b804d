//! tests/recurring.rs
//! Timer loop behaviour: recurring fires, late registration and removal.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::common::{build_scheduler, counting_job, setup_tracing, wait_for};
use ticketkeeper::{JobState, StopOutcome};

#[tokio::test(flavor = "multi_thread")]
async fn test_every_second_job_runs_repeatedly() {
  setup_tracing();
  let scheduler = build_scheduler();
  let counter = Arc::new(AtomicUsize::new(0));

  scheduler
    .register_job(
      "cleanup",
      "* * * * * *",
      "Runs every second",
      counting_job(counter.clone(), StdDuration::from_millis(10)),
    )
    .unwrap();
  scheduler.start().unwrap();

  tokio::time::sleep(StdDuration::from_millis(2500)).await;

  let status = scheduler.get_job_status("cleanup").unwrap();
  assert!(status.run_count >= 2, "Expected at least 2 runs, got {}", status.run_count);
  assert_eq!(status.error_count, 0);
  assert!(status.last_run.is_some());
  assert!(counter.load(Ordering::SeqCst) >= 2);

  let metrics = scheduler.metrics_snapshot();
  assert!(metrics.scheduled_fires >= 2);
  assert_eq!(metrics.manual_triggers, 0);
  assert!(metrics.mean_execution_duration().is_some());

  let stats = scheduler.get_scheduler_stats();
  assert!(stats.total_runs >= 2);
  assert!(stats.last_activity.is_some());
  assert!(stats.uptime.unwrap() >= StdDuration::from_secs(2));

  assert_eq!(scheduler.stop(StdDuration::from_secs(5)).await, StopOutcome::Drained);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_interval_job_registered_after_start() {
  setup_tracing();
  let scheduler = build_scheduler();
  let counter = Arc::new(AtomicUsize::new(0));
  scheduler.start().unwrap();

  // The timer loop is idle with an empty queue; registration must wake it.
  scheduler
    .register_job(
      "heartbeat",
      "@every 200ms",
      "",
      counting_job(counter.clone(), StdDuration::ZERO),
    )
    .unwrap();

  let ran_three_times = wait_for(StdDuration::from_secs(3), || counter.load(Ordering::SeqCst) >= 3).await;
  assert!(ran_three_times, "Interval job should have run at least 3 times");

  let status = scheduler.get_job_status("heartbeat").unwrap();
  assert!(matches!(status.state, JobState::Success | JobState::Running));

  scheduler.stop(StdDuration::from_secs(5)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_removed_job_stops_firing() {
  setup_tracing();
  let scheduler = build_scheduler();
  let counter = Arc::new(AtomicUsize::new(0));

  scheduler
    .register_job("poll_mailbox", "@every 100ms", "", counting_job(counter.clone(), StdDuration::ZERO))
    .unwrap();
  scheduler.start().unwrap();

  assert!(wait_for(StdDuration::from_secs(2), || counter.load(Ordering::SeqCst) >= 1).await);
  scheduler.remove_job("poll_mailbox");
  // Let anything already dispatched settle.
  tokio::time::sleep(StdDuration::from_millis(150)).await;

  let after_removal = counter.load(Ordering::SeqCst);
  tokio::time::sleep(StdDuration::from_millis(500)).await;
  assert_eq!(
    counter.load(Ordering::SeqCst),
    after_removal,
    "Removed job must not fire again"
  );
  assert!(scheduler.get_job_status("poll_mailbox").is_none());

  scheduler.stop(StdDuration::from_secs(5)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stopped_scheduler_no_longer_fires() {
  setup_tracing();
  let scheduler = build_scheduler();
  let counter = Arc::new(AtomicUsize::new(0));

  scheduler
    .register_job("tick", "@every 100ms", "", counting_job(counter.clone(), StdDuration::ZERO))
    .unwrap();
  scheduler.start().unwrap();
  assert!(wait_for(StdDuration::from_secs(2), || counter.load(Ordering::SeqCst) >= 1).await);

  assert_eq!(scheduler.stop(StdDuration::from_secs(5)).await, StopOutcome::Drained);
  let after_stop = counter.load(Ordering::SeqCst);
  tokio::time::sleep(StdDuration::from_millis(400)).await;
  assert_eq!(counter.load(Ordering::SeqCst), after_stop);
}
