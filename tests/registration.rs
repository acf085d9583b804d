//! tests/registration.rs
//! Registering, removing and querying jobs.

mod common;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::common::{build_scheduler, counting_job, setup_tracing};
use ticketkeeper::{BuildError, JobState, Scheduler, SchedulerError};

#[test]
fn test_builder_rejects_zero_stuck_threshold() {
  let result = Scheduler::builder().stuck_threshold(StdDuration::ZERO).build();
  assert!(matches!(result, Err(BuildError::ZeroStuckThreshold)));
}

#[test]
fn test_register_job_starts_pending() {
  setup_tracing();
  let scheduler = build_scheduler();
  let counter = Arc::new(AtomicUsize::new(0));

  let job_id = scheduler
    .register_job(
      "check_overdue_tickets",
      "0 */5 * * * *",
      "Flags tickets past their SLA",
      counting_job(counter, StdDuration::ZERO),
    )
    .expect("Failed to register job");

  let status = scheduler
    .get_job_status("check_overdue_tickets")
    .expect("Job should be registered");
  assert_eq!(status.job_id, job_id);
  assert_eq!(status.schedule, "0 */5 * * * *");
  assert_eq!(status.description, "Flags tickets past their SLA");
  assert_eq!(status.state, JobState::Pending);
  assert_eq!(status.state.to_string(), "pending");
  assert!(!status.is_running);
  assert_eq!(status.run_count, 0);
  assert_eq!(status.error_count, 0);
  assert!(status.last_run.is_none());
  assert!(status.last_error.is_none());
  assert!(status.next_run.is_some(), "Next run is computed at query time");
}

#[test]
fn test_duplicate_name_rejected_and_original_kept() {
  setup_tracing();
  let scheduler = build_scheduler();
  let counter = Arc::new(AtomicUsize::new(0));

  let first_id = scheduler
    .register_job("cleanup", "@hourly", "original", counting_job(counter.clone(), StdDuration::ZERO))
    .unwrap();

  let result = scheduler.register_job("cleanup", "@daily", "replacement", counting_job(counter, StdDuration::ZERO));
  assert_eq!(result, Err(SchedulerError::DuplicateJob("cleanup".to_string())));

  let status = scheduler.get_job_status("cleanup").unwrap();
  assert_eq!(status.job_id, first_id);
  assert_eq!(status.schedule, "@hourly");
  assert_eq!(status.description, "original");
  assert_eq!(scheduler.job_names(), vec!["cleanup".to_string()]);
}

#[test]
fn test_invalid_schedule_is_not_stored() {
  setup_tracing();
  let scheduler = build_scheduler();
  let counter = Arc::new(AtomicUsize::new(0));

  let result = scheduler.register_job("broken", "every tuesday-ish", "", counting_job(counter, StdDuration::ZERO));
  match result {
    Err(SchedulerError::ScheduleParse(e)) => assert_eq!(e.expression, "every tuesday-ish"),
    other => panic!("Expected ScheduleParse error, got {:?}", other),
  }
  assert!(scheduler.get_job_status("broken").is_none());
  assert!(scheduler.job_names().is_empty());
}

#[test]
fn test_remove_and_reregister_gets_new_id() {
  setup_tracing();
  let scheduler = build_scheduler();
  let counter = Arc::new(AtomicUsize::new(0));

  let first_id = scheduler
    .register_job("refresh_stats", "@every 10m", "", counting_job(counter.clone(), StdDuration::ZERO))
    .unwrap();
  scheduler.remove_job("refresh_stats");
  assert!(scheduler.get_job_status("refresh_stats").is_none());

  // Unknown names are a no-op.
  scheduler.remove_job("refresh_stats");
  scheduler.remove_job("never_registered");

  let second_id = scheduler
    .register_job("refresh_stats", "@every 10m", "", counting_job(counter, StdDuration::ZERO))
    .unwrap();
  assert_ne!(first_id, second_id);
}

#[test]
fn test_statuses_and_names_sorted() {
  setup_tracing();
  let scheduler = build_scheduler();
  let counter = Arc::new(AtomicUsize::new(0));

  for name in ["sla_check", "archive_closed", "notify_digest"] {
    scheduler
      .register_job(name, "@daily", "", counting_job(counter.clone(), StdDuration::ZERO))
      .unwrap();
  }

  let names: Vec<String> = scheduler
    .get_all_job_status()
    .into_iter()
    .map(|status| status.name)
    .collect();
  assert_eq!(names, vec!["archive_closed", "notify_digest", "sla_check"]);
  assert_eq!(scheduler.job_names(), names);

  let stats = scheduler.get_scheduler_stats();
  assert_eq!(stats.total_jobs, 3);
  assert_eq!(stats.running_jobs, 0);
  assert_eq!(stats.total_runs, 0);
  assert!(stats.started_at.is_none());
  assert!(stats.uptime.is_none());
}

#[tokio::test]
async fn test_manual_run_of_unknown_job() {
  setup_tracing();
  let scheduler = build_scheduler();
  assert_eq!(
    scheduler.run_job_manually("ghost"),
    Err(SchedulerError::JobNotFound("ghost".to_string()))
  );
  assert_eq!(scheduler.metrics_snapshot().manual_triggers, 0);
}

#[tokio::test]
async fn test_start_twice_and_after_stop() {
  setup_tracing();
  let scheduler = build_scheduler();

  scheduler.start().expect("First start should succeed");
  assert!(scheduler.is_running());
  assert_eq!(scheduler.start(), Err(SchedulerError::AlreadyStarted));
  assert!(scheduler.get_scheduler_stats().started_at.is_some());

  scheduler.stop(StdDuration::from_secs(1)).await;
  assert!(!scheduler.is_running());
  assert_eq!(scheduler.start(), Err(SchedulerError::Stopped));
}
