use crate::error::{ExecutionError, StuckJobWarning};
use crate::job::JobId;
use crate::registry::{JobRegistry, JobSlot};

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Derived, human-facing state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
  /// Registered, never completed an execution.
  Pending,
  Running,
  /// Last completed execution succeeded.
  Success,
  /// Last completed execution failed or panicked.
  Error,
}

impl JobState {
  pub fn as_str(&self) -> &'static str {
    match self {
      JobState::Pending => "pending",
      JobState::Running => "running",
      JobState::Success => "success",
      JobState::Error => "error",
    }
  }
}

impl fmt::Display for JobState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Point-in-time view of one job, suitable for status pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
  pub name: String,
  pub job_id: JobId,
  /// The schedule expression as registered.
  pub schedule: String,
  pub description: String,
  pub timeout: Duration,
  pub is_running: bool,
  /// When the in-flight execution was admitted, if one is running.
  pub running_since: Option<DateTime<Utc>>,
  /// Start time of the most recent completed execution.
  pub last_run: Option<DateTime<Utc>>,
  pub last_error: Option<ExecutionError>,
  pub run_count: u64,
  pub error_count: u64,
  /// Next fire time computed from the moment of the query.
  pub next_run: Option<DateTime<Utc>>,
  pub state: JobState,
}

/// Aggregate counters across all registered jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
  pub total_jobs: usize,
  pub running_jobs: usize,
  pub total_runs: u64,
  pub total_errors: u64,
  /// Latest `last_run` across all jobs.
  pub last_activity: Option<DateTime<Utc>>,
  /// When `Scheduler::start` was called, if it was.
  pub started_at: Option<DateTime<Utc>>,
  pub uptime: Option<Duration>,
}

fn derive_state(slot: &JobSlot) -> JobState {
  let record = &slot.record;
  if record.is_running() {
    JobState::Running
  } else if record.last_error.is_some() {
    JobState::Error
  } else if record.last_run.is_some() {
    JobState::Success
  } else {
    JobState::Pending
  }
}

fn snapshot(name: &str, slot: &JobSlot, now: DateTime<Utc>) -> JobStatus {
  let definition = &slot.definition;
  let record = &slot.record;
  JobStatus {
    name: name.to_string(),
    job_id: definition.id,
    schedule: definition.schedule.expression().to_string(),
    description: definition.description.clone(),
    timeout: definition.timeout,
    is_running: record.is_running(),
    running_since: record.running_since,
    last_run: record.last_run,
    last_error: record.last_error.clone(),
    run_count: record.run_count,
    error_count: record.error_count,
    next_run: definition.schedule.next_after(now),
    state: derive_state(slot),
  }
}

impl JobRegistry {
  pub fn status(&self, name: &str, now: DateTime<Utc>) -> Option<JobStatus> {
    self
      .jobs
      .read()
      .get(name)
      .map(|slot| snapshot(name, slot, now))
  }

  /// Snapshots of every job, sorted by name.
  pub fn all_statuses(&self, now: DateTime<Utc>) -> Vec<JobStatus> {
    let mut statuses: Vec<JobStatus> = self
      .jobs
      .read()
      .iter()
      .map(|(name, slot)| snapshot(name, slot, now))
      .collect();
    statuses.sort_by(|a, b| a.name.cmp(&b.name));
    statuses
  }

  /// Aggregates counters. `started_at` is filled in by the caller.
  pub fn stats(&self, started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> SchedulerStats {
    let jobs = self.jobs.read();
    let mut stats = SchedulerStats {
      total_jobs: jobs.len(),
      running_jobs: 0,
      total_runs: 0,
      total_errors: 0,
      last_activity: None,
      started_at,
      uptime: started_at.and_then(|start| (now - start).to_std().ok()),
    };

    for slot in jobs.values() {
      let record = &slot.record;
      if record.is_running() {
        stats.running_jobs += 1;
      }
      stats.total_runs += record.run_count;
      stats.total_errors += record.error_count;
      if record.last_run > stats.last_activity {
        stats.last_activity = record.last_run;
      }
    }
    stats
  }

  /// Jobs that have been running for longer than `threshold`, sorted by name.
  pub fn stuck(&self, threshold: Duration, now: DateTime<Utc>) -> Vec<StuckJobWarning> {
    let mut stuck: Vec<StuckJobWarning> = self
      .jobs
      .read()
      .iter()
      .filter_map(|(name, slot)| {
        let since = slot.record.running_since?;
        let running_for = (now - since).to_std().unwrap_or(Duration::ZERO);
        (running_for > threshold).then(|| StuckJobWarning {
          name: name.clone(),
          running_for,
        })
      })
      .collect();
    stuck.sort_by(|a, b| a.name.cmp(&b.name));
    stuck
  }
}
