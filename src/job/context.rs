use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{JobId, RunId};

/// What caused an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
  /// The timer loop found the job due.
  Scheduled,
  /// `Scheduler::run_job_manually` was called.
  Manual,
}

impl fmt::Display for Trigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Trigger::Scheduled => f.write_str("scheduled"),
      Trigger::Manual => f.write_str("manual"),
    }
  }
}

/// Contextual information handed to a job's run callback for one execution.
///
/// Long-running callbacks should poll [`JobContext::is_cancelled`] or race
/// [`JobContext::cancelled`] so that `Scheduler::stop` can finish inside its grace period.
/// Callbacks that ignore cancellation simply run to completion.
#[derive(Debug, Clone)]
pub struct JobContext {
  job_name: Arc<str>,
  job_id: JobId,
  run_id: RunId,
  trigger: Trigger,
  started_at: DateTime<Utc>,
  cancel: CancellationToken,
}

impl JobContext {
  pub(crate) fn new(
    job_name: Arc<str>,
    job_id: JobId,
    trigger: Trigger,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      job_name,
      job_id,
      run_id: RunId::new_v4(),
      trigger,
      started_at,
      cancel,
    }
  }

  pub fn job_name(&self) -> &str {
    &self.job_name
  }

  /// The registration this execution belongs to.
  pub fn job_id(&self) -> JobId {
    self.job_id
  }

  /// Unique ID of this execution attempt (used in logs).
  pub fn run_id(&self) -> RunId {
    self.run_id
  }

  pub fn trigger(&self) -> Trigger {
    self.trigger
  }

  pub fn started_at(&self) -> DateTime<Utc> {
    self.started_at
  }

  /// `true` once the scheduler is stopping.
  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Completes when the scheduler starts stopping.
  pub async fn cancelled(&self) {
    self.cancel.cancelled().await
  }
}
