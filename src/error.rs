use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while configuring a `Scheduler` or `Hub` through their builders.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  #[error("Stuck-job threshold (`stuck_threshold`) must be greater than zero")]
  ZeroStuckThreshold,
  #[error("Outbound queue capacity (`outbound_capacity`) must be greater than zero")]
  ZeroOutboundCapacity,
  #[error("Hub command buffer (`command_buffer_size`) must be greater than zero")]
  ZeroCommandBuffer,
  #[error("Default job timeout (`default_job_timeout`) must be greater than zero")]
  ZeroJobTimeout,
}

/// A schedule expression that could not be turned into a [`Schedule`](crate::Schedule).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid schedule expression '{expression}': {reason}")]
pub struct ScheduleParseError {
  pub expression: String,
  pub reason: String,
}

impl ScheduleParseError {
  pub(crate) fn new(expression: &str, reason: impl Into<String>) -> Self {
    Self {
      expression: expression.to_string(),
      reason: reason.into(),
    }
  }
}

/// Errors returned synchronously by the scheduler surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
  /// A job with this name is already registered. The existing job is left untouched.
  #[error("Job '{0}' is already registered.")]
  DuplicateJob(String),
  /// The schedule expression was rejected at registration time.
  #[error(transparent)]
  ScheduleParse(#[from] ScheduleParseError),
  /// No job with this name is registered.
  #[error("Job '{0}' not found.")]
  JobNotFound(String),
  #[error("Scheduler timer loop is already running.")]
  AlreadyStarted,
  #[error("Scheduler has been stopped.")]
  Stopped,
}

/// Why a single execution attempt of a job failed.
///
/// Execution errors never leave the scheduler: they are recorded as the job's
/// `last_error`, counted in `error_count`, and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ExecutionError {
  /// The run callback returned an error.
  #[error("job failed: {0}")]
  Failed(String),
  /// The run callback panicked.
  #[error("job panicked: {0}")]
  Panicked(String),
  /// The run callback was still running when its timeout elapsed.
  #[error("job exceeded its {0:?} timeout")]
  TimedOut(Duration),
  /// The execution task was torn down before it could report an outcome.
  #[error("job execution was abandoned before completion")]
  Abandoned,
}

/// Advisory signal that a job has been running longer than the configured threshold.
/// No corrective action is taken.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("job '{name}' has been running for {running_for:?}, it might be stuck")]
pub struct StuckJobWarning {
  pub name: String,
  pub running_for: Duration,
}

/// Delivery to one connection failed. Resolved inside the dispatcher by evicting the
/// connection; never surfaced to the broadcaster.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSendError {
  #[error("outbound queue is full")]
  QueueFull,
  #[error("transport side of the connection is gone")]
  Disconnected,
}

/// Errors returned by the hub handle.
#[derive(Error, Debug)]
pub enum HubError {
  #[error("Hub dispatcher is closed (shut down or panicked).")]
  Closed,
  #[error("Payload could not be serialized: {0}")]
  Payload(#[from] serde_json::Error),
  #[error("Invalid client message: {0}")]
  InvalidClientMessage(String),
}
