pub mod context;
pub mod schedule;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

pub use context::{JobContext, Trigger};
pub use schedule::{next_fire_time, Schedule};

// --- Public Type Aliases ---

/// Identifies one registration of a job. A name that is removed and registered
/// again gets a fresh `JobId`. Uses UUID v4.
pub type JobId = Uuid;

/// Identifies one execution attempt of a job. Uses UUID v4.
pub type RunId = Uuid;

/// What a run callback resolves to.
pub type JobResult = anyhow::Result<()>;

/// The future a run callback returns.
pub type RunFuture = Pin<Box<dyn Future<Output = JobResult> + Send + 'static>>;

/// The function type the scheduler executes for a job.
///
/// Called once per admitted execution with that execution's [`JobContext`].
/// - `Ok(())` marks the attempt successful.
/// - `Err(_)` marks it failed; the error is rendered into the job's `last_error`.
///
/// Panics inside the callback (or its future) are caught and recorded as failures.
pub type BoxedRunFn = Box<dyn Fn(JobContext) -> RunFuture + Send + Sync + 'static>;

/// Boxes any async closure with the right shape into a [`BoxedRunFn`].
pub(crate) fn boxed_run_fn<F, Fut>(run_fn: F) -> BoxedRunFn
where
  F: Fn(JobContext) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
  Box::new(move |ctx| Box::pin(run_fn(ctx)) as RunFuture)
}

/// Internal, immutable record of a registered job. Shared by `Arc` between the
/// registry, the timer loop and running executions.
pub(crate) struct JobDefinition {
  pub name: Arc<str>,
  pub id: JobId,
  pub schedule: Schedule,
  pub description: String,
  /// Per-execution deadline. On expiry the run's context is cancelled.
  pub timeout: Duration,
  pub run_fn: BoxedRunFn,
}

// Manual Debug: the callback cannot be printed.
impl fmt::Debug for JobDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JobDefinition")
      .field("name", &self.name)
      .field("id", &self.id)
      .field("schedule", &self.schedule.expression())
      .field("description", &self.description)
      .field("timeout", &self.timeout)
      .field("run_fn", &format_args!("<Fn>"))
      .finish()
  }
}

#[cfg(test)]
pub(crate) fn test_definition(name: &str) -> JobDefinition {
  JobDefinition {
    name: Arc::from(name),
    id: JobId::new_v4(),
    schedule: Schedule::parse("@hourly").expect("valid schedule"),
    description: String::new(),
    timeout: Duration::from_secs(60),
    run_fn: boxed_run_fn(|_ctx: JobContext| async { Ok::<(), anyhow::Error>(()) }),
  }
}
