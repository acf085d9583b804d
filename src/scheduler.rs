use crate::coordinator::Coordinator;
use crate::error::{BuildError, ScheduleParseError, SchedulerError, StuckJobWarning};
use crate::job::{boxed_run_fn, JobContext, JobDefinition, JobId, Schedule, Trigger};
use crate::metrics::{MetricsSnapshot, SchedulerMetrics};
use crate::registry::JobRegistry;
use crate::status::{JobStatus, SchedulerStats};
use crate::worker::{Dispatch, Worker};

use std::future::Future;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

const DEFAULT_STUCK_THRESHOLD: Duration = Duration::from_secs(10 * 60);
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);
const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Builder for configuring and creating a [`Scheduler`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use ticketkeeper::Scheduler;
///
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let scheduler = Scheduler::builder()
///     .stuck_threshold(Duration::from_secs(5 * 60))
///     .default_grace(Duration::from_secs(10))
///     .default_job_timeout(Duration::from_secs(60))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SchedulerBuilder {
  stuck_threshold: Duration,
  default_grace: Duration,
  default_job_timeout: Duration,
}

impl Default for SchedulerBuilder {
  fn default() -> Self {
    Self {
      stuck_threshold: DEFAULT_STUCK_THRESHOLD,
      default_grace: DEFAULT_GRACE_PERIOD,
      default_job_timeout: DEFAULT_JOB_TIMEOUT,
    }
  }
}

impl SchedulerBuilder {
  /// Creates a new builder with default settings.
  /// - `stuck_threshold`: 10 minutes.
  /// - `default_grace`: 30 seconds.
  /// - `default_job_timeout`: 2 minutes.
  pub fn new() -> Self {
    Self::default()
  }

  /// How long a job may run before health checks report it as possibly stuck.
  pub fn stuck_threshold(mut self, threshold: Duration) -> Self {
    self.stuck_threshold = threshold;
    self
  }

  /// Grace period used by [`Scheduler::stop_default`].
  pub fn default_grace(mut self, grace: Duration) -> Self {
    self.default_grace = grace;
    self
  }

  /// Timeout for jobs registered without one of their own.
  pub fn default_job_timeout(mut self, timeout: Duration) -> Self {
    self.default_job_timeout = timeout;
    self
  }

  /// Creates the scheduler. Nothing is spawned until [`Scheduler::start`].
  ///
  /// # Errors
  ///
  /// - `BuildError::ZeroStuckThreshold` if the threshold is zero.
  /// - `BuildError::ZeroJobTimeout` if the default job timeout is zero.
  pub fn build(self) -> Result<Scheduler, BuildError> {
    if self.stuck_threshold.is_zero() {
      return Err(BuildError::ZeroStuckThreshold);
    }
    if self.default_job_timeout.is_zero() {
      return Err(BuildError::ZeroJobTimeout);
    }
    Ok(Scheduler::from_builder(self))
  }
}

/// How [`Scheduler::stop`] ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
  /// The timer loop exited and every in-flight execution finished.
  Drained,
  /// The grace period elapsed first. These jobs were still running; they are left to
  /// finish (or not) on their own.
  GraceElapsed { still_running: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
  Idle,
  Running,
  Stopped,
}

#[derive(Debug)]
struct Lifecycle {
  phase: Phase,
  started_at: Option<DateTime<Utc>>,
  coordinator: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Inner {
  registry: Arc<JobRegistry>,
  metrics: SchedulerMetrics,
  worker: Worker,
  wake: Arc<Notify>,
  shutdown: CancellationToken,
  tracker: TaskTracker,
  lifecycle: Mutex<Lifecycle>,
  stuck_threshold: Duration,
  default_grace: Duration,
  default_job_timeout: Duration,
}

/// Cron-style scheduler for the help-desk's periodic maintenance jobs.
///
/// Jobs are registered by unique name with a schedule expression and an async
/// callback. At most one execution per job is in flight at any time; a fire that
/// finds the job still running is skipped, never queued.
///
/// Cloning is cheap and every clone drives the same scheduler.
///
/// Use [`Scheduler::builder()`] or [`Scheduler::new()`] to create an instance.
#[derive(Debug, Clone)]
pub struct Scheduler {
  inner: Arc<Inner>,
}

impl Default for Scheduler {
  fn default() -> Self {
    Self::new()
  }
}

impl Scheduler {
  /// Returns a builder to configure and create a `Scheduler`.
  pub fn builder() -> SchedulerBuilder {
    SchedulerBuilder::new()
  }

  /// A scheduler with default settings.
  pub fn new() -> Self {
    Self::from_builder(SchedulerBuilder::default())
  }

  fn from_builder(builder: SchedulerBuilder) -> Self {
    let registry = Arc::new(JobRegistry::new());
    let metrics = SchedulerMetrics::new();
    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();
    let worker = Worker::new(
      registry.clone(),
      metrics.clone(),
      tracker.clone(),
      shutdown.clone(),
    );

    Self {
      inner: Arc::new(Inner {
        registry,
        metrics,
        worker,
        wake: Arc::new(Notify::new()),
        shutdown,
        tracker,
        lifecycle: Mutex::new(Lifecycle {
          phase: Phase::Idle,
          started_at: None,
          coordinator: None,
        }),
        stuck_threshold: builder.stuck_threshold,
        default_grace: builder.default_grace,
        default_job_timeout: builder.default_job_timeout,
      }),
    }
  }

  /// Registers a job under a unique name, with the default job timeout.
  ///
  /// The schedule is validated here; a job is never stored with an unparsable schedule.
  /// Registration works before and after [`start`](Self::start); a running timer loop
  /// picks the job up immediately.
  ///
  /// # Errors
  ///
  /// - [`SchedulerError::DuplicateJob`]: the name is taken; the existing job is untouched.
  /// - [`SchedulerError::ScheduleParse`]: the expression is not a valid schedule.
  pub fn register_job<F, Fut>(
    &self,
    name: impl Into<String>,
    schedule_expr: &str,
    description: impl Into<String>,
    run_fn: F,
  ) -> Result<JobId, SchedulerError>
  where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    self.register_job_with_timeout(name, schedule_expr, description, Duration::ZERO, run_fn)
  }

  /// Like [`register_job`](Self::register_job), with a timeout for each execution.
  /// A zero `timeout` means the builder's default.
  ///
  /// When an execution outlives its timeout its [`JobContext`] is cancelled and the
  /// attempt is recorded as [`ExecutionError::TimedOut`](crate::ExecutionError::TimedOut)
  /// once the callback returns. The callback is not aborted.
  pub fn register_job_with_timeout<F, Fut>(
    &self,
    name: impl Into<String>,
    schedule_expr: &str,
    description: impl Into<String>,
    timeout: Duration,
    run_fn: F,
  ) -> Result<JobId, SchedulerError>
  where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    let name = name.into();
    if self.inner.registry.get(&name).is_some() {
      return Err(SchedulerError::DuplicateJob(name));
    }
    let schedule = Schedule::parse(schedule_expr)?;

    let definition = JobDefinition {
      name: Arc::from(name),
      id: JobId::new_v4(),
      schedule,
      description: description.into(),
      timeout: if timeout.is_zero() {
        self.inner.default_job_timeout
      } else {
        timeout
      },
      run_fn: boxed_run_fn(run_fn),
    };
    let definition = self.inner.registry.register(definition)?;
    self.inner.wake.notify_one();
    Ok(definition.id)
  }

  /// Removes a job so it is never fired again. Unknown names are ignored.
  ///
  /// An execution already in flight runs to completion; its outcome is discarded.
  pub fn remove_job(&self, name: &str) {
    if self.inner.registry.remove(name).is_some() {
      self.inner.wake.notify_one();
    }
  }

  /// Starts the timer loop on the current Tokio runtime.
  ///
  /// # Errors
  ///
  /// - [`SchedulerError::AlreadyStarted`]: `start` was already called.
  /// - [`SchedulerError::Stopped`]: the scheduler was stopped; it cannot be restarted.
  ///
  /// # Panics
  ///
  /// Panics if called outside a Tokio runtime.
  pub fn start(&self) -> Result<(), SchedulerError> {
    let mut lifecycle = self.inner.lifecycle.lock();
    match lifecycle.phase {
      Phase::Running => return Err(SchedulerError::AlreadyStarted),
      Phase::Stopped => return Err(SchedulerError::Stopped),
      Phase::Idle => {}
    }

    let coordinator = Coordinator::new(
      self.inner.registry.clone(),
      self.inner.worker.clone(),
      self.inner.metrics.clone(),
      self.inner.wake.clone(),
      self.inner.shutdown.clone(),
    );
    let handle = tokio::spawn(async move {
      coordinator.run().await;
      debug!("Timer loop task finished.");
    });

    lifecycle.phase = Phase::Running;
    lifecycle.started_at = Some(Utc::now());
    lifecycle.coordinator = Some(handle);
    info!(jobs = self.inner.registry.len(), "Scheduler started.");
    Ok(())
  }

  /// Stops the timer loop and waits up to `grace` for in-flight executions.
  ///
  /// No new execution is admitted once this is called. Running executions see their
  /// [`JobContext`] cancelled but are not aborted. Idempotent: a later call changes
  /// nothing and again waits up to its own `grace` for executions still in flight.
  pub async fn stop(&self, grace: Duration) -> StopOutcome {
    let coordinator = {
      let mut lifecycle = self.inner.lifecycle.lock();
      if lifecycle.phase == Phase::Stopped {
        debug!("Stop requested on an already stopped scheduler.");
      }
      lifecycle.phase = Phase::Stopped;
      lifecycle.coordinator.take()
    };

    info!(?grace, "Stopping scheduler...");
    self.inner.shutdown.cancel();
    self.inner.tracker.close();

    let drain = async {
      if let Some(handle) = coordinator {
        if let Err(e) = handle.await {
          error!(error = %e, "Timer loop task failed.");
        }
      }
      self.inner.tracker.wait().await;
    };

    match tokio::time::timeout(grace, drain).await {
      Ok(()) => {
        info!("Scheduler stopped gracefully.");
        StopOutcome::Drained
      }
      Err(_) => {
        let still_running = self.inner.registry.running_names();
        warn!(?grace, ?still_running, "Grace period elapsed with jobs still running.");
        StopOutcome::GraceElapsed { still_running }
      }
    }
  }

  /// [`stop`](Self::stop) with the configured default grace period.
  pub async fn stop_default(&self) -> StopOutcome {
    self.stop(self.inner.default_grace).await
  }

  /// Requests one immediate execution of `name` through the same single-flight guard
  /// scheduled fires use. Returns without waiting for the execution.
  ///
  /// If the job is already running the request is skipped (logged, still `Ok`).
  ///
  /// # Errors
  ///
  /// - [`SchedulerError::JobNotFound`]: no such job.
  /// - [`SchedulerError::Stopped`]: the scheduler was stopped.
  ///
  /// # Panics
  ///
  /// Panics if called outside a Tokio runtime.
  pub fn run_job_manually(&self, name: &str) -> Result<(), SchedulerError> {
    // Held through dispatch so that `stop` cannot slip in between the check and the spawn.
    let lifecycle = self.inner.lifecycle.lock();
    if lifecycle.phase == Phase::Stopped {
      return Err(SchedulerError::Stopped);
    }
    if self.inner.registry.get(name).is_none() {
      return Err(SchedulerError::JobNotFound(name.to_string()));
    }

    self
      .inner
      .metrics
      .manual_triggers
      .fetch_add(1, AtomicOrdering::Relaxed);
    info!(job = name, "Manual run requested.");

    match self.inner.worker.dispatch(name, Trigger::Manual) {
      Dispatch::NotFound => Err(SchedulerError::JobNotFound(name.to_string())),
      Dispatch::ShuttingDown => Err(SchedulerError::Stopped),
      Dispatch::Spawned | Dispatch::Skipped => Ok(()),
    }
  }

  pub fn get_job_status(&self, name: &str) -> Option<JobStatus> {
    self.inner.registry.status(name, Utc::now())
  }

  /// Status of every registered job, sorted by name.
  pub fn get_all_job_status(&self) -> Vec<JobStatus> {
    self.inner.registry.all_statuses(Utc::now())
  }

  pub fn get_scheduler_stats(&self) -> SchedulerStats {
    let started_at = self.inner.lifecycle.lock().started_at;
    self.inner.registry.stats(started_at, Utc::now())
  }

  /// `false` if any job has been running longer than the stuck threshold.
  /// Each such job is logged as a warning; nothing is cancelled.
  pub fn is_healthy(&self) -> bool {
    let stuck = self.stuck_jobs();
    for warning in &stuck {
      warn!(job = %warning.name, running_for = ?warning.running_for, "Job might be stuck.");
    }
    stuck.is_empty()
  }

  /// Jobs running longer than the stuck threshold, sorted by name.
  pub fn stuck_jobs(&self) -> Vec<StuckJobWarning> {
    self
      .inner
      .registry
      .stuck(self.inner.stuck_threshold, Utc::now())
  }

  /// `true` between a successful [`start`](Self::start) and the first [`stop`](Self::stop).
  pub fn is_running(&self) -> bool {
    self.inner.lifecycle.lock().phase == Phase::Running
  }

  /// Registered job names, sorted.
  pub fn job_names(&self) -> Vec<String> {
    self.inner.registry.names()
  }

  pub fn metrics_snapshot(&self) -> MetricsSnapshot {
    self.inner.metrics.snapshot()
  }

  /// Computes the first fire time of `expression` strictly after `from`,
  /// without registering anything.
  pub fn next_fire_time(
    expression: &str,
    from: DateTime<Utc>,
  ) -> Result<Option<DateTime<Utc>>, ScheduleParseError> {
    crate::job::next_fire_time(expression, from)
  }
}
