use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

// --- Simple Histogram Implementation ---

/// A basic concurrent histogram storing count and sum.
///
/// Enough for mean latency tracking; no percentile information.
#[derive(Debug, Default)]
pub struct SimpleHistogram {
  count: AtomicUsize,
  sum_micros: AtomicUsize,
}

impl SimpleHistogram {
  /// Records a duration observation in the histogram.
  pub fn record(&self, duration: Duration) {
    self.count.fetch_add(1, Ordering::Relaxed);
    self.sum_micros.fetch_add(
      duration.as_micros().try_into().unwrap_or(usize::MAX),
      Ordering::Relaxed,
    );
  }

  pub fn get_count(&self) -> usize {
    self.count.load(Ordering::Relaxed)
  }

  /// Total of all recorded durations, in microseconds.
  pub fn get_sum_micros(&self) -> usize {
    self.sum_micros.load(Ordering::Relaxed)
  }
}

// --- Scheduler Metrics ---

/// Execution counters for the scheduler, shared between the handle, the timer loop
/// and execution tasks. Cloning only clones the `Arc`s.
///
/// Attempts skipped by the single-flight guard are deliberately not counted here;
/// they are only logged.
#[derive(Debug, Clone, Default)]
pub struct SchedulerMetrics {
  /// Times the timer loop found a job due.
  pub scheduled_fires: Arc<AtomicUsize>,
  /// Accepted calls to `run_job_manually`.
  pub manual_triggers: Arc<AtomicUsize>,
  /// Executions that passed the guard.
  pub executions_admitted: Arc<AtomicUsize>,
  pub executions_succeeded: Arc<AtomicUsize>,
  /// Executions whose callback returned an error.
  pub executions_failed: Arc<AtomicUsize>,
  pub executions_panicked: Arc<AtomicUsize>,
  /// Executions still running when their timeout elapsed.
  pub executions_timed_out: Arc<AtomicUsize>,
  /// Execution duration, admitted to settled.
  pub execution_duration: Arc<SimpleHistogram>,
}

impl SchedulerMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn snapshot(&self) -> MetricsSnapshot {
    let order = Ordering::Relaxed;
    MetricsSnapshot {
      scheduled_fires: self.scheduled_fires.load(order),
      manual_triggers: self.manual_triggers.load(order),
      executions_admitted: self.executions_admitted.load(order),
      executions_succeeded: self.executions_succeeded.load(order),
      executions_failed: self.executions_failed.load(order),
      executions_panicked: self.executions_panicked.load(order),
      executions_timed_out: self.executions_timed_out.load(order),
      execution_duration_count: self.execution_duration.get_count(),
      execution_duration_sum_micros: self.execution_duration.get_sum_micros(),
    }
  }
}

/// A snapshot of the scheduler's metrics at a specific point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
  pub scheduled_fires: usize,
  pub manual_triggers: usize,
  pub executions_admitted: usize,
  pub executions_succeeded: usize,
  pub executions_failed: usize,
  pub executions_panicked: usize,
  pub executions_timed_out: usize,
  pub execution_duration_count: usize,
  pub execution_duration_sum_micros: usize,
}

impl MetricsSnapshot {
  /// Mean execution duration, or `None` before the first execution settles.
  pub fn mean_execution_duration(&self) -> Option<Duration> {
    if self.execution_duration_count == 0 {
      None
    } else {
      let micros = self.execution_duration_sum_micros / self.execution_duration_count;
      Some(Duration::from_micros(micros as u64))
    }
  }
}

// --- Hub Metrics ---

/// Counters for the connection hub, updated only by the dispatcher loop.
#[derive(Debug, Clone, Default)]
pub struct HubMetrics {
  pub connections_registered: Arc<AtomicUsize>,
  /// Connections removed through `unregister` (idempotent repeats are not counted).
  pub connections_unregistered: Arc<AtomicUsize>,
  /// Connections dropped because delivery to them failed.
  pub connections_evicted: Arc<AtomicUsize>,
  /// Broadcast requests processed, regardless of how many connections matched.
  pub messages_broadcast: Arc<AtomicUsize>,
  /// Successful enqueues onto a connection's outbound queue.
  pub deliveries: Arc<AtomicUsize>,
}

impl HubMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn snapshot(&self) -> HubMetricsSnapshot {
    let order = Ordering::Relaxed;
    HubMetricsSnapshot {
      connections_registered: self.connections_registered.load(order),
      connections_unregistered: self.connections_unregistered.load(order),
      connections_evicted: self.connections_evicted.load(order),
      messages_broadcast: self.messages_broadcast.load(order),
      deliveries: self.deliveries.load(order),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct HubMetricsSnapshot {
  pub connections_registered: usize,
  pub connections_unregistered: usize,
  pub connections_evicted: usize,
  pub messages_broadcast: usize,
  pub deliveries: usize,
}
