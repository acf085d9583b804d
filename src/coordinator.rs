use crate::job::{JobId, Trigger};
use crate::metrics::SchedulerMetrics;
use crate::registry::JobRegistry;
use crate::worker::{Dispatch, Worker};

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use priority_queue::PriorityQueue;
use tokio::sync::Notify;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// How long to sleep when nothing is queued. Any registration wakes the loop early.
const IDLE_SLEEP: Duration = Duration::from_secs(60 * 60 * 24 * 7);

/// The timer loop.
///
/// Keeps one queue entry per registered job, keyed by name and ordered by the next
/// fire time (earliest first). The registry stays the source of truth: a name is only
/// fired if it is still registered under the same `JobId` it was queued for.
pub(crate) struct Coordinator {
  registry: Arc<JobRegistry>,
  worker: Worker,
  metrics: SchedulerMetrics,
  wake: Arc<Notify>,
  shutdown: CancellationToken,
  queue: PriorityQueue<String, Reverse<DateTime<Utc>>>,
  // JobId each queued name was computed for.
  queued_ids: HashMap<String, JobId>,
}

impl Coordinator {
  pub fn new(
    registry: Arc<JobRegistry>,
    worker: Worker,
    metrics: SchedulerMetrics,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
  ) -> Self {
    Self {
      registry,
      worker,
      metrics,
      wake,
      shutdown,
      queue: PriorityQueue::new(),
      queued_ids: HashMap::new(),
    }
  }

  /// Runs until the shutdown token is cancelled.
  pub async fn run(mut self) {
    info!(jobs = self.registry.len(), "Timer loop started.");
    self.sync_with_registry(Utc::now());

    loop {
      let sleep_duration = self.calculate_sleep();

      tokio::select! {
        biased;

        _ = self.shutdown.cancelled() => {
          info!("Timer loop received shutdown signal.");
          break;
        }

        _ = self.wake.notified() => {
          trace!("Registry changed, resyncing queue.");
          self.sync_with_registry(Utc::now());
        }

        _ = sleep(sleep_duration) => {
          self.fire_due_jobs();
        }
      }
    }

    info!(queued = self.queue.len(), "Timer loop exiting.");
  }

  /// Drops queue entries for removed or replaced jobs and queues jobs seen for the first time.
  fn sync_with_registry(&mut self, now: DateTime<Utc>) {
    let definitions = self.registry.definitions();
    let live: HashMap<&str, JobId> = definitions
      .iter()
      .map(|def| (def.name.as_ref(), def.id))
      .collect();

    let queue = &mut self.queue;
    self.queued_ids.retain(|name, id| {
      let keep = live.get(name.as_str()) == Some(&*id);
      if !keep {
        queue.remove(name);
        debug!(job = %name, "Dropped stale queue entry.");
      }
      keep
    });

    for definition in &definitions {
      if self.queued_ids.contains_key(definition.name.as_ref()) {
        continue;
      }
      match definition.schedule.next_after(now) {
        Some(next_run) => {
          trace!(job = %definition.name, %next_run, "Queued job.");
          self.queue.push(definition.name.to_string(), Reverse(next_run));
          self
            .queued_ids
            .insert(definition.name.to_string(), definition.id);
        }
        None => warn!(
          job = %definition.name,
          schedule = %definition.schedule,
          "Schedule has no future occurrence, job will only run manually."
        ),
      }
    }
  }

  fn calculate_sleep(&self) -> Duration {
    match self.queue.peek() {
      Some((_, Reverse(next_run))) => (*next_run - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO),
      None => IDLE_SLEEP,
    }
  }

  /// Fires every entry that is due and requeues each at its next occurrence.
  fn fire_due_jobs(&mut self) {
    let now = Utc::now();

    loop {
      let due = match self.queue.peek() {
        Some((_, Reverse(due))) if *due <= now => *due,
        _ => break,
      };
      let Some((name, _)) = self.queue.pop() else {
        break;
      };
      let Some(job_id) = self.queued_ids.remove(&name) else {
        continue;
      };
      let Some(definition) = self.registry.get(&name).filter(|def| def.id == job_id) else {
        debug!(job = %name, "Due job no longer registered, dropping.");
        continue;
      };

      self
        .metrics
        .scheduled_fires
        .fetch_add(1, AtomicOrdering::Relaxed);
      debug!(job = %name, %due, "Job due.");

      if self.worker.dispatch(&name, Trigger::Scheduled) == Dispatch::NotFound {
        continue;
      }

      match definition.schedule.next_after(now) {
        Some(next_run) => {
          trace!(job = %name, %next_run, "Requeued job.");
          self.queue.push(name.clone(), Reverse(next_run));
          self.queued_ids.insert(name, job_id);
        }
        None => info!(job = %name, "Schedule exhausted, not requeueing."),
      }
    }
  }
}
