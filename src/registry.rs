use crate::error::{ExecutionError, SchedulerError};
use crate::job::JobDefinition;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

/// Mutable run bookkeeping for one job. Only the execution guard writes it.
#[derive(Debug, Default, Clone)]
pub(crate) struct RunRecord {
  /// Set at admission, cleared when the execution reports back (or its permit drops).
  pub running_since: Option<DateTime<Utc>>,
  /// Start instant of the most recent completed attempt.
  pub last_run: Option<DateTime<Utc>>,
  pub last_error: Option<ExecutionError>,
  pub run_count: u64,
  pub error_count: u64,
}

impl RunRecord {
  pub fn is_running(&self) -> bool {
    self.running_since.is_some()
  }
}

#[derive(Debug)]
pub(crate) struct JobSlot {
  pub definition: Arc<JobDefinition>,
  pub record: RunRecord,
}

/// The job table: name -> definition plus run record.
///
/// A single `RwLock` guards both halves so that admission (check-and-set of the
/// running flag) and completion are atomic with respect to each other, while the
/// frequent status queries only take the read side.
#[derive(Debug, Default)]
pub(crate) struct JobRegistry {
  pub(crate) jobs: RwLock<HashMap<String, JobSlot>>,
}

impl JobRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Stores a new job with a zeroed run record.
  ///
  /// # Errors
  ///
  /// [`SchedulerError::DuplicateJob`] if the name is taken; the existing job is untouched.
  pub fn register(&self, definition: JobDefinition) -> Result<Arc<JobDefinition>, SchedulerError> {
    let mut jobs = self.jobs.write();
    if jobs.contains_key(definition.name.as_ref()) {
      return Err(SchedulerError::DuplicateJob(definition.name.to_string()));
    }

    let definition = Arc::new(definition);
    jobs.insert(
      definition.name.to_string(),
      JobSlot {
        definition: definition.clone(),
        record: RunRecord::default(),
      },
    );
    info!(
      job = %definition.name,
      job_id = %definition.id,
      schedule = %definition.schedule,
      total_jobs = jobs.len(),
      "Registered job."
    );
    Ok(definition)
  }

  /// Removes a job. Unknown names are ignored.
  pub fn remove(&self, name: &str) -> Option<Arc<JobDefinition>> {
    let removed = self.jobs.write().remove(name);
    match &removed {
      Some(slot) => info!(job = name, job_id = %slot.definition.id, running = slot.record.is_running(), "Removed job."),
      None => debug!(job = name, "Remove requested for unknown job, ignoring."),
    }
    removed.map(|slot| slot.definition)
  }

  pub fn get(&self, name: &str) -> Option<Arc<JobDefinition>> {
    self.jobs.read().get(name).map(|slot| slot.definition.clone())
  }

  /// All registered definitions, in no particular order.
  pub fn definitions(&self) -> Vec<Arc<JobDefinition>> {
    self
      .jobs
      .read()
      .values()
      .map(|slot| slot.definition.clone())
      .collect()
  }

  /// Registered job names, sorted.
  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.jobs.read().keys().cloned().collect();
    names.sort();
    names
  }

  pub fn len(&self) -> usize {
    self.jobs.read().len()
  }

  /// Names of jobs that are currently executing, sorted.
  pub fn running_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self
      .jobs
      .read()
      .iter()
      .filter(|(_, slot)| slot.record.is_running())
      .map(|(name, _)| name.clone())
      .collect();
    names.sort();
    names
  }
}
