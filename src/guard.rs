//! Single-flight admission for job executions.
//!
//! [`JobRegistry::try_admit`] is the only way to flip a job's running flag on, and an
//! [`AdmitPermit`] is the only way to flip it off again. The permit clears the flag
//! exactly once: either through [`AdmitPermit::complete`] with the execution's outcome,
//! or, if the execution task is torn down first, from its `Drop` impl.

use crate::error::ExecutionError;
use crate::job::JobDefinition;
use crate::registry::{JobRegistry, RunRecord};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{trace, warn};

/// Why an execution attempt was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Refusal {
  /// Another execution of the job is in flight since the given instant.
  AlreadyRunning { since: DateTime<Utc> },
  /// No job with that name is registered.
  NotFound,
}

impl JobRegistry {
  /// Atomically checks and sets the running flag of `name`.
  pub fn try_admit(self: &Arc<Self>, name: &str, now: DateTime<Utc>) -> Result<AdmitPermit, Refusal> {
    let mut jobs = self.jobs.write();
    let slot = jobs.get_mut(name).ok_or(Refusal::NotFound)?;
    if let Some(since) = slot.record.running_since {
      return Err(Refusal::AlreadyRunning { since });
    }
    slot.record.running_since = Some(now);
    trace!(job = name, "Admitted execution.");

    Ok(AdmitPermit {
      registry: Arc::clone(self),
      definition: slot.definition.clone(),
      started_at: now,
      settled: false,
    })
  }

  /// Clears the running flag and folds `outcome` into the counters.
  ///
  /// Does nothing if the job was removed (or removed and registered again) while the
  /// execution was in flight: the record it was admitted against no longer exists.
  fn settle(
    &self,
    definition: &JobDefinition,
    started_at: DateTime<Utc>,
    outcome: Result<(), ExecutionError>,
  ) -> Option<RunRecord> {
    let mut jobs = self.jobs.write();
    match jobs.get_mut(definition.name.as_ref()) {
      Some(slot) if slot.definition.id == definition.id => {
        let record = &mut slot.record;
        record.running_since = None;
        record.last_run = Some(started_at);
        record.run_count += 1;
        match outcome {
          Ok(()) => record.last_error = None,
          Err(e) => {
            record.last_error = Some(e);
            record.error_count += 1;
          }
        }
        Some(record.clone())
      }
      _ => {
        trace!(job = %definition.name, job_id = %definition.id, "Job removed while running, discarding outcome.");
        None
      }
    }
  }
}

/// Proof that an execution of one job was admitted. Holding it keeps the job's
/// running flag set.
#[derive(Debug)]
pub(crate) struct AdmitPermit {
  registry: Arc<JobRegistry>,
  definition: Arc<JobDefinition>,
  started_at: DateTime<Utc>,
  settled: bool,
}

impl AdmitPermit {
  pub fn definition(&self) -> &Arc<JobDefinition> {
    &self.definition
  }

  pub fn started_at(&self) -> DateTime<Utc> {
    self.started_at
  }

  /// Records the execution outcome and releases the job.
  /// Returns the updated record, or `None` if the job was removed meanwhile.
  pub fn complete(mut self, outcome: Result<(), ExecutionError>) -> Option<RunRecord> {
    self.settled = true;
    self
      .registry
      .settle(&self.definition, self.started_at, outcome)
  }
}

impl Drop for AdmitPermit {
  fn drop(&mut self) {
    if self.settled {
      return;
    }
    self.settled = true;
    warn!(job = %self.definition.name, "Execution dropped without reporting an outcome.");
    self
      .registry
      .settle(&self.definition, self.started_at, Err(ExecutionError::Abandoned));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::job::test_definition;

  fn registry_with(name: &str) -> Arc<JobRegistry> {
    let registry = Arc::new(JobRegistry::new());
    registry.register(test_definition(name)).unwrap();
    registry
  }

  #[test]
  fn test_second_admission_refused_while_permit_held() {
    let registry = registry_with("purge_notifications");
    let now = Utc::now();

    let permit = registry.try_admit("purge_notifications", now).unwrap();
    assert_eq!(
      registry.try_admit("purge_notifications", now).unwrap_err(),
      Refusal::AlreadyRunning { since: now }
    );
    assert_eq!(registry.try_admit("unknown", now).unwrap_err(), Refusal::NotFound);

    let record = permit.complete(Ok(())).unwrap();
    assert_eq!(record.run_count, 1);
    assert_eq!(record.error_count, 0);
    assert_eq!(record.last_run, Some(now));
    assert!(registry.try_admit("purge_notifications", now).is_ok());
  }

  #[test]
  fn test_dropped_permit_records_abandoned() {
    let registry = registry_with("sla_check");
    let permit = registry.try_admit("sla_check", Utc::now()).unwrap();
    drop(permit);

    let status = registry.status("sla_check", Utc::now()).unwrap();
    assert!(!status.is_running);
    assert_eq!(status.run_count, 1);
    assert_eq!(status.error_count, 1);
    assert_eq!(status.last_error, Some(ExecutionError::Abandoned));
  }

  #[test]
  fn test_outcome_discarded_after_removal() {
    let registry = registry_with("sla_check");
    let permit = registry.try_admit("sla_check", Utc::now()).unwrap();

    registry.remove("sla_check");
    assert!(permit.complete(Err(ExecutionError::Failed("late".to_string()))).is_none());
    assert!(registry.status("sla_check", Utc::now()).is_none());
  }

  #[test]
  fn test_stale_permit_leaves_new_registration_untouched() {
    let registry = registry_with("sla_check");
    let stale = registry.try_admit("sla_check", Utc::now()).unwrap();

    registry.remove("sla_check");
    registry.register(test_definition("sla_check")).unwrap();
    let fresh = registry.try_admit("sla_check", Utc::now()).unwrap();

    // Neither completing nor dropping the old permit touches the new record.
    assert!(stale.complete(Ok(())).is_none());
    let status = registry.status("sla_check", Utc::now()).unwrap();
    assert!(status.is_running);
    assert_eq!(status.run_count, 0);

    drop(fresh);
    let status = registry.status("sla_check", Utc::now()).unwrap();
    assert!(!status.is_running);
    assert_eq!(status.last_error, Some(ExecutionError::Abandoned));
  }
}
