/// Macro to simplify writing a job run callback.
///
/// Takes the name to bind the [`JobContext`](crate::JobContext) to, an optional
/// synchronous setup block and the async body. The setup block runs on every
/// execution, before the body's future is created; use it to clone `Arc`s into the
/// body. The body is wrapped in `async move` and must evaluate to
/// [`JobResult`](crate::JobResult).
///
/// # Usage
///
/// ```no_run
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use ticketkeeper::{job_fn, Scheduler};
///
/// # fn run(scheduler: &Scheduler) -> Result<(), ticketkeeper::SchedulerError> {
/// let purged = Arc::new(AtomicUsize::new(0));
///
/// // With setup block:
/// scheduler.register_job(
///     "purge_read_notifications",
///     "0 0 3 * * *",
///     "Deletes read notifications older than 30 days",
///     job_fn! {
///         |ctx|
///         { let purged = purged.clone(); }
///         {
///             if ctx.is_cancelled() {
///                 return Ok(());
///             }
///             purged.fetch_add(1, Ordering::SeqCst);
///             Ok(())
///         }
///     },
/// )?;
///
/// // Without setup block:
/// scheduler.register_job(
///     "heartbeat",
///     "@every 30s",
///     "Logs a heartbeat",
///     job_fn! {
///         |ctx|
///         {
///             println!("heartbeat from {}", ctx.job_name());
///             Ok(())
///         }
///     },
/// )?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! job_fn {
  // Context binding, setup block, body.
  (
    |$ctx:ident|
    { $($setup_stmts:stmt);* $(;)? }
    $main_block:block
  ) => {
    move |$ctx: $crate::JobContext| {
      $($setup_stmts;)*
      async move {
        let result: $crate::JobResult = async move $main_block.await;
        result
      }
    }
  };

  // Context binding and body only.
  (
    |$ctx:ident|
    $main_block:block
  ) => {
    move |$ctx: $crate::JobContext| {
      async move {
        let result: $crate::JobResult = async move $main_block.await;
        result
      }
    }
  };
}
