//! tests/common.rs
//! Shared helper functions for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::time::Instant;
use tracing_subscriber::EnvFilter;
use ticketkeeper::job::RunFuture;
use ticketkeeper::{Hub, JobContext, Scheduler};

// Initializes tracing subscriber for test output. `RUST_LOG` overrides the default filter.
pub fn setup_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ticketkeeper=debug"));
  // Use try_init to avoid panic if called multiple times
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_test_writer() // Enable per-test log capture
    .try_init();
}

// A scheduler with defaults, not yet started.
pub fn build_scheduler() -> Scheduler {
  Scheduler::builder()
    .build()
    .expect("default scheduler config is valid")
}

// A hub with a small outbound queue so eviction is easy to provoke.
pub fn build_hub(outbound_capacity: usize) -> Hub {
  Hub::builder()
    .outbound_capacity(outbound_capacity)
    .build()
    .expect("hub config is valid")
}

// Job that increments `counter` when it starts, then sleeps for `delay` and succeeds.
pub fn counting_job(
  counter: Arc<AtomicUsize>,
  delay: StdDuration,
) -> impl Fn(JobContext) -> RunFuture + Send + Sync + 'static {
  move |ctx| {
    let ctr = counter.clone();
    Box::pin(async move {
      let count = ctr.fetch_add(1, Ordering::SeqCst) + 1;
      tracing::debug!(job = ctx.job_name(), count, "Counter job executing");
      if delay > StdDuration::ZERO {
        tokio::time::sleep(delay).await;
      }
      Ok::<(), anyhow::Error>(())
    })
  }
}

// Job that increments `counter` and returns an error.
pub fn failing_job(
  counter: Arc<AtomicUsize>,
  message: &'static str,
) -> impl Fn(JobContext) -> RunFuture + Send + Sync + 'static {
  move |_ctx| {
    let ctr = counter.clone();
    Box::pin(async move {
      ctr.fetch_add(1, Ordering::SeqCst);
      Err::<(), _>(anyhow::anyhow!(message))
    })
  }
}

// Job that increments `counter` and panics.
pub fn panicking_job(counter: Arc<AtomicUsize>) -> impl Fn(JobContext) -> RunFuture + Send + Sync + 'static {
  move |_ctx| {
    let ctr = counter.clone();
    Box::pin(async move {
      let runs = ctr.fetch_add(1, Ordering::SeqCst) + 1;
      tokio::task::yield_now().await;
      if runs > 0 {
        panic!("Job forced panic!");
      }
      Ok::<(), anyhow::Error>(())
    })
  }
}

// Tracks how many executions overlap. Increments `active` on start, decrements on end
// and records the highest value seen in `max_observed`.
pub fn concurrency_tracker(
  active: Arc<AtomicUsize>,
  max_observed: Arc<AtomicUsize>,
  delay: StdDuration,
) -> impl Fn(JobContext) -> RunFuture + Send + Sync + 'static {
  move |_ctx| {
    let active = active.clone();
    let max_obs = max_observed.clone();
    Box::pin(async move {
      let current = active.fetch_add(1, Ordering::SeqCst) + 1;
      max_obs.fetch_max(current, Ordering::SeqCst);
      tokio::time::sleep(delay).await;
      active.fetch_sub(1, Ordering::SeqCst);
      Ok::<(), anyhow::Error>(())
    })
  }
}

// Polls `check` every 10ms until it holds or `timeout` elapses. Returns the last result.
pub async fn wait_for(timeout: StdDuration, mut check: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  loop {
    if check() {
      return true;
    }
    if Instant::now() >= deadline {
      return false;
    }
    tokio::time::sleep(StdDuration::from_millis(10)).await;
  }
}
