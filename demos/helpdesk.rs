//! demos/helpdesk.rs
//!
//! Composition root of a small help-desk backend: builds the scheduler and the hub,
//! registers maintenance jobs, simulates an agent's and a customer's browser sessions and pushes
//! ticket events to them, then shuts everything down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tracing::{info, warn};
use ticketkeeper::{
  job_fn, ClientMessage, Hub, JobContext, NotificationPusher, Outbound, Scheduler, StopOutcome,
  TicketSummary,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  // --- Setup Tracing ---
  let filter = tracing_subscriber::EnvFilter::try_new("warn,ticketkeeper=info,helpdesk=info")
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();

  // --- Build Subsystems ---
  let scheduler = Scheduler::builder()
    .stuck_threshold(StdDuration::from_secs(60))
    .default_grace(StdDuration::from_secs(5))
    .build()?;
  let hub = Hub::builder().outbound_capacity(32).build()?;
  let pusher = NotificationPusher::new(hub.clone());

  // --- Register Maintenance Jobs ---
  let purged = Arc::new(AtomicU64::new(0));
  scheduler.register_job(
    "purge_read_notifications",
    "*/2 * * * * *",
    "Deletes read notifications older than 30 days",
    job_fn! {
      |ctx|
      { let purged = purged.clone(); }
      {
        let total = purged.fetch_add(3, Ordering::Relaxed) + 3;
        info!(job = ctx.job_name(), total, "Purged read notifications.");
        Ok(())
      }
    },
  )?;

  let sla_pusher = pusher.clone();
  scheduler.register_job_with_timeout(
    "check_overdue_tickets",
    "@every 3s",
    "Warns the assignee of tickets past their SLA",
    StdDuration::from_secs(2),
    move |ctx: JobContext| {
      let pusher = sla_pusher.clone();
      async move {
        if ctx.is_cancelled() {
          return Ok(());
        }
        let overdue = TicketSummary {
          id: 1001,
          title: "Email not syncing".to_string(),
          status: "overdue".to_string(),
          priority: "high".to_string(),
          created_by: 7,
          assigned_to: Some(3),
        };
        pusher.push_ticket_update(&overdue, "sla_breached").await?;
        anyhow::Ok(())
      }
    },
  )?;
  scheduler.start()?;

  // --- Simulate Client Sessions ---
  let agent = hub.open_connection(3).await?;
  let customer = hub.open_connection(7).await?;
  pusher.send_welcome(3).await?;
  pusher.push_user_status(3, "online").await?;

  let agent_task = tokio::spawn(drain_session("agent", agent));
  let customer_task = tokio::spawn(drain_session("customer", customer));

  // A client frame arriving on the agent's socket.
  let frame = ClientMessage::parse(r#"{"type":"ping"}"#)?;
  if let Some(reply) = frame.reply() {
    hub.broadcast(ticketkeeper::Target::User(3), reply).await?;
  }

  tokio::time::sleep(StdDuration::from_secs(7)).await;

  // --- Report ---
  for status in scheduler.get_all_job_status() {
    info!(
      job = %status.name,
      state = %status.state,
      runs = status.run_count,
      errors = status.error_count,
      next_run = ?status.next_run,
      "Job status."
    );
  }
  info!(stats = ?scheduler.get_scheduler_stats(), "Scheduler stats.");
  info!(metrics = ?scheduler.metrics_snapshot(), "Scheduler metrics.");
  info!(online = ?hub.get_connected_users().await?, "Connected users.");

  // --- Shutdown ---
  match scheduler.stop_default().await {
    StopOutcome::Drained => info!("Scheduler drained."),
    StopOutcome::GraceElapsed { still_running } => warn!(?still_running, "Jobs still running at shutdown."),
  }
  let closed = hub.shutdown().await?;
  info!(closed, hub_metrics = ?hub.metrics_snapshot(), "Hub shut down.");

  agent_task.await?;
  customer_task.await?;
  Ok(())
}

// Stands in for a websocket write pump: coalesces queued messages into one write.
async fn drain_session(label: &'static str, mut outbound: Outbound) {
  loop {
    let batch = outbound.recv_batch(16).await;
    if batch.is_empty() {
      info!(label, user_id = outbound.user_id(), "Session closed by hub.");
      return;
    }
    for message in batch {
      match message.to_json() {
        Ok(frame) => info!(label, user_id = outbound.user_id(), %frame, "-> client"),
        Err(e) => warn!(label, error = %e, "Failed to encode frame."),
      }
    }
  }
}
