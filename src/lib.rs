//! TicketKeeper: Background Execution for Help-Desk Backends
//!
//! Two independent pieces that a ticketing backend wires up at startup:
//!
//! - A **cron-style job scheduler** for periodic maintenance (SLA checks, notification
//!   cleanup, statistics refresh). Jobs are registered by unique name with a schedule
//!   expression and an async callback; each job has at most one execution in flight,
//!   and a fire that finds the job still running is skipped rather than queued.
//! - A **real-time connection hub** that keeps the set of open client sessions and fans
//!   event messages out to them, per user or to everyone, without ever blocking on a
//!   slow client.
//!
//! # Features
//!
//! - Schedules as 5-, 6- or 7-field cron expressions (UTC), `@daily`-style descriptors,
//!   or fixed intervals (`@every 30s`, `@every 1h30m`), validated at registration.
//! - Single-flight execution per job; panics and errors are captured and counted.
//! - Manual triggers through the same guard as scheduled fires.
//! - Status snapshots per job ([`JobStatus`]), aggregate [`SchedulerStats`], a stuck-job
//!   health check and a [`MetricsSnapshot`].
//! - Graceful stop with a grace period, reported as a [`StopOutcome`].
//! - Hub delivery onto bounded per-connection queues; full or abandoned connections are
//!   evicted. Domain pushes (notifications, ticket updates, presence) through
//!   [`NotificationPusher`].
//!
//! # Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use ticketkeeper::{Hub, NotificationPusher, Scheduler, TicketSummary};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // tracing_subscriber::fmt().with_env_filter("warn,ticketkeeper=info").init();
//!
//!     let scheduler = Scheduler::builder()
//!         .stuck_threshold(Duration::from_secs(10 * 60))
//!         .build()?;
//!
//!     scheduler.register_job(
//!         "check_overdue_tickets",
//!         "0 */5 * * * *",
//!         "Flags tickets that breached their SLA",
//!         |ctx| async move {
//!             println!("{} running ({})", ctx.job_name(), ctx.trigger());
//!             Ok(())
//!         },
//!     )?;
//!     scheduler.start()?;
//!
//!     let hub = Hub::builder().build()?;
//!     let mut outbound = hub.open_connection(42).await?;
//!
//!     let pusher = NotificationPusher::new(hub.clone());
//!     let ticket = TicketSummary {
//!         id: 7,
//!         title: "Printer on fire".into(),
//!         status: "in_progress".into(),
//!         priority: "urgent".into(),
//!         created_by: 42,
//!         assigned_to: Some(3),
//!     };
//!     pusher.push_ticket_update(&ticket, "status_changed").await?;
//!
//!     if let Some(message) = outbound.recv().await {
//!         println!("client 42 got: {}", message.to_json()?);
//!     }
//!
//!     scheduler.stop(Duration::from_secs(30)).await;
//!     hub.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! - [`SchedulerBuilder`]: `stuck_threshold` (default 10 minutes) and `default_grace`
//!   (default 30 seconds, used by [`Scheduler::stop_default`]).
//! - [`HubBuilder`]: `command_buffer_size` (default 128) and `outbound_capacity`
//!   (default 256 messages per connection).
//!
//! # Observability
//!
//! - Integrate with the `tracing` crate for logs. Every execution runs inside a
//!   `job_exec` span carrying the job name and run id.
//! - [`Scheduler::metrics_snapshot`] and [`Hub::metrics_snapshot`] return serialisable counters.

mod command;
mod coordinator;
pub mod error;
mod guard;
pub mod hub;
pub mod job;
mod macros;
pub mod metrics;
mod registry;
pub mod scheduler;
pub mod status;
mod worker;

// --- Public Re-exports ---

// Core scheduler components
pub use scheduler::{Scheduler, SchedulerBuilder, StopOutcome};

// Hub components
pub use hub::client::ClientMessage;
pub use hub::connection::{Connection, ConnectionId, Outbound, UserId};
pub use hub::message::{Message, Target};
pub use hub::notify::{Notification, NotificationPusher, TicketSummary};
pub use hub::{Hub, HubBuilder};

// Error types
pub use error::{
  BuildError, ConnectionSendError, ExecutionError, HubError, ScheduleParseError, SchedulerError,
  StuckJobWarning,
};

// Job related types
pub use job::{next_fire_time, JobContext, JobId, JobResult, RunId, Schedule, Trigger};

// Status and metrics
pub use metrics::{HubMetricsSnapshot, MetricsSnapshot};
pub use status::{JobState, JobStatus, SchedulerStats};
