//! Real-time connection hub.
//!
//! Keeps the set of live client sessions and fans messages out to them. The registry
//! is owned by a single dispatcher task; the [`Hub`] handle talks to it through a
//! bounded command channel, so every operation is serialised with every other one.
//!
//! Delivery is best-effort: a message is put on each matching connection's bounded
//! queue without waiting, and a connection whose queue is full or whose transport is
//! gone is closed and removed as a side effect.

pub mod client;
pub mod connection;
mod dispatcher;
pub mod message;
pub mod notify;

use crate::command::HubCommand;
use crate::error::{BuildError, HubError};
use crate::metrics::{HubMetrics, HubMetricsSnapshot};

use connection::{Connection, ConnectionId, Outbound, UserId};
use dispatcher::Dispatcher;
use message::{Message, Target};

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

const DEFAULT_COMMAND_BUFFER: usize = 128;
/// Matches the per-client send buffer of typical websocket servers.
const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Builder for a [`Hub`].
///
/// # Example
///
/// ```no_run
/// use ticketkeeper::Hub;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let hub = Hub::builder()
///     .outbound_capacity(64)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HubBuilder {
  command_buffer_size: usize,
  outbound_capacity: usize,
}

impl Default for HubBuilder {
  fn default() -> Self {
    Self {
      command_buffer_size: DEFAULT_COMMAND_BUFFER,
      outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
    }
  }
}

impl HubBuilder {
  /// Creates a new builder with default settings.
  /// - `command_buffer_size`: 128.
  /// - `outbound_capacity`: 256.
  pub fn new() -> Self {
    Self::default()
  }

  /// Size of the channel between `Hub` handles and the dispatcher task.
  pub fn command_buffer_size(mut self, size: usize) -> Self {
    self.command_buffer_size = size;
    self
  }

  /// Queue capacity of connections created through [`Hub::open_connection`].
  pub fn outbound_capacity(mut self, capacity: usize) -> Self {
    self.outbound_capacity = capacity;
    self
  }

  /// Builds the hub and spawns its dispatcher on the current Tokio runtime.
  ///
  /// # Errors
  ///
  /// `BuildError::ZeroCommandBuffer` or `BuildError::ZeroOutboundCapacity` for zero sizes.
  ///
  /// # Panics
  ///
  /// Panics if called outside a Tokio runtime.
  pub fn build(self) -> Result<Hub, BuildError> {
    if self.command_buffer_size == 0 {
      return Err(BuildError::ZeroCommandBuffer);
    }
    if self.outbound_capacity == 0 {
      return Err(BuildError::ZeroOutboundCapacity);
    }

    let metrics = HubMetrics::new();
    let (cmd_tx, cmd_rx) = mpsc::channel(self.command_buffer_size);
    let dispatcher = Dispatcher::new(cmd_rx, metrics.clone());
    let handle = tokio::spawn(dispatcher.run());

    Ok(Hub {
      cmd_tx,
      metrics,
      outbound_capacity: self.outbound_capacity,
      dispatcher_handle: Arc::new(Mutex::new(Some(handle))),
    })
  }
}

/// Handle to the connection hub. Cheap to clone; all clones share one dispatcher.
#[derive(Debug, Clone)]
pub struct Hub {
  cmd_tx: mpsc::Sender<HubCommand>,
  metrics: HubMetrics,
  outbound_capacity: usize,
  dispatcher_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Hub {
  pub fn builder() -> HubBuilder {
    HubBuilder::new()
  }

  /// Creates both halves of a session for `user_id` and registers the registry half.
  /// The returned [`Outbound`] belongs to the transport.
  ///
  /// # Errors
  ///
  /// `HubError::Closed` if the hub was shut down.
  pub async fn open_connection(&self, user_id: UserId) -> Result<Outbound, HubError> {
    let (connection, outbound) = Connection::open(user_id, self.outbound_capacity);
    self.register(connection).await?;
    Ok(outbound)
  }

  /// Adds a connection to the registry.
  pub async fn register(&self, connection: Connection) -> Result<(), HubError> {
    self.send(HubCommand::Register(connection)).await
  }

  /// Removes and closes a connection. Unknown or already removed ids are a no-op.
  pub async fn unregister(&self, connection_id: ConnectionId) -> Result<(), HubError> {
    self.send(HubCommand::Unregister(connection_id)).await
  }

  /// Queues a `kind` message for every connection of `user_id`. Zero connections is a no-op.
  ///
  /// # Errors
  ///
  /// - `HubError::Payload` if `payload` cannot be serialised; nothing is dispatched.
  /// - `HubError::Closed` if the hub was shut down.
  pub async fn broadcast_to_user<T: Serialize + ?Sized>(
    &self,
    user_id: UserId,
    kind: &str,
    payload: &T,
  ) -> Result<(), HubError> {
    let message = Message::new(kind, payload)?;
    self.broadcast(Target::User(user_id), message).await
  }

  /// Queues a `kind` message for every registered connection.
  pub async fn broadcast_to_all<T: Serialize + ?Sized>(&self, kind: &str, payload: &T) -> Result<(), HubError> {
    let message = Message::new(kind, payload)?;
    self.broadcast(Target::All, message).await
  }

  /// Queues an already built message.
  pub async fn broadcast(&self, target: Target, message: Message) -> Result<(), HubError> {
    self
      .send(HubCommand::Broadcast {
        target,
        message: Arc::new(message),
      })
      .await
  }

  /// Distinct users with at least one live connection, sorted ascending.
  pub async fn get_connected_users(&self) -> Result<Vec<UserId>, HubError> {
    self
      .request(|responder| HubCommand::ConnectedUsers { responder })
      .await
  }

  pub async fn is_user_online(&self, user_id: UserId) -> Result<bool, HubError> {
    self
      .request(|responder| HubCommand::IsUserOnline { user_id, responder })
      .await
  }

  /// Number of registered connections (not users).
  pub async fn get_client_count(&self) -> Result<usize, HubError> {
    self
      .request(|responder| HubCommand::ClientCount { responder })
      .await
  }

  pub fn metrics_snapshot(&self) -> HubMetricsSnapshot {
    self.metrics.snapshot()
  }

  /// Closes every connection and stops the dispatcher. Later calls on any clone return
  /// `HubError::Closed`; calling `shutdown` again returns `Ok(0)`.
  ///
  /// Returns the number of connections that were closed.
  pub async fn shutdown(&self) -> Result<usize, HubError> {
    let closed = match self
      .request(|responder| HubCommand::Shutdown { responder })
      .await
    {
      Ok(closed) => closed,
      Err(HubError::Closed) => {
        debug!("Hub already shut down.");
        0
      }
      Err(e) => return Err(e),
    };

    let handle = self.dispatcher_handle.lock().take();
    if let Some(handle) = handle {
      if let Err(e) = handle.await {
        error!(error = %e, "Hub dispatcher task failed.");
      }
    }
    info!(closed, "Hub shut down.");
    Ok(closed)
  }

  async fn send(&self, cmd: HubCommand) -> Result<(), HubError> {
    self.cmd_tx.send(cmd).await.map_err(|_| HubError::Closed)
  }

  async fn request<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> HubCommand) -> Result<R, HubError> {
    let (responder, response) = oneshot::channel();
    self.send(make(responder)).await?;
    response.await.map_err(|_| HubError::Closed)
  }
}
