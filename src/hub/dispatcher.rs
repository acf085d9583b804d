use crate::command::HubCommand;
use crate::error::ConnectionSendError;
use crate::hub::connection::{Connection, ConnectionId, UserId};
use crate::hub::message::{Message, Target};
use crate::metrics::HubMetrics;

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// The task that owns the connection registry.
///
/// Every registry mutation and every delivery happens on this task, one command at a
/// time, so no lock guards the map and a connection is closed exactly once.
pub(crate) struct Dispatcher {
  cmd_rx: mpsc::Receiver<HubCommand>,
  connections: HashMap<ConnectionId, Connection>,
  metrics: HubMetrics,
}

impl Dispatcher {
  pub fn new(cmd_rx: mpsc::Receiver<HubCommand>, metrics: HubMetrics) -> Self {
    Self {
      cmd_rx,
      connections: HashMap::new(),
      metrics,
    }
  }

  /// Runs until a `Shutdown` command arrives or every `Hub` handle is dropped.
  pub async fn run(mut self) {
    info!("Hub dispatcher started.");

    while let Some(cmd) = self.cmd_rx.recv().await {
      match cmd {
        HubCommand::Register(connection) => self.register(connection),
        HubCommand::Unregister(connection_id) => self.unregister(connection_id),
        HubCommand::Broadcast { target, message } => self.broadcast(target, message),
        HubCommand::ConnectedUsers { responder } => {
          let _ = responder.send(self.connected_users());
        }
        HubCommand::IsUserOnline { user_id, responder } => {
          let online = self
            .connections
            .values()
            .any(|c| c.user_id() == user_id && c.is_alive());
          let _ = responder.send(online);
        }
        HubCommand::ClientCount { responder } => {
          let _ = responder.send(self.connections.len());
        }
        HubCommand::Shutdown { responder } => {
          self.cmd_rx.close();
          let closed = self.close_all();
          info!(closed, "Hub dispatcher received shutdown command.");
          let _ = responder.send(closed);
          break;
        }
      }
    }

    if !self.connections.is_empty() {
      let closed = self.close_all();
      debug!(closed, "Closed remaining connections on exit.");
    }
    info!("Hub dispatcher exiting.");
  }

  fn register(&mut self, connection: Connection) {
    let connection_id = connection.id();
    let user_id = connection.user_id();
    if let Some(mut replaced) = self.connections.insert(connection_id, connection) {
      // Ids are v4 UUIDs, so this only happens if a caller registers the same id twice.
      replaced.close();
      warn!(%connection_id, "Replaced connection registered under the same id.");
    }
    self
      .metrics
      .connections_registered
      .fetch_add(1, AtomicOrdering::Relaxed);
    info!(user_id, %connection_id, total = self.connections.len(), "Client connected.");
  }

  fn unregister(&mut self, connection_id: ConnectionId) {
    match self.connections.remove(&connection_id) {
      Some(mut connection) => {
        connection.close();
        self
          .metrics
          .connections_unregistered
          .fetch_add(1, AtomicOrdering::Relaxed);
        info!(
          user_id = connection.user_id(),
          %connection_id,
          total = self.connections.len(),
          "Client disconnected."
        );
      }
      None => trace!(%connection_id, "Unregister for unknown connection, ignoring."),
    }
  }

  fn broadcast(&mut self, target: Target, message: Arc<Message>) {
    self
      .metrics
      .messages_broadcast
      .fetch_add(1, AtomicOrdering::Relaxed);

    let mut delivered = 0usize;
    let mut failed: Vec<(ConnectionId, ConnectionSendError)> = Vec::new();
    for (connection_id, connection) in &self.connections {
      if !target.matches(connection.user_id()) {
        continue;
      }
      match connection.try_deliver(message.clone()) {
        Ok(()) => delivered += 1,
        Err(e) => failed.push((*connection_id, e)),
      }
    }

    self
      .metrics
      .deliveries
      .fetch_add(delivered, AtomicOrdering::Relaxed);

    for (connection_id, reason) in failed {
      if let Some(mut connection) = self.connections.remove(&connection_id) {
        connection.close();
        self
          .metrics
          .connections_evicted
          .fetch_add(1, AtomicOrdering::Relaxed);
        warn!(
          user_id = connection.user_id(),
          %connection_id,
          %reason,
          total = self.connections.len(),
          "Evicted connection after failed delivery."
        );
      }
    }

    debug!(kind = %message.kind, ?target, delivered, "Broadcast processed.");
  }

  fn connected_users(&self) -> Vec<UserId> {
    self
      .connections
      .values()
      .filter(|c| c.is_alive())
      .map(|c| c.user_id())
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect()
  }

  fn close_all(&mut self) -> usize {
    let closed = self.connections.len();
    for (_, mut connection) in self.connections.drain() {
      connection.close();
    }
    closed
  }
}
