//! The two halves of a client session.
//!
//! [`Connection::open`] creates a bounded outbound queue and splits it: the
//! [`Connection`] (sending end) goes to the hub's registry, the [`Outbound`]
//! (receiving end) stays with the transport that writes frames to the socket.

use crate::error::ConnectionSendError;
use crate::hub::message::Message;

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use uuid::Uuid;

/// Identity of the user owning a connection.
pub type UserId = u64;

/// Unique per connection. Uses UUID v4.
pub type ConnectionId = Uuid;

/// Registry half of a session: owner, liveness and the queue's sending end.
#[derive(Debug)]
pub struct Connection {
  id: ConnectionId,
  user_id: UserId,
  sender: Option<mpsc::Sender<Arc<Message>>>,
  alive: Arc<AtomicBool>,
}

impl Connection {
  /// Creates both halves of a session for `user_id` with room for `capacity` queued
  /// messages. `capacity` must be non-zero.
  pub fn open(user_id: UserId, capacity: usize) -> (Connection, Outbound) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let id = ConnectionId::new_v4();
    let alive = Arc::new(AtomicBool::new(true));

    let connection = Connection {
      id,
      user_id,
      sender: Some(sender),
      alive: alive.clone(),
    };
    let outbound = Outbound {
      id,
      user_id,
      receiver,
      alive,
    };
    (connection, outbound)
  }

  pub fn id(&self) -> ConnectionId {
    self.id
  }

  pub fn user_id(&self) -> UserId {
    self.user_id
  }

  /// `false` once the connection was closed from either side.
  pub fn is_alive(&self) -> bool {
    self.sender.is_some() && self.alive.load(Ordering::Acquire)
  }

  /// Non-blocking enqueue.
  pub(crate) fn try_deliver(&self, message: Arc<Message>) -> Result<(), ConnectionSendError> {
    let sender = self.sender.as_ref().ok_or(ConnectionSendError::Disconnected)?;
    if !self.alive.load(Ordering::Acquire) {
      return Err(ConnectionSendError::Disconnected);
    }
    sender.try_send(message).map_err(|e| match e {
      TrySendError::Full(_) => ConnectionSendError::QueueFull,
      TrySendError::Closed(_) => ConnectionSendError::Disconnected,
    })
  }

  /// Marks the session dead and drops the sending end. The transport drains whatever
  /// is still queued and then sees the end of the stream.
  pub(crate) fn close(&mut self) {
    self.alive.store(false, Ordering::Release);
    self.sender = None;
  }
}

/// Transport half of a session.
///
/// Yields queued messages in order; `recv` returns `None` once the hub closed the
/// connection and the queue is drained. Dropping it makes the next delivery attempt
/// fail, which evicts the connection.
#[derive(Debug)]
pub struct Outbound {
  id: ConnectionId,
  user_id: UserId,
  receiver: mpsc::Receiver<Arc<Message>>,
  alive: Arc<AtomicBool>,
}

impl Outbound {
  pub fn id(&self) -> ConnectionId {
    self.id
  }

  pub fn user_id(&self) -> UserId {
    self.user_id
  }

  pub fn is_alive(&self) -> bool {
    self.alive.load(Ordering::Acquire)
  }

  pub async fn recv(&mut self) -> Option<Arc<Message>> {
    self.receiver.recv().await
  }

  /// `Ok(None)` when nothing is queued right now, `Err(ConnectionSendError::Disconnected)`
  /// once the connection is closed and drained.
  pub fn try_recv(&mut self) -> Result<Option<Arc<Message>>, ConnectionSendError> {
    match self.receiver.try_recv() {
      Ok(message) => Ok(Some(message)),
      Err(TryRecvError::Empty) => Ok(None),
      Err(TryRecvError::Disconnected) => Err(ConnectionSendError::Disconnected),
    }
  }

  /// Waits for at least one message, then takes up to `max` queued messages at once so
  /// the transport can coalesce them into one write. Empty means closed and drained.
  pub async fn recv_batch(&mut self, max: usize) -> Vec<Arc<Message>> {
    let mut batch = Vec::new();
    self.receiver.recv_many(&mut batch, max.max(1)).await;
    batch
  }

  /// Marks the session dead from the transport side (for example after a read error).
  /// The hub evicts it on the next delivery attempt.
  pub fn close(&mut self) {
    self.alive.store(false, Ordering::Release);
    self.receiver.close();
  }
}

impl Stream for Outbound {
  type Item = Arc<Message>;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.receiver.poll_recv(cx)
  }
}

impl Drop for Outbound {
  fn drop(&mut self) {
    self.alive.store(false, Ordering::Release);
  }
}
