use crate::hub::connection::{Connection, ConnectionId, UserId};
use crate::hub::message::{Message, Target};

use std::sync::Arc;

use tokio::sync::oneshot;

/// Commands sent from the `Hub` handle to the dispatcher task.
///
/// Queries carry a `oneshot::Sender` for the dispatcher to send the answer back on.
/// Mutations are fire-and-forget; ordering is preserved because every command goes
/// through the same channel.
#[derive(Debug)]
pub(crate) enum HubCommand {
  /// Add a connection to the registry.
  Register(Connection),
  /// Remove and close a connection. Unknown ids are ignored.
  Unregister(ConnectionId),
  /// Deliver a message to every connection matching `target`.
  Broadcast {
    target: Target,
    message: Arc<Message>,
  },
  /// Distinct users with at least one live connection, sorted.
  ConnectedUsers {
    responder: oneshot::Sender<Vec<UserId>>,
  },
  IsUserOnline {
    user_id: UserId,
    responder: oneshot::Sender<bool>,
  },
  ClientCount {
    responder: oneshot::Sender<usize>,
  },
  /// Close every connection and exit the loop. Answers with the number closed.
  Shutdown {
    responder: oneshot::Sender<usize>,
  },
}
