use crate::error::HubError;
use crate::hub::message::Message;

use serde::Deserialize;

/// Frames a client may send over its socket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
  /// Keep-alive; answered with a `pong` message.
  Ping,
  /// The client has read a notification.
  MarkRead { notification_id: u64 },
}

impl ClientMessage {
  /// Decodes one text frame.
  ///
  /// # Errors
  ///
  /// `HubError::InvalidClientMessage` for malformed JSON, a missing `type`, an unknown
  /// `type` or missing fields.
  pub fn parse(text: &str) -> Result<Self, HubError> {
    serde_json::from_str(text).map_err(|e| HubError::InvalidClientMessage(e.to_string()))
  }

  /// The frame the server sends straight back, if any.
  pub fn reply(&self) -> Option<Message> {
    match self {
      ClientMessage::Ping => Some(Message::bare("pong")),
      ClientMessage::MarkRead { .. } => None,
    }
  }
}
