use crate::hub::connection::UserId;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Envelope pushed to clients: `{"type": ..., "data": ..., "timestamp": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  #[serde(rename = "type")]
  pub kind: String,
  pub data: serde_json::Value,
  /// Unix seconds at creation.
  pub timestamp: i64,
}

impl Message {
  /// Builds an envelope stamped with the current time.
  ///
  /// # Errors
  ///
  /// Fails if `payload` cannot be represented as JSON (for example a map with
  /// non-string keys).
  pub fn new<T: Serialize + ?Sized>(kind: impl Into<String>, payload: &T) -> Result<Self, serde_json::Error> {
    Ok(Self {
      kind: kind.into(),
      data: serde_json::to_value(payload)?,
      timestamp: Utc::now().timestamp(),
    })
  }

  /// An envelope with `null` data.
  pub fn bare(kind: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      data: serde_json::Value::Null,
      timestamp: Utc::now().timestamp(),
    }
  }

  /// The wire form of the envelope.
  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

/// Which connections a broadcast is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
  All,
  User(UserId),
}

impl Target {
  pub fn matches(&self, user_id: UserId) -> bool {
    match self {
      Target::All => true,
      Target::User(target) => *target == user_id,
    }
  }
}
