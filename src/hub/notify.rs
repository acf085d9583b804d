//! Domain-level pushes built on top of [`Hub`]: notifications, unread counters,
//! ticket updates, presence and welcome messages.

use crate::error::HubError;
use crate::hub::connection::UserId;
use crate::hub::Hub;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

/// A stored notification as it is pushed to its recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
  pub id: u64,
  pub recipient_id: UserId,
  /// Domain category, e.g. `ticket_assigned`.
  #[serde(rename = "type")]
  pub kind: String,
  pub title: String,
  pub content: String,
  pub priority: String,
  pub created_at: DateTime<Utc>,
  pub is_read: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub action_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sender_id: Option<UserId>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub related_ticket_id: Option<u64>,
}

/// The ticket fields a `ticket_update` push needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketSummary {
  pub id: u64,
  pub title: String,
  pub status: String,
  pub priority: String,
  pub created_by: UserId,
  pub assigned_to: Option<UserId>,
}

impl TicketSummary {
  /// Creator and assignee, de-duplicated. Zero ids mean "unset" and are skipped.
  pub fn audience(&self) -> Vec<UserId> {
    let mut users = Vec::with_capacity(2);
    if self.created_by != 0 {
      users.push(self.created_by);
    }
    if let Some(assignee) = self.assigned_to {
      if assignee != 0 && !users.contains(&assignee) {
        users.push(assignee);
      }
    }
    users
  }
}

const WELCOME_FEATURES: [&str; 4] = [
  "real-time notifications",
  "ticket status updates",
  "system announcements",
  "online presence",
];

/// Pushes help-desk events to connected users.
///
/// Per-user pushes first check presence and quietly skip offline users; delivery is
/// at-most-once and nothing is queued for later.
#[derive(Debug, Clone)]
pub struct NotificationPusher {
  hub: Hub,
}

impl NotificationPusher {
  pub fn new(hub: Hub) -> Self {
    Self { hub }
  }

  pub fn hub(&self) -> &Hub {
    &self.hub
  }

  /// Sends `notification` to its recipient. Returns `false` if they are offline.
  pub async fn push_notification(&self, notification: &Notification) -> Result<bool, HubError> {
    let recipient = notification.recipient_id;
    if !self.hub.is_user_online(recipient).await? {
      debug!(user_id = recipient, notification_id = notification.id, "User offline, notification not pushed.");
      return Ok(false);
    }
    self
      .hub
      .broadcast_to_user(recipient, "notification", notification)
      .await?;
    info!(user_id = recipient, notification_id = notification.id, "Pushed notification.");
    Ok(true)
  }

  /// Announcement to every connected client.
  pub async fn push_system_notification(&self, title: &str, content: &str) -> Result<(), HubError> {
    let data = json!({
      "title": title,
      "content": content,
      "timestamp": Utc::now().timestamp(),
      "priority": "normal",
    });
    self.hub.broadcast_to_all("system_notification", &data).await?;
    info!(title, "Pushed system notification.");
    Ok(())
  }

  /// Returns `false` if the user is offline.
  pub async fn push_unread_count(&self, user_id: UserId, count: u64) -> Result<bool, HubError> {
    if !self.hub.is_user_online(user_id).await? {
      return Ok(false);
    }
    let data = json!({ "count": count, "timestamp": Utc::now().timestamp() });
    self.hub.broadcast_to_user(user_id, "unread_count", &data).await?;
    debug!(user_id, count, "Pushed unread count.");
    Ok(true)
  }

  /// Sends a `ticket_update` to the ticket's creator and assignee, whoever is online.
  /// Returns how many users it was pushed to.
  pub async fn push_ticket_update(&self, ticket: &TicketSummary, update_type: &str) -> Result<usize, HubError> {
    let data = json!({
      "ticket_id": ticket.id,
      "title": ticket.title,
      "status": ticket.status,
      "priority": ticket.priority,
      "update_type": update_type,
      "timestamp": Utc::now().timestamp(),
    });

    let mut pushed = 0;
    for user_id in ticket.audience() {
      if self.hub.is_user_online(user_id).await? {
        self.hub.broadcast_to_user(user_id, "ticket_update", &data).await?;
        pushed += 1;
      }
    }
    info!(ticket_id = ticket.id, update_type, pushed, "Pushed ticket update.");
    Ok(pushed)
  }

  /// Presence change, broadcast to every connected client.
  pub async fn push_user_status(&self, user_id: UserId, status: &str) -> Result<(), HubError> {
    let data = json!({
      "user_id": user_id,
      "status": status,
      "timestamp": Utc::now().timestamp(),
    });
    self.hub.broadcast_to_all("user_status", &data).await?;
    debug!(user_id, status, "Pushed user status.");
    Ok(())
  }

  /// Greets a freshly connected user. Returns `false` if they are offline.
  pub async fn send_welcome(&self, user_id: UserId) -> Result<bool, HubError> {
    if !self.hub.is_user_online(user_id).await? {
      return Ok(false);
    }
    let data = json!({
      "message": "Welcome to real-time notifications!",
      "timestamp": Utc::now().timestamp(),
      "features": WELCOME_FEATURES,
    });
    self.hub.broadcast_to_user(user_id, "welcome", &data).await?;
    debug!(user_id, "Sent welcome message.");
    Ok(true)
  }
}
