// src/models/messages.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chat message between rider and driver, scoped to a single ride.
/// The message list is append-only and cleared when the ride resets.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub ride_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub sender_name: Option<String>,
    pub receiver_name: Option<String>,
}
