//! Configuration, wire protocol, and event/command enums for the realtime
//! channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ChatMessage, Driver, DriverLocation, RouteDirections, RouteKind};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for the realtime channel.
#[derive(Clone)]
pub struct ChannelConfig {
    /// WebSocket endpoint, without the token query parameter.
    pub ws_url: String,
    pub connect_timeout: Duration,
    /// Base delay before the first reconnect attempt.
    pub reconnect_delay: Duration,
    /// Ceiling for the doubling backoff.
    pub max_reconnect_delay: Duration,
}

impl std::fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("ws_url", &self.ws_url)
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .finish()
    }
}

impl ChannelConfig {
    /// Handshake URL with the bearer credential attached.
    pub(crate) fn ws_url_with_token(&self, token: &str) -> String {
        format!("{}?token={}", self.ws_url, token)
    }
}

// ---------------------------------------------------------------------------
// Channel FSM
// ---------------------------------------------------------------------------

/// Connection state of the channel itself, advanced only by transport events
/// and foreground signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    /// Connected and joined to the active ride room.
    Subscribed,
}

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// Every frame on the socket is `{"event": "...", "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl WireFrame {
    pub fn join_room(ride_id: &str) -> Self {
        Self {
            event: "ride:join-room".to_string(),
            payload: serde_json::json!({ "rideId": ride_id }),
        }
    }

    pub fn send_message(ride_id: &str, content: &str) -> Self {
        Self {
            event: "message:send".to_string(),
            payload: serde_json::json!({ "rideId": ride_id, "content": content }),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteUpdatePayload {
    route_type: RouteKind,
    new_directions: RouteDirections,
}

#[derive(Debug, Clone, Deserialize)]
struct CancelPayload {
    #[serde(default)]
    reason: Option<String>,
}

/// Server-pushed ride events, parsed from the wire envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum RideEvent {
    Accepted { driver: Driver },
    Arrived,
    Started,
    Completed,
    Cancelled { reason: Option<String> },
    DriverLocation { location: DriverLocation },
    RouteUpdated { route_type: RouteKind, directions: RouteDirections },
    MessageReceived { message: ChatMessage },
}

impl RideEvent {
    /// Parse a wire frame. `Ok(None)` for events this client does not
    /// handle; `Err` only for a recognized event with a bad payload.
    pub fn from_frame(frame: &WireFrame) -> Result<Option<Self>, serde_json::Error> {
        let event = match frame.event.as_str() {
            "ride:accepted" => RideEvent::Accepted {
                driver: serde_json::from_value(frame.payload.clone())?,
            },
            "ride:arrived" => RideEvent::Arrived,
            "ride:started" => RideEvent::Started,
            "ride:completed" => RideEvent::Completed,
            "ride:cancelled" => {
                let payload: CancelPayload = serde_json::from_value(frame.payload.clone())?;
                RideEvent::Cancelled {
                    reason: payload.reason,
                }
            }
            "driver:location-update" => RideEvent::DriverLocation {
                location: serde_json::from_value(frame.payload.clone())?,
            },
            "driver:route-updated" => {
                let payload: RouteUpdatePayload =
                    serde_json::from_value(frame.payload.clone())?;
                RideEvent::RouteUpdated {
                    route_type: payload.route_type,
                    directions: payload.new_directions,
                }
            }
            "message:receive" => RideEvent::MessageReceived {
                message: serde_json::from_value(frame.payload.clone())?,
            },
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

// ---------------------------------------------------------------------------
// Events & commands crossing the task boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("connect timed out")]
    Timeout,
}

/// Everything the connection loop reports to the application layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Ride(RideEvent),
    Error(ChannelError),
}

/// Commands sent to the connection loop from the application layer.
#[derive(Debug)]
pub(crate) enum ChannelCommand {
    JoinRoom { ride_id: String },
    SendMessage { ride_id: String, content: String },
    Disconnect,
}
