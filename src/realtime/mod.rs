//! Realtime event channel: one authenticated, auto-reconnecting WebSocket
//! per session. Rider actions go out as frames; server pushes arrive as
//! [`ChannelEvent`]s in socket order. On every connect the loop re-announces
//! the active ride room, since the server forgets membership across
//! transport reconnects.

mod client;
mod connection;
mod types;

pub use client::EventChannel;
pub use types::{ChannelConfig, ChannelError, ChannelEvent, ChannelState, RideEvent, WireFrame};
