// src/services/chat.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{KekeError, KekeResult};
use crate::models::ChatMessage;
use crate::realtime::EventChannel;
use crate::services::api::RiderApi;
use crate::store::RideStateStore;

/// Outbound path for chat messages. The realtime channel is the production
/// implementation; tests substitute a recorder.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_chat(&self, ride_id: &str, content: &str) -> KekeResult<()>;
}

#[async_trait]
impl MessageSink for EventChannel {
    async fn send_chat(&self, ride_id: &str, content: &str) -> KekeResult<()> {
        if !self.is_connected().await {
            return Err(KekeError::ChannelDisconnected);
        }
        self.send_message(ride_id, content).await;
        Ok(())
    }
}

/// Chat with the matched driver, valid only while a ride is active.
///
/// History is fetched fresh on every entry into the chat stage. Sends are
/// not appended optimistically; a message appears only via its
/// `message:receive` echo or a later history fetch, so the list always
/// reflects what the server accepted.
pub struct ChatSession {
    api: Arc<dyn RiderApi>,
    sink: Arc<dyn MessageSink>,
    store: Arc<RideStateStore>,
    local_rider_id: String,
    sending: AtomicBool,
}

impl ChatSession {
    pub fn new(
        api: Arc<dyn RiderApi>,
        sink: Arc<dyn MessageSink>,
        store: Arc<RideStateStore>,
        local_rider_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            sink,
            store,
            local_rider_id: local_rider_id.into(),
            sending: AtomicBool::new(false),
        }
    }

    fn active_ride_id(&self) -> KekeResult<String> {
        self.store.snapshot().ride_id.ok_or(KekeError::NoActiveRide)
    }

    /// Refresh history for the active ride into the store. Called each time
    /// the chat overlay opens; nothing is cached between entries.
    pub async fn open(&self) -> KekeResult<()> {
        let ride_id = self.active_ride_id()?;
        let messages = self.api.fetch_messages(&ride_id).await?;
        debug!(ride_id = %ride_id, count = messages.len(), "Loaded chat history");
        self.store.set_messages(messages);
        Ok(())
    }

    /// Whether the send button should be enabled for this draft.
    pub fn can_send(&self, draft: &str) -> bool {
        !draft.trim().is_empty()
            && !self.sending.load(Ordering::SeqCst)
            && self.store.snapshot().ride_id.is_some()
    }

    /// Send a message. On failure the caller keeps the compose text and
    /// shows a retryable notice; nothing is appended locally either way.
    pub async fn send(&self, draft: &str) -> KekeResult<()> {
        if !self.can_send(draft) {
            return Err(KekeError::validation_error("message", "nothing to send"));
        }
        let ride_id = self.active_ride_id()?;
        self.sending.store(true, Ordering::SeqCst);
        let result = self.sink.send_chat(&ride_id, draft.trim()).await;
        self.sending.store(false, Ordering::SeqCst);
        result
    }

    /// Handle a `message:receive` push. Appends when the message belongs to
    /// the active ride; returns `true` when a "new message" notification is
    /// warranted, which excludes our own echoes.
    pub fn on_message_received(&self, message: ChatMessage) -> bool {
        let state = self.store.snapshot();
        if state.ride_id.as_deref() != Some(message.ride_id.as_str()) {
            debug!(ride_id = %message.ride_id, "Dropping message for inactive ride");
            return false;
        }
        let from_self = message.sender_id == self.local_rider_id;
        self.store.push_message(message);
        !from_self
    }
}
