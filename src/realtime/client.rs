//! Public handle for the realtime channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify, RwLock};

use super::connection::connection_loop;
use super::types::{ChannelCommand, ChannelConfig, ChannelEvent, ChannelState};
use crate::services::storage::CredentialStore;
use crate::store::RideStateStore;

/// Handle for the session-wide realtime connection.
///
/// One instance per signed-in session; it survives navigation and is torn
/// down only on logout. All methods are non-blocking sends to the background
/// connection task.
pub struct EventChannel {
    command_tx: mpsc::Sender<ChannelCommand>,
    state: Arc<RwLock<ChannelState>>,
    wake: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
}

impl EventChannel {
    /// Start the background connection. Returns `(channel, event_receiver)`;
    /// the receiver yields events in the order they arrive on the socket.
    pub fn connect(
        config: ChannelConfig,
        credentials: Arc<dyn CredentialStore>,
        store: Arc<RideStateStore>,
    ) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let state = Arc::new(RwLock::new(ChannelState::Disconnected));
        let wake = Arc::new(Notify::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        tokio::spawn(connection_loop(
            config,
            credentials,
            store,
            Arc::clone(&state),
            event_tx,
            command_rx,
            Arc::clone(&wake),
            Arc::clone(&shutdown),
        ));

        (
            Self {
                command_tx,
                state,
                wake,
                shutdown,
            },
            event_rx,
        )
    }

    /// Announce membership of a ride room (after a successful booking).
    pub async fn join_room(&self, ride_id: &str) {
        let _ = self
            .command_tx
            .send(ChannelCommand::JoinRoom {
                ride_id: ride_id.to_string(),
            })
            .await;
    }

    /// Send a chat message to the driver over the channel.
    pub async fn send_message(&self, ride_id: &str, content: &str) {
        let _ = self
            .command_tx
            .send(ChannelCommand::SendMessage {
                ride_id: ride_id.to_string(),
                content: content.to_string(),
            })
            .await;
    }

    pub async fn state(&self) -> ChannelState {
        *self.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        matches!(
            self.state().await,
            ChannelState::Connected | ChannelState::Subscribed
        )
    }

    /// App returned to the foreground: reconnect immediately if the
    /// transport is down, otherwise a no-op.
    pub async fn notify_foreground(&self) {
        if !self.is_connected().await {
            self.wake.notify_one();
        }
    }

    /// Tear the connection down for good (logout).
    pub async fn disconnect(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Close frame when a socket is up; queued harmlessly otherwise.
        let _ = self.command_tx.send(ChannelCommand::Disconnect).await;
        // In case the loop is waiting out a backoff or a missing credential.
        self.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::MemoryCredentialStore;
    use std::time::Duration;

    fn config() -> ChannelConfig {
        ChannelConfig {
            ws_url: "ws://127.0.0.1:9".to_string(),
            connect_timeout: Duration::from_secs(1),
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_delay: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_disconnect_while_signed_out_stops_loop() {
        let store = RideStateStore::new();
        let credentials: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let (channel, mut events) = EventChannel::connect(config(), credentials, store);

        // No credential: the loop parks waiting for a wake.
        tokio::task::yield_now().await;
        channel.disconnect().await;

        // The loop must exit and drop its sender, not reconnect or park.
        loop {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Some(ChannelEvent::Disconnected)) => continue,
                Ok(Some(other)) => panic!("unexpected event during shutdown: {:?}", other),
                Ok(None) => break,
                Err(_) => panic!("connection loop did not shut down"),
            }
        }
        assert_eq!(channel.state().await, ChannelState::Disconnected);
    }
}
