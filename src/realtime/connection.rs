//! Background WebSocket connection loop with auto-reconnect and ride-room
//! re-announcement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::types::{
    ChannelCommand, ChannelConfig, ChannelError, ChannelEvent, ChannelState, RideEvent, WireFrame,
};
use crate::services::storage::CredentialStore;
use crate::store::{RideState, RideStateStore};

/// Room announcement due on a fresh connect: the server forgets room
/// membership across transport reconnects, so any active ride must be
/// rejoined every time.
pub(crate) fn rejoin_frame(state: &RideState) -> Option<WireFrame> {
    let ride_id = state.ride_id.as_deref()?;
    if state.stage.is_active() {
        Some(WireFrame::join_room(ride_id))
    } else {
        None
    }
}

/// Background task managing the WebSocket connection.
///
/// Retries forever with doubling, jittered, capped backoff; a foreground
/// `wake` notification cuts the wait short. Exits only when `shutdown` is
/// set (logout), which the handle raises directly so a loop parked on a
/// backoff or credential wait still stops.
pub(crate) async fn connection_loop(
    config: ChannelConfig,
    credentials: Arc<dyn CredentialStore>,
    store: Arc<RideStateStore>,
    channel_state: Arc<RwLock<ChannelState>>,
    event_tx: mpsc::Sender<ChannelEvent>,
    command_rx: mpsc::Receiver<ChannelCommand>,
    wake: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let token = match credentials.access_token().await {
            Some(token) => token,
            None => {
                // Not signed in; wait for a foreground nudge after login.
                debug!("No credential available, realtime connect deferred");
                wake.notified().await;
                continue;
            }
        };

        *channel_state.write().await = ChannelState::Connecting;
        let url = config.ws_url_with_token(&token);
        info!(url = %config.ws_url, "Connecting realtime channel");

        match tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(&url))
            .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay;
                *channel_state.write().await = ChannelState::Connected;
                let _ = event_tx.send(ChannelEvent::Connected).await;

                let (ws_write, mut ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                // Re-announce room membership for any active ride.
                if let Some(frame) = rejoin_frame(&store.snapshot()) {
                    info!(event = %frame.event, "Re-announcing ride room after connect");
                    if send_frame(&ws_write, &frame).await {
                        *channel_state.write().await = ChannelState::Subscribed;
                    }
                }

                // Forward outbound commands while this connection lives.
                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&channel_state),
                    Arc::clone(&shutdown),
                ));

                // Process incoming frames in arrival order.
                while let Some(msg_result) = ws_read.next().await {
                    match msg_result {
                        Ok(WsMessage::Text(text)) => {
                            handle_text_frame(&text, &event_tx).await;
                        }
                        Ok(WsMessage::Close(_)) => {
                            info!("Realtime channel closed by server");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Realtime channel error");
                            break;
                        }
                        _ => {}
                    }
                }

                // Cleanup before the next attempt: no handler survives
                // across reconnect cycles.
                cmd_handle.abort();
                *channel_state.write().await = ChannelState::Disconnected;
                let _ = event_tx.send(ChannelEvent::Disconnected).await;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Realtime connect failed");
                *channel_state.write().await = ChannelState::Disconnected;
                let _ = event_tx
                    .send(ChannelEvent::Error(ChannelError::Connect(e.to_string())))
                    .await;
            }
            Err(_elapsed) => {
                error!(timeout = ?config.connect_timeout, "Realtime connect timed out");
                *channel_state.write().await = ChannelState::Disconnected;
                let _ = event_tx
                    .send(ChannelEvent::Error(ChannelError::Timeout))
                    .await;
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let delay = with_jitter(reconnect_delay);
        info!(delay = ?delay, "Reconnecting realtime channel");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            // App came to the foreground: try again immediately.
            _ = wake.notified() => {}
        }
        reconnect_delay = next_backoff(reconnect_delay, config.max_reconnect_delay);
    }

    *channel_state.write().await = ChannelState::Disconnected;
    let _ = event_tx.send(ChannelEvent::Disconnected).await;
}

pub(crate) fn next_backoff(current: Duration, ceiling: Duration) -> Duration {
    (current * 2).min(ceiling)
}

fn with_jitter(delay: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    delay.mul_f64(jitter)
}

async fn handle_text_frame(text: &str, event_tx: &mpsc::Sender<ChannelEvent>) {
    let frame: WireFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => {
            debug!(text = %text, "Unrecognized frame on realtime channel");
            return;
        }
    };
    match RideEvent::from_frame(&frame) {
        Ok(Some(event)) => {
            let _ = event_tx.send(ChannelEvent::Ride(event)).await;
        }
        Ok(None) => {
            debug!(event = %frame.event, "Unhandled realtime event");
        }
        Err(e) => {
            warn!(event = %frame.event, error = %e, "Bad payload on realtime event");
        }
    }
}

async fn send_frame<S>(ws_write: &Arc<Mutex<S>>, frame: &WireFrame) -> bool
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    match serde_json::to_string(frame) {
        Ok(json) => {
            let mut writer = ws_write.lock().await;
            writer.send(WsMessage::Text(json.into())).await.is_ok()
        }
        Err(e) => {
            error!(error = %e, "Failed to encode outbound frame");
            false
        }
    }
}

async fn command_forwarder<S>(
    command_rx: Arc<Mutex<mpsc::Receiver<ChannelCommand>>>,
    ws_write: Arc<Mutex<S>>,
    channel_state: Arc<RwLock<ChannelState>>,
    shutdown: Arc<AtomicBool>,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = command_rx.lock().await;
    while let Some(command) = rx.recv().await {
        match command {
            ChannelCommand::JoinRoom { ride_id } => {
                if send_frame(&ws_write, &WireFrame::join_room(&ride_id)).await {
                    *channel_state.write().await = ChannelState::Subscribed;
                }
            }
            ChannelCommand::SendMessage { ride_id, content } => {
                send_frame(&ws_write, &WireFrame::send_message(&ride_id, &content)).await;
            }
            ChannelCommand::Disconnect => {
                shutdown.store(true, Ordering::SeqCst);
                let mut writer = ws_write.lock().await;
                let _ = writer.send(WsMessage::Close(None)).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RideStage;

    #[test]
    fn test_rejoin_emitted_for_active_ride() {
        let store = RideStateStore::new();
        store.set_ride_id(Some("ride-9".to_string()));
        store.set_stage(RideStage::Paired);

        let frame = rejoin_frame(&store.snapshot()).expect("active ride must rejoin");
        assert_eq!(frame.event, "ride:join-room");
        assert_eq!(frame.payload["rideId"], "ride-9");
    }

    #[test]
    fn test_no_rejoin_before_booking() {
        let store = RideStateStore::new();
        store.set_stage(RideStage::Confirm);
        assert!(rejoin_frame(&store.snapshot()).is_none());

        // Ride id present but request still settling: stage not yet active.
        store.set_ride_id(Some("ride-9".to_string()));
        assert!(rejoin_frame(&store.snapshot()).is_none());
    }

    #[test]
    fn test_backoff_is_capped() {
        let ceiling = Duration::from_secs(30);
        let mut delay = Duration::from_secs(1);
        for _ in 0..10 {
            delay = next_backoff(delay, ceiling);
            assert!(delay <= ceiling);
        }
        assert_eq!(delay, ceiling);
    }
}
