use std::sync::Arc;

use keke_rider::config::AppConfig;
use keke_rider::lifecycle::{run_event_pump, RideLifecycleController};
use keke_rider::realtime::{ChannelConfig, EventChannel};
use keke_rider::services::api::{HttpRiderApi, RiderApi};
use keke_rider::services::chat::{ChatSession, MessageSink};
use keke_rider::services::location::{MockLocationProvider, PickupResolver};
use keke_rider::services::notifier::{LogNotifier, RiderNotifier};
use keke_rider::services::storage::{CredentialStore, MemoryCredentialStore};
use keke_rider::store::RideStateStore;
use keke_rider::models::{Credentials, RiderProfile};

/// Headless rider client: wires the core together from the environment and
/// logs everything the UI would render. Useful for smoke-driving a backend.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keke_rider=debug".into()),
        )
        .init();

    let config = AppConfig::from_env();
    let Ok(token) = std::env::var("KEKE_ACCESS_TOKEN") else {
        eprintln!("KEKE_ACCESS_TOKEN is required");
        std::process::exit(1);
    };
    let rider = RiderProfile {
        id: std::env::var("KEKE_RIDER_ID").unwrap_or_else(|_| "rider-dev".to_string()),
        name: std::env::var("KEKE_RIDER_NAME").unwrap_or_else(|_| "Dev Rider".to_string()),
        phone: std::env::var("KEKE_RIDER_PHONE").unwrap_or_default(),
        email: None,
        profile_picture: None,
    };

    let credentials: Arc<dyn CredentialStore> = Arc::new(
        MemoryCredentialStore::with_credentials(Credentials {
            access_token: token,
            rider: rider.clone(),
        }),
    );
    let store = RideStateStore::new();
    let api: Arc<dyn RiderApi> = Arc::new(HttpRiderApi::new(
        &config,
        Arc::clone(&credentials),
        Arc::clone(&store),
    ));
    let notifier: Arc<dyn RiderNotifier> = Arc::new(LogNotifier);

    let channel_config = ChannelConfig {
        ws_url: config.ws_url.clone(),
        connect_timeout: config.connect_timeout,
        reconnect_delay: config.reconnect_delay,
        max_reconnect_delay: config.max_reconnect_delay,
    };
    let (channel, events) =
        EventChannel::connect(channel_config, Arc::clone(&credentials), Arc::clone(&store));
    let channel = Arc::new(channel);

    let controller = RideLifecycleController::new(
        Arc::clone(&store),
        Arc::clone(&api),
        Arc::clone(&notifier),
        Arc::clone(&channel) as Arc<dyn keke_rider::lifecycle::RoomAnnouncer>,
        config.clone(),
    );
    let chat = Arc::new(ChatSession::new(
        Arc::clone(&api),
        Arc::clone(&channel) as Arc<dyn MessageSink>,
        Arc::clone(&store),
        rider.id.clone(),
    ));

    let resolver = PickupResolver::new(
        Arc::new(MockLocationProvider::default()),
        Arc::clone(&store),
    );
    if let Err(e) = resolver.refresh_pickup().await {
        tracing::warn!(error = %e, "Initial pickup resolution failed");
    }
    controller.start_nearby_polling();

    run_event_pump(controller, chat, notifier, events).await;
}
