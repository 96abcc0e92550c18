// src/services/api.rs
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::{KekeError, KekeResult};
use crate::models::{
    CancelResponse, ChatMessage, Coordinates, FareQuote, NearbyDriver, RideRating, RideRecord,
    RideRequest, RideRequestResponse,
};
use crate::services::storage::CredentialStore;
use crate::store::RideStateStore;

/// The backend REST surface the rider core consumes.
#[async_trait]
pub trait RiderApi: Send + Sync {
    async fn request_ride(&self, request: &RideRequest) -> KekeResult<RideRequestResponse>;
    async fn cancel_ride(&self, ride_id: &str, reason: Option<&str>) -> KekeResult<CancelResponse>;
    async fn ride_status(&self, ride_id: &str) -> KekeResult<RideRecord>;
    async fn nearby_drivers(&self, coords: &Coordinates) -> KekeResult<Vec<NearbyDriver>>;
    async fn calculate_fare(
        &self,
        distance_in_km: f64,
        duration_in_minutes: f64,
    ) -> KekeResult<FareQuote>;
    async fn fetch_messages(&self, ride_id: &str) -> KekeResult<Vec<ChatMessage>>;
    async fn send_message(&self, ride_id: &str, content: &str) -> KekeResult<ChatMessage>;
    async fn submit_rating(&self, rating: &RideRating) -> KekeResult<()>;
}

pub struct HttpRiderApi {
    base_url: String,
    client: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
    store: Arc<RideStateStore>,
}

impl HttpRiderApi {
    pub fn new(
        config: &AppConfig,
        credentials: Arc<dyn CredentialStore>,
        store: Arc<RideStateStore>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            client,
            credentials,
            store,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn bearer(&self) -> KekeResult<String> {
        self.credentials
            .access_token()
            .await
            .ok_or(KekeError::SessionExpired)
    }

    /// Session invalidation on 401: wipe credentials and reset the whole
    /// store, never retry locally.
    async fn invalidate_session(&self) {
        warn!("Received 401, invalidating session");
        self.credentials.clear().await;
        self.store.reset_all();
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> KekeResult<T> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.invalidate_session().await;
            return Err(KekeError::SessionExpired);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(KekeError::ApiStatus {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> KekeResult<T> {
        let token = self.bearer().await?;
        let response = self
            .client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
            .json(body)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> KekeResult<T> {
        let token = self.bearer().await?;
        let response = self
            .client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;
        self.handle_response(response).await
    }
}

#[async_trait]
impl RiderApi for HttpRiderApi {
    async fn request_ride(&self, request: &RideRequest) -> KekeResult<RideRequestResponse> {
        info!(
            pickup = %request.pickup_location.address,
            dropoff = %request.dropoff_location.address,
            "Requesting ride"
        );
        self.post_json("/rider/request-ride", &serde_json::to_value(request)?)
            .await
    }

    async fn cancel_ride(&self, ride_id: &str, reason: Option<&str>) -> KekeResult<CancelResponse> {
        info!(ride_id = %ride_id, "Cancelling ride");
        self.post_json(
            &format!("/rider/ride/{}/cancel", ride_id),
            &json!({ "reason": reason }),
        )
        .await
    }

    async fn ride_status(&self, ride_id: &str) -> KekeResult<RideRecord> {
        self.get_json(&format!("/rider/ride-status/{}", ride_id))
            .await
    }

    async fn nearby_drivers(&self, coords: &Coordinates) -> KekeResult<Vec<NearbyDriver>> {
        self.post_json("/rider/nearby-drivers", &json!({ "coords": coords }))
            .await
    }

    async fn calculate_fare(
        &self,
        distance_in_km: f64,
        duration_in_minutes: f64,
    ) -> KekeResult<FareQuote> {
        self.post_json(
            "/rider/calculate-fare",
            &json!({
                "distanceInKm": distance_in_km,
                "durationInMinutes": duration_in_minutes,
            }),
        )
        .await
    }

    async fn fetch_messages(&self, ride_id: &str) -> KekeResult<Vec<ChatMessage>> {
        self.get_json(&format!("/ride/{}/messages", ride_id)).await
    }

    async fn send_message(&self, ride_id: &str, content: &str) -> KekeResult<ChatMessage> {
        self.post_json(
            &format!("/ride/{}/messages", ride_id),
            &json!({ "content": content }),
        )
        .await
    }

    async fn submit_rating(&self, rating: &RideRating) -> KekeResult<()> {
        info!(ride_id = %rating.ride_id, stars = rating.stars, "Submitting rating");
        let _: serde_json::Value = self
            .post_json(
                &format!("/rider/ride/{}/rating", rating.ride_id),
                &serde_json::to_value(rating)?,
            )
            .await?;
        Ok(())
    }
}

// Mock API for development and testing: succeeds with canned data unless
// told to fail, and counts calls so tests can assert on traffic.
#[derive(Debug, Default)]
pub struct MockRiderApi {
    pub fail_next: AtomicBool,
    pub ride_requests: AtomicUsize,
    pub cancels: AtomicUsize,
    pub rating_submissions: AtomicUsize,
    pub message_fetches: AtomicUsize,
    /// `ride_status` answer; `None` means "requested".
    pub ride_status_override: Mutex<Option<String>>,
}

impl MockRiderApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_failure(&self) -> KekeResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            Err(KekeError::NetworkTimeout)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RiderApi for MockRiderApi {
    async fn request_ride(&self, _request: &RideRequest) -> KekeResult<RideRequestResponse> {
        self.ride_requests.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        Ok(RideRequestResponse {
            ride: RideRecord {
                id: "r1".to_string(),
                status: "requested".to_string(),
            },
        })
    }

    async fn cancel_ride(
        &self,
        _ride_id: &str,
        _reason: Option<&str>,
    ) -> KekeResult<CancelResponse> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        Ok(CancelResponse { success: true })
    }

    async fn ride_status(&self, ride_id: &str) -> KekeResult<RideRecord> {
        self.take_failure()?;
        let status = self
            .ride_status_override
            .lock()
            .expect("mock lock poisoned")
            .clone()
            .unwrap_or_else(|| "requested".to_string());
        Ok(RideRecord {
            id: ride_id.to_string(),
            status,
        })
    }

    async fn nearby_drivers(&self, _coords: &Coordinates) -> KekeResult<Vec<NearbyDriver>> {
        self.take_failure()?;
        Ok(Vec::new())
    }

    async fn calculate_fare(
        &self,
        distance_in_km: f64,
        duration_in_minutes: f64,
    ) -> KekeResult<FareQuote> {
        self.take_failure()?;
        Ok(FareQuote {
            estimated_fare: 500.0 + distance_in_km * 120.0,
            duration_in_minutes,
        })
    }

    async fn fetch_messages(&self, _ride_id: &str) -> KekeResult<Vec<ChatMessage>> {
        self.message_fetches.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        Ok(Vec::new())
    }

    async fn send_message(&self, ride_id: &str, content: &str) -> KekeResult<ChatMessage> {
        self.take_failure()?;
        Ok(ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            ride_id: ride_id.to_string(),
            sender_id: "usr-mock".to_string(),
            receiver_id: "drv-mock".to_string(),
            content: content.to_string(),
            created_at: chrono::Utc::now(),
            sender_name: None,
            receiver_name: None,
        })
    }

    async fn submit_rating(&self, _rating: &RideRating) -> KekeResult<()> {
        self.rating_submissions.fetch_add(1, Ordering::SeqCst);
        self.take_failure()
    }
}
