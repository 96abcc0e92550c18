// src/services/location.rs
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::{KekeError, KekeResult};
use crate::models::{GeoPoint, LocationPoint};
use crate::store::RideStateStore;

/// Fallback pickup when the device cannot produce a fix (Ikeja, Lagos).
pub const DEFAULT_PICKUP: GeoPoint = GeoPoint {
    latitude: 6.6018,
    longitude: 3.3515,
};

/// Device geolocation plus reverse geocoding.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_position(&self) -> KekeResult<GeoPoint>;
    async fn reverse_geocode(&self, point: GeoPoint) -> KekeResult<String>;
}

/// Resolves the rider's pickup point into the store.
///
/// Lookups are sequenced with a monotonically increasing request id; a
/// result is only applied while its id is still the latest, so a slow stale
/// response can never overwrite a newer one.
pub struct PickupResolver {
    provider: Arc<dyn LocationProvider>,
    store: Arc<RideStateStore>,
    latest_request: AtomicU64,
}

impl PickupResolver {
    pub fn new(provider: Arc<dyn LocationProvider>, store: Arc<RideStateStore>) -> Self {
        Self {
            provider,
            store,
            latest_request: AtomicU64::new(0),
        }
    }

    fn is_current(&self, request_id: u64) -> bool {
        self.latest_request.load(Ordering::SeqCst) == request_id
    }

    /// Resolve the device position, reverse-geocode it, and write the
    /// pickup into the store. Transient failures degrade to the default
    /// coordinates rather than surfacing a dialog.
    pub async fn refresh_pickup(&self) -> KekeResult<LocationPoint> {
        let request_id = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
        self.store.set_map_loading(true);

        let position = match self.provider.current_position().await {
            Ok(position) => position,
            Err(e) => {
                warn!(error = %e, "Geolocation failed, falling back to default pickup");
                DEFAULT_PICKUP
            }
        };

        let address = match self.provider.reverse_geocode(position).await {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "Reverse geocoding failed");
                "Current location".to_string()
            }
        };

        let point = LocationPoint::new(address, position.latitude, position.longitude);

        // A newer lookup started while this one was in flight: drop it.
        if !self.is_current(request_id) {
            return Err(KekeError::LocationUnavailable(
                "superseded by a newer lookup".to_string(),
            ));
        }

        self.store.set_pickup(point.clone());
        self.store.set_map_loading(false);
        Ok(point)
    }
}

/// Fixed-position provider for tests and the headless binary.
#[derive(Debug, Clone)]
pub struct MockLocationProvider {
    pub position: GeoPoint,
    pub address: String,
}

impl Default for MockLocationProvider {
    fn default() -> Self {
        Self {
            position: DEFAULT_PICKUP,
            address: "Ikeja, Lagos".to_string(),
        }
    }
}

#[async_trait]
impl LocationProvider for MockLocationProvider {
    async fn current_position(&self) -> KekeResult<GeoPoint> {
        Ok(self.position)
    }

    async fn reverse_geocode(&self, _point: GeoPoint) -> KekeResult<String> {
        Ok(self.address.clone())
    }
}
