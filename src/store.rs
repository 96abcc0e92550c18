// src/store.rs
use std::sync::{Arc, RwLock};

use crate::models::{
    ChatMessage, Driver, DriverLocation, LocationPoint, NearbyDriver, RideStage, RouteDirections,
    RouteKind,
};

/// One immutable snapshot of everything the ride UI renders from.
#[derive(Debug, Clone, PartialEq)]
pub struct RideState {
    pub stage: RideStage,
    pub ride_id: Option<String>,
    pub driver: Option<Driver>,
    pub eta_minutes: Option<i64>,
    pub fare: Option<f64>,
    pub distance_km: f64,
    pub duration_min: f64,
    pub pickup: LocationPoint,
    pub destination: LocationPoint,
    pub pickup_route: Option<RouteDirections>,
    pub destination_route: Option<RouteDirections>,
    pub messages: Vec<ChatMessage>,
    pub nearby_drivers: Vec<NearbyDriver>,
    pub map_loading: bool,
    /// Set when `ride:completed` is observed; disarms the countdown fallback.
    pub completion_seen: bool,
    /// Stage the chat overlay was entered from.
    pub chat_return_stage: Option<RideStage>,
}

impl Default for RideState {
    fn default() -> Self {
        Self {
            stage: RideStage::Initial,
            ride_id: None,
            driver: None,
            eta_minutes: None,
            fare: None,
            distance_km: 0.0,
            duration_min: 0.0,
            pickup: LocationPoint::default(),
            destination: LocationPoint::default(),
            pickup_route: None,
            destination_route: None,
            messages: Vec::new(),
            nearby_drivers: Vec::new(),
            map_loading: true,
            completion_seen: false,
            chat_return_stage: None,
        }
    }
}

/// Single source of truth for ride state. Components read via `snapshot()`
/// and mutate only through the typed setters below; `stage` in particular is
/// written exclusively by the lifecycle controller.
#[derive(Debug, Default)]
pub struct RideStateStore {
    inner: RwLock<RideState>,
}

impl RideStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> RideState {
        self.inner.read().expect("ride state lock poisoned").clone()
    }

    pub fn stage(&self) -> RideStage {
        self.inner.read().expect("ride state lock poisoned").stage
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut RideState) -> R) -> R {
        let mut state = self.inner.write().expect("ride state lock poisoned");
        f(&mut state)
    }

    // Stage is single-writer: only lifecycle.rs calls this.
    pub(crate) fn set_stage(&self, stage: RideStage) {
        self.mutate(|s| s.stage = stage);
    }

    pub fn set_ride_id(&self, ride_id: Option<String>) {
        self.mutate(|s| s.ride_id = ride_id);
    }

    pub fn set_driver(&self, driver: Option<Driver>) {
        self.mutate(|s| s.driver = driver);
    }

    /// Incremental driver position update; a no-op when no driver is matched
    /// (a stray update after reset must not resurrect a driver).
    pub fn set_driver_location(&self, location: DriverLocation) {
        self.mutate(|s| {
            if let Some(driver) = s.driver.as_mut() {
                driver.location = location;
            }
        });
    }

    pub fn set_eta_minutes(&self, eta: Option<i64>) {
        self.mutate(|s| s.eta_minutes = eta);
    }

    /// Decrement the ETA by one minute, saturating at zero. Returns the new
    /// value, or `None` when no ETA is set.
    pub fn tick_eta(&self) -> Option<i64> {
        self.mutate(|s| {
            if let Some(eta) = s.eta_minutes.as_mut() {
                *eta = (*eta - 1).max(0);
                Some(*eta)
            } else {
                None
            }
        })
    }

    pub fn set_fare(&self, fare: Option<f64>) {
        self.mutate(|s| s.fare = fare);
    }

    pub fn set_trip_metrics(&self, distance_km: f64, duration_min: f64) {
        self.mutate(|s| {
            s.distance_km = distance_km;
            s.duration_min = duration_min;
        });
    }

    pub fn set_pickup(&self, pickup: LocationPoint) {
        self.mutate(|s| s.pickup = pickup);
    }

    pub fn set_destination(&self, destination: LocationPoint) {
        self.mutate(|s| s.destination = destination);
    }

    /// Replace one of the two routes wholesale. Stale routes are discarded,
    /// never merged.
    pub fn set_route(&self, kind: RouteKind, directions: Option<RouteDirections>) {
        self.mutate(|s| match kind {
            RouteKind::Pickup => s.pickup_route = directions,
            RouteKind::Destination => s.destination_route = directions,
        });
    }

    pub fn set_messages(&self, messages: Vec<ChatMessage>) {
        self.mutate(|s| s.messages = messages);
    }

    pub fn push_message(&self, message: ChatMessage) {
        self.mutate(|s| s.messages.push(message));
    }

    pub fn set_nearby_drivers(&self, drivers: Vec<NearbyDriver>) {
        self.mutate(|s| s.nearby_drivers = drivers);
    }

    pub fn set_map_loading(&self, loading: bool) {
        self.mutate(|s| s.map_loading = loading);
    }

    pub fn mark_completion_seen(&self) {
        self.mutate(|s| s.completion_seen = true);
    }

    pub(crate) fn set_chat_return_stage(&self, stage: Option<RideStage>) {
        self.mutate(|s| s.chat_return_stage = stage);
    }

    /// Clear every ride-scoped field in one lock acquisition. Pickup and
    /// destination survive a cancel so the rider can rebook without
    /// re-entering them; the caller decides whether to clear those too.
    pub fn reset_ride(&self) {
        self.mutate(|s| {
            s.ride_id = None;
            s.driver = None;
            s.eta_minutes = None;
            s.fare = None;
            s.distance_km = 0.0;
            s.duration_min = 0.0;
            s.pickup_route = None;
            s.destination_route = None;
            s.messages.clear();
            s.completion_seen = false;
            s.chat_return_stage = None;
        });
    }

    /// Full wipe on logout or 401: ride state plus locations.
    pub fn reset_all(&self) {
        self.mutate(|s| *s = RideState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_driver() -> Driver {
        Driver {
            id: "drv-1".to_string(),
            name: "Emeka".to_string(),
            vehicle: "Bajaj RE".to_string(),
            vehicle_number: "KJA-421-QA".to_string(),
            rating: 4.7,
            profile_picture: None,
            phone: "+2348012345678".to_string(),
            location: DriverLocation {
                latitude: 6.52,
                longitude: 3.37,
                heading: None,
            },
        }
    }

    #[test]
    fn test_driver_location_update_requires_driver() {
        let store = RideStateStore::new();
        store.set_driver_location(DriverLocation {
            latitude: 1.0,
            longitude: 2.0,
            heading: None,
        });
        assert!(store.snapshot().driver.is_none());

        store.set_driver(Some(test_driver()));
        store.set_driver_location(DriverLocation {
            latitude: 6.53,
            longitude: 3.38,
            heading: Some(90.0),
        });
        let driver = store.snapshot().driver.unwrap();
        assert_eq!(driver.location.latitude, 6.53);
        assert_eq!(driver.location.heading, Some(90.0));
    }

    #[test]
    fn test_tick_eta_saturates_at_zero() {
        let store = RideStateStore::new();
        assert_eq!(store.tick_eta(), None);

        store.set_eta_minutes(Some(1));
        assert_eq!(store.tick_eta(), Some(0));
        assert_eq!(store.tick_eta(), Some(0));
    }

    #[test]
    fn test_reset_ride_clears_ride_scoped_fields() {
        let store = RideStateStore::new();
        store.set_ride_id(Some("ride-1".to_string()));
        store.set_driver(Some(test_driver()));
        store.set_eta_minutes(Some(5));
        store.set_fare(Some(1200.0));
        store.set_route(
            RouteKind::Pickup,
            Some(crate::models::RouteDirections {
                coordinates: vec![],
                distance: 1.0,
                duration: 4.0,
            }),
        );
        store.push_message(ChatMessage {
            id: "m1".to_string(),
            ride_id: "ride-1".to_string(),
            sender_id: "u1".to_string(),
            receiver_id: "drv-1".to_string(),
            content: "I dey come".to_string(),
            created_at: chrono::Utc::now(),
            sender_name: None,
            receiver_name: None,
        });
        store.set_pickup(LocationPoint::new("Ikeja City Mall", 6.61, 3.35));

        store.reset_ride();
        let state = store.snapshot();
        assert!(state.ride_id.is_none());
        assert!(state.driver.is_none());
        assert!(state.eta_minutes.is_none());
        assert!(state.fare.is_none());
        assert!(state.pickup_route.is_none());
        assert!(state.messages.is_empty());
        assert!(!state.completion_seen);
        // Pickup survives a reset so rebooking is one tap.
        assert!(state.pickup.is_valid());
    }
}
