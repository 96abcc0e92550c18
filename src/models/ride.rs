// src/models/ride.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RideStage {
    Initial, // Idle on the map, no destination chosen
    Input,   // Destination selector open
    Confirm, // Pickup + destination chosen, awaiting booking confirmation
    Search,  // Ride requested, waiting for a driver to accept
    Paired,  // Driver accepted and is en route to pickup
    Arrived, // Driver is at the pickup point
    Trip,    // Ride in progress towards the destination
    Chat,    // Modal chat overlay, entered from Paired/Arrived/Trip
}

impl RideStage {
    /// A ride exists server-side (the event channel has a room to join).
    pub fn is_active(&self) -> bool {
        !matches!(self, RideStage::Initial | RideStage::Input | RideStage::Confirm)
    }

    /// Stages from which the chat overlay may be opened.
    pub fn allows_chat(&self) -> bool {
        matches!(self, RideStage::Paired | RideStage::Arrived | RideStage::Trip)
    }
}

/// A plain latitude/longitude pair used by all geometry code.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Coordinates as the backend transports them: numeric strings, which may be
/// empty while the rider is still picking a location.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Coordinates {
    pub latitude: String,
    pub longitude: String,
}

impl Coordinates {
    pub fn from_geo(point: GeoPoint) -> Self {
        Self {
            latitude: point.latitude.to_string(),
            longitude: point.longitude.to_string(),
        }
    }

    /// Valid iff both fields are non-empty and parse as finite numbers.
    pub fn is_valid(&self) -> bool {
        self.to_geo().is_some()
    }

    pub fn to_geo(&self) -> Option<GeoPoint> {
        let latitude: f64 = self.latitude.trim().parse().ok()?;
        let longitude: f64 = self.longitude.trim().parse().ok()?;
        if latitude.is_finite() && longitude.is_finite() {
            Some(GeoPoint { latitude, longitude })
        } else {
            None
        }
    }
}

/// A pickup or destination as held in the store: human address + coordinates.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct LocationPoint {
    pub address: String,
    pub coords: Coordinates,
}

impl LocationPoint {
    pub fn new(address: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            address: address.into(),
            coords: Coordinates::from_geo(GeoPoint::new(latitude, longitude)),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.address.is_empty() && self.coords.is_valid()
    }
}

/// Which of the two concurrent routes a server update targets.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    Pickup,      // driver -> pickup
    Destination, // pickup -> destination
}

/// A backend-computed route: polyline plus aggregate distance/duration.
/// Replaced wholesale on every `driver:route-updated`; never merged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RouteDirections {
    pub coordinates: Vec<GeoPoint>,
    pub distance: f64, // kilometres
    pub duration: f64, // minutes
}

// Request/Response wire types

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    pub pickup_location: LocationPoint,
    pub dropoff_location: LocationPoint,
    pub payment_method: String,
    pub distance_in_km: f64,
    pub duration_in_minutes: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RideRecord {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RideRequestResponse {
    pub ride: RideRecord,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CancelResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FareQuote {
    pub estimated_fare: f64,
    pub duration_in_minutes: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RideRating {
    pub ride_id: String,
    pub stars: u8,
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_validity() {
        let good = Coordinates {
            latitude: "6.5244".to_string(),
            longitude: "3.3792".to_string(),
        };
        assert!(good.is_valid());

        let empty = Coordinates::default();
        assert!(!empty.is_valid());

        let partial = Coordinates {
            latitude: "6.5244".to_string(),
            longitude: "".to_string(),
        };
        assert!(!partial.is_valid());

        let garbage = Coordinates {
            latitude: "north".to_string(),
            longitude: "3.3792".to_string(),
        };
        assert!(!garbage.is_valid());
    }

    #[test]
    fn test_stage_classification() {
        assert!(!RideStage::Confirm.is_active());
        assert!(RideStage::Search.is_active());
        assert!(RideStage::Trip.allows_chat());
        assert!(!RideStage::Search.allows_chat());
    }
}
