// src/models/driver.rs
use serde::{Deserialize, Serialize};

/// Live driver position as pushed by `driver:location-update`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DriverLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: Option<f64>, // Direction in degrees (0-360)
}

/// The matched driver. Created wholesale on `ride:accepted`, nulled on ride
/// reset; only `location` is mutated incrementally in between.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: String,
    pub name: String,
    pub vehicle: String,        // e.g. "Bajaj RE"
    pub vehicle_number: String, // plate
    pub rating: f32,
    pub profile_picture: Option<String>,
    pub phone: String,
    pub location: DriverLocation,
}

/// Minimal marker returned by the nearby-drivers poll, enough to render
/// idle Kekes on the map before any booking happens.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NearbyDriver {
    pub id: String,
    pub location: DriverLocation,
}
