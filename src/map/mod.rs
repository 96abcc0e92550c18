// src/map/mod.rs
pub mod region;
pub mod route;

pub use region::{camera_for, CameraCommand, EdgePadding};
pub use route::{haversine_distance_m, trim_route};
