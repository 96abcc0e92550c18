// src/map/region.rs
use crate::models::{Driver, GeoPoint, LocationPoint, RideStage};

/// Asymmetric edge padding in screen points; the large bottom inset keeps the
/// fitted bounds clear of the bottom sheet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePadding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

pub const SHEET_PADDING: EdgePadding = EdgePadding {
    top: 80.0,
    right: 60.0,
    bottom: 280.0,
    left: 60.0,
};

pub const DEFAULT_ZOOM: f64 = 16.0;

/// Camera directive for the map view. `None` from [`camera_for`] means the
/// inputs for the current stage are not valid yet and the camera must stay
/// where it is.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraCommand {
    AnimateTo { center: GeoPoint, zoom: f64 },
    FitBounds { points: Vec<GeoPoint>, padding: EdgePadding },
}

fn driver_point(driver: Option<&Driver>) -> Option<GeoPoint> {
    let location = &driver?.location;
    if location.latitude.is_finite() && location.longitude.is_finite() {
        Some(GeoPoint::new(location.latitude, location.longitude))
    } else {
        None
    }
}

/// Pure mapping from (stage, positions) to a camera directive.
///
/// Each stage has a validity predicate over the positions it frames; when it
/// fails the function returns `None` so the camera never jumps to (0,0) or a
/// NaN region. Recomputing with unchanged inputs yields the same command.
pub fn camera_for(
    stage: RideStage,
    user: Option<GeoPoint>,
    pickup: &LocationPoint,
    destination: &LocationPoint,
    driver: Option<&Driver>,
) -> Option<CameraCommand> {
    match stage {
        // Single-point stages: centre on the rider (or pickup as fallback).
        RideStage::Initial | RideStage::Input => {
            let center = user.or_else(|| pickup.coords.to_geo())?;
            Some(CameraCommand::AnimateTo {
                center,
                zoom: DEFAULT_ZOOM,
            })
        }

        // Both ends of the requested trip.
        RideStage::Confirm | RideStage::Search => {
            let from = pickup.coords.to_geo()?;
            let to = destination.coords.to_geo()?;
            Some(CameraCommand::FitBounds {
                points: vec![from, to],
                padding: SHEET_PADDING,
            })
        }

        // Driver approaching the pickup.
        RideStage::Paired | RideStage::Arrived => {
            let keke = driver_point(driver)?;
            let from = pickup.coords.to_geo()?;
            Some(CameraCommand::FitBounds {
                points: vec![keke, from],
                padding: SHEET_PADDING,
            })
        }

        // Everything on screen during the trip (chat overlays the trip map).
        RideStage::Trip | RideStage::Chat => {
            let keke = driver_point(driver)?;
            let from = pickup.coords.to_geo()?;
            let to = destination.coords.to_geo()?;
            Some(CameraCommand::FitBounds {
                points: vec![keke, from, to],
                padding: SHEET_PADDING,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DriverLocation;

    fn point(address: &str, lat: f64, lng: f64) -> LocationPoint {
        LocationPoint::new(address, lat, lng)
    }

    fn driver_at(lat: f64, lng: f64) -> Driver {
        Driver {
            id: "drv-1".to_string(),
            name: "Chidi".to_string(),
            vehicle: "TVS King".to_string(),
            vehicle_number: "ABJ-118-XY".to_string(),
            rating: 4.9,
            profile_picture: None,
            phone: "+2347011112222".to_string(),
            location: DriverLocation {
                latitude: lat,
                longitude: lng,
                heading: None,
            },
        }
    }

    #[test]
    fn test_confirm_requires_both_ends() {
        let pickup = point("Yaba", 6.50, 3.37);
        let empty = LocationPoint {
            address: "somewhere".to_string(),
            coords: Default::default(),
        };
        // Destination coords empty: no command at all.
        assert_eq!(
            camera_for(RideStage::Confirm, None, &pickup, &empty, None),
            None
        );

        let destination = point("Lekki", 6.44, 3.47);
        match camera_for(RideStage::Confirm, None, &pickup, &destination, None) {
            Some(CameraCommand::FitBounds { points, padding }) => {
                assert_eq!(points.len(), 2);
                assert!(padding.bottom > padding.top);
            }
            other => panic!("expected FitBounds, got {:?}", other),
        }
    }

    #[test]
    fn test_initial_animates_to_user() {
        let pickup = LocationPoint::default();
        let command = camera_for(
            RideStage::Initial,
            Some(GeoPoint::new(6.52, 3.37)),
            &pickup,
            &pickup,
            None,
        );
        assert_eq!(
            command,
            Some(CameraCommand::AnimateTo {
                center: GeoPoint::new(6.52, 3.37),
                zoom: DEFAULT_ZOOM,
            })
        );
    }

    #[test]
    fn test_paired_requires_driver() {
        let pickup = point("Surulere", 6.49, 3.35);
        let destination = point("VI", 6.43, 3.42);
        assert_eq!(
            camera_for(RideStage::Paired, None, &pickup, &destination, None),
            None
        );

        let driver = driver_at(6.51, 3.36);
        assert!(
            camera_for(RideStage::Paired, None, &pickup, &destination, Some(&driver)).is_some()
        );
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let pickup = point("Surulere", 6.49, 3.35);
        let destination = point("VI", 6.43, 3.42);
        let driver = driver_at(6.51, 3.36);
        let a = camera_for(RideStage::Trip, None, &pickup, &destination, Some(&driver));
        let b = camera_for(RideStage::Trip, None, &pickup, &destination, Some(&driver));
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn test_nan_driver_location_is_invalid() {
        let pickup = point("Surulere", 6.49, 3.35);
        let destination = point("VI", 6.43, 3.42);
        let driver = driver_at(f64::NAN, 3.36);
        assert_eq!(
            camera_for(RideStage::Trip, None, &pickup, &destination, Some(&driver)),
            None
        );
    }
}
