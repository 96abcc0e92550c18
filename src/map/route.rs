// src/map/route.rs
use crate::models::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in metres (haversine).
pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lng = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Closest point to `p` on the segment `a`-`b`, by parametric projection in
/// raw lat/lng space with `t` clamped to [0, 1]. A zero-length segment
/// collapses to the shared endpoint.
fn project_onto_segment(p: GeoPoint, a: GeoPoint, b: GeoPoint) -> GeoPoint {
    let dx = b.latitude - a.latitude;
    let dy = b.longitude - a.longitude;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return a;
    }

    let t = ((p.latitude - a.latitude) * dx + (p.longitude - a.longitude) * dy) / len_sq;
    let t = t.clamp(0.0, 1.0);
    GeoPoint {
        latitude: a.latitude + t * dx,
        longitude: a.longitude + t * dy,
    }
}

/// Trim a route polyline to the portion still ahead of the driver.
///
/// Projects the driver onto every segment, keeps the segment whose projection
/// is nearest (haversine), and returns `[projection] + route[seg + 1..]`. The
/// projected point, not the raw GPS fix, leads the result so the rendered
/// route hugs the road.
pub fn trim_route(driver: GeoPoint, route: &[GeoPoint]) -> Vec<GeoPoint> {
    if route.len() < 2 {
        return vec![driver];
    }

    let mut best_index = 0;
    let mut best_projection = route[0];
    let mut best_distance = f64::INFINITY;

    for (i, window) in route.windows(2).enumerate() {
        let projection = project_onto_segment(driver, window[0], window[1]);
        let distance = haversine_distance_m(driver, projection);
        if distance < best_distance {
            best_distance = distance;
            best_projection = projection;
            best_index = i;
        }
    }

    let mut trimmed = Vec::with_capacity(route.len() - best_index);
    trimmed.push(best_projection);
    trimmed.extend_from_slice(&route[best_index + 1..]);
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng)
    }

    #[test]
    fn test_haversine_lagos_ibadan() {
        // Lagos to Ibadan is roughly 130 km
        let distance = haversine_distance_m(p(6.5244, 3.3792), p(7.3775, 3.9470));
        assert!(distance > 100_000.0 && distance < 150_000.0);
    }

    #[test]
    fn test_trim_starts_at_projection() {
        let route = vec![p(0.0, 0.0), p(0.0, 1.0), p(0.0, 2.0)];
        let trimmed = trim_route(p(0.0, 0.5), &route);
        assert_eq!(trimmed, vec![p(0.0, 0.5), p(0.0, 1.0), p(0.0, 2.0)]);
    }

    #[test]
    fn test_trim_driver_off_route_projects_perpendicular() {
        let route = vec![p(0.0, 0.0), p(0.0, 2.0)];
        // Driver north of the line; projection lands on the segment, not a vertex.
        let trimmed = trim_route(p(0.5, 1.0), &route);
        assert_eq!(trimmed[0], p(0.0, 1.0));
        assert_eq!(trimmed.last(), Some(&p(0.0, 2.0)));
    }

    #[test]
    fn test_trim_short_route_returns_driver_point() {
        assert_eq!(trim_route(p(1.0, 1.0), &[]), vec![p(1.0, 1.0)]);
        assert_eq!(trim_route(p(1.0, 1.0), &[p(5.0, 5.0)]), vec![p(1.0, 1.0)]);
    }

    #[test]
    fn test_trim_handles_duplicate_points() {
        // Zero-length segment must not divide by zero.
        let route = vec![p(0.0, 0.0), p(0.0, 0.0), p(0.0, 1.0)];
        let trimmed = trim_route(p(0.0, 0.1), &route);
        assert!(trimmed[0].latitude.is_finite());
        assert!(trimmed[0].longitude.is_finite());
        assert_eq!(trimmed.last(), Some(&p(0.0, 1.0)));
    }

    #[test]
    fn test_trim_past_end_clamps_to_last_point() {
        let route = vec![p(0.0, 0.0), p(0.0, 1.0)];
        let trimmed = trim_route(p(0.0, 5.0), &route);
        assert_eq!(trimmed[0], p(0.0, 1.0));
    }
}
