//! Geographic distance helpers shared by the delay estimator and the
//! corridor filter.

use crate::snapshot::VehicleRecord;

/// Coarse "along this route" corridor width.
pub const ROUTE_CORRIDOR_KM: f64 = 2.0;
/// Tight "on this exact corridor" width.
pub const EXACT_CORRIDOR_KM: f64 = 0.5;

/// Kilometers per degree at mid-latitudes, used by the flat-earth corridor
/// math. Not geodesically exact; fine at single-city scale.
const KM_PER_DEGREE: f64 = 111.0;

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lng: f64,
}

impl Point {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Great-circle distance between two coordinates in kilometers (Haversine).
pub fn haversine_km(a: Point, b: Point) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Distance in kilometers from `point` to the segment `start -> end`.
///
/// Projects the point onto the segment in degree space, clamps the projection
/// scalar to `[0, 1]`, and scales the Euclidean residual by [`KM_PER_DEGREE`].
/// A zero-length segment degenerates to the distance to `start`.
pub fn corridor_distance_km(point: Point, start: Point, end: Point) -> f64 {
    let a_lat = point.lat - start.lat;
    let a_lng = point.lng - start.lng;
    let c_lat = end.lat - start.lat;
    let c_lng = end.lng - start.lng;

    let dot = a_lat * c_lat + a_lng * c_lng;
    let len_sq = c_lat * c_lat + c_lng * c_lng;

    // len_sq of zero forces the clamp below to pick `start`.
    let t = if len_sq == 0.0 { -1.0 } else { dot / len_sq };
    let t = t.clamp(0.0, 1.0);

    let proj_lat = start.lat + t * c_lat;
    let proj_lng = start.lng + t * c_lng;

    let d_lat = point.lat - proj_lat;
    let d_lng = point.lng - proj_lng;

    (d_lat * d_lat + d_lng * d_lng).sqrt() * KM_PER_DEGREE
}

/// Retains the vehicles whose distance to the `start -> end` corridor is
/// within `threshold_km`.
pub fn filter_corridor(
    vehicles: &[VehicleRecord],
    start: Point,
    end: Point,
    threshold_km: f64,
) -> Vec<VehicleRecord> {
    vehicles
        .iter()
        .filter(|v| corridor_distance_km(Point::new(v.lat, v.lng), start, end) <= threshold_km)
        .cloned()
        .collect()
}
