//! Great-circle distance between two coordinates (haversine, statute miles).

use crate::location::Coordinate;
use std::f64::consts::PI;

/// Mean Earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

const DEG: f64 = PI / 180.0;

/// Distance in miles from `a` to `b`, rounded to one decimal place.
pub fn distance_miles(a: Coordinate, b: Coordinate) -> f64 {
    round_tenth(raw_distance_miles(a, b))
}

/// Unrounded haversine distance.
pub fn raw_distance_miles(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = b.latitude - a.latitude;
    let d_lon = b.longitude - a.longitude;

    let h = 0.5 - (d_lat * DEG).cos() / 2.0
        + (a.latitude * DEG).cos() * (b.latitude * DEG).cos() * (1.0 - (d_lon * DEG).cos()) / 2.0;

    // Rounding can push h slightly outside [0, 1] for identical or antipodal points.
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_MILES * h.sqrt().asin()
}

fn round_tenth(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
