//! Geographic utilities: great-circle distance, bearings, turning angles and
//! cross-track distance on a spherical Earth.
//!
//! The checked functions (`distance`, `bearing`, `turning_angle`) validate their
//! inputs and return [`TrackError::InvalidCoordinate`] for out-of-range values.
//! The `haversine_*`/`initial_*` variants skip validation and are used inside the
//! filtering stages once a trajectory has been checked as a whole.

use geo::{Distance, Haversine, Point};

use crate::error::{Result, TrackError};
use crate::{Bounds, GpsPoint};

/// Mean Earth radius in meters, the same sphere `geo::Haversine` measures on.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Approximate length of one degree of latitude in meters.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Validate a single coordinate pair.
pub fn validate_coordinate(latitude: f64, longitude: f64) -> Result<()> {
    if GpsPoint::new(latitude, longitude).is_valid() {
        Ok(())
    } else {
        Err(TrackError::InvalidCoordinate {
            latitude,
            longitude,
        })
    }
}

/// Great-circle distance between two points in meters.
///
/// # Example
/// ```
/// use turtle_track::GpsPoint;
/// use turtle_track::geo_utils::distance;
///
/// let a = GpsPoint::new(0.0, 0.0);
/// let b = GpsPoint::new(0.0, 1.0);
/// let d = distance(&a, &b).unwrap();
/// assert!((d - 111_195.0).abs() < 1.0);
/// ```
pub fn distance(p1: &GpsPoint, p2: &GpsPoint) -> Result<f64> {
    p1.validate()?;
    p2.validate()?;
    Ok(haversine_distance(p1, p2))
}

/// Initial great-circle bearing from `p1` to `p2` in degrees, in [0, 360).
pub fn bearing(p1: &GpsPoint, p2: &GpsPoint) -> Result<f64> {
    p1.validate()?;
    p2.validate()?;
    Ok(initial_bearing(p1, p2))
}

/// Absolute deviation between the heading on arrival at `p2` (from `p1`) and
/// the heading leaving `p2` (towards `p3`), in degrees, in [0, 180].
pub fn turning_angle(p1: &GpsPoint, p2: &GpsPoint, p3: &GpsPoint) -> Result<f64> {
    p1.validate()?;
    p2.validate()?;
    p3.validate()?;
    Ok(bearing_difference(
        final_bearing(p1, p2),
        initial_bearing(p2, p3),
    ))
}

/// Haversine distance between two points in meters, without validation.
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Initial bearing in degrees [0, 360), without validation.
///
/// Coincident points have a bearing of 0.
pub fn initial_bearing(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlng = (p2.longitude - p1.longitude).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();

    normalize_bearing(y.atan2(x).to_degrees())
}

/// Heading on arrival at `p2` along the great circle from `p1`, without validation.
pub fn final_bearing(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    normalize_bearing(initial_bearing(p2, p1) + 180.0)
}

/// Map any angle in degrees onto [0, 360).
pub fn normalize_bearing(degrees: f64) -> f64 {
    let b = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

/// Smallest absolute difference between two bearings, in [0, 180].
pub fn bearing_difference(incoming: f64, outgoing: f64) -> f64 {
    let diff = (outgoing - incoming).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Distance in meters from `point` to the great-circle arc `start`→`end`.
///
/// When the along-track projection of the point falls before `start` or past
/// `end`, the distance to the nearer endpoint is returned instead. A degenerate
/// arc (coincident endpoints) measures the distance to `start`.
pub fn cross_track_distance(point: &GpsPoint, start: &GpsPoint, end: &GpsPoint) -> f64 {
    let d13 = haversine_distance(start, point);
    let d12 = haversine_distance(start, end);
    if d12 < 1e-9 || d13 < 1e-9 {
        return d13;
    }

    let delta13 = d13 / EARTH_RADIUS_M;
    let theta13 = initial_bearing(start, point).to_radians();
    let theta12 = initial_bearing(start, end).to_radians();

    let xt = (delta13.sin() * (theta13 - theta12).sin())
        .clamp(-1.0, 1.0)
        .asin();

    let cos_xt = xt.cos();
    let along_ratio = if cos_xt.abs() < 1e-15 {
        0.0
    } else {
        (delta13.cos() / cos_xt).clamp(-1.0, 1.0)
    };
    let mut along = along_ratio.acos() * EARTH_RADIUS_M;
    if (theta13 - theta12).cos() < 0.0 {
        along = -along;
    }

    if along < 0.0 {
        d13
    } else if along > d12 {
        haversine_distance(end, point)
    } else {
        xt.abs() * EARTH_RADIUS_M
    }
}

/// Project a point onto a local plane centered on `origin` (meters east, meters north).
pub fn project_equirectangular(point: &GpsPoint, origin: &GpsPoint) -> (f64, f64) {
    let cos_lat = origin.latitude.to_radians().cos();
    let x = (point.longitude - origin.longitude).to_radians() * cos_lat * EARTH_RADIUS_M;
    let y = (point.latitude - origin.latitude).to_radians() * EARTH_RADIUS_M;
    (x, y)
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Convert a distance in meters to an approximate span in degrees at `latitude`.
///
/// Returns `(lat_degrees, lng_degrees)`.
pub fn meters_to_degrees(meters: f64, latitude: f64) -> (f64, f64) {
    let lat_deg = meters / METERS_PER_DEGREE;
    let cos_lat = latitude.to_radians().cos().max(1e-6);
    (lat_deg, lat_deg / cos_lat)
}

/// Bounding box of a set of points; `None` when empty.
pub fn compute_bounds(points: &[GpsPoint]) -> Option<Bounds> {
    Bounds::from_points(points)
}

/// Arithmetic mean of the coordinates; `None` when empty.
pub fn compute_center(points: &[GpsPoint]) -> Option<GpsPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    Some(GpsPoint::new(sum_lat / n, sum_lng / n))
}
