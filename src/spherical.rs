//! # Spherical Averaging
//!
//! Mean position of a set of coordinates computed on the unit sphere.
//!
//! Arithmetic averaging of longitudes breaks at the ±180° seam: the mean of
//! 179°E and 179°W comes out as 0° instead of 180°. Averaging unit vectors
//! and converting the resultant back to latitude/longitude has no seam and
//! stays well defined near the poles.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`to_unit_vector`] | Latitude/longitude (degrees) to a unit-sphere vector |
//! | [`to_lat_lon`] | Unit-sphere vector back to latitude/longitude (degrees) |
//! | [`mean_of`] | Spherical mean of a non-empty set of points |
//! | [`haversine_distance`] | Great-circle distance between two points |
//!
//! ## Example
//!
//! ```rust
//! use visitor_atlas::{GeoPoint, spherical};
//!
//! let points = [GeoPoint::new(0.0, 179.0), GeoPoint::new(0.0, -179.0)];
//! let mean = spherical::mean_of(&points).unwrap();
//! assert!(mean.longitude.abs() > 179.9);
//! ```
//!
//! ## Algorithm Notes
//!
//! The averaged vector is shorter than unit length whenever the points are
//! spread out. [`mean_of`] rescales it before converting back, so the result
//! is the direction of the resultant. Points that cancel out completely
//! (e.g. two antipodes) have no defined mean and are rejected.

use geo::{Distance, Haversine, Point};

use crate::{AtlasError, GeoPoint};

/// Resultant vectors shorter than this are treated as having no direction.
const MIN_RESULTANT_LENGTH: f64 = 1e-12;

/// A point on (or inside) the unit sphere.
pub type UnitVector = (f64, f64, f64);

// =============================================================================
// Conversions
// =============================================================================

/// Convert a latitude/longitude in degrees to a vector on the unit sphere.
///
/// `x` points at (0°, 0°), `y` at (0°, 90°E), `z` at the north pole.
#[inline]
pub fn to_unit_vector(latitude: f64, longitude: f64) -> UnitVector {
    let lat = latitude.to_radians();
    let lon = longitude.to_radians();
    (lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

/// Convert a vector back to latitude/longitude in degrees.
///
/// The vector is treated as unit length: `lat = asin(z)`, `lon = atan2(y, x)`.
/// A shorter vector pulls the latitude toward the equator; normalize first if
/// that matters. `z` is clamped to `[-1, 1]` so rounding cannot produce NaN.
#[inline]
pub fn to_lat_lon(x: f64, y: f64, z: f64) -> GeoPoint {
    let latitude = z.clamp(-1.0, 1.0).asin().to_degrees();
    let longitude = y.atan2(x).to_degrees();
    GeoPoint::new(latitude, longitude)
}

// =============================================================================
// Mean Position
// =============================================================================

/// Compute the spherical mean of a set of points.
///
/// Every point is converted to a unit vector, the components are averaged,
/// and the normalized resultant is converted back.
///
/// # Errors
///
/// [`AtlasError::InvalidInput`] when `points` is empty, contains an
/// out-of-range coordinate, or the vectors cancel out.
///
/// # Example
///
/// ```rust
/// use visitor_atlas::{GeoPoint, spherical};
///
/// let mean = spherical::mean_of(&[GeoPoint::new(10.0, 20.0)]).unwrap();
/// assert!((mean.latitude - 10.0).abs() < 1e-9);
/// assert!((mean.longitude - 20.0).abs() < 1e-9);
///
/// assert!(spherical::mean_of(&[]).is_err());
/// ```
pub fn mean_of(points: &[GeoPoint]) -> Result<GeoPoint, AtlasError> {
    if points.is_empty() {
        return Err(AtlasError::invalid("cannot average an empty set of points"));
    }
    if let Some(bad) = points.iter().find(|p| !p.is_valid()) {
        return Err(AtlasError::invalid(format!(
            "coordinate out of range: ({}, {})",
            bad.latitude, bad.longitude
        )));
    }

    let (sx, sy, sz) = sum_vectors(points);
    let n = points.len() as f64;
    let (ax, ay, az) = (sx / n, sy / n, sz / n);

    let length = (ax * ax + ay * ay + az * az).sqrt();
    if length < MIN_RESULTANT_LENGTH {
        return Err(AtlasError::invalid(
            "points cancel out on the sphere; mean position is undefined",
        ));
    }

    Ok(to_lat_lon(ax / length, ay / length, az / length))
}

#[cfg(not(feature = "parallel"))]
fn sum_vectors(points: &[GeoPoint]) -> UnitVector {
    points
        .iter()
        .map(|p| to_unit_vector(p.latitude, p.longitude))
        .fold((0.0, 0.0, 0.0), add)
}

#[cfg(feature = "parallel")]
fn sum_vectors(points: &[GeoPoint]) -> UnitVector {
    use rayon::prelude::*;

    points
        .par_iter()
        .map(|p| to_unit_vector(p.latitude, p.longitude))
        .reduce(|| (0.0, 0.0, 0.0), add)
}

#[inline]
fn add(a: UnitVector, b: UnitVector) -> UnitVector {
    (a.0 + b.0, a.1 + b.1, a.2 + b.2)
}

// =============================================================================
// Distance
// =============================================================================

/// Great-circle distance in meters (spherical Earth, radius 6,371 km).
#[inline]
pub fn haversine_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_unit_vector_axes() {
        let (x, y, z) = to_unit_vector(0.0, 0.0);
        assert!(approx_eq(x, 1.0, 1e-12) && approx_eq(y, 0.0, 1e-12) && approx_eq(z, 0.0, 1e-12));

        let (x, y, z) = to_unit_vector(0.0, 90.0);
        assert!(approx_eq(x, 0.0, 1e-12) && approx_eq(y, 1.0, 1e-12) && approx_eq(z, 0.0, 1e-12));

        let (_, _, z) = to_unit_vector(90.0, 0.0);
        assert!(approx_eq(z, 1.0, 1e-12));
    }

    #[test]
    fn test_vector_round_trip_tokyo() {
        let (x, y, z) = to_unit_vector(35.6762, 139.6503);
        let back = to_lat_lon(x, y, z);
        assert!(approx_eq(back.latitude, 35.6762, 1e-9));
        assert!(approx_eq(back.longitude, 139.6503, 1e-9));
    }

    #[test]
    fn test_to_lat_lon_clamps_rounding() {
        let p = to_lat_lon(0.0, 0.0, 1.0 + 1e-15);
        assert!(approx_eq(p.latitude, 90.0, 1e-9));
    }

    #[test]
    fn test_mean_of_single_origin() {
        let mean = mean_of(&[GeoPoint::new(0.0, 0.0)]).unwrap();
        assert!(approx_eq(mean.latitude, 0.0, 1e-12));
        assert!(approx_eq(mean.longitude, 0.0, 1e-12));
    }

    #[test]
    fn test_mean_of_across_antimeridian() {
        let mean = mean_of(&[GeoPoint::new(0.0, 179.0), GeoPoint::new(0.0, -179.0)]).unwrap();
        assert!(approx_eq(mean.latitude, 0.0, 1e-9));
        assert!(mean.longitude.abs() > 179.9, "got {}", mean.longitude);
    }

    #[test]
    fn test_mean_of_near_pole() {
        // Both points are 10° from the pole on opposite meridians.
        let mean = mean_of(&[GeoPoint::new(80.0, 0.0), GeoPoint::new(80.0, 180.0)]).unwrap();
        assert!(approx_eq(mean.latitude, 90.0, 1e-6));
    }

    #[test]
    fn test_mean_of_is_symmetric_on_equator() {
        let mean = mean_of(&[GeoPoint::new(0.0, -10.0), GeoPoint::new(0.0, 10.0)]).unwrap();
        assert!(approx_eq(mean.latitude, 0.0, 1e-9));
        assert!(approx_eq(mean.longitude, 0.0, 1e-9));
    }

    #[test]
    fn test_mean_of_empty_fails() {
        assert!(matches!(mean_of(&[]), Err(AtlasError::InvalidInput(_))));
    }

    #[test]
    fn test_mean_of_antipodes_fails() {
        let result = mean_of(&[GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 180.0)]);
        assert!(matches!(result, Err(AtlasError::InvalidInput(_))));
    }

    #[test]
    fn test_mean_of_rejects_invalid_point() {
        let result = mean_of(&[GeoPoint::new(91.0, 0.0)]);
        assert!(matches!(result, Err(AtlasError::InvalidInput(_))));
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // London to Paris is approximately 344 km
        let london = GeoPoint::new(51.5074, -0.1278);
        let paris = GeoPoint::new(48.8566, 2.3522);
        assert!(approx_eq(haversine_distance(&london, &paris), 343_560.0, 5000.0));
    }
}
