//! Great-circle distance helpers.

/// Mean Earth radius in statute miles
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// Miles spanned by one degree of latitude on a sphere of [`EARTH_RADIUS_MILES`]
pub const MILES_PER_DEGREE_LATITUDE: f64 = EARTH_RADIUS_MILES * std::f64::consts::PI / 180.0;

/// Haversine distance in miles between two points given in decimal degrees.
///
/// Inputs are not range-checked. The haversine term is clamped to `[0, 1]`
/// so floating-point drift on antipodal or identical points never yields NaN.
pub fn distance_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_MILES * c
}

/// Half-width in degrees of the latitude band that contains every point
/// within `radius_miles`, padded slightly for rounding
pub fn latitude_band_degrees(radius_miles: f64) -> f64 {
    radius_miles.max(0.0) / MILES_PER_DEGREE_LATITUDE + 1e-9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_zero() {
        assert_eq!(distance_miles(40.7128, -74.0060, 40.7128, -74.0060), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let ab = distance_miles(40.7128, -74.0060, 34.0522, -118.2437);
        let ba = distance_miles(34.0522, -118.2437, 40.7128, -74.0060);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_known_distance() {
        // New York to Los Angeles is roughly 2445 miles
        let d = distance_miles(40.7128, -74.0060, 34.0522, -118.2437);
        assert!((d - 2445.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn test_one_degree_latitude() {
        let d = distance_miles(0.0, 0.0, 1.0, 0.0);
        assert!((d - MILES_PER_DEGREE_LATITUDE).abs() < 1e-6);
    }

    #[test]
    fn test_antipodal_not_nan() {
        let d = distance_miles(0.0, 0.0, 0.0, 180.0);
        assert!(d.is_finite());
        assert!((d - EARTH_RADIUS_MILES * std::f64::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn test_band_covers_radius() {
        let band = latitude_band_degrees(25.0);
        let edge = distance_miles(45.0, -100.0, 45.0 + band, -100.0);
        assert!(edge >= 25.0);
    }
}
