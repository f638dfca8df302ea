/// Default radius for location-constrained issue listings, in meters.
pub const DEFAULT_RADIUS_METERS: f64 = 5000.0;

/// Validate a (longitude, latitude) pair against geodetic bounds.
/// Returns false for non-finite values or out-of-range coordinates.
pub fn validate_coordinates(lng: f64, lat: f64) -> bool {
    lng.is_finite() && lat.is_finite() && (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat)
}

/// Haversine great-circle distance between two lat/lng points in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_coordinates() {
        assert!(validate_coordinates(-73.9851, 40.7589));
        assert!(validate_coordinates(0.0, 0.0));
        assert!(validate_coordinates(-180.0, -90.0));
        assert!(validate_coordinates(180.0, 90.0));
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(!validate_coordinates(-180.1, 0.0));
        assert!(!validate_coordinates(180.1, 0.0));
        assert!(!validate_coordinates(0.0, -90.1));
        assert!(!validate_coordinates(0.0, 90.1));
    }

    #[test]
    fn rejects_non_finite() {
        assert!(!validate_coordinates(f64::NAN, 0.0));
        assert!(!validate_coordinates(0.0, f64::INFINITY));
        assert!(!validate_coordinates(f64::NEG_INFINITY, f64::NAN));
    }

    #[test]
    fn haversine_times_square_to_central_park() {
        // Times Square to the middle of Central Park is ~3km
        let dist = haversine_km(40.7589, -73.9851, 40.7829, -73.9654);
        assert!((dist - 3.2).abs() < 0.5, "expected ~3.2km, got {dist}");
    }

    #[test]
    fn haversine_same_point_is_zero() {
        let dist = haversine_km(40.7589, -73.9851, 40.7589, -73.9851);
        assert!(dist < 0.001, "same point should be 0km, got {dist}");
    }
}
