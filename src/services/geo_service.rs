use crate::models::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_PER_DEGREE_LAT: f64 = 111.0;

/// Great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(b.latitude - a.latitude);
    let dlon = to_rad(b.longitude - a.longitude);
    let h = (dlat / 2.0).sin().powi(2)
        + to_rad(a.latitude).cos() * to_rad(b.latitude).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_KM * c
}

/// `(min_lat, max_lat, min_lon, max_lon)` enclosing every point within `radius_km` of `center`.
///
/// The box is a superset: callers filter the candidates with [`haversine_km`]. Near the poles,
/// or when the box would cross the antimeridian, the longitude span widens to the full range.
pub fn bounding_box(center: GeoPoint, radius_km: f64) -> (f64, f64, f64, f64) {
    // Slightly generous so rounding never drops a point sitting on the circle.
    let lat_change = radius_km / KM_PER_DEGREE_LAT * 1.01;
    let min_lat = (center.latitude - lat_change).max(-90.0);
    let max_lat = (center.latitude + lat_change).min(90.0);

    let cos_lat = center.latitude.to_radians().cos().abs();
    let touches_pole = min_lat <= -90.0 || max_lat >= 90.0;
    if touches_pole || cos_lat < 1e-6 {
        return (min_lat, max_lat, -180.0, 180.0);
    }

    let lon_change = lat_change / cos_lat;
    let min_lon = center.longitude - lon_change;
    let max_lon = center.longitude + lon_change;
    if min_lon < -180.0 || max_lon > 180.0 {
        return (min_lat, max_lat, -180.0, 180.0);
    }

    (min_lat, max_lat, min_lon, max_lon)
}
