//! Numeric helpers shared by the feature extractors and the enrichers.
//! All functions are total: empty input yields 0, never NaN.

/// Mean radius of the Earth in kilometers, used by the Haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation: sqrt(mean((x - mean)^2)).
///
/// Returns 0.0 for empty and single-element slices.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Great-circle distance between two coordinates in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Travel velocity in km/h given a distance and the elapsed milliseconds.
///
/// Returns 0.0 when no time has elapsed (or the clock went backwards),
/// so a duplicated location signal never reads as infinite speed.
pub fn velocity_kmh(distance_km: f64, elapsed_ms: i64) -> f64 {
    if elapsed_ms <= 0 {
        return 0.0;
    }
    let hours = elapsed_ms as f64 / 3_600_000.0;
    distance_km / hours
}
