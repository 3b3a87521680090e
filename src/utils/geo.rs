// src/utils/geo.rs
//
// Distance, fare and duration estimation. Pure functions; callers are
// responsible for coordinate validity.

use crate::models::geo::Coordinate;
use crate::models::order::Tariff;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Assumed average speed, km per minute (30 km/h).
const AVG_SPEED_KM_PER_MIN: f64 = 0.5;

/// Minimum dispatch/boarding time in minutes.
const MIN_DURATION_MIN: i64 = 5;

/// Great-circle distance between two points using the haversine formula.
pub fn distance_km(from: Coordinate, to: Coordinate) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Fare in whole currency units. The metered part truncates toward zero, and
/// the fare never drops below the tariff's base price.
pub fn estimate_price(distance_km: f64, tariff: Tariff) -> i64 {
    let base = tariff.base_price();
    let metered = base + (distance_km * tariff.per_km_rate() as f64) as i64;
    metered.max(base)
}

/// Ride duration estimate in minutes, floored at the dispatch minimum.
pub fn estimate_duration_min(distance_km: f64) -> i64 {
    ((distance_km / AVG_SPEED_KM_PER_MIN) as i64).max(MIN_DURATION_MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_is_symmetric() {
        let a = Coordinate::new(58.1387, 52.6584);
        let b = Coordinate::new(58.1400, 52.6700);
        assert_eq!(distance_km(a, b), distance_km(b, a));
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let a = Coordinate::new(58.1387, 52.6584);
        assert_eq!(distance_km(a, a), 0.0);
    }

    #[test]
    fn test_distance_across_town() {
        let from = Coordinate::new(58.1387, 52.6584);
        let to = Coordinate::new(58.1400, 52.6700);
        let d = distance_km(from, to);
        // A short hop inside the city center, well under a kilometer.
        assert!(d > 0.5 && d < 1.0, "unexpected distance {}", d);
    }

    #[test]
    fn test_price_never_below_base() {
        for tariff in [Tariff::Economy, Tariff::Comfort, Tariff::Business] {
            assert_eq!(estimate_price(0.0, tariff), tariff.base_price());
            assert!(estimate_price(0.01, tariff) >= tariff.base_price());
            assert!(estimate_price(12.7, tariff) >= tariff.base_price());
        }
    }

    #[test]
    fn test_price_truncates_metered_part() {
        // 3.9 km * 25 = 97.5, truncated to 97.
        assert_eq!(estimate_price(3.9, Tariff::Economy), 197);
        assert_eq!(estimate_price(10.0, Tariff::Business), 250 + 500);
    }

    #[test]
    fn test_city_center_fare() {
        let from = Coordinate::new(58.1387, 52.6584);
        let to = Coordinate::new(58.1400, 52.6700);
        let d = distance_km(from, to);
        let price = estimate_price(d, Tariff::Economy);
        assert_eq!(price, 100 + (d * 25.0) as i64);
        assert!(price >= 100);
    }

    #[test]
    fn test_duration_floor() {
        assert_eq!(estimate_duration_min(0.0), 5);
        assert_eq!(estimate_duration_min(1.0), 5);
        assert_eq!(estimate_duration_min(10.0), 20);
    }
}
