//! Geographic location value type and Haversine distance.
//!
//! Extracted from the store's query path so it can be unit-tested in
//! isolation and reused if a spatial index is ever added (spec §9).

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Earth radius in kilometers, as used by `storage.py`.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Immutable geographic coordinate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: Option<f64>,
    pub altitude_meters: Option<f64>,
}

impl GeoLocation {
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy_meters: Option<f64>,
        altitude_meters: Option<f64>,
    ) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::LongitudeOutOfRange(longitude));
        }
        if let Some(acc) = accuracy_meters {
            if acc < 0.0 {
                return Err(ValidationError::NegativeAccuracy(acc));
            }
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy_meters,
            altitude_meters,
        })
    }

    /// Great-circle distance to `other`, in kilometers.
    pub fn distance_km(&self, other: &GeoLocation) -> f64 {
        haversine_km(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// Haversine great-circle distance between two points given in degrees.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());
    let (lat2, lon2) = (lat2.to_radians(), lon2.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, lon: f64) -> GeoLocation {
        GeoLocation::new(lat, lon, None, None).unwrap()
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        assert!(matches!(
            GeoLocation::new(91.0, 0.0, None, None),
            Err(ValidationError::LatitudeOutOfRange(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        assert!(matches!(
            GeoLocation::new(0.0, 181.0, None, None),
            Err(ValidationError::LongitudeOutOfRange(_))
        ));
    }

    #[test]
    fn rejects_negative_accuracy() {
        assert!(matches!(
            GeoLocation::new(0.0, 0.0, Some(-1.0), None),
            Err(ValidationError::NegativeAccuracy(_))
        ));
    }

    #[test]
    fn distance_is_zero_for_identical_points() {
        let a = loc(41.0082, 28.9784);
        assert_eq!(a.distance_km(&a), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = loc(41.0082, 28.9784);
        let b = loc(52.5200, 13.4050);
        assert!((a.distance_km(&b) - b.distance_km(&a)).abs() < 1e-9);
    }

    #[test]
    fn distance_istanbul_to_berlin_is_roughly_correct() {
        let istanbul = loc(41.0082, 28.9784);
        let berlin = loc(52.5200, 13.4050);
        let d = istanbul.distance_km(&berlin);
        // Known great-circle distance is ~1730 km; allow generous tolerance.
        assert!((1650.0..1800.0).contains(&d), "distance was {d}");
    }

    #[test]
    fn nearby_points_within_small_radius() {
        let a = loc(41.0082, 28.9784);
        let b = loc(41.0090, 28.9790);
        assert!(a.distance_km(&b) < 1.0);
    }
}
