use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Mean Earth radius used by every distance computation.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const MAX_LATITUDE: f64 = 90.0;
const MAX_LONGITUDE: f64 = 180.0;

/// Latitude/longitude pair in decimal degrees.
///
/// Out-of-range and non-finite values are rejected at construction, so every
/// `GeoPoint` can be fed to [`distance_km`] without further checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = ValidationError;

    fn try_from(value: RawGeoPoint) -> Result<Self, Self::Error> {
        Self::new(value.latitude, value.longitude)
    }
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        validate_axis("latitude", latitude, MAX_LATITUDE)?;
        validate_axis("longitude", longitude, MAX_LONGITUDE)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub const fn latitude(self) -> f64 {
        self.latitude
    }

    pub const fn longitude(self) -> f64 {
        self.longitude
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_km(self, other: Self) -> f64 {
        distance_km(self, other)
    }
}

impl Display for GeoPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Haversine great-circle distance in kilometres.
///
/// Symmetric and zero for identical points. Absolute coordinate deltas are
/// used so `distance_km(a, b)` and `distance_km(b, a)` are bit-identical.
///
/// ```
/// use kisan_core::{distance_km, GeoPoint};
///
/// let delhi = GeoPoint::new(28.6139, 77.2090).unwrap();
/// let azadpur = GeoPoint::new(28.7041, 77.1025).unwrap();
/// let km = distance_km(delhi, azadpur);
/// assert!((km - 14.44).abs() < 0.05);
/// ```
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).abs().to_radians();
    let delta_lon = (b.longitude - a.longitude).abs().to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points.
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Distance between raw coordinates, validating both points first.
pub fn distance_between(
    latitude_a: f64,
    longitude_a: f64,
    latitude_b: f64,
    longitude_b: f64,
) -> Result<f64, ValidationError> {
    let a = GeoPoint::new(latitude_a, longitude_a)?;
    let b = GeoPoint::new(latitude_b, longitude_b)?;
    Ok(distance_km(a, b))
}

fn validate_axis(field: &'static str, value: f64, max: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (-max..=max).contains(&value) {
        return Ok(());
    }
    Err(ValidationError::InvalidCoordinate {
        field,
        value,
        min: -max,
        max,
    })
}
