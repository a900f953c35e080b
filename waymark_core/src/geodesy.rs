//! Geographic distance and coordinate conversion.
//!
//! Two tiers of accuracy coexist here:
//! - [`haversine_meters`] is the great-circle reference used by the
//!   visibility gate.
//! - The linear meter/geo-unit conversions and the equirectangular
//!   [`geo_to_local`] projection are small-distance approximations; their
//!   error grows past roughly 5 km and they must not be used for long
//!   ranges.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Earth radius used by the great-circle formula, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_384_000.0;

/// Meters per geographic unit for the fast linear conversions.
pub const METERS_PER_GEO_UNIT: f64 = 107_817.518_384_399_42;

/// A geographic fix: latitude/longitude in degrees, altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// A fix at altitude zero.
    pub fn at_sea_level(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, 0.0)
    }
}

/// Great-circle distance in meters between two lon/lat pairs (degrees).
///
/// Symmetric in its arguments and exactly zero for identical points.
pub fn haversine_meters(lon_a: f64, lat_a: f64, lon_b: f64, lat_b: f64) -> f64 {
    let d_lat = (lat_b - lat_a).to_radians();
    let d_lon = (lon_b - lon_a).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat_a.to_radians().cos() * lat_b.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Great-circle distance between two fixes. Altitude is ignored.
pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_meters(a.longitude, a.latitude, b.longitude, b.latitude)
}

/// Fast linear conversion from geographic units to meters.
pub fn geo_units_to_meters(units: f64) -> f64 {
    units * METERS_PER_GEO_UNIT
}

/// Fast linear conversion from meters to geographic units.
pub fn meters_to_geo_units(meters: f64) -> f64 {
    meters / METERS_PER_GEO_UNIT
}

/// Area in km² of the bounding rectangle spanned by two corner fixes.
///
/// Edge lengths come from two haversine calls and are multiplied; this is
/// a rectangle estimate, not a geodesic area.
pub fn approx_area_km2(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let width = haversine_meters(a.longitude, a.latitude, b.longitude, a.latitude);
    let height = haversine_meters(a.longitude, a.latitude, a.longitude, b.latitude);
    (width * height) / 1.0e6
}

/// Offsets a fix by meters east/north/up using the linear conversion.
///
/// Longitude degrees shrink with latitude, so the east offset is widened
/// by 1/cos(lat). Small-distance approximation only.
pub fn destination_point(origin: &GeoPoint, east_m: f64, north_m: f64, up_m: f64) -> GeoPoint {
    let latitude = origin.latitude + meters_to_geo_units(north_m);
    let longitude =
        origin.longitude + meters_to_geo_units(east_m) / origin.latitude.to_radians().cos();
    GeoPoint::new(latitude, longitude, origin.altitude + up_m)
}

/// Projects a target fix into the device-local render frame, in meters:
/// x east, y up (altitude difference), z south.
///
/// Equirectangular projection around the device fix; valid over
/// view-distance scales.
pub fn geo_to_local(device: &GeoPoint, target: &GeoPoint) -> Point3<f32> {
    let lat_diff = (target.latitude - device.latitude).to_radians();
    let lon_diff = (target.longitude - device.longitude).to_radians();

    let x = (lon_diff * EARTH_RADIUS_METERS * device.latitude.to_radians().cos()) as f32;
    let z = (-lat_diff * EARTH_RADIUS_METERS) as f32;
    let y = (target.altitude - device.altitude) as f32;

    Point3::new(x, y, z)
}
