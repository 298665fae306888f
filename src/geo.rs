//! Great-circle distance and bounding boxes over WGS84 coordinates.

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_PER_DEGREE_LAT: f64 = 111.32;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        distance_km(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Haversine distance in kilometres.
///
/// Never fails: non-finite input yields `NaN`, which callers must treat
/// as "not comparable".
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Box in degrees, used to narrow source-feature queries.
///
/// Longitudes are normalized to `[-180, 180)`. A box crossing the
/// antimeridian has `min_lon > max_lon` and covers both sides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Smallest box that contains the circle of `radius_km` around `center`.
    pub fn around(center: Coordinate, radius_km: f64) -> Self {
        let dlat = radius_km / KM_PER_DEGREE_LAT;
        let cos_lat = center.lat.to_radians().cos().abs().max(1e-6);
        let dlon = radius_km / (KM_PER_DEGREE_LAT * cos_lat);

        let (min_lon, max_lon) = if dlon >= 180.0 {
            (-180.0, 180.0)
        } else {
            (wrap_lon(center.lon - dlon), wrap_lon(center.lon + dlon))
        };

        Self {
            min_lat: (center.lat - dlat).max(-90.0),
            min_lon,
            max_lat: (center.lat + dlat).min(90.0),
            max_lon,
        }
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon > self.max_lon
    }

    pub fn contains(&self, c: &Coordinate) -> bool {
        if c.lat < self.min_lat || c.lat > self.max_lat {
            return false;
        }
        let lon = if self.min_lon <= -180.0 && self.max_lon >= 180.0 {
            c.lon
        } else {
            wrap_lon(c.lon)
        };
        if self.crosses_antimeridian() {
            lon >= self.min_lon || lon <= self.max_lon
        } else {
            lon >= self.min_lon && lon <= self.max_lon
        }
    }
}

fn wrap_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}
