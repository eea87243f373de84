//! Great-circle distance on a spherical earth.

use civic_types::GeoPoint;

/// Earth radius in meters used for distance queries.
pub const EARTH_RADIUS_M: f64 = 6_378_100.0;

/// Haversine distance between two points, in meters.
pub fn distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Lat/lon box that contains every point within `radius_m` of `center`.
/// Used as an index prefilter; callers still check the exact distance.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

pub fn bounding_box(center: &GeoPoint, radius_m: f64) -> BoundingBox {
    let dlat = (radius_m / EARTH_RADIUS_M).to_degrees();
    let cos_lat = center.latitude.to_radians().cos();
    // Near the poles or across the antimeridian, fall back to the full longitude range.
    let (min_lon, max_lon) = if cos_lat < 1e-6 {
        (-180.0, 180.0)
    } else {
        let dlon = dlat / cos_lat;
        let (lo, hi) = (center.longitude - dlon, center.longitude + dlon);
        if lo < -180.0 || hi > 180.0 {
            (-180.0, 180.0)
        } else {
            (lo, hi)
        }
    };
    BoundingBox {
        min_lat: (center.latitude - dlat).max(-90.0),
        max_lat: (center.latitude + dlat).min(90.0),
        min_lon,
        max_lon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint::new(79.0882, 21.1458);
        assert!(distance_m(&p, &p) < 1e-9);
    }

    #[test]
    fn small_offsets_are_meter_accurate() {
        let a = GeoPoint::new(79.0882, 21.1458);
        // ~0.0003 degrees of latitude is about 33 m.
        let b = GeoPoint::new(79.0882, 21.1461);
        let d = distance_m(&a, &b);
        assert!((30.0..36.0).contains(&d), "got {}", d);
    }

    #[test]
    fn bounding_box_contains_radius() {
        let c = GeoPoint::new(79.0882, 21.1458);
        let bb = bounding_box(&c, 50.0);
        let north = GeoPoint::new(c.longitude, bb.max_lat);
        let east = GeoPoint::new(bb.max_lon, c.latitude);
        assert!(distance_m(&c, &north) >= 49.9);
        assert!(distance_m(&c, &east) >= 49.9);
    }
}
