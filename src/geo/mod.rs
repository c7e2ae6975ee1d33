//! Duty geofence geometry.
//!
//! Everything here uses an equirectangular approximation around the point of
//! interest. It is not geodesically exact, but the error stays far below a
//! metre for the few-hundred-metre radii a checkpoint or patrol beat uses.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use thiserror::Error;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Metres spanned by one degree of latitude (≈111 km) on a sphere of
/// [`EARTH_RADIUS_M`]. Building and measuring share this scale so a
/// reconstructed radius always matches the one a polygon was built with.
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

pub const DEFAULT_SIDES: usize = 16;
pub const DEFAULT_MINIMUM_RADIUS_M: f64 = 50.0;

#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    #[error("radius must be a positive number of metres, got {0}")]
    InvalidRadius(f64),
    #[error("a polygon needs at least 3 sides, got {0}")]
    TooFewSides(usize),
    #[error("coordinate ({lat}, {lng}) is not a valid position")]
    InvalidCoordinate { lat: f64, lng: f64 },
    #[error("polygon has no vertices")]
    EmptyPolygon,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Finite, strictly between the poles, and within ±180° of longitude.
    pub fn is_valid_center(&self) -> bool {
        self.is_finite() && self.lat.abs() < 90.0 && self.lng.abs() <= 180.0
    }

    pub fn parse(text: &str) -> Option<Self> {
        let (lat, lng) = text.split_once(',')?;
        let point = Self::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?);
        point.is_finite().then_some(point)
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// Builds a `sides`-gon approximating a circle of `radius_m` metres around
/// `center`. Longitude offsets are stretched by `1 / cos(lat)` to account for
/// meridian convergence.
pub fn build_circle_polygon(center: LatLng, radius_m: f64, sides: usize) -> Result<Vec<LatLng>, GeoError> {
    if !center.is_valid_center() {
        return Err(GeoError::InvalidCoordinate { lat: center.lat, lng: center.lng });
    }
    if !radius_m.is_finite() || radius_m <= 0.0 {
        return Err(GeoError::InvalidRadius(radius_m));
    }
    if sides < 3 {
        return Err(GeoError::TooFewSides(sides));
    }

    let angular_deg = (radius_m / EARTH_RADIUS_M).to_degrees();
    let lng_scale = center.lat.to_radians().cos();

    let points = (0..sides)
        .map(|i| {
            let theta = TAU * i as f64 / sides as f64;
            LatLng::new(
                center.lat + angular_deg * theta.cos(),
                center.lng + angular_deg * theta.sin() / lng_scale,
            )
        })
        .collect();

    Ok(points)
}

pub fn centroid(polygon: &[LatLng]) -> Result<LatLng, GeoError> {
    if polygon.is_empty() {
        return Err(GeoError::EmptyPolygon);
    }

    let n = polygon.len() as f64;
    let (lat_sum, lng_sum) = polygon
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));

    Ok(LatLng::new(lat_sum / n, lng_sum / n))
}

/// Planar distance in metres between `point` and `origin`, with the
/// longitude component scaled by the cosine of the origin's latitude.
pub fn planar_distance_m(origin: LatLng, point: LatLng) -> f64 {
    let dy = (point.lat - origin.lat) * METERS_PER_DEGREE;
    let dx = (point.lng - origin.lng) * METERS_PER_DEGREE * origin.lat.to_radians().cos();
    dx.hypot(dy)
}

/// Radius of the smallest circle around `center` that encloses every vertex,
/// never less than `minimum_m`.
pub fn effective_radius(polygon: &[LatLng], center: LatLng, minimum_m: f64) -> f64 {
    polygon
        .iter()
        .map(|p| planar_distance_m(center, *p))
        .fold(minimum_m, f64::max)
}

/// Center and display radius for a stored polygon, or `None` when there is
/// nothing to draw.
pub fn display_circle(polygon: &[LatLng], minimum_m: f64) -> Option<(LatLng, f64)> {
    let center = centroid(polygon).ok()?;
    Some((center, effective_radius(polygon, center, minimum_m)))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    pub fn contains(&self, point: LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }
}

pub fn bounds(points: &[LatLng]) -> Option<Bounds> {
    let mut iter = points.iter().filter(|p| p.is_finite());
    let first = *iter.next()?;

    let (south_west, north_east) = iter.fold((first, first), |(sw, ne), p| {
        (
            LatLng::new(sw.lat.min(p.lat), sw.lng.min(p.lng)),
            LatLng::new(ne.lat.max(p.lat), ne.lng.max(p.lng)),
        )
    });

    Some(Bounds { south_west, north_east })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn haversine_m(a: LatLng, b: LatLng) -> f64 {
        let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (b.lng - a.lng).to_radians();
        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * h.sqrt().asin()
    }

    #[test]
    fn test_circle_has_requested_sides() {
        let polygon = build_circle_polygon(LatLng::new(15.30, 74.12), 200.0, DEFAULT_SIDES).unwrap();
        assert_eq!(polygon.len(), 16);

        let pentagon = build_circle_polygon(LatLng::new(15.30, 74.12), 200.0, 5).unwrap();
        assert_eq!(pentagon.len(), 5);
    }

    #[test]
    fn test_circle_vertices_sit_on_radius() {
        for lat in [-80.0, -45.5, 0.0, 15.30, 60.0, 80.0] {
            for radius in [50.0, 200.0, 500.0, 1000.0] {
                let center = LatLng::new(lat, 74.12);
                let polygon = build_circle_polygon(center, radius, 16).unwrap();

                for vertex in &polygon {
                    let planar = planar_distance_m(center, *vertex);
                    assert!((planar - radius).abs() / radius < 1e-9, "planar {} vs {}", planar, radius);

                    let great_circle = haversine_m(center, *vertex);
                    assert!(
                        (great_circle - radius).abs() / radius < 0.01,
                        "lat {} radius {}: great-circle distance {}",
                        lat, radius, great_circle
                    );
                }
            }
        }
    }

    #[test]
    fn test_first_vertex_points_north() {
        let center = LatLng::new(15.30, 74.12);
        let polygon = build_circle_polygon(center, 200.0, 16).unwrap();
        assert!(polygon[0].lat > center.lat);
        assert!((polygon[0].lng - center.lng).abs() < 1e-12);
    }

    #[test]
    fn test_circle_rejects_bad_input() {
        let center = LatLng::new(15.30, 74.12);
        assert_eq!(build_circle_polygon(center, 0.0, 16), Err(GeoError::InvalidRadius(0.0)));
        assert_eq!(build_circle_polygon(center, -5.0, 16), Err(GeoError::InvalidRadius(-5.0)));
        assert_eq!(build_circle_polygon(center, 100.0, 2), Err(GeoError::TooFewSides(2)));
        assert!(matches!(
            build_circle_polygon(LatLng::new(f64::NAN, 74.12), 100.0, 16),
            Err(GeoError::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_circle_rejects_out_of_range_center() {
        for center in [
            LatLng::new(90.0, 74.12),
            LatLng::new(-91.5, 74.12),
            LatLng::new(15.30, 180.5),
            LatLng::new(15.30, -200.0),
        ] {
            assert_eq!(
                build_circle_polygon(center, 100.0, 16),
                Err(GeoError::InvalidCoordinate { lat: center.lat, lng: center.lng })
            );
        }
        assert!(build_circle_polygon(LatLng::new(-89.9, 180.0), 100.0, 16).is_ok());
    }

    #[test]
    fn test_centroid_of_square() {
        let square = vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 2.0),
            LatLng::new(2.0, 2.0),
            LatLng::new(2.0, 0.0),
        ];
        assert_eq!(centroid(&square).unwrap(), LatLng::new(1.0, 1.0));
        assert_eq!(centroid(&[]), Err(GeoError::EmptyPolygon));
    }

    #[test]
    fn test_effective_radius_covers_original_circle() {
        for lat in [-80.0, -30.0, 0.0, 15.30, 45.0, 80.0] {
            for radius in [50.0, 120.0, 200.0, 750.0, 1000.0] {
                for sides in [3, 8, 16, 32] {
                    let center = LatLng::new(lat, 74.12);
                    let polygon = build_circle_polygon(center, radius, sides).unwrap();
                    let reconstructed = effective_radius(&polygon, center, DEFAULT_MINIMUM_RADIUS_M);

                    assert!(reconstructed >= radius - 1e-6, "{} < {}", reconstructed, radius);
                    assert!(reconstructed <= radius * 1.001, "{} too far above {}", reconstructed, radius);
                }
            }
        }
    }

    #[test]
    fn test_effective_radius_from_own_centroid() {
        let center = LatLng::new(15.30, 74.12);
        let polygon = build_circle_polygon(center, 200.0, 16).unwrap();
        let derived = centroid(&polygon).unwrap();

        assert!(planar_distance_m(center, derived) < 1e-6);
        assert!((effective_radius(&polygon, derived, 50.0) - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_effective_radius_floor() {
        let tiny = build_circle_polygon(LatLng::new(15.30, 74.12), 10.0, 16).unwrap();
        let center = centroid(&tiny).unwrap();
        assert_eq!(effective_radius(&tiny, center, 50.0), 50.0);

        let point = [LatLng::new(15.30, 74.12)];
        assert_eq!(effective_radius(&point, point[0], 50.0), 50.0);
    }

    #[test]
    fn test_effective_radius_irregular_polygon() {
        let center = LatLng::new(0.0, 0.0);
        let polygon = vec![
            LatLng::new(0.001, 0.0),
            LatLng::new(0.0, 0.003),
            LatLng::new(-0.002, 0.0),
        ];
        let expected = 0.003 * METERS_PER_DEGREE;
        assert!((effective_radius(&polygon, center, 50.0) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_display_circle() {
        assert!(display_circle(&[], 50.0).is_none());

        let center = LatLng::new(15.30, 74.12);
        let polygon = build_circle_polygon(center, 300.0, 16).unwrap();
        let (derived, radius) = display_circle(&polygon, 50.0).unwrap();
        assert!(planar_distance_m(center, derived) < 1e-6);
        assert!((radius - 300.0).abs() < 1e-3);
    }

    #[test]
    fn test_bounds() {
        assert!(bounds(&[]).is_none());

        let points = vec![
            LatLng::new(15.49, 73.82),
            LatLng::new(15.27, 73.95),
            LatLng::new(15.39, 73.81),
        ];
        let b = bounds(&points).unwrap();
        assert_eq!(b.south_west, LatLng::new(15.27, 73.81));
        assert_eq!(b.north_east, LatLng::new(15.49, 73.95));
        assert!(points.iter().all(|p| b.contains(*p)));
        assert!(!b.contains(LatLng::new(16.0, 74.0)));
    }

    #[test]
    fn test_parse_location_text() {
        assert_eq!(LatLng::parse("15.2993, 74.1240"), Some(LatLng::new(15.2993, 74.1240)));
        assert_eq!(LatLng::parse(" 15.5 ,73.8 "), Some(LatLng::new(15.5, 73.8)));
        assert_eq!(LatLng::parse("Beach Road"), None);
        assert_eq!(LatLng::parse("15.5, abc"), None);
    }
}
