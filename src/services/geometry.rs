//! Field polygon geometry: validation, geodesic area and mean coordinate.
//!
//! All polygon input uses (longitude, latitude) order in decimal degrees
//! (WGS84), for every entry point.

use geo::{Area, GeodesicArea, LineString, Polygon};

use crate::errors::AppError;

/// Rings enclosing less than this (square metres) are treated as degenerate.
const MIN_AREA_SQ_M: f64 = 1e-3;

/// A validated field boundary ring.
///
/// The ring is stored open and counter-clockwise: a trailing point equal to
/// the first one is dropped on construction, and clockwise input is reversed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPolygon {
    points: Vec<(f64, f64)>,
}

/// A location used as the weather lookup key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    /// Render as the `q` parameter of the weather service: `"lat,lon"`.
    pub fn to_query(&self) -> String {
        format!("{},{}", self.lat, self.lon)
    }
}

impl FieldPolygon {
    /// Build a polygon from (longitude, latitude) pairs.
    ///
    /// Fails with `AppError::Geometry` for out-of-range coordinates, fewer than
    /// three distinct points, or a ring that encloses no area.
    pub fn new(coordinates: &[[f64; 2]]) -> Result<Self, AppError> {
        let mut points: Vec<(f64, f64)> = Vec::with_capacity(coordinates.len());
        for (i, &[lon, lat]) in coordinates.iter().enumerate() {
            if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
                return Err(AppError::Geometry(format!(
                    "point {} has longitude {} outside [-180, 180]",
                    i, lon
                )));
            }
            if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
                return Err(AppError::Geometry(format!(
                    "point {} has latitude {} outside [-90, 90]",
                    i, lat
                )));
            }
            points.push((lon, lat));
        }

        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }

        let mut distinct: Vec<(f64, f64)> = Vec::with_capacity(points.len());
        for p in &points {
            if !distinct.contains(p) {
                distinct.push(*p);
            }
        }
        if distinct.len() < 3 {
            return Err(AppError::Geometry(format!(
                "a field boundary needs at least 3 distinct points, got {}",
                distinct.len()
            )));
        }

        // geodesic area of a clockwise ring is the rest of the globe
        if ring_polygon(&points).signed_area() < 0.0 {
            points.reverse();
        }

        let polygon = Self { points };
        if polygon.area_sq_m() < MIN_AREA_SQ_M {
            return Err(AppError::Geometry(
                "field boundary encloses zero area".to_string(),
            ));
        }
        Ok(polygon)
    }

    /// Ring points in (longitude, latitude) order, without the closing point.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Closed ring as `[[lon, lat], ...]`, first point repeated at the end.
    pub fn closed_ring(&self) -> Vec<[f64; 2]> {
        let mut ring: Vec<[f64; 2]> = self.points.iter().map(|&(lon, lat)| [lon, lat]).collect();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        ring
    }

    fn area_sq_m(&self) -> f64 {
        ring_polygon(&self.points).geodesic_area_unsigned()
    }
}

fn ring_polygon(points: &[(f64, f64)]) -> Polygon<f64> {
    Polygon::new(LineString::from(points.to_vec()), vec![])
}

/// Geodesic area of the field on the WGS84 ellipsoid, in square metres.
pub fn compute_area(polygon: &FieldPolygon) -> f64 {
    polygon.area_sq_m()
}

/// Arithmetic mean of the longitudes and of the latitudes of `points`.
///
/// This is not a true centroid; it is the location the weather service is
/// queried with.
pub fn mean_coordinate(points: &[(f64, f64)]) -> Result<LatLon, AppError> {
    if points.is_empty() {
        return Err(AppError::EmptyInput(
            "cannot take the mean coordinate of zero points".to_string(),
        ));
    }
    let n = points.len() as f64;
    let (lon_sum, lat_sum) = points
        .iter()
        .fold((0.0, 0.0), |(lo, la), &(lon, lat)| (lo + lon, la + lat));
    Ok(LatLon {
        lat: lat_sum / n,
        lon: lon_sum / n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<[f64; 2]> {
        vec![[68.10, 26.90], [68.11, 26.90], [68.11, 26.91], [68.10, 26.91]]
    }

    #[test]
    fn test_area_positive_for_field() {
        let polygon = FieldPolygon::new(&square()).unwrap();
        let area = compute_area(&polygon);
        // ~0.01° x 0.01° near 27°N is roughly 1.1 km x 1.0 km
        assert!(area > 1.0e6 && area < 1.2e6, "unexpected area {}", area);
    }

    #[test]
    fn test_area_invariant_under_rotation() {
        let base = square();
        let expected = compute_area(&FieldPolygon::new(&base).unwrap());
        for shift in 1..base.len() {
            let mut rotated = base.clone();
            rotated.rotate_left(shift);
            let area = compute_area(&FieldPolygon::new(&rotated).unwrap());
            assert!(
                (area - expected).abs() < 1e-6 * expected,
                "rotation {} changed area: {} vs {}",
                shift,
                area,
                expected
            );
        }
    }

    #[test]
    fn test_area_ignores_winding_and_explicit_closure() {
        let mut ring = square();
        let expected = compute_area(&FieldPolygon::new(&ring).unwrap());
        ring.reverse();
        let reversed = compute_area(&FieldPolygon::new(&ring).unwrap());
        ring.push(ring[0]);
        let closed = compute_area(&FieldPolygon::new(&ring).unwrap());
        assert!((reversed - expected).abs() < 1e-6 * expected);
        assert!((closed - expected).abs() < 1e-6 * expected);
    }

    #[test]
    fn test_clockwise_ring_stored_counter_clockwise() {
        let mut ring = square();
        ring.reverse();
        let polygon = FieldPolygon::new(&ring).unwrap();
        let area = compute_area(&polygon);
        // 0.01 x 0.01 degrees near 26.9N, roughly 1.1 km2
        assert!(area > 1.0e6 && area < 1.2e6, "area was {}", area);

        let closed = polygon.closed_ring();
        let shoelace: f64 = closed
            .windows(2)
            .map(|w| w[0][0] * w[1][1] - w[1][0] * w[0][1])
            .sum();
        assert!(shoelace > 0.0);
        assert_eq!(closed.first(), closed.last());
    }

    #[test]
    fn test_too_few_points_rejected() {
        let err = FieldPolygon::new(&[[0.0, 0.0], [1.0, 1.0]]).unwrap_err();
        assert!(matches!(err, AppError::Geometry(_)));
    }

    #[test]
    fn test_repeated_points_do_not_count_as_distinct() {
        let err = FieldPolygon::new(&[[0.0, 0.0], [1.0, 1.0], [0.0, 0.0], [1.0, 1.0]]).unwrap_err();
        assert!(matches!(err, AppError::Geometry(_)));
    }

    #[test]
    fn test_collinear_ring_rejected_as_zero_area() {
        let err = FieldPolygon::new(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]).unwrap_err();
        assert!(matches!(err, AppError::Geometry(_)));
    }

    #[test]
    fn test_out_of_range_latitude_rejected() {
        let err = FieldPolygon::new(&[[0.0, 0.0], [1.0, 95.0], [1.0, 0.0]]).unwrap_err();
        assert!(matches!(err, AppError::Geometry(_)));
    }

    #[test]
    fn test_mean_coordinate_of_square() {
        let points = [(0.0, 0.0), (0.0, 2.0), (2.0, 2.0), (2.0, 0.0)];
        let loc = mean_coordinate(&points).unwrap();
        assert_eq!(loc, LatLon { lat: 1.0, lon: 1.0 });
    }

    #[test]
    fn test_mean_coordinate_is_not_centroid() {
        // Extra point on one edge pulls the mean, a true centroid would not move.
        let points = [(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)];
        let loc = mean_coordinate(&points).unwrap();
        assert!((loc.lat - 0.8).abs() < 1e-12);
        assert!((loc.lon - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_coordinate_empty() {
        assert!(matches!(
            mean_coordinate(&[]).unwrap_err(),
            AppError::EmptyInput(_)
        ));
    }

    #[test]
    fn test_query_string_is_lat_first() {
        let loc = LatLon { lat: 26.9, lon: 68.1 };
        assert_eq!(loc.to_query(), "26.9,68.1");
    }

    #[test]
    fn test_closed_ring_repeats_first_point() {
        let polygon = FieldPolygon::new(&square()).unwrap();
        let ring = polygon.closed_ring();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
    }
}
