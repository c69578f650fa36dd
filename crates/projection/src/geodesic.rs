//! Ellipsoidal ground distances.

use geo::{point, GeodesicDistance};
use ogc_common::BoundingBox;

/// Geodesic distance in meters between two lon/lat positions (degrees).
///
/// Computed on the WGS84 ellipsoid with Karney's algorithm.
pub fn geodesic_length(from: (f64, f64), to: (f64, f64)) -> f64 {
    let a = point!(x: from.0, y: from.1);
    let b = point!(x: to.0, y: to.1);
    a.geodesic_distance(&b)
}

/// Ground width and height in meters of a geographic bounding box.
///
/// Width is measured east-west along the southern edge, height south-north
/// along the western edge.
pub fn ground_extent(bbox: &BoundingBox) -> (f64, f64) {
    let width = geodesic_length((bbox.min_x, bbox.min_y), (bbox.max_x, bbox.min_y));
    let height = geodesic_length((bbox.min_x, bbox.min_y), (bbox.min_x, bbox.max_y));
    (width, height)
}
