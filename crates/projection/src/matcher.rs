//! Reprojection of geometries, bounding boxes and coordinate lists.

use geo::{Coord, MapCoords};
use ogc_common::{BoundingBox, Geometry, OgcResult, SpatialReference};

use crate::transform::Transformer;

/// Points sampled along each edge when reprojecting a bounding box.
const DENSIFY_POINTS: usize = 21;

/// Reproject `geom` from `source` to `target`.
///
/// When both references share a canonical definition the input is returned
/// as is. Geometries keep their topology (closed rings stay closed, interior
/// ring order is preserved), coordinate lists keep their order and length,
/// and bounding boxes are returned as the envelope of the reprojected
/// rectangle.
pub fn match_crs(
    geom: Geometry,
    source: &SpatialReference,
    target: &SpatialReference,
) -> OgcResult<Geometry> {
    if source == target {
        return Ok(geom);
    }

    let t = Transformer::new(source, target)?;
    let project = |c: Coord<f64>| t.transform_coord(c);

    match geom {
        Geometry::Point(g) => g.try_map_coords(project).map(Geometry::Point),
        Geometry::MultiPoint(g) => g.try_map_coords(project).map(Geometry::MultiPoint),
        Geometry::Polygon(g) => g.try_map_coords(project).map(Geometry::Polygon),
        Geometry::LineString(g) => g.try_map_coords(project).map(Geometry::LineString),
        Geometry::MultiPolygon(g) => g.try_map_coords(project).map(Geometry::MultiPolygon),
        Geometry::MultiLineString(g) => {
            g.try_map_coords(project).map(Geometry::MultiLineString)
        }
        Geometry::BoundingBox(bbox) => transform_bounds(&t, &bbox).map(Geometry::BoundingBox),
        Geometry::Coordinates(coords) => transform_coords(&t, &coords).map(Geometry::Coordinates),
    }
}

/// Reproject a bounding box, returning the envelope of the transformed rectangle.
pub fn match_bbox(
    bbox: &BoundingBox,
    source: &SpatialReference,
    target: &SpatialReference,
) -> OgcResult<BoundingBox> {
    bbox.validate()?;
    if source == target {
        return Ok(*bbox);
    }
    let t = Transformer::new(source, target)?;
    transform_bounds(&t, bbox)
}

/// Reproject a list of coordinates pointwise.
pub fn match_coords(
    coords: &[(f64, f64)],
    source: &SpatialReference,
    target: &SpatialReference,
) -> OgcResult<Vec<(f64, f64)>> {
    if source == target {
        return Ok(coords.to_vec());
    }
    let t = Transformer::new(source, target)?;
    transform_coords(&t, coords)
}

fn transform_coords(t: &Transformer, coords: &[(f64, f64)]) -> OgcResult<Vec<(f64, f64)>> {
    coords.iter().map(|&(x, y)| t.transform(x, y)).collect()
}

/// Envelope of the rectangle's image, sampling every edge rather than only
/// the corners so curved edges near singularities are covered.
fn transform_bounds(t: &Transformer, bbox: &BoundingBox) -> OgcResult<BoundingBox> {
    bbox.validate()?;

    let mut out = BoundingBox::new(
        f64::INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::NEG_INFINITY,
    );
    let steps = (DENSIFY_POINTS - 1) as f64;

    for i in 0..DENSIFY_POINTS {
        let f = i as f64 / steps;
        let x = bbox.min_x + f * bbox.width();
        let y = bbox.min_y + f * bbox.height();
        for (px, py) in [
            (x, bbox.min_y),
            (x, bbox.max_y),
            (bbox.min_x, y),
            (bbox.max_x, y),
        ] {
            let (tx, ty) = t.transform(px, py)?;
            out.min_x = out.min_x.min(tx);
            out.min_y = out.min_y.min(ty);
            out.max_x = out.max_x.max(tx);
            out.max_y = out.max_y.max(ty);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, polygon};

    fn epsg(code: u32) -> SpatialReference {
        SpatialReference::Epsg(code)
    }

    #[test]
    fn test_identity_returns_input() {
        let geom = Geometry::Coordinates(vec![(1.0, 2.0), (3.0, 4.0)]);
        let out = match_crs(geom.clone(), &epsg(4326), &epsg(4326)).unwrap();
        assert_eq!(out, geom);

        let bbox = BoundingBox::new(-7766049.665, 5691929.739, -7763049.665, 5696929.739);
        let out = match_crs(bbox.into(), &epsg(3857), &epsg(3857)).unwrap();
        assert_eq!(out, Geometry::BoundingBox(bbox));
    }

    #[test]
    fn test_point() {
        let geom = Geometry::Point(point!(x: -7766049.665, y: 5691929.739));
        match match_crs(geom, &epsg(3857), &epsg(4326)).unwrap() {
            Geometry::Point(p) => {
                assert!((p.x() - (-69.7636111130079)).abs() < 1e-5);
                assert!((p.y() - 45.44549114818127).abs() < 1e-5);
            }
            other => panic!("expected Point, got {}", other.kind()),
        }
    }

    #[test]
    fn test_bbox() {
        let bbox = BoundingBox::new(-7766049.665, 5691929.739, -7763049.665, 5696929.739);
        let out = match_bbox(&bbox, &epsg(3857), &epsg(4326)).unwrap();
        assert!((out.min_x - (-69.7636111130079)).abs() < 1e-5);
        assert!((out.min_y - 45.44549114818127).abs() < 1e-5);
        assert!((out.max_x - (-69.73666165448431)).abs() < 1e-5);
        assert!((out.max_y - 45.47699468552394).abs() < 1e-5);
    }

    #[test]
    fn test_coordinates_keep_order() {
        let coords = vec![(-7766049.665, 5691929.739), (0.0, 0.0)];
        let out = match_coords(&coords, &epsg(3857), &epsg(4326)).unwrap();
        assert_eq!(out.len(), 2);
        assert!((out[0].0 - (-69.7636111130079)).abs() < 1e-5);
        assert!(out[1].0.abs() < 1e-9 && out[1].1.abs() < 1e-9);
    }

    #[test]
    fn test_polygon_stays_closed() {
        let poly = polygon![
            (x: -100.0, y: 30.0),
            (x: -90.0, y: 30.0),
            (x: -90.0, y: 40.0),
            (x: -100.0, y: 40.0),
            (x: -100.0, y: 30.0),
        ];
        match match_crs(poly.into(), &epsg(4326), &epsg(3857)).unwrap() {
            Geometry::Polygon(p) => {
                let ring = &p.exterior().0;
                assert_eq!(ring.len(), 5);
                assert_eq!(ring.first(), ring.last());
            }
            other => panic!("expected Polygon, got {}", other.kind()),
        }
    }

    #[test]
    fn test_round_trip() {
        let coords = vec![(-100.0, 30.0), (-90.5, 39.25), (12.0, -45.0)];
        let there = match_coords(&coords, &epsg(4326), &epsg(3857)).unwrap();
        let back = match_coords(&there, &epsg(3857), &epsg(4326)).unwrap();
        for (a, b) in coords.iter().zip(&back) {
            assert!((a.0 - b.0).abs() < 1e-7 && (a.1 - b.1).abs() < 1e-7);
        }

        let geom = Geometry::Point(point!(x: -7766049.665, y: 5691929.739));
        let there = match_crs(geom, &epsg(3857), &epsg(4326)).unwrap();
        match match_crs(there, &epsg(4326), &epsg(3857)).unwrap() {
            Geometry::Point(p) => {
                assert!((p.x() - (-7766049.665)).abs() < 1e-3);
                assert!((p.y() - 5691929.739).abs() < 1e-3);
            }
            other => panic!("expected Point, got {}", other.kind()),
        }
    }

    #[test]
    fn test_unordered_bbox_rejected() {
        let bbox = BoundingBox::new(10.0, 0.0, 0.0, 10.0);
        assert!(match_bbox(&bbox, &epsg(4326), &epsg(3857)).is_err());
    }
}
