//! Caller geometries accepted by the reprojection and query builders.

use geo_types::{LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};

use crate::bbox::BoundingBox;
use crate::error::OgcResult;

/// A geometry, bounding box or coordinate list.
///
/// The spatial reference is always supplied next to the geometry; nothing here
/// records which reference the coordinates are in.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    MultiPoint(MultiPoint<f64>),
    Polygon(Polygon<f64>),
    LineString(LineString<f64>),
    MultiPolygon(MultiPolygon<f64>),
    MultiLineString(MultiLineString<f64>),
    BoundingBox(BoundingBox),
    Coordinates(Vec<(f64, f64)>),
}

impl Geometry {
    /// Checked constructor for an untyped `(west, south, east, north)` slice.
    pub fn from_bounds(values: &[f64]) -> OgcResult<Self> {
        BoundingBox::from_slice(values).map(Geometry::BoundingBox)
    }

    /// Short name of the variant, used in error messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::Polygon(_) => "Polygon",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::BoundingBox(_) => "BoundingBox",
            Geometry::Coordinates(_) => "Coordinates",
        }
    }
}

impl From<BoundingBox> for Geometry {
    fn from(bbox: BoundingBox) -> Self {
        Geometry::BoundingBox(bbox)
    }
}

impl From<Point<f64>> for Geometry {
    fn from(point: Point<f64>) -> Self {
        Geometry::Point(point)
    }
}

impl From<MultiPoint<f64>> for Geometry {
    fn from(points: MultiPoint<f64>) -> Self {
        Geometry::MultiPoint(points)
    }
}

impl From<Polygon<f64>> for Geometry {
    fn from(polygon: Polygon<f64>) -> Self {
        Geometry::Polygon(polygon)
    }
}

impl From<LineString<f64>> for Geometry {
    fn from(line: LineString<f64>) -> Self {
        Geometry::LineString(line)
    }
}

impl From<MultiPolygon<f64>> for Geometry {
    fn from(polygons: MultiPolygon<f64>) -> Self {
        Geometry::MultiPolygon(polygons)
    }
}

impl From<MultiLineString<f64>> for Geometry {
    fn from(lines: MultiLineString<f64>) -> Self {
        Geometry::MultiLineString(lines)
    }
}

impl From<Vec<(f64, f64)>> for Geometry {
    fn from(coords: Vec<(f64, f64)>) -> Self {
        Geometry::Coordinates(coords)
    }
}
