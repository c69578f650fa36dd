//! ArcGIS REST geometry queries.
//!
//! A query fragment carries the geometry as ESRI JSON together with its
//! spatial reference:
//!
//! ```text
//! geometryType = esriGeometryEnvelope
//! geometry     = {"xmin":..,"ymin":..,"xmax":..,"ymax":..,"spatialReference":{"wkid":4326}}
//! inSR         = 4326
//! ```

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

use ogc_common::bbox::BOX_ORD;
use ogc_common::{Geometry, OgcError, OgcResult};

/// ESRI geometry kinds accepted by the query endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EsriGeometryType {
    Point,
    Multipoint,
    Envelope,
    Polygon,
    Polyline,
}

impl EsriGeometryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EsriGeometryType::Point => "esriGeometryPoint",
            EsriGeometryType::Multipoint => "esriGeometryMultipoint",
            EsriGeometryType::Envelope => "esriGeometryEnvelope",
            EsriGeometryType::Polygon => "esriGeometryPolygon",
            EsriGeometryType::Polyline => "esriGeometryPolyline",
        }
    }
}

impl fmt::Display for EsriGeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded geometry filter, ready to be merged into a query payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EsriQuery {
    pub geometry_type: EsriGeometryType,
    /// ESRI JSON with an embedded `spatialReference`.
    pub geometry: String,
    pub in_sr: String,
}

impl EsriQuery {
    /// Payload entries in request order.
    pub fn into_params(self) -> Vec<(String, String)> {
        vec![
            ("geometryType".to_string(), self.geometry_type.as_str().to_string()),
            ("geometry".to_string(), self.geometry),
            ("inSR".to_string(), self.in_sr),
        ]
    }
}

/// Builder for a single geometry filter.
///
/// Each kind-specific method checks the geometry variant first and fails with
/// an `InputType` error naming the expected shape on mismatch.
#[derive(Debug, Clone, Copy)]
pub struct EsriGeomQuery<'a> {
    geometry: &'a Geometry,
    wkid: u32,
}

impl<'a> EsriGeomQuery<'a> {
    /// `wkid` is the well-known id of the reference the geometry is in.
    pub fn new(geometry: &'a Geometry, wkid: u32) -> Self {
        Self { geometry, wkid }
    }

    pub fn point(&self) -> OgcResult<EsriQuery> {
        match self.geometry {
            Geometry::Point(p) => Ok(self.payload(
                EsriGeometryType::Point,
                json!({"x": p.x(), "y": p.y()}),
            )),
            _ => Err(OgcError::input_type_with_shape("geometry", "Point", "(x, y)")),
        }
    }

    pub fn multipoint(&self) -> OgcResult<EsriQuery> {
        let points: Vec<[f64; 2]> = match self.geometry {
            Geometry::MultiPoint(mp) => mp.iter().map(|p| [p.x(), p.y()]).collect(),
            Geometry::Coordinates(coords) => coords.iter().map(|&(x, y)| [x, y]).collect(),
            _ => {
                return Err(OgcError::input_type_with_shape(
                    "geometry",
                    "list of tuples",
                    "[(x, y), ...]",
                ))
            }
        };
        Ok(self.payload(EsriGeometryType::Multipoint, json!({ "points": points })))
    }

    pub fn bbox(&self) -> OgcResult<EsriQuery> {
        match self.geometry {
            Geometry::BoundingBox(b) => Ok(self.payload(
                EsriGeometryType::Envelope,
                json!({"xmin": b.min_x, "ymin": b.min_y, "xmax": b.max_x, "ymax": b.max_y}),
            )),
            _ => Err(OgcError::input_type_with_shape("geometry", "tuple", BOX_ORD)),
        }
    }

    /// Only the exterior ring is sent; holes are ignored by this query mode.
    pub fn polygon(&self) -> OgcResult<EsriQuery> {
        match self.geometry {
            Geometry::Polygon(poly) => {
                let ring: Vec<[f64; 2]> = poly.exterior().0.iter().map(|c| [c.x, c.y]).collect();
                Ok(self.payload(EsriGeometryType::Polygon, json!({ "rings": [ring] })))
            }
            _ => Err(OgcError::input_type("geometry", "Polygon")),
        }
    }

    pub fn polyline(&self) -> OgcResult<EsriQuery> {
        match self.geometry {
            Geometry::LineString(line) => {
                let path: Vec<[f64; 2]> = line.0.iter().map(|c| [c.x, c.y]).collect();
                Ok(self.payload(EsriGeometryType::Polyline, json!({ "paths": [path] })))
            }
            _ => Err(OgcError::input_type("geometry", "LineString")),
        }
    }

    /// Pick the encoding from the geometry variant.
    pub fn auto(&self) -> OgcResult<EsriQuery> {
        match self.geometry {
            Geometry::Point(_) => self.point(),
            Geometry::MultiPoint(_) | Geometry::Coordinates(_) => self.multipoint(),
            Geometry::BoundingBox(_) => self.bbox(),
            Geometry::Polygon(_) => self.polygon(),
            Geometry::LineString(_) => self.polyline(),
            Geometry::MultiPolygon(_) | Geometry::MultiLineString(_) => Err(OgcError::input_type(
                "geometry",
                "Point, MultiPoint, Polygon, LineString, a bounding box or a list of coordinates",
            )),
        }
    }

    fn payload(&self, geometry_type: EsriGeometryType, mut geometry: Value) -> EsriQuery {
        geometry["spatialReference"] = json!({ "wkid": self.wkid });
        EsriQuery {
            geometry_type,
            geometry: geometry.to_string(),
            in_sr: self.wkid.to_string(),
        }
    }
}

/// Spatial predicate applied between the query geometry and the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialRelation {
    #[default]
    Intersects,
    Contains,
    Crosses,
    EnvelopeIntersects,
    IndexIntersects,
    Overlaps,
    Touches,
    Within,
    Relation,
}

impl SpatialRelation {
    pub const ALL: [SpatialRelation; 9] = [
        SpatialRelation::Intersects,
        SpatialRelation::Contains,
        SpatialRelation::Crosses,
        SpatialRelation::EnvelopeIntersects,
        SpatialRelation::IndexIntersects,
        SpatialRelation::Overlaps,
        SpatialRelation::Touches,
        SpatialRelation::Within,
        SpatialRelation::Relation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpatialRelation::Intersects => "esriSpatialRelIntersects",
            SpatialRelation::Contains => "esriSpatialRelContains",
            SpatialRelation::Crosses => "esriSpatialRelCrosses",
            SpatialRelation::EnvelopeIntersects => "esriSpatialRelEnvelopeIntersects",
            SpatialRelation::IndexIntersects => "esriSpatialRelIndexIntersects",
            SpatialRelation::Overlaps => "esriSpatialRelOverlaps",
            SpatialRelation::Touches => "esriSpatialRelTouches",
            SpatialRelation::Within => "esriSpatialRelWithin",
            SpatialRelation::Relation => "esriSpatialRelRelation",
        }
    }
}

impl FromStr for SpatialRelation {
    type Err = OgcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rel| rel.as_str() == s)
            .ok_or_else(|| {
                OgcError::input_value("spatial_relation", Self::ALL.iter().map(|r| r.as_str()))
            })
    }
}

impl fmt::Display for SpatialRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, point, polygon};
    use ogc_common::BoundingBox;

    fn geometry_json(query: &EsriQuery) -> Value {
        serde_json::from_str(&query.geometry).unwrap()
    }

    #[test]
    fn test_point() {
        let geom: Geometry = point!(x: -69.76, y: 45.44).into();
        let query = EsriGeomQuery::new(&geom, 4326).point().unwrap();
        assert_eq!(query.geometry_type, EsriGeometryType::Point);
        assert_eq!(query.in_sr, "4326");
        let value = geometry_json(&query);
        assert_eq!(value["x"], json!(-69.76));
        assert_eq!(value["y"], json!(45.44));
        assert_eq!(value["spatialReference"]["wkid"], json!(4326));
    }

    #[test]
    fn test_bbox() {
        let geom: Geometry = BoundingBox::new(-100.0, 30.0, -90.0, 40.0).into();
        let query = EsriGeomQuery::new(&geom, 4326).bbox().unwrap();
        let value = geometry_json(&query);
        assert_eq!(value["xmin"], json!(-100.0));
        assert_eq!(value["ymax"], json!(40.0));
        assert_eq!(query.geometry_type.as_str(), "esriGeometryEnvelope");
    }

    #[test]
    fn test_multipoint_from_coordinates() {
        let geom = Geometry::Coordinates(vec![(1.0, 2.0), (3.0, 4.0)]);
        let query = EsriGeomQuery::new(&geom, 3857).auto().unwrap();
        assert_eq!(query.geometry_type, EsriGeometryType::Multipoint);
        assert_eq!(geometry_json(&query)["points"], json!([[1.0, 2.0], [3.0, 4.0]]));
    }

    #[test]
    fn test_polygon_uses_exterior_ring() {
        let geom: Geometry = polygon!(
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 0.0),
            ],
            interiors: [[
                (x: 1.0, y: 1.0),
                (x: 2.0, y: 1.0),
                (x: 2.0, y: 2.0),
                (x: 1.0, y: 1.0),
            ]],
        )
        .into();
        let query = EsriGeomQuery::new(&geom, 4326).polygon().unwrap();
        let rings = &geometry_json(&query)["rings"];
        assert_eq!(rings.as_array().unwrap().len(), 1);
        assert_eq!(rings[0].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_polyline_single_path() {
        let geom: Geometry = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into();
        let query = EsriGeomQuery::new(&geom, 4326).polyline().unwrap();
        assert_eq!(geometry_json(&query)["paths"], json!([[[0.0, 0.0], [1.0, 1.0]]]));
    }

    #[test]
    fn test_type_mismatch_names_shape() {
        let geom: Geometry = point!(x: 1.0, y: 2.0).into();
        let err = EsriGeomQuery::new(&geom, 4326).bbox().unwrap_err();
        assert!(err.is_invalid_input());
        assert!(err.to_string().contains(BOX_ORD));

        let err = EsriGeomQuery::new(&geom, 4326).polygon().unwrap_err();
        assert!(err.to_string().contains("Polygon"));
    }

    #[test]
    fn test_params_order() {
        let geom: Geometry = point!(x: 1.0, y: 2.0).into();
        let params = EsriGeomQuery::new(&geom, 4326).point().unwrap().into_params();
        let keys: Vec<&str> = params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["geometryType", "geometry", "inSR"]);
    }

    #[test]
    fn test_spatial_relation_parse() {
        let rel: SpatialRelation = "esriSpatialRelWithin".parse().unwrap();
        assert_eq!(rel, SpatialRelation::Within);
        assert_eq!(SpatialRelation::default().as_str(), "esriSpatialRelIntersects");
    }

    #[test]
    fn test_spatial_relation_invalid_lists_options() {
        let err = "esriSpatialRelNearby".parse::<SpatialRelation>().unwrap_err();
        assert!(err.is_invalid_input());
        let msg = err.to_string();
        for rel in SpatialRelation::ALL {
            assert!(msg.contains(rel.as_str()), "missing {}", rel);
        }
    }
}
