//! WFS GetFeature payloads, CQL filters and DescribeFeatureType parsing.

use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt;
use std::str::FromStr;
use wkt::ToWkt;

use ogc_common::{BoundingBox, Geometry, OgcError, OgcResult, SpatialReference};

/// Supported WFS protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WfsVersion {
    V1_0_0,
    V1_1_0,
    #[default]
    V2_0_0,
}

impl WfsVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            WfsVersion::V1_0_0 => "1.0.0",
            WfsVersion::V1_1_0 => "1.1.0",
            WfsVersion::V2_0_0 => "2.0.0",
        }
    }
}

impl FromStr for WfsVersion {
    type Err = OgcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.0.0" => Ok(WfsVersion::V1_0_0),
            "1.1.0" => Ok(WfsVersion::V1_1_0),
            "2.0.0" => Ok(WfsVersion::V2_0_0),
            _ => Err(OgcError::input_value("version", ["1.0.0", "1.1.0", "2.0.0"])),
        }
    }
}

impl fmt::Display for WfsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CQL spatial predicates accepted by `getfeature_bygeom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialPredicate {
    Equals,
    Disjoint,
    #[default]
    Intersects,
    Touches,
    Crosses,
    Within,
    Contains,
    Overlaps,
    Relate,
    Beyond,
}

impl SpatialPredicate {
    pub const ALL: [SpatialPredicate; 10] = [
        SpatialPredicate::Equals,
        SpatialPredicate::Disjoint,
        SpatialPredicate::Intersects,
        SpatialPredicate::Touches,
        SpatialPredicate::Crosses,
        SpatialPredicate::Within,
        SpatialPredicate::Contains,
        SpatialPredicate::Overlaps,
        SpatialPredicate::Relate,
        SpatialPredicate::Beyond,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpatialPredicate::Equals => "EQUALS",
            SpatialPredicate::Disjoint => "DISJOINT",
            SpatialPredicate::Intersects => "INTERSECTS",
            SpatialPredicate::Touches => "TOUCHES",
            SpatialPredicate::Crosses => "CROSSES",
            SpatialPredicate::Within => "WITHIN",
            SpatialPredicate::Contains => "CONTAINS",
            SpatialPredicate::Overlaps => "OVERLAPS",
            SpatialPredicate::Relate => "RELATE",
            SpatialPredicate::Beyond => "BEYOND",
        }
    }
}

impl FromStr for SpatialPredicate {
    type Err = OgcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| OgcError::input_value("predicate", Self::ALL.iter().map(|p| p.as_str())))
    }
}

impl fmt::Display for SpatialPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters shared by every GetFeature request against one feature type.
#[derive(Debug, Clone)]
pub struct GetFeatureTemplate {
    pub version: WfsVersion,
    pub outformat: String,
    pub layer: String,
    /// Reference features are returned in (`srsName`).
    pub crs: SpatialReference,
}

impl GetFeatureTemplate {
    pub fn new(
        version: WfsVersion,
        outformat: impl Into<String>,
        layer: impl Into<String>,
        crs: SpatialReference,
    ) -> Self {
        Self {
            version,
            outformat: outformat.into(),
            layer: layer.into(),
            crs,
        }
    }

    /// True when coordinates in `crs` have to be sent as (lat, lon).
    pub fn swaps_axes(&self, crs: &SpatialReference, always_xy: bool) -> bool {
        self.version != WfsVersion::V1_0_0 && crs.is_geographic() && !always_xy
    }

    fn base_params(&self) -> Vec<(String, String)> {
        vec![
            ("service".to_string(), "wfs".to_string()),
            ("version".to_string(), self.version.as_str().to_string()),
            ("outputFormat".to_string(), self.outformat.clone()),
            ("request".to_string(), "GetFeature".to_string()),
            ("typeName".to_string(), self.layer.clone()),
            ("srsName".to_string(), self.crs.to_ogc_string()),
        ]
    }

    /// Payload for features within `bbox`; the box reference travels with it.
    pub fn bbox_params(
        &self,
        bbox: &BoundingBox,
        box_crs: &SpatialReference,
        always_xy: bool,
    ) -> Vec<(String, String)> {
        let bbox = if self.swaps_axes(box_crs, always_xy) {
            bbox.swapped_axes()
        } else {
            *bbox
        };
        let mut params = self.base_params();
        params.push((
            "bbox".to_string(),
            format!("{},{}", bbox.to_ogc_string(), box_crs),
        ));
        params
    }

    /// Payload for features matching a CQL expression.
    pub fn filter_params(&self, cql_filter: &str) -> Vec<(String, String)> {
        let mut params = self.base_params();
        params.push(("cql_filter".to_string(), cql_filter.to_string()));
        params
    }
}

/// `<field> IN ('a', 'b')` with single quotes in values doubled.
pub fn in_filter(field: &str, values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect();
    format!("{} IN ({})", field, quoted.join(", "))
}

/// `<PREDICATE>(<geom_name>, <wkt>)` for a polygonal geometry.
pub fn geometry_filter(
    predicate: SpatialPredicate,
    geom_name: &str,
    geometry: &Geometry,
    swap_axes: bool,
) -> OgcResult<String> {
    let wkt = match geometry {
        Geometry::Polygon(polygon) if swap_axes => swap_polygon(polygon).wkt_string(),
        Geometry::Polygon(polygon) => polygon.wkt_string(),
        Geometry::MultiPolygon(polygons) if swap_axes => {
            MultiPolygon::new(polygons.iter().map(swap_polygon).collect()).wkt_string()
        }
        Geometry::MultiPolygon(polygons) => polygons.wkt_string(),
        _ => return Err(OgcError::input_type("geometry", "Polygon or MultiPolygon")),
    };
    Ok(format!("{}({}, {})", predicate, geom_name, wkt))
}

fn swap_polygon(polygon: &Polygon<f64>) -> Polygon<f64> {
    let swap_ring = |ring: &LineString<f64>| {
        ring.coords()
            .map(|c| Coord { x: c.y, y: c.x })
            .collect::<LineString<f64>>()
    };
    Polygon::new(
        swap_ring(polygon.exterior()),
        polygon.interiors().iter().map(swap_ring).collect(),
    )
}

/// Query parameters for a DescribeFeatureType request.
pub fn describe_feature_type_params(version: WfsVersion, layer: &str) -> Vec<(String, String)> {
    vec![
        ("service".to_string(), "wfs".to_string()),
        ("version".to_string(), version.as_str().to_string()),
        ("request".to_string(), "DescribeFeatureType".to_string()),
        ("typeName".to_string(), layer.to_string()),
    ]
}

/// Property names declared by a DescribeFeatureType schema.
///
/// These are the `element` declarations nested inside type definitions; the
/// top-level element naming the feature type itself is skipped.
pub fn parse_feature_type_fields(xml: &str) -> OgcResult<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut fields = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth > 2 {
                    push_element_name(&e, &mut fields)?;
                }
            }
            Ok(Event::Empty(e)) => {
                if depth + 1 > 2 {
                    push_element_name(&e, &mut fields)?;
                }
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(OgcError::Decode(format!(
                    "XML parsing error at position {}: {:?}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(fields)
}

fn push_element_name(e: &BytesStart<'_>, fields: &mut Vec<String>) -> OgcResult<()> {
    if e.local_name().as_ref() != b"element" {
        return Ok(());
    }
    let name = e
        .try_get_attribute("name")
        .map_err(|e| OgcError::Decode(format!("feature type schema: {}", e)))?;
    if let Some(attr) = name {
        let value = attr
            .unescape_value()
            .map_err(|e| OgcError::Decode(format!("feature type schema: {}", e)))?;
        fields.push(value.into_owned());
    }
    Ok(())
}
