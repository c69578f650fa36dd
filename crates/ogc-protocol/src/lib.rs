//! Service-native request encodings.
//!
//! Supports:
//! - ArcGIS REST geometry queries and spatial relations
//! - WMS 1.1.1 and 1.3.0 GetMap payloads and GetCapabilities CRS lists
//! - WFS GetFeature payloads, CQL filters and feature type schemas
//! - Error message extraction from XML and JSON service responses

pub mod esri;
pub mod exceptions;
pub mod wfs;
pub mod wms;

pub use esri::{EsriGeomQuery, EsriGeometryType, EsriQuery, SpatialRelation};
pub use exceptions::{extract_error_message, is_exception_report};
pub use wfs::{
    describe_feature_type_params, geometry_filter, in_filter, parse_feature_type_fields,
    GetFeatureTemplate, SpatialPredicate, WfsVersion,
};
pub use wms::{capabilities_params, parse_capability_crs, GetMapTemplate, WmsVersion};
