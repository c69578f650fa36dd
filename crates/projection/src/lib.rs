//! Coordinate reference system transformations and bounding box tiling.
//!
//! Transforms run through the pure Rust `proj4rs` engine with EPSG
//! definitions resolved by [`ogc_common::SpatialReference`]. Ground distances
//! are geodesic (ellipsoidal), never planar.

pub mod decompose;
pub mod geodesic;
pub mod matcher;
pub mod transform;

pub use decompose::{decompose, DEFAULT_MAX_PIXELS, MAX_TILES};
pub use geodesic::{geodesic_length, ground_extent};
pub use matcher::{match_bbox, match_coords, match_crs};
pub use transform::Transformer;
