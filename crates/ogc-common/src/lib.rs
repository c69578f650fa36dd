//! Common types shared by the projection, protocol and client crates.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod geometry;
pub mod ids;
pub mod tile;

pub use bbox::BoundingBox;
pub use crs::SpatialReference;
pub use error::{OgcError, OgcResult};
pub use geometry::Geometry;
pub use ids::{IdentifierBatch, ObjectId};
pub use tile::Tile;
