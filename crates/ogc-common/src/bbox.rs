//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

use crate::error::{OgcError, OgcResult};

/// Order in which bounding box components are given everywhere in this workspace.
pub const BOX_ORD: &str = "(west, south, east, north)";

/// A geographic or projected bounding box.
///
/// Components are `(west, south, east, north)`. For geographic references the
/// values are degrees, for projected references they are in the reference's
/// linear unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Build a validated box from an untyped slice of exactly four numbers.
    pub fn from_slice(values: &[f64]) -> OgcResult<Self> {
        match values {
            [west, south, east, north] => {
                let bbox = Self::new(*west, *south, *east, *north);
                bbox.validate()?;
                Ok(bbox)
            }
            _ => Err(OgcError::input_type_with_shape("bbox", "tuple", BOX_ORD)),
        }
    }

    /// Parse an OGC BBOX parameter string: "minx,miny,maxx,maxy"
    pub fn from_ogc_string(s: &str) -> OgcResult<Self> {
        let values = s
            .split(',')
            .map(|part| {
                part.parse::<f64>()
                    .map_err(|_| OgcError::InvalidBbox(format!("invalid number in BBOX: {}", part)))
            })
            .collect::<OgcResult<Vec<f64>>>()?;

        if values.len() != 4 {
            return Err(OgcError::InvalidBbox(format!(
                "{}. Expected 'minx,miny,maxx,maxy'",
                s
            )));
        }
        Self::from_slice(&values)
    }

    /// Check that all components are finite and ordered.
    pub fn validate(&self) -> OgcResult<()> {
        if ![self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(OgcError::InvalidBbox(format!(
                "non-finite component in {:?}",
                self.to_array()
            )));
        }
        if self.min_x > self.max_x || self.min_y > self.max_y {
            return Err(OgcError::InvalidBbox(format!(
                "{:?} is not ordered as {}",
                self.to_array(),
                BOX_ORD
            )));
        }
        Ok(())
    }

    /// Components as `[west, south, east, north]`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    /// The same box with x and y swapped, for services expecting lat/lon order.
    pub fn swapped_axes(&self) -> Self {
        Self::new(self.min_y, self.min_x, self.max_y, self.max_x)
    }

    /// Width of the bounding box in coordinate units.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box in coordinate units.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when the box has no area.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Comma separated form used in query strings.
    pub fn to_ogc_string(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}
