//! Raster sub-requests produced by bounding box decomposition.

use serde::{Deserialize, Serialize};

use crate::BoundingBox;

/// One cell of a decomposed bounding box.
///
/// Columns grow eastward and rows grow northward, both starting at zero, so
/// a 2x2 grid is labelled:
///
/// ```text
/// |-----|-----|
/// | 0_1 | 1_1 |
/// |-----|-----|
/// | 0_0 | 1_0 |
/// |-----|-----|
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// Extent in the reference of the decomposed box.
    pub bbox: BoundingBox,
    /// Grid position as "<col>_<row>".
    pub label: String,
    pub col: u32,
    pub row: u32,
    /// Raster width in pixels.
    pub width: u64,
    /// Raster height in pixels.
    pub height: u64,
}

impl Tile {
    pub fn new(bbox: BoundingBox, col: u32, row: u32, width: u64, height: u64) -> Self {
        Self {
            bbox,
            label: Self::label_for(col, row),
            col,
            row,
            width,
            height,
        }
    }

    /// Label for a grid position.
    pub fn label_for(col: u32, row: u32) -> String {
        format!("{}_{}", col, row)
    }

    /// Number of pixels requested for this tile.
    pub fn pixel_count(&self) -> u64 {
        self.width * self.height
    }
}
