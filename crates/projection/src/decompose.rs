//! Bounding box decomposition for raster requests with a pixel budget.
//!
//! A box is sized in pixels from its geodesic ground extent and the target
//! resolution. When the total pixel count exceeds the budget the box is cut
//! into a grid of square-budget cells; the last cell in each direction takes
//! the remainder. Cell extents are proportional to their pixel counts, so
//! every cell keeps the same ground sampling distance.

use ogc_common::{BoundingBox, OgcError, OgcResult, SpatialReference, Tile};
use tracing::{debug, warn};

use crate::geodesic::ground_extent;
use crate::matcher::match_bbox;

/// Pixel budget most WMS services accept for a single GetMap request.
pub const DEFAULT_MAX_PIXELS: u64 = 8_000_000;

/// Largest grid a single decomposition may produce.
pub const MAX_TILES: u64 = 100_000;

/// Split `bbox` (given in `box_crs`) into tiles that each fit `max_px` pixels
/// at `resolution` meters per pixel.
///
/// Tiles are returned row by row from the south, west to east within a row.
/// Tile boxes are in `box_crs` and partition the input exactly: the outer
/// edges equal the input edges and neighbouring tiles share edges.
///
/// A box with no area is not decomposed; it comes back as a single `0_0`
/// tile with a zero pixel dimension. A grid of more than [`MAX_TILES`] cells
/// is rejected as an invalid `max_px`.
pub fn decompose(
    bbox: &BoundingBox,
    resolution: f64,
    box_crs: &SpatialReference,
    max_px: u64,
) -> OgcResult<Vec<Tile>> {
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(OgcError::input_value(
            "resolution",
            ["a positive number of meters per pixel"],
        ));
    }
    if max_px == 0 {
        return Err(OgcError::input_value("max_px", ["a positive pixel count"]));
    }
    bbox.validate()?;

    let geographic = match_bbox(bbox, box_crs, &SpatialReference::wgs84())?;
    let (width_m, height_m) = ground_extent(&geographic);
    let width = (width_m / resolution).ceil() as u64;
    let height = (height_m / resolution).ceil() as u64;

    if bbox.is_degenerate() || width == 0 || height == 0 {
        warn!(
            bbox = ?bbox.to_array(),
            width,
            height,
            "Bounding box has no ground area, returning it as a single tile"
        );
        let (width, height) = if bbox.width() <= 0.0 {
            (0, height)
        } else if bbox.height() <= 0.0 {
            (width, 0)
        } else {
            (width, height)
        };
        return Ok(vec![Tile::new(*bbox, 0, 0, width, height)]);
    }

    if width.saturating_mul(height) <= max_px {
        return Ok(vec![Tile::new(*bbox, 0, 0, width, height)]);
    }

    let n_px = isqrt(max_px);
    let cells = width.div_ceil(n_px).saturating_mul(height.div_ceil(n_px));
    if cells > MAX_TILES {
        return Err(OgcError::input_value(
            "max_px",
            [format!(
                "a pixel count that splits {}x{} pixels into at most {} tiles",
                width, height, MAX_TILES
            )],
        ));
    }
    let (cols, xs) = split_directional(bbox.min_x, bbox.max_x, width, n_px);
    let (rows, ys) = split_directional(bbox.min_y, bbox.max_y, height, n_px);

    debug!(
        width,
        height,
        n_px,
        columns = cols.len(),
        rows = rows.len(),
        "Decomposed bounding box"
    );

    let mut tiles = Vec::with_capacity(cells as usize);
    for (j, &tile_height) in rows.iter().enumerate() {
        for (i, &tile_width) in cols.iter().enumerate() {
            let cell = BoundingBox::new(xs[i], ys[j], xs[i + 1], ys[j + 1]);
            tiles.push(Tile::new(cell, i as u32, j as u32, tile_width, tile_height));
        }
    }
    Ok(tiles)
}

/// Chunk `px_tot` pixels into runs of `n_px` plus a non-empty remainder and
/// return the chunk sizes with the cumulative edge coordinates between `low`
/// and `high`.
fn split_directional(low: f64, high: f64, px_tot: u64, n_px: u64) -> (Vec<u64>, Vec<f64>) {
    let mut chunks = vec![n_px; (px_tot / n_px) as usize];
    let remainder = px_tot % n_px;
    if remainder > 0 {
        chunks.push(remainder);
    }

    let span = high - low;
    let mut edges = Vec::with_capacity(chunks.len() + 1);
    edges.push(low);
    let mut acc = 0u64;
    for &chunk in &chunks {
        acc += chunk;
        // pin the final edge so the grid closes exactly on the input box
        let edge = if acc == px_tot {
            high
        } else {
            low + span * acc as f64 / px_tot as f64
        };
        edges.push(edge);
    }
    (chunks, edges)
}

/// Integer square root (floor).
fn isqrt(n: u64) -> u64 {
    let squares_within = |r: u64| r.checked_mul(r).is_some_and(|sq| sq <= n);
    let mut r = (n as f64).sqrt() as u64;
    while !squares_within(r) {
        r -= 1;
    }
    while squares_within(r + 1) {
        r += 1;
    }
    r
}
