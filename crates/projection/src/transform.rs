//! Point transforms between two spatial references.

use geo::Coord;
use ogc_common::{OgcError, OgcResult, SpatialReference};
use proj4rs::proj::Proj;

/// A reusable transform from one spatial reference to another.
///
/// Coordinates are always taken and returned in x, y order (longitude first
/// for geographic references) regardless of the authority axis order.
pub struct Transformer {
    source: Proj,
    target: Proj,
    source_label: String,
    target_label: String,
    /// proj4rs works in radians for geographic references
    source_is_geographic: bool,
    target_is_geographic: bool,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("source", &self.source_label)
            .field("target", &self.target_label)
            .finish_non_exhaustive()
    }
}

impl Transformer {
    /// Build a transform from `source` to `target`.
    pub fn new(source: &SpatialReference, target: &SpatialReference) -> OgcResult<Self> {
        Ok(Self {
            source: build_proj(source)?,
            target: build_proj(target)?,
            source_label: source.to_string(),
            target_label: target.to_string(),
            source_is_geographic: source.is_geographic(),
            target_is_geographic: target.is_geographic(),
        })
    }

    /// Transform a single x, y pair.
    pub fn transform(&self, x: f64, y: f64) -> OgcResult<(f64, f64)> {
        let (in_x, in_y) = if self.source_is_geographic {
            (x.to_radians(), y.to_radians())
        } else {
            (x, y)
        };

        let mut point = (in_x, in_y, 0.0);
        proj4rs::transform::transform(&self.source, &self.target, &mut point).map_err(|e| {
            OgcError::Projection(format!(
                "({}, {}) from {} to {}: {:?}",
                x, y, self.source_label, self.target_label, e
            ))
        })?;

        let (out_x, out_y) = if self.target_is_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out_x.is_finite() || !out_y.is_finite() {
            return Err(OgcError::Projection(format!(
                "({}, {}) has no finite image in {}",
                x, y, self.target_label
            )));
        }
        Ok((out_x, out_y))
    }

    /// Transform a `geo` coordinate.
    pub fn transform_coord(&self, coord: Coord<f64>) -> OgcResult<Coord<f64>> {
        self.transform(coord.x, coord.y)
            .map(|(x, y)| Coord { x, y })
    }
}

fn build_proj(reference: &SpatialReference) -> OgcResult<Proj> {
    let def = reference.proj4()?;
    Proj::from_proj_string(&def)
        .map_err(|e| OgcError::InvalidCrs(format!("{}: {:?}", reference, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn epsg(code: u32) -> SpatialReference {
        SpatialReference::Epsg(code)
    }

    #[test]
    fn test_origin_to_mercator() {
        let t = Transformer::new(&epsg(4326), &epsg(3857)).unwrap();
        let (x, y) = t.transform(0.0, 0.0).unwrap();
        assert!(x.abs() < EPS);
        assert!(y.abs() < EPS);
    }

    #[test]
    fn test_mercator_known_point() {
        let t = Transformer::new(&epsg(3857), &epsg(4326)).unwrap();
        let (lon, lat) = t.transform(-7766049.665, 5691929.739).unwrap();
        assert!((lon - (-69.7636111130079)).abs() < 1e-5, "lon {}", lon);
        assert!((lat - 45.44549114818127).abs() < 1e-5, "lat {}", lat);
    }

    #[test]
    fn test_roundtrip_4326_3857() {
        let fwd = Transformer::new(&epsg(4326), &epsg(3857)).unwrap();
        let inv = Transformer::new(&epsg(3857), &epsg(4326)).unwrap();
        for (lon, lat) in [(10.0, 51.5), (-122.4, 37.8), (139.7, 35.7)] {
            let (x, y) = fwd.transform(lon, lat).unwrap();
            let (lon2, lat2) = inv.transform(x, y).unwrap();
            assert!((lon - lon2).abs() < EPS, "lon: {} != {}", lon, lon2);
            assert!((lat - lat2).abs() < EPS, "lat: {} != {}", lat, lat2);
        }
    }
}
