//! WMS GetMap payloads and GetCapabilities CRS parsing.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::fmt;
use std::str::FromStr;

use ogc_common::{OgcError, OgcResult, SpatialReference, Tile};

/// Supported WMS protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WmsVersion {
    V1_1_1,
    #[default]
    V1_3_0,
}

impl WmsVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            WmsVersion::V1_1_1 => "1.1.1",
            WmsVersion::V1_3_0 => "1.3.0",
        }
    }

    /// Name of the reference parameter: `SRS` before 1.3.0, `CRS` after.
    pub fn crs_param(&self) -> &'static str {
        match self {
            WmsVersion::V1_1_1 => "srs",
            WmsVersion::V1_3_0 => "crs",
        }
    }
}

impl FromStr for WmsVersion {
    type Err = OgcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.1.1" => Ok(WmsVersion::V1_1_1),
            "1.3.0" => Ok(WmsVersion::V1_3_0),
            _ => Err(OgcError::input_value("version", ["1.1.1", "1.3.0"])),
        }
    }
}

impl fmt::Display for WmsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters shared by every GetMap request of a decomposition.
#[derive(Debug, Clone)]
pub struct GetMapTemplate {
    pub version: WmsVersion,
    pub format: String,
    pub crs: SpatialReference,
    /// Keep x, y order even where WMS 1.3.0 mandates lat, lon.
    pub always_xy: bool,
    /// Extra parameters such as `styles`, sent with every request.
    pub extra: Vec<(String, String)>,
}

impl GetMapTemplate {
    pub fn new(version: WmsVersion, format: impl Into<String>, crs: SpatialReference) -> Self {
        Self {
            version,
            format: format.into(),
            crs,
            always_xy: false,
            extra: Vec::new(),
        }
    }

    /// True when the bbox has to be sent as (south, west, north, east).
    pub fn swaps_axes(&self) -> bool {
        self.version == WmsVersion::V1_3_0 && self.crs.is_geographic() && !self.always_xy
    }

    /// Full payload for one layer and tile.
    pub fn payload(&self, layer: &str, tile: &Tile) -> Vec<(String, String)> {
        let bbox = if self.swaps_axes() {
            tile.bbox.swapped_axes()
        } else {
            tile.bbox
        };

        let mut params = vec![
            ("version".to_string(), self.version.as_str().to_string()),
            ("format".to_string(), self.format.clone()),
            ("request".to_string(), "GetMap".to_string()),
        ];
        params.extend(self.extra.iter().cloned());
        params.push((
            self.version.crs_param().to_string(),
            self.crs.to_ogc_string(),
        ));
        params.push(("bbox".to_string(), bbox.to_ogc_string()));
        params.push(("width".to_string(), tile.width.to_string()));
        params.push(("height".to_string(), tile.height.to_string()));
        params.push(("layers".to_string(), layer.to_string()));
        params
    }

    /// Result key for one layer and tile.
    pub fn key(layer: &str, tile: &Tile) -> String {
        format!("{}_dd_{}", layer, tile.label)
    }
}

/// Query parameters for a WMS GetCapabilities request.
pub fn capabilities_params(version: WmsVersion) -> Vec<(String, String)> {
    vec![
        ("service".to_string(), "wms".to_string()),
        ("request".to_string(), "GetCapabilities".to_string()),
        ("version".to_string(), version.as_str().to_string()),
    ]
}

/// CRS identifiers advertised by the top-level layer of a 1.3.0 capabilities
/// document (`Capability/Layer/CRS`), lower-cased.
pub fn parse_capability_crs(xml: &str) -> OgcResult<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut crs = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                path.push(name);
            }
            Ok(Event::Text(t)) if is_layer_crs(&path) => {
                let text = t
                    .unescape()
                    .map_err(|e| OgcError::Decode(format!("capabilities: {}", e)))?;
                crs.push(text.trim().to_lowercase());
            }
            Ok(Event::End(_)) => {
                path.pop();
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

    Ok(crs)
}

fn is_layer_crs(path: &[String]) -> bool {
    path.len() == 4 && path[1] == "Capability" && path[2] == "Layer" && path[3] == "CRS"
}
