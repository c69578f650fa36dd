//! Spatial reference identifiers and their canonical definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{OgcError, OgcResult};

/// EPSG code of WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

/// EPSG code of Web Mercator.
pub const EPSG_WEB_MERCATOR: u32 = 3857;

/// PROJ.4 tokens that do not change the meaning of a definition.
const IGNORED_TOKENS: [&str; 3] = ["+no_defs", "+type=crs", "+wktext"];

/// A caller supplied spatial reference.
///
/// Two references are equal when their canonical PROJ.4 definitions match, so
/// `EPSG:4326`, `CRS:84` and the equivalent `+proj=longlat` string compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpatialReference {
    /// An EPSG code resolved through the bundled definition database.
    Epsg(u32),
    /// A raw PROJ.4 definition string.
    Proj4(String),
}

impl SpatialReference {
    /// WGS84 geographic coordinates.
    pub fn wgs84() -> Self {
        SpatialReference::Epsg(EPSG_WGS84)
    }

    /// Parse a reference from the forms services and users commonly pass.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326" / "epsg:4326"
    /// - "4326"
    /// - "CRS:84" (equivalent to EPSG:4326)
    /// - "urn:ogc:def:crs:EPSG::4326"
    /// - "+proj=longlat +datum=WGS84"
    pub fn parse(s: &str) -> OgcResult<Self> {
        let trimmed = s.trim();
        if trimmed.starts_with("+proj=") {
            let reference = SpatialReference::Proj4(trimmed.to_string());
            reference.canonical_definition()?;
            return Ok(reference);
        }

        let normalized = trimmed.to_uppercase();
        let code = match normalized.as_str() {
            "CRS:84" | "OGC:CRS84" | "URN:OGC:DEF:CRS:OGC:1.3:CRS84" => Some(EPSG_WGS84),
            "EPSG:900913" => Some(EPSG_WEB_MERCATOR),
            _ => normalized
                .strip_prefix("EPSG:")
                .or_else(|| normalized.strip_prefix("URN:OGC:DEF:CRS:EPSG::"))
                .unwrap_or(&normalized)
                .parse::<u32>()
                .ok(),
        };

        let reference = code
            .map(SpatialReference::Epsg)
            .ok_or_else(|| OgcError::InvalidCrs(s.to_string()))?;
        reference.canonical_definition()?;
        Ok(reference)
    }

    /// The EPSG code, when this reference is one.
    pub fn epsg_code(&self) -> Option<u32> {
        match self {
            SpatialReference::Epsg(code) => Some(*code),
            SpatialReference::Proj4(_) => None,
        }
    }

    /// The PROJ.4 definition as stored in the database or supplied by the caller.
    pub fn proj4(&self) -> OgcResult<String> {
        match self {
            SpatialReference::Epsg(code) => u16::try_from(*code)
                .ok()
                .and_then(crs_definitions::from_code)
                .map(|def| def.proj4.to_string())
                .ok_or_else(|| OgcError::InvalidCrs(format!("EPSG:{} is not supported", code))),
            SpatialReference::Proj4(def) => Ok(def.clone()),
        }
    }

    /// Normalized definition used for equality.
    pub fn canonical_definition(&self) -> OgcResult<String> {
        let def = self.proj4()?;
        let mut tokens: Vec<&str> = def
            .split_whitespace()
            .filter(|t| !IGNORED_TOKENS.contains(t))
            .collect();
        if tokens.is_empty() {
            return Err(OgcError::InvalidCrs(def));
        }
        tokens.sort_unstable();
        Ok(tokens.join(" "))
    }

    /// Check if this is a geographic (lon/lat) reference.
    pub fn is_geographic(&self) -> bool {
        self.proj4()
            .map(|def| def.split_whitespace().any(|t| t == "+proj=longlat"))
            .unwrap_or(false)
    }

    /// Lower-case form used in service payloads, e.g. "epsg:4326".
    pub fn to_ogc_string(&self) -> String {
        match self {
            SpatialReference::Epsg(code) => format!("epsg:{}", code),
            SpatialReference::Proj4(def) => def.clone(),
        }
    }
}

impl PartialEq for SpatialReference {
    fn eq(&self, other: &Self) -> bool {
        match (self.canonical_definition(), other.canonical_definition()) {
            (Ok(a), Ok(b)) => a == b,
            _ => match (self, other) {
                (SpatialReference::Epsg(a), SpatialReference::Epsg(b)) => a == b,
                (SpatialReference::Proj4(a), SpatialReference::Proj4(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl From<u32> for SpatialReference {
    fn from(code: u32) -> Self {
        SpatialReference::Epsg(code)
    }
}

impl std::str::FromStr for SpatialReference {
    type Err = OgcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpatialReference::parse(s)
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialReference::Epsg(code) => write!(f, "EPSG:{}", code),
            SpatialReference::Proj4(def) => write!(f, "{}", def),
        }
    }
}
