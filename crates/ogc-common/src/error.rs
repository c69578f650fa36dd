//! Error types for OGC/ArcGIS retrieval.

use thiserror::Error;

/// Result type alias using OgcError.
pub type OgcResult<T> = Result<T, OgcError>;

/// Primary error type for geometry handling and service retrieval.
///
/// Validation variants (`InputType`, `InputValue`, `InvalidBbox`, `InvalidCrs`)
/// are raised before any request is sent and are never retried. `ZeroMatched`
/// is the expected-empty outcome of a discovery query and is kept separate so
/// callers can tell it apart from a malformed query.
#[derive(Debug, Error)]
pub enum OgcError {
    // === Validation Errors ===
    #[error("The {arg} argument should be of type {expected}{}", shape_hint(.shape))]
    InputType {
        arg: String,
        expected: String,
        shape: Option<String>,
    },

    #[error("Given {arg} is invalid. Valid options are:\n{}", .valid.join("\n"))]
    InputValue { arg: String, valid: Vec<String> },

    #[error("Invalid BBOX: {0}")]
    InvalidBbox(String),

    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),

    #[error("Projection error: {0}")]
    Projection(String),

    // === Service Errors ===
    #[error("Service rejected the request{}: {message}", status_hint(.status))]
    ServiceRejected { status: Option<u16>, message: String },

    #[error("Service returned no matched records: {0}")]
    ZeroMatched(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode service response: {0}")]
    Decode(String),

    // === Infrastructure Errors ===
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Operation cancelled")]
    Cancelled,
}

fn shape_hint(shape: &Option<String>) -> String {
    shape
        .as_ref()
        .map(|s| format!(" with the following shape:\n{}", s))
        .unwrap_or_default()
}

fn status_hint(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl OgcError {
    /// Create an InputType error.
    pub fn input_type(arg: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InputType {
            arg: arg.into(),
            expected: expected.into(),
            shape: None,
        }
    }

    /// Create an InputType error that also describes the expected shape.
    pub fn input_type_with_shape(
        arg: impl Into<String>,
        expected: impl Into<String>,
        shape: impl Into<String>,
    ) -> Self {
        Self::InputType {
            arg: arg.into(),
            expected: expected.into(),
            shape: Some(shape.into()),
        }
    }

    /// Create an InputValue error listing the accepted options.
    pub fn input_value<I, S>(arg: impl Into<String>, valid: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::InputValue {
            arg: arg.into(),
            valid: valid.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a ServiceRejected error.
    pub fn service_rejected(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::ServiceRejected {
            status,
            message: message.into(),
        }
    }

    /// True for errors caused by caller input. These are never retried.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            OgcError::InputType { .. }
                | OgcError::InputValue { .. }
                | OgcError::InvalidBbox(_)
                | OgcError::InvalidCrs(_)
        )
    }

    /// True when a discovery query legitimately matched nothing.
    pub fn is_zero_matched(&self) -> bool {
        matches!(self, OgcError::ZeroMatched(_))
    }
}

impl From<std::io::Error> for OgcError {
    fn from(err: std::io::Error) -> Self {
        OgcError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for OgcError {
    fn from(err: serde_json::Error) -> Self {
        OgcError::Decode(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_value_lists_options() {
        let err = OgcError::input_value("method", ["GET", "POST"]);
        let msg = err.to_string();
        assert!(msg.contains("method"));
        assert!(msg.contains("GET\nPOST"));
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_input_type_shape() {
        let err = OgcError::input_type_with_shape("bbox", "tuple", "(west, south, east, north)");
        assert!(err.to_string().contains("(west, south, east, north)"));
    }

    #[test]
    fn test_service_rejected_status() {
        let err = OgcError::service_rejected(Some(400), "Invalid query");
        assert_eq!(
            err.to_string(),
            "Service rejected the request (HTTP 400): Invalid query"
        );
        assert!(!err.is_invalid_input());
    }

    #[test]
    fn test_zero_matched_is_distinct() {
        let err = OgcError::ZeroMatched("bad request".to_string());
        assert!(err.is_zero_matched());
        assert!(!err.is_invalid_input());
    }
}
