//! Error types shared by every component.

use thiserror::Error;

/// Errors surfaced to callers of the aggregation core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AtlasError {
    /// Malformed coordinates, empty country code, or empty averaging input.
    /// Rejected before any state is touched.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The geolocation service could not be reached or returned an error status.
    #[error("geolocation lookup failed: {0}")]
    Network(String),

    /// Loading or saving persisted state failed.
    #[error("state store error: {0}")]
    Persistence(String),
}

impl AtlasError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        AtlasError::InvalidInput(msg.into())
    }
}

/// Why a single resolver call produced no observation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionFailure {
    /// Timeout, connection failure, non-success status or unreadable body.
    #[error("network error: {0}")]
    Network(String),

    /// The lookup succeeded but lacked a country or coordinates.
    /// Nothing was learned; the identity stays eligible for a later retry.
    #[error("incomplete geolocation data (country: {country:?}, loc: {loc:?})")]
    IncompleteData {
        country: Option<String>,
        loc: Option<String>,
    },

    /// The lookup carried a country and coordinates, but they were not usable
    /// (out-of-range latitude or longitude, blank country code).
    #[error("invalid geolocation data: {0}")]
    InvalidData(String),
}

impl From<std::io::Error> for AtlasError {
    fn from(e: std::io::Error) -> Self {
        AtlasError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for AtlasError {
    fn from(e: serde_json::Error) -> Self {
        AtlasError::Persistence(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_and_json_errors_are_persistence_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(AtlasError::from(io), AtlasError::Persistence(_)));

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(AtlasError::from(json), AtlasError::Persistence(_)));
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            AtlasError::invalid("latitude 91 out of range").to_string(),
            "invalid input: latitude 91 out of range"
        );
        let incomplete = ResolutionFailure::IncompleteData {
            country: Some("US".into()),
            loc: None,
        };
        assert!(incomplete.to_string().contains("incomplete"));
        assert_eq!(
            ResolutionFailure::InvalidData("latitude 91 outside [-90, 90]".into()).to_string(),
            "invalid geolocation data: latitude 91 outside [-90, 90]"
        );
    }
}
