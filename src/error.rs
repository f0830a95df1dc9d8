//! Unified error handling for the turtle-track library.
//!
//! Only misconfiguration is an error. Noisy telemetry (low location classes,
//! fixes on land, speed outliers, duplicate timestamps) is handled by the
//! filtering stages and shows up in their reports instead.

use thiserror::Error;

/// Unified error type for turtle-track operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    /// Latitude outside [-90, 90] or longitude outside [-180, 180] (or non-finite)
    #[error("invalid coordinate ({latitude}, {longitude}): latitude must be within [-90, 90] and longitude within [-180, 180]")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// A tuning parameter is out of its valid range
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    /// Spatial validation was requested without the geometry it needs
    #[error("missing geometry: {message}")]
    MissingGeometry { message: String },

    /// Configuration could not be parsed
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl TrackError {
    /// Shorthand for an [`TrackError::InvalidParameter`].
    pub fn invalid_parameter(name: &str, message: impl Into<String>) -> Self {
        TrackError::InvalidParameter {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for TrackError {
    fn from(err: serde_json::Error) -> Self {
        TrackError::Config {
            message: err.to_string(),
        }
    }
}

/// Result type alias for turtle-track operations.
pub type Result<T> = std::result::Result<T, TrackError>;

/// Extension trait for converting Option to TrackError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a missing geometry error.
    fn ok_or_missing_geometry(self, message: &str) -> Result<T>;

    /// Convert Option to Result with an invalid parameter error.
    fn ok_or_invalid_parameter(self, name: &str, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_missing_geometry(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TrackError::MissingGeometry {
            message: message.to_string(),
        })
    }

    fn ok_or_invalid_parameter(self, name: &str, message: &str) -> Result<T> {
        self.ok_or_else(|| TrackError::invalid_parameter(name, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrackError::InvalidCoordinate {
            latitude: 91.0,
            longitude: 0.0,
        };
        assert!(err.to_string().contains("91"));

        let err = TrackError::invalid_parameter("max_speed_kmh", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid parameter 'max_speed_kmh': must be positive"
        );
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_missing_geometry("study area not supplied");
        assert!(matches!(result, Err(TrackError::MissingGeometry { .. })));

        let none: Option<i32> = None;
        let result = none.ok_or_invalid_parameter("bandwidth", "cannot be derived");
        assert!(matches!(
            result,
            Err(TrackError::InvalidParameter { ref name, .. }) if name == "bandwidth"
        ));

        assert_eq!(Some(3).ok_or_missing_geometry("unused"), Ok(3));
    }

    #[test]
    fn test_from_json_error() {
        let err: TrackError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, TrackError::Config { .. }));
    }
}
