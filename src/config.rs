//! Pipeline configuration.
//!
//! Every option has a default, so a JSON document only needs the keys it
//! changes:
//!
//! ```rust
//! use turtle_track::PipelineConfig;
//!
//! let config = PipelineConfig::from_json_str(
//!     r#"{ "max_speed_kmh": 20.0, "density_bandwidth": 0.05 }"#,
//! ).unwrap();
//! assert_eq!(config.simplification_tolerance_m, 500.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::density::{Bandwidth, DensityConfig};
use crate::error::{Result, TrackError};
use crate::quality::AllowedClasses;
use crate::speed::SpeedFilterConfig;
use crate::temporal::TemporalConfig;

/// Configuration for a full processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Location classes retained by the quality filter.
    /// Default: {"1", "2", "3"} (Argos LC1 to LC3)
    pub allowed_location_classes: AllowedClasses,

    /// Swim-speed ceiling for the speed filter.
    /// Default: 30.0 km/h
    pub max_speed_kmh: f64,

    /// Douglas-Peucker tolerance.
    /// Default: 500.0 meters
    pub simplification_tolerance_m: f64,

    /// Kernel bandwidth in degrees, or "auto" for Silverman's rule.
    /// Default: "auto"
    pub density_bandwidth: Bandwidth,

    /// Density grid nodes per axis (at least 2).
    /// Default: 100
    pub density_grid_resolution: usize,

    /// Run spatial validation. A study area must then be supplied.
    /// Default: true
    pub spatial_validation: bool,

    /// Cap on speed-filter removal passes per trajectory.
    /// Default: None
    pub speed_filter_max_passes: Option<usize>,

    /// Interval diagnostics thresholds.
    /// Default: 30 s short intervals, 72 h gaps
    pub temporal: TemporalConfig,

    /// Density percentile marking hotspot fixes.
    /// Default: 75.0
    pub hotspot_percentile: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            allowed_location_classes: AllowedClasses::new(["1", "2", "3"]),
            max_speed_kmh: 30.0,
            simplification_tolerance_m: 500.0,
            density_bandwidth: Bandwidth::Auto,
            density_grid_resolution: 100,
            spatial_validation: true,
            speed_filter_max_passes: None,
            temporal: TemporalConfig::default(),
            hotspot_percentile: 75.0,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every option against its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.allowed_location_classes.is_empty() {
            return Err(TrackError::invalid_parameter(
                "allowed_location_classes",
                "at least one class must be allowed",
            ));
        }
        self.speed_filter().validate()?;
        if !self.simplification_tolerance_m.is_finite() || self.simplification_tolerance_m <= 0.0 {
            return Err(TrackError::invalid_parameter(
                "simplification_tolerance_m",
                format!(
                    "must be a positive number of meters, got {}",
                    self.simplification_tolerance_m
                ),
            ));
        }
        self.density().validate()?;
        if !self.hotspot_percentile.is_finite() || !(0.0..=100.0).contains(&self.hotspot_percentile)
        {
            return Err(TrackError::invalid_parameter(
                "hotspot_percentile",
                format!("must lie in [0, 100], got {}", self.hotspot_percentile),
            ));
        }
        let t = &self.temporal;
        if !(t.short_interval_secs >= 0.0 && t.long_gap_hours >= 0.0) {
            return Err(TrackError::invalid_parameter(
                "temporal",
                "interval thresholds must be non-negative",
            ));
        }
        Ok(())
    }

    /// Speed filter settings.
    pub fn speed_filter(&self) -> SpeedFilterConfig {
        SpeedFilterConfig {
            max_speed_kmh: self.max_speed_kmh,
            max_passes: self.speed_filter_max_passes,
        }
    }

    /// Density settings (data-driven bounds, default margin, no cutoff).
    pub fn density(&self) -> DensityConfig {
        DensityConfig {
            bandwidth: self.density_bandwidth,
            grid_resolution: self.density_grid_resolution,
            ..DensityConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.allowed_location_classes.contains("3"));
        assert!(!config.allowed_location_classes.contains("A"));
        assert_eq!(config.max_speed_kmh, 30.0);
        assert_eq!(config.density_bandwidth, Bandwidth::Auto);
        assert_eq!(config.density().grid_resolution, 100);
        assert_eq!(config.speed_filter().max_passes, None);
    }

    #[test]
    fn test_partial_json() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "allowed_location_classes": ["LC1", "LC2", "LC3"],
                "density_bandwidth": "auto",
                "temporal": { "long_gap_hours": 48 }
            }"#,
        )
        .unwrap();
        assert!(config.allowed_location_classes.contains("LC2"));
        assert_eq!(config.temporal.long_gap_hours, 48.0);
        assert_eq!(config.temporal.short_interval_secs, 30.0);
        assert_eq!(config.density_grid_resolution, 100);
    }

    #[test]
    fn test_json_round_trip() {
        let config = PipelineConfig {
            density_bandwidth: Bandwidth::Fixed(0.08),
            speed_filter_max_passes: Some(50),
            ..PipelineConfig::default()
        };
        let json = config.to_json_string().unwrap();
        assert_eq!(PipelineConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases = [
            r#"{ "max_speed_kmh": 0 }"#,
            r#"{ "simplification_tolerance_m": -10 }"#,
            r#"{ "density_grid_resolution": 1 }"#,
            r#"{ "hotspot_percentile": 120 }"#,
            r#"{ "allowed_location_classes": [] }"#,
        ];
        for json in cases {
            assert!(
                matches!(
                    PipelineConfig::from_json_str(json),
                    Err(TrackError::InvalidParameter { .. })
                ),
                "{json}"
            );
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            PipelineConfig::from_json_str("{ not json"),
            Err(TrackError::Config { .. })
        ));
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{ "density_bandwidth": "wide" }"#),
            Err(TrackError::Config { .. })
        ));
    }
}
