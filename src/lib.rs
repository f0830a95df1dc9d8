//! # Turtle Track
//!
//! Quality control and simplification of Argos/SPOT satellite telemetry for
//! sea turtles.
//!
//! This library provides:
//! - Location-class filtering of raw Argos fixes
//! - Spatial validation against a study area and excluded land polygons
//! - Iterative removal of fixes implying impossible swim speeds
//! - Douglas-Peucker simplification with geodesic cross-track distance
//! - Per-step and per-trajectory movement metrics
//! - Kernel density surfaces and hotspot detection over pooled fixes
//!
//! ## Features
//!
//! - **`parallel`** - Process individuals in parallel with rayon
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use turtle_track::{simplify, filter_speed, Fix, SpeedFilterConfig, Trajectory};
//!
//! let t0 = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
//! let fixes = vec![
//!     Fix::new("241136", t0, 8.00, -79.50, "3"),
//!     Fix::new("241136", t0 + Duration::hours(6), 8.02, -79.48, "2"),
//!     Fix::new("241136", t0 + Duration::hours(12), 8.04, -79.46, "1"),
//! ];
//! let track = Trajectory::new("241136", fixes);
//!
//! let filtered = filter_speed(&track, &SpeedFilterConfig::default()).unwrap();
//! let simplified = simplify(&filtered.trajectory, 500.0).unwrap();
//! assert_eq!(simplified.trajectory.len(), 2);
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrackError};

// Geographic utilities (distance, bearing, turning angle, cross-track distance)
pub mod geo_utils;

// Sorting, duplicate removal and sampling-interval diagnostics
pub mod temporal;
pub use temporal::{group_by_individual, normalize, TemporalConfig, TemporalReport};

// Argos location-class filtering
pub mod quality;
pub use quality::{filter_quality, AllowedClasses, LocationClassRanking, QualityReport};

// Study area and land-mask validation
pub mod spatial;
pub use spatial::{
    validate_spatial, ExclusionSet, PointInPolygon, Region, Ring, SpatialReport,
};

// Speed-coherence outlier removal
pub mod speed;
pub use speed::{filter_speed, SpeedFilterConfig, SpeedReport};

// Douglas-Peucker simplification
pub mod simplify;
pub use simplify::{
    simplify, simplify_with, CrossTrackDistance, Equirectangular, GreatCircle, SimplifyReport,
};

// Movement metrics
pub mod metrics;
pub use metrics::{compute_metrics, compute_steps, StepMetric, TrajectoryMetrics};

// Kernel density estimation and hotspots
pub mod density;
pub use density::{
    estimate_density, identify_hotspots, Bandwidth, DensityConfig, DensityGrid, HotspotFix,
    HotspotReport,
};

// Pipeline configuration
pub mod config;
pub use config::PipelineConfig;

// Stage sequencing across individuals
pub mod pipeline;
pub use pipeline::{
    cohort_density, cohort_hotspots, process_individuals, process_trajectory, summarize,
    BeforeAfter, CohortSummary, Geometry, ProcessedTrajectory, Stage, StageSummary,
};

// Algorithm toolbox - modular access to all algorithms
// Use turtle_track::algorithms::{...} for standalone algorithm access
pub mod algorithms;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use turtle_track::GpsPoint;
/// let point = GpsPoint::new(8.95, -79.53); // Gulf of Panama
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// Like [`GpsPoint::is_valid`], but as a `Result`.
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(TrackError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

/// Axis-aligned bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Eastern Tropical Pacific study box used for the Panama turtle cohort:
    /// 5°N to 15°N, 95°W to 75°W.
    pub const EASTERN_TROPICAL_PACIFIC: Bounds = Bounds {
        min_lat: 5.0,
        max_lat: 15.0,
        min_lng: -95.0,
        max_lng: -75.0,
    };

    /// Create bounds from explicit limits.
    pub fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Inclusive containment test.
    pub fn contains_point(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_lat
            && latitude <= self.max_lat
            && longitude >= self.min_lng
            && longitude <= self.max_lng
    }

    /// Grow the box by the given margins (degrees) on every side.
    pub fn expand(&self, lat_margin: f64, lng_margin: f64) -> Self {
        Self {
            min_lat: self.min_lat - lat_margin,
            max_lat: self.max_lat + lat_margin,
            min_lng: self.min_lng - lng_margin,
            max_lng: self.max_lng + lng_margin,
        }
    }

    /// Latitude extent in degrees.
    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Longitude extent in degrees.
    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }
}

/// One telemetry observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Tag / individual identifier
    pub individual_id: String,
    /// Observation time (UTC)
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Argos location class ("3", "2", "1", "0", "A", "B", "Z" or any configured symbol)
    pub location_class: String,
    /// Auxiliary columns (error ellipse, satellite, ...) carried through untouched
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl Fix {
    /// Create a fix without auxiliary fields.
    pub fn new(
        individual_id: &str,
        timestamp: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        location_class: &str,
    ) -> Self {
        Self {
            individual_id: individual_id.to_string(),
            timestamp,
            latitude,
            longitude,
            location_class: location_class.to_string(),
            extras: BTreeMap::new(),
        }
    }

    /// Attach an auxiliary field.
    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extras.insert(key.to_string(), value.to_string());
        self
    }

    /// Position of this fix.
    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Time-ordered fixes of one individual.
///
/// Fixes are sorted ascending by timestamp and no two share a timestamp. When
/// the input repeats a timestamp, the fix encountered first is kept and later
/// ones are dropped. Every processing stage returns a new `Trajectory` and
/// leaves its input untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    individual_id: String,
    fixes: Vec<Fix>,
}

impl Trajectory {
    /// Build a trajectory from unordered fixes (sorted and de-duplicated).
    ///
    /// Fixes tagged with a different `individual_id` are dropped.
    pub fn new(individual_id: &str, fixes: Vec<Fix>) -> Self {
        temporal::normalize(individual_id, fixes, &TemporalConfig::default()).0
    }

    /// Wrap fixes that are already sorted with unique timestamps.
    pub(crate) fn from_ordered(individual_id: &str, fixes: Vec<Fix>) -> Self {
        debug_assert!(fixes
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
        Self {
            individual_id: individual_id.to_string(),
            fixes,
        }
    }

    /// An empty trajectory for `individual_id`.
    pub fn empty(individual_id: &str) -> Self {
        Self::from_ordered(individual_id, Vec::new())
    }

    pub fn individual_id(&self) -> &str {
        &self.individual_id
    }

    pub fn fixes(&self) -> &[Fix] {
        &self.fixes
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn first(&self) -> Option<&Fix> {
        self.fixes.first()
    }

    pub fn last(&self) -> Option<&Fix> {
        self.fixes.last()
    }

    /// Positions of all fixes, in order.
    pub fn points(&self) -> Vec<GpsPoint> {
        self.fixes.iter().map(Fix::point).collect()
    }

    /// Bounding box of the fixes.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.points())
    }

    /// Check every fix for valid coordinates.
    pub fn validate_coordinates(&self) -> Result<()> {
        self.fixes.iter().try_for_each(|f| f.point().validate())
    }

    /// New trajectory keeping only the fixes at `indices` (ascending).
    pub(crate) fn select(&self, indices: impl IntoIterator<Item = usize>) -> Self {
        let fixes = indices
            .into_iter()
            .map(|i| self.fixes[i].clone())
            .collect();
        Self::from_ordered(&self.individual_id, fixes)
    }

    pub fn into_fixes(self) -> Vec<Fix> {
        self.fixes
    }
}

/// Input/output counts shared by every filtering stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    /// Fixes entering the stage
    pub input: usize,
    /// Fixes leaving the stage
    pub retained: usize,
}

impl StageCounts {
    pub fn new(input: usize, retained: usize) -> Self {
        Self { input, retained }
    }

    /// Fixes removed by the stage.
    pub fn removed(&self) -> usize {
        self.input.saturating_sub(self.retained)
    }

    /// Retained share in percent (100 for empty input).
    pub fn retention_percent(&self) -> f64 {
        if self.input == 0 {
            100.0
        } else {
            self.retained as f64 / self.input as f64 * 100.0
        }
    }
}

/// Output of a filtering stage: the new trajectory and what happened to it.
#[derive(Debug, Clone, Serialize)]
pub struct Filtered<R> {
    pub trajectory: Trajectory,
    pub report: R,
}

// ============================================================================
// Tests
// ============================================================================
