//! # Algorithm Toolbox
//!
//! Direct access to every telemetry algorithm. Use these to plug a single
//! stage into your own processing without the pipeline.
//!
//! ## Core Algorithms
//!
//! - **Quality Filter**: Argos location-class screening
//! - **Spatial Validation**: Study-area and land-mask checks
//! - **Speed Filter**: Iterative worst-offender removal
//! - **Douglas-Peucker**: Geodesic line simplification
//! - **Movement Metrics**: Step and trajectory statistics
//! - **Kernel Density**: Density grids and hotspots
//!
//! ## Geographic Utilities
//!
//! - **Haversine Distance**: Great-circle distance between GPS points
//! - **Bearing / Turning Angle**: Headings and changes of heading
//! - **Cross-Track Distance**: Deviation from a great-circle chord
//!
//! # Example
//!
//! ```rust
//! use turtle_track::algorithms::{haversine_distance, GpsPoint};
//!
//! let panama = GpsPoint::new(8.95, -79.53);
//! let coiba = GpsPoint::new(7.45, -81.78);
//! let distance = haversine_distance(&panama, &coiba);
//! println!("Panama City to Coiba: {:.0} km", distance / 1000.0);
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{Bounds, Filtered, Fix, GpsPoint, StageCounts, Trajectory};

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{
    bearing, bearing_difference, compute_bounds, compute_center, cross_track_distance, distance,
    final_bearing, haversine_distance, initial_bearing, meters_to_degrees, polyline_length,
    project_equirectangular, turning_angle, validate_coordinate,
};

// =============================================================================
// Temporal Normalization
// =============================================================================

/// Sort fixes, drop repeated timestamps and report on sampling intervals.
pub use crate::temporal::normalize;
/// Split a flat record stream into one trajectory per individual.
pub use crate::temporal::group_by_individual;

// =============================================================================
// Filtering Stages
// =============================================================================

/// Location-class filter.
pub use crate::quality::{filter_quality, AllowedClasses, LocationClassRanking};

/// Spatial validation against any [`PointInPolygon`] shape.
pub use crate::spatial::{validate_spatial, ExclusionSet, PointInPolygon, Region, Ring};

/// Speed-coherence filter.
///
/// Removes one fix per pass: most violations first, then higher mean
/// violating speed, then earliest.
pub use crate::speed::{filter_speed, implied_speed_kmh, SpeedFilterConfig};

// =============================================================================
// Line Simplification
// =============================================================================

/// Douglas-Peucker simplification with a pluggable deviation metric.
pub use crate::simplify::{simplify, simplify_with, CrossTrackDistance, Equirectangular, GreatCircle};

// =============================================================================
// Metrics and Statistics
// =============================================================================

pub use crate::metrics::{compute_metrics, compute_steps, mean, median, percentile, std_dev};

// =============================================================================
// Density Estimation
// =============================================================================

pub use crate::density::{estimate_density, identify_hotspots, Bandwidth, DensityConfig};

// =============================================================================
// Spatial Indexing
// =============================================================================

/// R-tree spatial index for fast geographic queries.
///
/// Re-export of rstar's RTree for custom spatial indexing needs.
pub use rstar::RTree;

/// Axis-aligned bounding box for spatial queries.
pub use rstar::AABB;
