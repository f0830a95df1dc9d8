//! Movement metrics for a trajectory.
//!
//! Everything is recomputed from the fixes passed in. Aggregates that cannot
//! be defined (no steps, zero path length, zero duration) are `None` rather
//! than NaN or zero.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geo_utils::{bearing_difference, final_bearing, haversine_distance, initial_bearing};
use crate::Trajectory;

/// Kilometers per degree used for the bounding-box area estimate.
const KM_PER_DEGREE: f64 = 111.0;

/// One step between consecutive fixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetric {
    pub from_index: usize,
    pub to_index: usize,
    pub distance_m: f64,
    pub elapsed_s: f64,
    /// Undefined when no time elapsed
    pub speed_kmh: Option<f64>,
    /// Undefined when the fixes coincide
    pub bearing_deg: Option<f64>,
    /// Change of heading at `from_index`, in [0, 180]
    pub turning_angle_deg: Option<f64>,
}

/// Trajectory-level aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryMetrics {
    pub individual_id: String,
    pub fix_count: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Whole days between first and last fix
    pub duration_days: Option<i64>,
    /// Sum of step distances
    pub total_distance_m: f64,
    /// Distance from first to last fix
    pub net_displacement_m: f64,
    /// net_displacement / total_distance, in (0, 1]
    pub straightness: Option<f64>,
    pub mean_step_speed_kmh: Option<f64>,
    pub median_step_speed_kmh: Option<f64>,
    pub max_step_speed_kmh: Option<f64>,
    pub mean_turning_angle_deg: Option<f64>,
    pub distance_per_day_km: Option<f64>,
    pub lat_range_deg: Option<f64>,
    pub lon_range_deg: Option<f64>,
    /// Bounding box area at 111 km per degree on both axes
    pub approx_area_km2: Option<f64>,
    pub steps: Vec<StepMetric>,
}

/// Per-step distance, speed, bearing and turning angle.
pub fn compute_steps(trajectory: &Trajectory) -> Result<Vec<StepMetric>> {
    trajectory.validate_coordinates()?;
    let fixes = trajectory.fixes();

    let mut steps: Vec<StepMetric> = Vec::with_capacity(fixes.len().saturating_sub(1));
    // Heading on arrival at the current fix
    let mut arrival: Option<f64> = None;
    for (i, pair) in fixes.windows(2).enumerate() {
        let (a, b) = (pair[0].point(), pair[1].point());
        let distance_m = haversine_distance(&a, &b);
        let elapsed_s = (pair[1].timestamp - pair[0].timestamp).num_milliseconds() as f64 / 1000.0;

        let speed_kmh = (elapsed_s > 0.0).then(|| (distance_m / 1000.0) / (elapsed_s / 3600.0));
        let bearing_deg = (distance_m > 0.0).then(|| initial_bearing(&a, &b));
        let turning_angle_deg = match (arrival, bearing_deg) {
            (Some(prev), Some(cur)) => Some(bearing_difference(prev, cur)),
            _ => None,
        };
        arrival = (distance_m > 0.0).then(|| final_bearing(&a, &b));

        steps.push(StepMetric {
            from_index: i,
            to_index: i + 1,
            distance_m,
            elapsed_s,
            speed_kmh,
            bearing_deg,
            turning_angle_deg,
        });
    }

    Ok(steps)
}

/// Compute steps and aggregates for one trajectory.
pub fn compute_metrics(trajectory: &Trajectory) -> Result<TrajectoryMetrics> {
    let steps = compute_steps(trajectory)?;

    let total_distance_m: f64 = steps.iter().map(|s| s.distance_m).sum();
    let net_displacement_m = match (trajectory.first(), trajectory.last()) {
        (Some(a), Some(b)) => haversine_distance(&a.point(), &b.point()),
        _ => 0.0,
    };
    let straightness = (total_distance_m > 0.0 && net_displacement_m > 0.0)
        .then(|| (net_displacement_m / total_distance_m).min(1.0));

    let speeds: Vec<f64> = steps.iter().filter_map(|s| s.speed_kmh).collect();
    let turns: Vec<f64> = steps.iter().filter_map(|s| s.turning_angle_deg).collect();

    let start = trajectory.first().map(|f| f.timestamp);
    let end = trajectory.last().map(|f| f.timestamp);
    let duration_days = start.zip(end).map(|(s, e)| (e - s).num_days());
    let distance_per_day_km = duration_days
        .filter(|&d| d > 0)
        .map(|d| total_distance_m / 1000.0 / d as f64);

    let bounds = trajectory.bounds();
    let lat_range_deg = bounds.map(|b| b.lat_span());
    let lon_range_deg = bounds.map(|b| b.lng_span());
    let approx_area_km2 = bounds.map(|b| b.lat_span() * KM_PER_DEGREE * b.lng_span() * KM_PER_DEGREE);

    let metrics = TrajectoryMetrics {
        individual_id: trajectory.individual_id().to_string(),
        fix_count: trajectory.len(),
        start,
        end,
        duration_days,
        total_distance_m,
        net_displacement_m,
        straightness,
        mean_step_speed_kmh: mean(&speeds),
        median_step_speed_kmh: median(&speeds),
        max_step_speed_kmh: speeds.iter().copied().reduce(f64::max),
        mean_turning_angle_deg: mean(&turns),
        distance_per_day_km,
        lat_range_deg,
        lon_range_deg,
        approx_area_km2,
        steps,
    };

    info!(
        "[Metrics] {}: {} fixes, {:.1} km path, straightness {}",
        metrics.individual_id,
        metrics.fix_count,
        total_distance_m / 1000.0,
        metrics
            .straightness
            .map_or_else(|| "undefined".to_string(), |s| format!("{:.3}", s))
    );

    Ok(metrics)
}

/// Arithmetic mean; `None` when empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1); `None` for fewer than 2 values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Median (mean of the two middle values for even counts); `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Percentile in [0, 100] with linear interpolation between closest ranks;
/// `None` when empty.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = pct.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}
