//! Temporal normalization of raw fix streams.
//!
//! Raw Argos exports are not guaranteed to be in time order and occasionally
//! repeat a timestamp. This module sorts each individual's fixes, drops
//! repeated timestamps and reports on the sampling regime (short bursts and
//! long transmission gaps).

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::metrics::median;
use crate::{Fix, StageCounts, Trajectory};

/// Thresholds for interval diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Intervals shorter than this (but non-zero) are counted as short bursts.
    /// Default: 30 seconds
    pub short_interval_secs: f64,
    /// Intervals longer than this are counted as transmission gaps.
    /// Default: 72 hours
    pub long_gap_hours: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            short_interval_secs: 30.0,
            long_gap_hours: 72.0,
        }
    }
}

/// What normalization did to one individual's fixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalReport {
    pub counts: StageCounts,
    /// Fixes dropped because they belong to a different individual
    pub foreign_removed: usize,
    /// Fixes dropped because an earlier fix had the same timestamp
    pub duplicates_removed: usize,
    /// Whether the input was already in non-decreasing time order
    pub was_sorted: bool,
    /// Intervals in (0, short_interval_secs)
    pub short_intervals: usize,
    /// Mean interval between consecutive fixes in hours
    pub mean_interval_hours: Option<f64>,
    /// Median interval between consecutive fixes in hours
    pub median_interval_hours: Option<f64>,
    /// Intervals longer than long_gap_hours
    pub long_gaps: usize,
    /// Longest of those gaps in days
    pub max_gap_days: Option<f64>,
}

/// Sort fixes by time and drop repeated timestamps.
///
/// Fixes whose `individual_id` differs from `individual_id` are dropped.
///
/// The sort is stable, so among fixes sharing a timestamp the one that came
/// first in `fixes` survives.
pub fn normalize(
    individual_id: &str,
    mut fixes: Vec<Fix>,
    config: &TemporalConfig,
) -> (Trajectory, TemporalReport) {
    let input = fixes.len();
    fixes.retain(|f| f.individual_id == individual_id);
    let foreign_removed = input - fixes.len();
    if foreign_removed > 0 {
        warn!(
            "[Temporal] {}: dropped {} fixes tagged with another individual",
            individual_id, foreign_removed
        );
    }

    let was_sorted = fixes.windows(2).all(|w| w[0].timestamp <= w[1].timestamp);

    if !was_sorted {
        fixes.sort_by_key(|f| f.timestamp);
    }
    fixes.dedup_by(|later, earlier| later.timestamp == earlier.timestamp);

    let duplicates_removed = input - foreign_removed - fixes.len();
    if duplicates_removed > 0 {
        debug!(
            "[Temporal] {}: dropped {} fixes with repeated timestamps",
            individual_id, duplicates_removed
        );
    }

    let intervals_secs: Vec<f64> = fixes
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_milliseconds() as f64 / 1000.0)
        .collect();

    let short_intervals = intervals_secs
        .iter()
        .filter(|&&s| s > 0.0 && s < config.short_interval_secs)
        .count();

    let hours: Vec<f64> = intervals_secs
        .iter()
        .filter(|&&s| s > 0.0)
        .map(|s| s / 3600.0)
        .collect();
    let mean_interval_hours = if hours.is_empty() {
        None
    } else {
        Some(hours.iter().sum::<f64>() / hours.len() as f64)
    };
    let median_interval_hours = median(&hours);

    let gap_secs = config.long_gap_hours * 3600.0;
    let gaps: Vec<f64> = intervals_secs
        .iter()
        .copied()
        .filter(|&s| s > gap_secs)
        .collect();
    let max_gap_days = gaps
        .iter()
        .copied()
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))
        .map(|s| s / 86_400.0);

    let report = TemporalReport {
        counts: StageCounts::new(input, fixes.len()),
        foreign_removed,
        duplicates_removed,
        was_sorted,
        short_intervals,
        mean_interval_hours,
        median_interval_hours,
        long_gaps: gaps.len(),
        max_gap_days,
    };

    (Trajectory::from_ordered(individual_id, fixes), report)
}

/// Split a flat fix stream into one normalized trajectory per individual,
/// ordered by individual id.
pub fn group_by_individual(
    fixes: Vec<Fix>,
    config: &TemporalConfig,
) -> Vec<(Trajectory, TemporalReport)> {
    let mut by_id: BTreeMap<String, Vec<Fix>> = BTreeMap::new();
    for fix in fixes {
        by_id.entry(fix.individual_id.clone()).or_default().push(fix);
    }

    info!("[Temporal] Grouped fixes into {} individuals", by_id.len());

    by_id
        .into_iter()
        .map(|(id, fixes)| normalize(&id, fixes, config))
        .collect()
}
