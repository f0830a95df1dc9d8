//! Stage sequencing for one individual and for a whole cohort.
//!
//! Stages run in a fixed order: quality, spatial, speed, simplify, then
//! metrics on the simplified trajectory. Individuals are independent, so with
//! the `parallel` feature they are processed concurrently.

use std::collections::BTreeMap;
use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::density::{estimate_density, identify_hotspots, DensityGrid, HotspotReport};
use crate::error::{Result, TrackError};
use crate::metrics::{compute_metrics, mean, TrajectoryMetrics};
use crate::quality::{filter_quality, QualityReport};
use crate::simplify::{simplify, SimplifyReport};
use crate::spatial::{validate_spatial, PointInPolygon, SpatialReport};
use crate::speed::{filter_speed, SpeedReport};
use crate::temporal::{group_by_individual, TemporalReport};
use crate::{Fix, GpsPoint, StageCounts, Trajectory};

/// Study area and exclusion shapes shared by every individual.
#[derive(Default)]
pub struct Geometry {
    pub study_area: Option<Box<dyn PointInPolygon>>,
    pub exclusions: Vec<Box<dyn PointInPolygon>>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_study_area(mut self, area: impl PointInPolygon + 'static) -> Self {
        self.study_area = Some(Box::new(area));
        self
    }

    pub fn with_exclusion(mut self, shape: impl PointInPolygon + 'static) -> Self {
        self.exclusions.push(Box::new(shape));
        self
    }
}

impl fmt::Debug for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Geometry")
            .field("study_area", &self.study_area.is_some())
            .field("exclusions", &self.exclusions.len())
            .finish()
    }
}

/// Filtering stage identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Quality,
    Spatial,
    Speed,
    Simplify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Quality => "quality",
            Stage::Spatial => "spatial",
            Stage::Speed => "speed",
            Stage::Simplify => "simplify",
        };
        f.write_str(name)
    }
}

/// Fix counts through one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub input: usize,
    pub removed: usize,
    pub retained: usize,
}

impl StageSummary {
    fn new(stage: Stage, counts: StageCounts) -> Self {
        Self {
            stage,
            input: counts.input,
            removed: counts.removed(),
            retained: counts.retained,
        }
    }
}

/// Raw versus processed fix counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeforeAfter {
    pub raw_count: usize,
    /// After the speed filter
    pub cleaned_count: usize,
    /// After simplification
    pub processed_count: usize,
    pub retention_percent: f64,
}

/// Everything produced for one individual.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedTrajectory {
    pub individual_id: String,
    /// Present when the trajectory was built from a flat record stream
    pub temporal: Option<TemporalReport>,
    pub quality: QualityReport,
    /// Absent when spatial validation is disabled
    pub spatial: Option<SpatialReport>,
    pub speed: SpeedReport,
    pub simplify: SimplifyReport,
    pub stages: Vec<StageSummary>,
    /// Speed-filtered trajectory
    pub cleaned: Trajectory,
    /// Simplified trajectory
    pub simplified: Trajectory,
    /// Metrics of the simplified trajectory
    pub metrics: TrajectoryMetrics,
    pub before_after: BeforeAfter,
}

/// Run every stage on one trajectory.
pub fn process_trajectory(
    raw: &Trajectory,
    config: &PipelineConfig,
    geometry: &Geometry,
) -> Result<ProcessedTrajectory> {
    config.validate()?;
    let id = raw.individual_id();
    let mut stages = Vec::with_capacity(4);

    let quality = filter_quality(raw, &config.allowed_location_classes);
    stages.push(StageSummary::new(Stage::Quality, quality.report.counts));

    let (spatial_report, located) = if config.spatial_validation {
        let exclusions: Vec<&dyn PointInPolygon> =
            geometry.exclusions.iter().map(|e| e.as_ref()).collect();
        let spatial = validate_spatial(
            &quality.trajectory,
            geometry.study_area.as_deref(),
            &exclusions,
        )?;
        stages.push(StageSummary::new(Stage::Spatial, spatial.report.counts));
        (Some(spatial.report), spatial.trajectory)
    } else {
        (None, quality.trajectory)
    };

    let speed = filter_speed(&located, &config.speed_filter())?;
    stages.push(StageSummary::new(Stage::Speed, speed.report.counts));

    let simplified = simplify(&speed.trajectory, config.simplification_tolerance_m)?;
    stages.push(StageSummary::new(Stage::Simplify, simplified.report.counts));

    let metrics = compute_metrics(&simplified.trajectory)?;

    if simplified.trajectory.len() < 2 {
        warn!(
            "[Pipeline] {}: only {} fixes left after filtering",
            id,
            simplified.trajectory.len()
        );
    }

    let before_after = BeforeAfter {
        raw_count: raw.len(),
        cleaned_count: speed.trajectory.len(),
        processed_count: simplified.trajectory.len(),
        retention_percent: StageCounts::new(raw.len(), simplified.trajectory.len())
            .retention_percent(),
    };

    info!(
        "[Pipeline] {}: {} raw -> {} cleaned -> {} simplified fixes",
        id, before_after.raw_count, before_after.cleaned_count, before_after.processed_count
    );

    Ok(ProcessedTrajectory {
        individual_id: id.to_string(),
        temporal: None,
        quality: quality.report,
        spatial: spatial_report,
        speed: speed.report,
        simplify: simplified.report,
        stages,
        cleaned: speed.trajectory,
        simplified: simplified.trajectory,
        metrics,
        before_after,
    })
}

/// Group a flat record stream by individual, normalize each group and run the
/// stages. Results are ordered by individual id.
pub fn process_individuals(
    fixes: Vec<Fix>,
    config: &PipelineConfig,
    geometry: &Geometry,
) -> Result<Vec<ProcessedTrajectory>> {
    config.validate()?;
    let start = std::time::Instant::now();
    let fix_count = fixes.len();
    let groups = group_by_individual(fixes, &config.temporal);

    let run = |(trajectory, temporal): &(Trajectory, TemporalReport)| {
        process_trajectory(trajectory, config, geometry).map(|mut processed| {
            processed.temporal = Some(temporal.clone());
            processed
        })
    };

    #[cfg(feature = "parallel")]
    let processed: Result<Vec<ProcessedTrajectory>> = {
        use rayon::prelude::*;
        groups.par_iter().map(run).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let processed: Result<Vec<ProcessedTrajectory>> = groups.iter().map(run).collect();

    let processed = processed?;

    info!(
        "[Pipeline] Processed {} fixes from {} individuals in {}ms",
        fix_count,
        processed.len(),
        start.elapsed().as_millis()
    );

    Ok(processed)
}

/// Totals across individuals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    pub individuals: usize,
    pub raw_fixes: usize,
    pub duplicates_removed: usize,
    /// Per-stage counts summed over individuals, in stage order
    pub stages: Vec<StageSummary>,
    pub class_counts: BTreeMap<String, usize>,
    pub outside_study_area: usize,
    pub inside_exclusion: usize,
    pub speed_violations: usize,
    pub max_speed_detected_kmh: f64,
    pub residual_violations: usize,
    pub cleaned_fixes: usize,
    pub processed_fixes: usize,
    pub retention_percent: f64,
    pub total_distance_km: f64,
    /// Mean over individuals with a defined value
    pub mean_straightness: Option<f64>,
    pub mean_interval_hours: Option<f64>,
}

/// Sum the per-individual reports.
pub fn summarize(processed: &[ProcessedTrajectory]) -> CohortSummary {
    let mut stages: BTreeMap<Stage, StageSummary> = BTreeMap::new();
    let mut class_counts: BTreeMap<String, usize> = BTreeMap::new();

    for p in processed {
        for s in &p.stages {
            let total = stages.entry(s.stage).or_insert(StageSummary {
                stage: s.stage,
                input: 0,
                removed: 0,
                retained: 0,
            });
            total.input += s.input;
            total.removed += s.removed;
            total.retained += s.retained;
        }
        for (class, count) in &p.quality.class_counts {
            *class_counts.entry(class.clone()).or_default() += count;
        }
    }

    let raw_fixes: usize = processed.iter().map(|p| p.before_after.raw_count).sum();
    let processed_fixes: usize = processed.iter().map(|p| p.before_after.processed_count).sum();
    let straightness: Vec<f64> = processed.iter().filter_map(|p| p.metrics.straightness).collect();
    let intervals: Vec<f64> = processed
        .iter()
        .filter_map(|p| p.temporal.as_ref().and_then(|t| t.mean_interval_hours))
        .collect();

    CohortSummary {
        individuals: processed.len(),
        raw_fixes,
        duplicates_removed: processed
            .iter()
            .filter_map(|p| p.temporal.as_ref())
            .map(|t| t.duplicates_removed)
            .sum(),
        stages: stages.into_values().collect(),
        class_counts,
        outside_study_area: processed
            .iter()
            .filter_map(|p| p.spatial.as_ref())
            .map(|s| s.outside_study_area)
            .sum(),
        inside_exclusion: processed
            .iter()
            .filter_map(|p| p.spatial.as_ref())
            .map(|s| s.inside_exclusion)
            .sum(),
        speed_violations: processed.iter().map(|p| p.speed.initial_violations).sum(),
        max_speed_detected_kmh: processed
            .iter()
            .map(|p| p.speed.max_speed_detected_kmh)
            .fold(0.0, f64::max),
        residual_violations: processed
            .iter()
            .filter(|p| p.speed.residual_violation)
            .count(),
        cleaned_fixes: processed.iter().map(|p| p.before_after.cleaned_count).sum(),
        processed_fixes,
        retention_percent: StageCounts::new(raw_fixes, processed_fixes).retention_percent(),
        total_distance_km: processed
            .iter()
            .map(|p| p.metrics.total_distance_m / 1000.0)
            .sum(),
        mean_straightness: mean(&straightness),
        mean_interval_hours: mean(&intervals),
    }
}

fn pooled_points(processed: &[ProcessedTrajectory]) -> Vec<GpsPoint> {
    processed
        .iter()
        .flat_map(|p| p.simplified.fixes().iter().map(Fix::point))
        .collect()
}

/// Density of every simplified fix across the cohort.
pub fn cohort_density(
    processed: &[ProcessedTrajectory],
    config: &PipelineConfig,
) -> Result<DensityGrid> {
    let points = pooled_points(processed);
    if points.is_empty() {
        return Err(TrackError::invalid_parameter(
            "points",
            "no fixes survived processing",
        ));
    }
    estimate_density(&points, &config.density())
}

/// Hotspot fixes across the cohort at `config.hotspot_percentile`.
pub fn cohort_hotspots(
    processed: &[ProcessedTrajectory],
    config: &PipelineConfig,
) -> Result<HotspotReport> {
    let fixes: Vec<Fix> = processed
        .iter()
        .flat_map(|p| p.simplified.fixes().iter().cloned())
        .collect();
    identify_hotspots(&fixes, &config.density(), config.hotspot_percentile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bounds, Region};
    use chrono::{Duration, TimeZone, Utc};

    fn fixes_for(id: &str, n: usize, lat0: f64) -> Vec<Fix> {
        let t0 = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let class = if i % 5 == 4 { "A" } else { "2" };
                let wiggle = if i % 2 == 0 { 0.01 } else { -0.01 };
                Fix::new(
                    id,
                    t0 + Duration::hours(3 * i as i64),
                    lat0 + wiggle,
                    -85.0 + i as f64 * 0.05,
                    class,
                )
            })
            .collect()
    }

    fn study_geometry() -> Geometry {
        Geometry::new().with_study_area(Bounds::EASTERN_TROPICAL_PACIFIC)
    }

    #[test]
    fn test_stage_order_and_counts() {
        let mut fixes = fixes_for("a", 20, 8.0);
        // One fix far outside the study box, one speed outlier
        fixes[6].latitude = 20.0;
        fixes[10].latitude = 11.0;
        let raw = Trajectory::new("a", fixes);

        let out = process_trajectory(&raw, &PipelineConfig::default(), &study_geometry()).unwrap();
        let order: Vec<Stage> = out.stages.iter().map(|s| s.stage).collect();
        assert_eq!(
            order,
            vec![Stage::Quality, Stage::Spatial, Stage::Speed, Stage::Simplify]
        );
        for pair in out.stages.windows(2) {
            assert_eq!(pair[0].retained, pair[1].input);
        }
        assert_eq!(out.stages[0].removed, 4);
        assert_eq!(out.spatial.as_ref().unwrap().outside_study_area, 1);
        assert!(out.speed.removed.iter().any(|f| f.latitude == 11.0));
        assert_eq!(out.before_after.raw_count, 20);
        assert_eq!(out.before_after.processed_count, out.simplified.len());
        assert_eq!(out.metrics.fix_count, out.simplified.len());
    }

    #[test]
    fn test_missing_study_area() {
        let raw = Trajectory::new("a", fixes_for("a", 5, 8.0));
        let result = process_trajectory(&raw, &PipelineConfig::default(), &Geometry::new());
        assert!(matches!(result, Err(TrackError::MissingGeometry { .. })));

        let config = PipelineConfig {
            spatial_validation: false,
            ..PipelineConfig::default()
        };
        let out = process_trajectory(&raw, &config, &Geometry::new()).unwrap();
        assert!(out.spatial.is_none());
        assert_eq!(out.stages.len(), 3);
    }

    #[test]
    fn test_exclusions_applied() {
        let land = Region::polygon(vec![
            GpsPoint::new(7.5, -84.9),
            GpsPoint::new(7.5, -84.6),
            GpsPoint::new(8.5, -84.6),
            GpsPoint::new(8.5, -84.9),
        ])
        .unwrap();
        let geometry = study_geometry().with_exclusion(land);
        let raw = Trajectory::new("a", fixes_for("a", 20, 8.0));
        let out = process_trajectory(&raw, &PipelineConfig::default(), &geometry).unwrap();
        assert!(out.spatial.unwrap().inside_exclusion > 0);
    }

    #[test]
    fn test_process_individuals_and_summary() {
        let mut fixes = fixes_for("b", 15, 9.0);
        fixes.extend(fixes_for("a", 12, 8.0));
        // Duplicate timestamp for "a"
        fixes.push(fixes_for("a", 1, 8.5).remove(0));

        let processed =
            process_individuals(fixes, &PipelineConfig::default(), &study_geometry()).unwrap();
        assert_eq!(processed.len(), 2);
        assert_eq!(processed[0].individual_id, "a");
        assert_eq!(processed[0].temporal.as_ref().unwrap().duplicates_removed, 1);

        let summary = summarize(&processed);
        assert_eq!(summary.individuals, 2);
        assert_eq!(summary.raw_fixes, 27);
        assert_eq!(summary.duplicates_removed, 1);
        assert_eq!(summary.stages.len(), 4);
        assert_eq!(summary.stages[0].stage, Stage::Quality);
        assert_eq!(summary.stages[0].input, 27);
        assert_eq!(summary.class_counts["A"], 5);
        assert_eq!(
            summary.processed_fixes,
            processed.iter().map(|p| p.simplified.len()).sum::<usize>()
        );
    }

    #[test]
    fn test_cohort_density_and_hotspots() {
        let mut fixes = fixes_for("a", 30, 8.0);
        fixes.extend(fixes_for("b", 30, 9.0));
        let config = PipelineConfig {
            density_grid_resolution: 25,
            simplification_tolerance_m: 100.0,
            ..PipelineConfig::default()
        };
        let processed = process_individuals(fixes, &config, &study_geometry()).unwrap();

        let grid = cohort_density(&processed, &config).unwrap();
        assert_eq!(grid.values.len(), 625);
        assert!(grid.max_value() > 0.0);

        let hotspots = cohort_hotspots(&processed, &config).unwrap();
        assert!(hotspots.hotspot_count > 0);

        assert!(cohort_density(&[], &config).is_err());
    }
}
