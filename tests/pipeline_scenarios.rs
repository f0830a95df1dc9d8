//! End-to-end scenarios for the telemetry pipeline.
//!
//! Exercises the public API the way a batch job would: raw fixes in, cleaned
//! and simplified trajectories, metrics and a density surface out.
//!
//! Run with: `cargo test --test pipeline_scenarios`
//! Add `-- --nocapture` and `RUST_LOG=debug` to see per-stage logging.

use chrono::{DateTime, Duration, TimeZone, Utc};
use turtle_track::{
    compute_metrics, filter_quality, filter_speed, process_individuals, simplify, summarize,
    validate_spatial, AllowedClasses, Bounds, ExclusionSet, Fix, Geometry, GpsPoint,
    PipelineConfig, PointInPolygon, Region, SpeedFilterConfig, Trajectory, TrackError,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap()
}

/// Hourly fixes at the given (lat, lon) positions.
fn hourly(id: &str, points: &[(f64, f64)]) -> Trajectory {
    let fixes = points
        .iter()
        .enumerate()
        .map(|(i, (lat, lng))| Fix::new(id, t0() + Duration::hours(i as i64), *lat, *lng, "2"))
        .collect();
    Trajectory::new(id, fixes)
}

/// A turtle foraging along the Gulf of Panama shelf: slow meanders with a few
/// bad Argos fixes thrown in.
fn foraging_fixes(id: &str, n: usize, lat0: f64, seed: u64) -> Vec<Fix> {
    let mut state = seed.max(1);
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state % 1_000_000) as f64 / 1_000_000.0
    };

    let classes = ["3", "2", "1", "0", "A", "B", "Z"];
    (0..n)
        .map(|i| {
            let class = classes[(next() * classes.len() as f64) as usize % classes.len()];
            let mut lat = lat0 + 0.08 * (i as f64 * 0.3).sin() + 0.01 * next();
            let lng = -80.5 + 0.015 * i as f64 + 0.01 * next();
            if next() < 0.05 {
                // Argos outlier
                lat += 1.5;
            }
            Fix::new(id, t0() + Duration::hours(4 * i as i64), lat, lng, class)
                .with_extra("satellite", "NK")
        })
        .collect()
}

fn is_subsequence(sub: &Trajectory, of: &Trajectory) -> bool {
    let mut it = of.fixes().iter();
    sub.fixes().iter().all(|f| it.any(|g| g == f))
}

// ============================================================================
// Concrete scenarios
// ============================================================================

#[test]
fn collinear_fixes_simplify_to_endpoints() {
    init_logging();
    let traj = hourly("s1", &[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)]);
    let out = simplify(&traj, 1.0).unwrap();
    let kept: Vec<GpsPoint> = out.trajectory.points();
    assert_eq!(kept, vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 2.0)]);
}

#[test]
fn speed_filter_removes_middle_and_rechecks_remaining_pair() {
    init_logging();
    let traj = hourly("s2", &[(0.0, 0.0), (0.0, 0.5), (0.0, 1.0)]);
    let out = filter_speed(&traj, &SpeedFilterConfig::new(20.0)).unwrap();

    assert_eq!(out.trajectory.len(), 2);
    assert_eq!(out.report.removed.len(), 1);
    assert_eq!(out.report.removed[0].longitude, 0.5);
    // ~111 km over 2 h remains above 20 km/h and is flagged
    assert!(out.report.residual_violation);
}

#[test]
fn quality_filter_drops_disallowed_class() {
    init_logging();
    let fixes = vec![
        Fix::new("s3", t0(), 0.0, 0.0, "LC-Z"),
        Fix::new("s3", t0() + Duration::hours(1), 0.1, 0.0, "LC1"),
        Fix::new("s3", t0() + Duration::hours(2), 0.2, 0.0, "LC3"),
        Fix::new("s3", t0() + Duration::hours(3), 0.3, 0.0, "LC-B"),
    ];
    let traj = Trajectory::new("s3", fixes);
    let allowed = AllowedClasses::new(["LC1", "LC2", "LC3"]);

    let out = filter_quality(&traj, &allowed);
    assert_eq!(out.trajectory.len(), traj.len() - 2);
    assert!(out
        .trajectory
        .fixes()
        .iter()
        .all(|f| f.location_class != "LC-Z"));
}

#[test]
fn straightness_of_straight_and_returning_paths() {
    init_logging();
    let straight = hourly("s4", &[(0.0, 0.0), (0.5, 0.0), (1.0, 0.0)]);
    let m = compute_metrics(&straight).unwrap();
    assert!((m.straightness.unwrap() - 1.0).abs() < 1e-9);

    let round_trip = hourly("s4", &[(8.0, -80.0), (8.1, -79.9), (8.0, -80.0)]);
    let m = compute_metrics(&round_trip).unwrap();
    assert_eq!(m.net_displacement_m, 0.0);
    assert!(m.straightness.is_none());
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn filters_are_idempotent() {
    init_logging();
    let traj = Trajectory::new("p1", foraging_fixes("p1", 80, 8.2, 7));
    let allowed = AllowedClasses::new(["1", "2", "3"]);

    let once = filter_quality(&traj, &allowed);
    let twice = filter_quality(&once.trajectory, &allowed);
    assert_eq!(once.trajectory, twice.trajectory);

    let study = Bounds::new(7.0, 9.0, -81.0, -79.0);
    let once = validate_spatial(&traj, Some(&study), &[]).unwrap();
    let twice = validate_spatial(&once.trajectory, Some(&study), &[]).unwrap();
    assert_eq!(once.trajectory, twice.trajectory);
}

#[test]
fn simplifier_is_monotonic_and_keeps_endpoints() {
    init_logging();
    let traj = Trajectory::new("p2", foraging_fixes("p2", 120, 8.0, 11));
    let cleaned = filter_speed(&traj, &SpeedFilterConfig::default())
        .unwrap()
        .trajectory;

    let mut last_len = usize::MAX;
    let mut max_dev = 0.0;
    for tol in [50.0, 200.0, 1_000.0, 5_000.0, 20_000.0] {
        let out = simplify(&cleaned, tol).unwrap();
        assert!(out.trajectory.len() <= last_len);
        assert_eq!(out.trajectory.first(), cleaned.first());
        assert_eq!(out.trajectory.last(), cleaned.last());
        assert!(is_subsequence(&out.trajectory, &cleaned));
        last_len = out.trajectory.len();
        max_dev = out.report.max_deviation_m;
    }

    let out = simplify(&cleaned, max_dev + 1.0).unwrap();
    assert_eq!(out.trajectory.len(), 2);
}

#[test]
fn speed_filter_converges() {
    init_logging();
    for seed in 1..6 {
        let traj = Trajectory::new("p3", foraging_fixes("p3", 60, 8.0, seed));
        let config = SpeedFilterConfig::new(10.0);
        let out = filter_speed(&traj, &config).unwrap();

        let ok = out.trajectory.len() <= 2
            || out
                .trajectory
                .fixes()
                .windows(2)
                .all(|w| turtle_track::algorithms::implied_speed_kmh(&w[0], &w[1]) <= 10.0);
        assert!(ok, "seed {seed} did not converge");
        assert!(is_subsequence(&out.trajectory, &traj));
    }
}

// ============================================================================
// Full pipeline
// ============================================================================

/// Simple square "island" used as a land mask.
fn island(lat: f64, lng: f64, half: f64) -> Region {
    Region::polygon(vec![
        GpsPoint::new(lat - half, lng - half),
        GpsPoint::new(lat - half, lng + half),
        GpsPoint::new(lat + half, lng + half),
        GpsPoint::new(lat + half, lng - half),
    ])
    .unwrap()
}

#[test]
fn cohort_pipeline_end_to_end() {
    init_logging();
    let mut fixes = foraging_fixes("241136", 150, 8.0, 3);
    fixes.extend(foraging_fixes("241137", 90, 8.6, 5));
    fixes.extend(foraging_fixes("241138", 40, 7.6, 9));

    let land = ExclusionSet::new(vec![island(8.0, -80.0, 0.05), island(8.6, -79.5, 0.05)]);
    assert!(land.contains(8.0, -80.0));

    let geometry = Geometry::new()
        .with_study_area(Bounds::EASTERN_TROPICAL_PACIFIC)
        .with_exclusion(land);
    let config = PipelineConfig {
        density_grid_resolution: 40,
        ..PipelineConfig::default()
    };

    let processed = process_individuals(fixes, &config, &geometry).unwrap();
    assert_eq!(processed.len(), 3);
    assert_eq!(processed[0].individual_id, "241136");

    for p in &processed {
        // Every stage output is a subsequence of its input
        assert!(p.before_after.processed_count <= p.before_after.cleaned_count);
        assert!(p.before_after.cleaned_count <= p.before_after.raw_count);
        assert!(is_subsequence(&p.simplified, &p.cleaned));
        assert!(p
            .simplified
            .fixes()
            .iter()
            .all(|f| config.allowed_location_classes.contains(&f.location_class)));
        // Extras pass through
        assert!(p
            .simplified
            .fixes()
            .iter()
            .all(|f| f.extras.get("satellite").map(String::as_str) == Some("NK")));
        assert_eq!(p.metrics.fix_count, p.simplified.len());
    }

    let summary = summarize(&processed);
    assert_eq!(summary.individuals, 3);
    assert_eq!(summary.raw_fixes, 280);
    assert_eq!(
        summary.class_counts.values().sum::<usize>(),
        summary.raw_fixes
    );
    assert!(summary.retention_percent > 0.0 && summary.retention_percent < 100.0);

    let grid = turtle_track::cohort_density(&processed, &config).unwrap();
    assert_eq!(grid.values.len(), 1600);
    assert!(grid.values.iter().all(|v| *v >= 0.0));

    let json = serde_json::to_string(&summary).unwrap();
    assert!(json.contains("\"raw_fixes\":280"));
}

#[test]
fn misconfiguration_is_reported() {
    init_logging();
    let fixes = foraging_fixes("e1", 10, 8.0, 2);

    let no_area = process_individuals(fixes.clone(), &PipelineConfig::default(), &Geometry::new());
    assert!(matches!(no_area, Err(TrackError::MissingGeometry { .. })));

    let bad = PipelineConfig {
        simplification_tolerance_m: 0.0,
        ..PipelineConfig::default()
    };
    let geometry = Geometry::new().with_study_area(Bounds::EASTERN_TROPICAL_PACIFIC);
    assert!(matches!(
        process_individuals(fixes, &bad, &geometry),
        Err(TrackError::InvalidParameter { .. })
    ));
}

#[test]
fn filtered_to_nothing_is_not_an_error() {
    init_logging();
    let fixes: Vec<Fix> = (0..5)
        .map(|i| Fix::new("e2", t0() + Duration::hours(i), 8.0, -80.0, "Z"))
        .collect();
    let geometry = Geometry::new().with_study_area(Bounds::EASTERN_TROPICAL_PACIFIC);
    let processed = process_individuals(fixes, &PipelineConfig::default(), &geometry).unwrap();

    let p = &processed[0];
    assert!(p.simplified.is_empty());
    assert!(p.metrics.straightness.is_none());
    assert!(p.metrics.mean_step_speed_kmh.is_none());
    assert_eq!(p.before_after.retention_percent, 0.0);
}
