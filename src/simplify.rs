//! Douglas-Peucker trajectory simplification in meters.
//!
//! Deviation from a chord is measured with a [`CrossTrackDistance`] metric
//! rather than on raw degrees. [`simplify`] uses [`GreatCircle`]: the
//! spherical cross-track distance to the chord's arc, falling back to the
//! nearer endpoint when the point projects outside the arc.
//!
//! The output is always a subsequence of the input that keeps the first and
//! last fix. An interior point is kept only when its deviation is strictly
//! greater than the tolerance. The split point of a segment never depends on
//! the tolerance, so a smaller tolerance keeps a superset of the fixes kept at
//! a larger one.
//!
//! ## Example
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use turtle_track::{simplify, Fix, Trajectory};
//!
//! let t0 = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
//! let fixes = (0..3)
//!     .map(|i| Fix::new("a", t0 + Duration::hours(i), 0.0, i as f64, "2"))
//!     .collect();
//! let out = simplify(&Trajectory::new("a", fixes), 1.0).unwrap();
//! assert_eq!(out.trajectory.len(), 2);
//! ```

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::geo_utils::{cross_track_distance, project_equirectangular};
use crate::{Filtered, GpsPoint, StageCounts, Trajectory};

/// Distance in meters from a point to the chord `start`→`end`.
pub trait CrossTrackDistance: Send + Sync {
    fn distance(&self, point: &GpsPoint, start: &GpsPoint, end: &GpsPoint) -> f64;
}

/// Spherical cross-track distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreatCircle;

impl CrossTrackDistance for GreatCircle {
    fn distance(&self, point: &GpsPoint, start: &GpsPoint, end: &GpsPoint) -> f64 {
        cross_track_distance(point, start, end)
    }
}

/// Planar point-to-segment distance after an equirectangular projection
/// centered on the chord midpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct Equirectangular;

impl CrossTrackDistance for Equirectangular {
    fn distance(&self, point: &GpsPoint, start: &GpsPoint, end: &GpsPoint) -> f64 {
        let origin = GpsPoint::new(
            (start.latitude + end.latitude) / 2.0,
            (start.longitude + end.longitude) / 2.0,
        );
        let (px, py) = project_equirectangular(point, &origin);
        let (ax, ay) = project_equirectangular(start, &origin);
        let (bx, by) = project_equirectangular(end, &origin);

        let dx = bx - ax;
        let dy = by - ay;
        let len_sq = dx * dx + dy * dy;
        let t = if len_sq > 0.0 {
            (((px - ax) * dx + (py - ay) * dy) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let cx = ax + t * dx;
        let cy = ay + t * dy;
        ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
    }
}

/// Outcome of simplification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifyReport {
    pub counts: StageCounts,
    pub tolerance_m: f64,
    /// Largest deviation of any interior fix from the first→last chord
    pub max_deviation_m: f64,
}

/// Simplify with great-circle cross-track distance.
pub fn simplify(trajectory: &Trajectory, tolerance_m: f64) -> Result<Filtered<SimplifyReport>> {
    simplify_with(trajectory, tolerance_m, &GreatCircle)
}

/// Simplify with a caller-supplied deviation metric.
pub fn simplify_with(
    trajectory: &Trajectory,
    tolerance_m: f64,
    metric: &dyn CrossTrackDistance,
) -> Result<Filtered<SimplifyReport>> {
    if !tolerance_m.is_finite() || tolerance_m <= 0.0 {
        return Err(TrackError::invalid_parameter(
            "tolerance_m",
            format!("must be a positive number of meters, got {}", tolerance_m),
        ));
    }
    trajectory.validate_coordinates()?;

    let points = trajectory.points();
    let n = points.len();

    let max_deviation_m = if n >= 3 {
        farthest_interior(&points, 0, n - 1, metric).map_or(0.0, |(_, d)| d)
    } else {
        0.0
    };

    let kept = if n < 3 {
        (0..n).collect()
    } else {
        douglas_peucker(&points, tolerance_m, metric)
    };

    let simplified = trajectory.select(kept);
    let counts = StageCounts::new(n, simplified.len());

    info!(
        "[Simplify] {}: {} -> {} fixes (tolerance {:.0} m, max deviation {:.0} m)",
        trajectory.individual_id(),
        n,
        counts.retained,
        tolerance_m,
        max_deviation_m
    );

    Ok(Filtered {
        trajectory: simplified,
        report: SimplifyReport {
            counts,
            tolerance_m,
            max_deviation_m,
        },
    })
}

/// Indices retained by Douglas-Peucker, ascending. Requires `points.len() >= 2`.
fn douglas_peucker(
    points: &[GpsPoint],
    tolerance_m: f64,
    metric: &dyn CrossTrackDistance,
) -> Vec<usize> {
    let last = points.len() - 1;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[last] = true;

    let mut stack = vec![(0, last)];
    while let Some((first, last)) = stack.pop() {
        if let Some((idx, deviation)) = farthest_interior(points, first, last, metric) {
            if deviation > tolerance_m {
                keep[idx] = true;
                stack.push((first, idx));
                stack.push((idx, last));
            }
        }
    }

    keep.iter()
        .enumerate()
        .filter_map(|(i, k)| k.then_some(i))
        .collect()
}

/// Interior point farthest from the chord `first`→`last` (earliest on ties).
fn farthest_interior(
    points: &[GpsPoint],
    first: usize,
    last: usize,
    metric: &dyn CrossTrackDistance,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for i in (first + 1)..last {
        let d = metric.distance(&points[i], &points[first], &points[last]);
        if best.map_or(true, |(_, bd)| d > bd) {
            best = Some((i, d));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Fix;
    use chrono::{Duration, TimeZone, Utc};

    fn track(points: &[(f64, f64)]) -> Trajectory {
        let t0 = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
        let fixes = points
            .iter()
            .enumerate()
            .map(|(i, (lat, lng))| Fix::new("t", t0 + Duration::hours(i as i64), *lat, *lng, "2"))
            .collect();
        Trajectory::new("t", fixes)
    }

    /// Zigzag along 8°N with alternating offsets of varying size.
    fn zigzag() -> Trajectory {
        let pts: Vec<(f64, f64)> = (0..25)
            .map(|i| {
                let amp = 0.002 * ((i * 7) % 11) as f64;
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                (8.0 + sign * amp, -80.0 + i as f64 * 0.03)
            })
            .collect();
        track(&pts)
    }

    #[test]
    fn test_collinear_points_collapse() {
        let traj = track(&[(0.0, 0.0), (0.0, 1.0), (0.0, 2.0)]);
        let out = simplify(&traj, 1.0).unwrap();
        let kept: Vec<(f64, f64)> = out
            .trajectory
            .fixes()
            .iter()
            .map(|f| (f.latitude, f.longitude))
            .collect();
        assert_eq!(kept, vec![(0.0, 0.0), (0.0, 2.0)]);
    }

    #[test]
    fn test_keeps_significant_corner() {
        // Right-angle turn: the corner is ~111 km from the chord's nearer end
        let traj = track(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        let out = simplify(&traj, 500.0).unwrap();
        assert_eq!(out.trajectory.len(), 3);
        assert!(out.report.max_deviation_m > 50_000.0);
    }

    #[test]
    fn test_endpoints_always_retained() {
        let traj = zigzag();
        for tol in [1.0, 100.0, 1_000.0, 1e7] {
            let out = simplify(&traj, tol).unwrap();
            assert_eq!(out.trajectory.first(), traj.first());
            assert_eq!(out.trajectory.last(), traj.last());
        }
    }

    #[test]
    fn test_monotonic_in_tolerance() {
        let traj = zigzag();
        let tolerances = [10.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0];
        let mut previous: Option<Vec<Fix>> = None;
        for tol in tolerances {
            let out = simplify(&traj, tol).unwrap().trajectory.into_fixes();
            if let Some(prev) = &previous {
                assert!(out.len() <= prev.len());
                // Everything kept at the larger tolerance was kept at the smaller one
                assert!(out.iter().all(|f| prev.contains(f)));
            }
            previous = Some(out);
        }
    }

    #[test]
    fn test_tolerance_at_max_deviation_gives_endpoints() {
        let traj = zigzag();
        let first_pass = simplify(&traj, 1.0).unwrap();
        let out = simplify(&traj, first_pass.report.max_deviation_m).unwrap();
        assert_eq!(out.trajectory.len(), 2);
    }

    #[test]
    fn test_subsequence_of_input() {
        let traj = zigzag();
        let out = simplify(&traj, 200.0).unwrap();
        let mut it = traj.fixes().iter();
        for f in out.trajectory.fixes() {
            assert!(it.any(|g| g == f));
        }
    }

    #[test]
    fn test_small_inputs_unchanged() {
        for pts in [vec![], vec![(8.0, -80.0)], vec![(8.0, -80.0), (8.1, -80.0)]] {
            let traj = track(&pts);
            let out = simplify(&traj, 500.0).unwrap();
            assert_eq!(out.trajectory, traj);
            assert_eq!(out.report.max_deviation_m, 0.0);
        }
    }

    #[test]
    fn test_invalid_tolerance() {
        let traj = zigzag();
        for tol in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                simplify(&traj, tol),
                Err(TrackError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_equirectangular_close_to_great_circle() {
        let start = GpsPoint::new(8.0, -80.0);
        let end = GpsPoint::new(8.0, -79.5);
        let point = GpsPoint::new(8.05, -79.75);
        let gc = GreatCircle.distance(&point, &start, &end);
        let eq = Equirectangular.distance(&point, &start, &end);
        assert!((gc - eq).abs() / gc < 0.01, "gc={gc} eq={eq}");

        let traj = zigzag();
        let a = simplify_with(&traj, 300.0, &Equirectangular).unwrap();
        assert!(a.trajectory.len() >= 2);
    }

    #[test]
    fn test_equirectangular_clamps_to_endpoints() {
        let start = GpsPoint::new(0.0, 0.0);
        let end = GpsPoint::new(0.0, 1.0);
        let beyond = GpsPoint::new(0.0, 2.0);
        let d = Equirectangular.distance(&beyond, &start, &end);
        assert!((d - 111_195.0).abs() < 500.0);
    }
}
