//! Speed-coherence filtering.
//!
//! Removes fixes that imply a travel speed above a biological ceiling. One fix
//! is removed per pass, chosen by the net number of violations its removal
//! clears: violating steps it touches, less one if the step that would join
//! its neighbors still violates. Ties go to the fix touching more violating
//! steps, then the higher mean violating speed, then the earliest. After each
//! removal only the merged step is recomputed.
//!
//! The loop ends when no step exceeds the ceiling, when two fixes remain, or
//! when the optional pass cap is reached. Each pass removes exactly one fix, so
//! at most `n - 2` passes run.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::geo_utils::haversine_distance;
use crate::{Filtered, Fix, StageCounts, Trajectory};

/// Configuration for the speed filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedFilterConfig {
    /// Maximum plausible travel speed in km/h.
    /// Default: 30.0
    pub max_speed_kmh: f64,
    /// Upper bound on removal passes.
    /// Default: None (bounded by the trajectory length)
    pub max_passes: Option<usize>,
}

impl Default for SpeedFilterConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh: 30.0,
            max_passes: None,
        }
    }
}

impl SpeedFilterConfig {
    pub fn new(max_speed_kmh: f64) -> Self {
        Self {
            max_speed_kmh,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_speed_kmh.is_finite() || self.max_speed_kmh <= 0.0 {
            return Err(TrackError::invalid_parameter(
                "max_speed_kmh",
                format!("must be a positive number, got {}", self.max_speed_kmh),
            ));
        }
        Ok(())
    }
}

/// Outcome of the speed filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedReport {
    pub counts: StageCounts,
    /// Removal passes performed
    pub passes: usize,
    /// Violating steps in the input
    pub initial_violations: usize,
    /// Largest finite step speed in the input (0 when there is none)
    pub max_speed_detected_kmh: f64,
    /// Removed fixes, in removal order
    pub removed: Vec<Fix>,
    /// Two fixes remain and their step still exceeds the ceiling
    pub residual_violation: bool,
    /// Stopped because `max_passes` was reached while violations remained
    pub pass_cap_reached: bool,
}

/// Speed implied by travelling from `from` to `to`, in km/h.
///
/// A non-positive elapsed time yields `f64::INFINITY`, so such a pair always
/// violates a finite ceiling.
pub fn implied_speed_kmh(from: &Fix, to: &Fix) -> f64 {
    let elapsed_s = (to.timestamp - from.timestamp).num_milliseconds() as f64 / 1000.0;
    if elapsed_s <= 0.0 {
        return f64::INFINITY;
    }
    let km = haversine_distance(&from.point(), &to.point()) / 1000.0;
    km / (elapsed_s / 3600.0)
}

/// Remove fixes implying speeds above `config.max_speed_kmh`.
pub fn filter_speed(
    trajectory: &Trajectory,
    config: &SpeedFilterConfig,
) -> Result<Filtered<SpeedReport>> {
    config.validate()?;
    trajectory.validate_coordinates()?;

    let fixes = trajectory.fixes();
    let max_speed = config.max_speed_kmh;

    // Positions still in play and the speed of each step between neighbors
    let mut kept: Vec<usize> = (0..fixes.len()).collect();
    let mut speeds: Vec<f64> = kept
        .windows(2)
        .map(|w| implied_speed_kmh(&fixes[w[0]], &fixes[w[1]]))
        .collect();

    let initial_violations = speeds.iter().filter(|&&s| s > max_speed).count();
    let max_speed_detected_kmh = speeds
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(0.0, f64::max);

    let mut removed = Vec::new();
    let mut passes = 0;
    let mut pass_cap_reached = false;

    loop {
        let merged = |pos: usize| implied_speed_kmh(&fixes[kept[pos - 1]], &fixes[kept[pos + 1]]);
        let Some(pos) = worst_offender(&speeds, merged, max_speed) else {
            break;
        };
        if kept.len() <= 2 {
            break;
        }
        if config.max_passes.is_some_and(|cap| passes >= cap) {
            pass_cap_reached = true;
            break;
        }

        let last_pos = speeds.len();
        let fix_idx = kept.remove(pos);
        if pos == 0 {
            speeds.remove(0);
        } else if pos == last_pos {
            speeds.pop();
        } else {
            speeds.remove(pos);
            speeds[pos - 1] = implied_speed_kmh(&fixes[kept[pos - 1]], &fixes[kept[pos]]);
        }

        debug!(
            "[SpeedFilter] {}: removed fix at {} ({:.4}, {:.4})",
            trajectory.individual_id(),
            fixes[fix_idx].timestamp,
            fixes[fix_idx].latitude,
            fixes[fix_idx].longitude
        );
        removed.push(fixes[fix_idx].clone());
        passes += 1;
    }

    let still_violating = speeds.iter().any(|&s| s > max_speed);
    let residual_violation = still_violating && kept.len() <= 2;

    if residual_violation {
        warn!(
            "[SpeedFilter] {}: two fixes remain at {:.1} km/h, above the {:.1} km/h ceiling",
            trajectory.individual_id(),
            speeds.first().copied().unwrap_or(0.0),
            max_speed
        );
    }
    if pass_cap_reached {
        warn!(
            "[SpeedFilter] {}: stopped after {} passes with violations remaining",
            trajectory.individual_id(),
            passes
        );
    }

    let filtered = trajectory.select(kept);
    let counts = StageCounts::new(trajectory.len(), filtered.len());

    info!(
        "[SpeedFilter] {}: {} initial violations, removed {} fixes in {} passes (max {:.1} km/h)",
        trajectory.individual_id(),
        initial_violations,
        counts.removed(),
        passes,
        max_speed_detected_kmh
    );

    Ok(Filtered {
        trajectory: filtered,
        report: SpeedReport {
            counts,
            passes,
            initial_violations,
            max_speed_detected_kmh,
            removed,
            residual_violation,
            pass_cap_reached,
        },
    })
}

/// Position (into the kept list) of the fix to remove next, if any step violates.
///
/// Fix `p` touches step `p - 1` (incoming) and step `p` (outgoing). For an
/// interior fix, `merged(p)` is the speed of the step that would replace both.
fn worst_offender(
    speeds: &[f64],
    merged: impl Fn(usize) -> f64,
    max_speed: f64,
) -> Option<usize> {
    // (pos, net cleared, violating steps touched, mean violating speed)
    let mut best: Option<(usize, usize, usize, f64)> = None;

    for pos in 0..=speeds.len() {
        let incoming = pos.checked_sub(1).and_then(|i| speeds.get(i));
        let outgoing = speeds.get(pos);

        let violating: Vec<f64> = incoming
            .into_iter()
            .chain(outgoing)
            .copied()
            .filter(|&s| s > max_speed)
            .collect();
        if violating.is_empty() {
            continue;
        }

        let count = violating.len();
        let mean = violating.iter().sum::<f64>() / count as f64;
        let interior = incoming.is_some() && outgoing.is_some();
        let net = if interior && merged(pos) > max_speed {
            count - 1
        } else {
            count
        };

        let better = match best {
            None => true,
            Some((_, best_net, best_count, best_mean)) => {
                (net, count) > (best_net, best_count)
                    || ((net, count) == (best_net, best_count) && mean > best_mean)
            }
        };
        if better {
            best = Some((pos, net, count, mean));
        }
    }

    best.map(|(pos, _, _, _)| pos)
}
