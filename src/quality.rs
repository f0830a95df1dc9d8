//! Argos location-class filtering.
//!
//! Argos grades each fix with a location class. The grades are configuration,
//! not hard-coded: a [`LocationClassRanking`] orders the symbols from worst to
//! best and turns a "minimum acceptable class" into an [`AllowedClasses`] set.
//!
//! ## Example
//! ```rust
//! use turtle_track::quality::LocationClassRanking;
//!
//! let ranking = LocationClassRanking::argos();
//! let allowed = ranking.allowed_at_or_above("1").unwrap();
//! assert!(allowed.contains("2"));
//! assert!(!allowed.contains("A"));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::{Filtered, StageCounts, Trajectory};

/// Standard Argos location classes, worst to best.
pub const ARGOS_CLASSES: &[&str] = &["Z", "B", "A", "0", "1", "2", "3"];

/// Ordered list of location-class symbols, worst first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationClassRanking {
    classes: Vec<String>,
}

impl LocationClassRanking {
    /// Build a ranking from symbols ordered worst to best.
    pub fn new<S: AsRef<str>>(worst_to_best: &[S]) -> Result<Self> {
        let classes: Vec<String> = worst_to_best
            .iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        if classes.is_empty() {
            return Err(TrackError::invalid_parameter(
                "location_class_ranking",
                "at least one class is required",
            ));
        }
        let unique: BTreeSet<&String> = classes.iter().collect();
        if unique.len() != classes.len() {
            return Err(TrackError::invalid_parameter(
                "location_class_ranking",
                "class symbols must be unique",
            ));
        }
        Ok(Self { classes })
    }

    /// The Argos ranking `Z < B < A < 0 < 1 < 2 < 3`.
    pub fn argos() -> Self {
        Self {
            classes: ARGOS_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Position of a class in the ranking (0 = worst).
    pub fn rank(&self, class: &str) -> Option<usize> {
        self.classes.iter().position(|c| c == class)
    }

    /// Every class at least as good as `minimum`.
    pub fn allowed_at_or_above(&self, minimum: &str) -> Result<AllowedClasses> {
        let start = self.rank(minimum).ok_or_else(|| {
            TrackError::invalid_parameter(
                "minimum_location_class",
                format!("'{}' is not part of the ranking {:?}", minimum, self.classes),
            )
        })?;
        Ok(AllowedClasses::new(self.classes[start..].iter().cloned()))
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl Default for LocationClassRanking {
    fn default() -> Self {
        Self::argos()
    }
}

/// Set of location classes a fix may carry to be retained.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowedClasses(BTreeSet<String>);

impl AllowedClasses {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(classes.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, class: &str) -> bool {
        self.0.contains(class)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

/// Outcome of the location-class filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub counts: StageCounts,
    /// Input fixes per location class (before filtering)
    pub class_counts: BTreeMap<String, usize>,
}

/// Keep the fixes whose location class is in `allowed`.
///
/// Order is preserved and no other field is inspected. An empty result is a
/// valid outcome.
pub fn filter_quality(trajectory: &Trajectory, allowed: &AllowedClasses) -> Filtered<QualityReport> {
    let mut class_counts: BTreeMap<String, usize> = BTreeMap::new();
    for fix in trajectory.fixes() {
        *class_counts.entry(fix.location_class.clone()).or_default() += 1;
    }

    let kept: Vec<usize> = trajectory
        .fixes()
        .iter()
        .enumerate()
        .filter(|(_, f)| allowed.contains(&f.location_class))
        .map(|(i, _)| i)
        .collect();

    let filtered = trajectory.select(kept);
    let counts = StageCounts::new(trajectory.len(), filtered.len());

    info!(
        "[Quality] {}: retained {}/{} fixes ({:.1}%)",
        trajectory.individual_id(),
        counts.retained,
        counts.input,
        counts.retention_percent()
    );

    Filtered {
        trajectory: filtered,
        report: QualityReport {
            counts,
            class_counts,
        },
    }
}
