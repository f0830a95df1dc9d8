//! Spatial validation of fixes against a study area and exclusion polygons.
//!
//! The validator only depends on the [`PointInPolygon`] capability, so it can be
//! driven by real coastline data, a plain bounding box, or synthetic shapes in
//! tests. Polygon containment is planar in longitude/latitude, which is adequate
//! at coastal tracking scales.
//!
//! Points exactly on an edge or vertex (including the edge of a hole) are
//! treated as inside.

use geo::{Coord, Intersects, LineString, MultiPolygon, Polygon};
use log::{debug, info};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result, TrackError};
use crate::{Bounds, Filtered, GpsPoint, StageCounts, Trajectory};

/// Point-in-polygon query used by the spatial validator.
pub trait PointInPolygon: Send + Sync {
    /// True when the coordinate lies inside or on the boundary of the shape.
    fn contains(&self, latitude: f64, longitude: f64) -> bool;
}

impl PointInPolygon for Bounds {
    fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.contains_point(latitude, longitude)
    }
}

/// A closed vertex ring. Inner rings cut holes into the outer ring enclosing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    pub vertices: Vec<GpsPoint>,
    pub inner: bool,
}

impl Ring {
    pub fn outer(vertices: Vec<GpsPoint>) -> Self {
        Self {
            vertices,
            inner: false,
        }
    }

    pub fn inner(vertices: Vec<GpsPoint>) -> Self {
        Self {
            vertices,
            inner: true,
        }
    }

    fn to_line_string(&self) -> Result<LineString<f64>> {
        for v in &self.vertices {
            v.validate()?;
        }

        let mut distinct = self.vertices.len();
        if distinct > 1 && self.vertices.first() == self.vertices.last() {
            distinct -= 1;
        }
        if distinct < 3 {
            return Err(TrackError::invalid_parameter(
                "ring",
                format!("a ring needs at least 3 distinct vertices, got {}", distinct),
            ));
        }

        let coords: Vec<Coord<f64>> = self
            .vertices
            .iter()
            .map(|p| Coord {
                x: p.longitude,
                y: p.latitude,
            })
            .collect();
        Ok(LineString::new(coords))
    }
}

/// One or more polygons (with optional holes) built from vertex rings.
#[derive(Debug, Clone)]
pub struct Region {
    shape: MultiPolygon<f64>,
    bounds: Bounds,
}

impl Region {
    /// Build a region from rings.
    ///
    /// Each outer ring becomes a polygon. Each inner ring becomes a hole of the
    /// first outer ring that encloses its first vertex.
    pub fn from_rings(rings: Vec<Ring>) -> Result<Self> {
        let mut exteriors: Vec<LineString<f64>> = Vec::new();
        let mut holes: Vec<LineString<f64>> = Vec::new();
        let mut all_points: Vec<GpsPoint> = Vec::new();

        for ring in &rings {
            let line = ring.to_line_string()?;
            if ring.inner {
                holes.push(line);
            } else {
                all_points.extend_from_slice(&ring.vertices);
                exteriors.push(line);
            }
        }

        if exteriors.is_empty() {
            return Err(TrackError::invalid_parameter(
                "rings",
                "a region needs at least one outer ring",
            ));
        }

        let mut interiors: Vec<Vec<LineString<f64>>> = vec![Vec::new(); exteriors.len()];
        for hole in holes {
            let anchor = hole.0[0];
            let owner = exteriors
                .iter()
                .position(|ext| Polygon::new(ext.clone(), vec![]).intersects(&anchor))
                .ok_or_invalid_parameter("rings", "inner ring is not enclosed by any outer ring")?;
            interiors[owner].push(hole);
        }

        let polygons: Vec<Polygon<f64>> = exteriors
            .into_iter()
            .zip(interiors)
            .map(|(ext, ints)| Polygon::new(ext, ints))
            .collect();

        let bounds = Bounds::from_points(&all_points)
            .ok_or_invalid_parameter("rings", "a region needs at least one vertex")?;

        Ok(Self {
            shape: MultiPolygon::new(polygons),
            bounds,
        })
    }

    /// A simple polygon without holes.
    pub fn polygon(vertices: Vec<GpsPoint>) -> Result<Self> {
        Self::from_rings(vec![Ring::outer(vertices)])
    }

    /// Bounding box of the outer rings.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Number of outer polygons.
    pub fn polygon_count(&self) -> usize {
        self.shape.0.len()
    }
}

impl PointInPolygon for Region {
    fn contains(&self, latitude: f64, longitude: f64) -> bool {
        if !self.bounds.contains_point(latitude, longitude) {
            return false;
        }
        let coord = Coord {
            x: longitude,
            y: latitude,
        };
        self.shape.0.iter().any(|p| p.intersects(&coord))
    }
}

/// Bounding box of one region, for R-tree indexing.
#[derive(Debug, Clone)]
struct RegionEnvelope {
    idx: usize,
    bounds: Bounds,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min_lng, self.bounds.min_lat],
            [self.bounds.max_lng, self.bounds.max_lat],
        )
    }
}

/// Many exclusion regions (e.g. land polygons) behind an R-tree of their
/// bounding boxes, so each query only tests nearby regions.
pub struct ExclusionSet {
    regions: Vec<Region>,
    index: RTree<RegionEnvelope>,
}

impl ExclusionSet {
    pub fn new(regions: Vec<Region>) -> Self {
        let envelopes: Vec<RegionEnvelope> = regions
            .iter()
            .enumerate()
            .map(|(idx, r)| RegionEnvelope {
                idx,
                bounds: r.bounds(),
            })
            .collect();
        Self {
            regions,
            index: RTree::bulk_load(envelopes),
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl PointInPolygon for ExclusionSet {
    fn contains(&self, latitude: f64, longitude: f64) -> bool {
        let query = AABB::from_point([longitude, latitude]);
        self.index
            .locate_in_envelope_intersecting(&query)
            .any(|env| self.regions[env.idx].contains(latitude, longitude))
    }
}

/// Outcome of spatial validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialReport {
    pub counts: StageCounts,
    /// Fixes outside the study area
    pub outside_study_area: usize,
    /// Fixes inside the study area but within an exclusion polygon
    pub inside_exclusion: usize,
}

/// Keep fixes inside `study_area` and outside every exclusion.
///
/// Fails with [`TrackError::MissingGeometry`] when no study area is supplied
/// and with [`TrackError::InvalidCoordinate`] when a fix is out of range.
pub fn validate_spatial(
    trajectory: &Trajectory,
    study_area: Option<&dyn PointInPolygon>,
    exclusions: &[&dyn PointInPolygon],
) -> Result<Filtered<SpatialReport>> {
    let study_area =
        study_area.ok_or_missing_geometry("spatial validation requires a study-area polygon")?;
    trajectory.validate_coordinates()?;

    let mut outside_study_area = 0;
    let mut inside_exclusion = 0;
    let mut kept = Vec::with_capacity(trajectory.len());

    for (i, fix) in trajectory.fixes().iter().enumerate() {
        if !study_area.contains(fix.latitude, fix.longitude) {
            outside_study_area += 1;
            debug!(
                "[Spatial] {}: fix at ({:.4}, {:.4}) outside study area",
                trajectory.individual_id(),
                fix.latitude,
                fix.longitude
            );
        } else if exclusions
            .iter()
            .any(|e| e.contains(fix.latitude, fix.longitude))
        {
            inside_exclusion += 1;
        } else {
            kept.push(i);
        }
    }

    let filtered = trajectory.select(kept);
    let counts = StageCounts::new(trajectory.len(), filtered.len());

    info!(
        "[Spatial] {}: {} outside study area, {} excluded, {} retained",
        trajectory.individual_id(),
        outside_study_area,
        inside_exclusion,
        counts.retained
    );

    Ok(Filtered {
        trajectory: filtered,
        report: SpatialReport {
            counts,
            outside_study_area,
            inside_exclusion,
        },
    })
}
