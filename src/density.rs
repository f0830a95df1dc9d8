//! Gaussian kernel density estimation over pooled fixes.
//!
//! ## Features
//! - Product-Gaussian kernel with separate latitude and longitude bandwidths
//! - Silverman's rule of thumb per axis, or a fixed bandwidth in degrees
//! - Evenly spaced `resolution × resolution` grid (endpoints included)
//! - Optional kernel cutoff backed by an R-tree
//! - Hotspot detection at a density percentile
//!
//! Values are in points per square degree. The grid only covers a finite
//! window, so kernel mass falling outside it is dropped and the grid does not
//! integrate to exactly 1. That is expected.

use std::f64::consts::PI;

use log::{debug, info};
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::metrics::{percentile, std_dev};
use crate::{Bounds, Fix, GpsPoint};

/// Kernel bandwidth.
///
/// Serialized as a number of degrees or the string `"auto"`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "BandwidthRepr", into = "BandwidthRepr")]
pub enum Bandwidth {
    /// Silverman's rule of thumb, per axis
    #[default]
    Auto,
    /// Same bandwidth (decimal degrees) on both axes
    Fixed(f64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BandwidthRepr {
    Degrees(f64),
    Keyword(String),
}

impl TryFrom<BandwidthRepr> for Bandwidth {
    type Error = TrackError;

    fn try_from(repr: BandwidthRepr) -> Result<Self> {
        let bandwidth = match repr {
            BandwidthRepr::Degrees(h) => Bandwidth::Fixed(h),
            BandwidthRepr::Keyword(s) if s.eq_ignore_ascii_case("auto") => Bandwidth::Auto,
            BandwidthRepr::Keyword(s) => {
                return Err(TrackError::invalid_parameter(
                    "density_bandwidth",
                    format!("expected a number or \"auto\", got \"{}\"", s),
                ))
            }
        };
        bandwidth.validate()?;
        Ok(bandwidth)
    }
}

impl From<Bandwidth> for BandwidthRepr {
    fn from(bandwidth: Bandwidth) -> Self {
        match bandwidth {
            Bandwidth::Auto => BandwidthRepr::Keyword("auto".to_string()),
            Bandwidth::Fixed(h) => BandwidthRepr::Degrees(h),
        }
    }
}

impl Bandwidth {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Bandwidth::Auto => Ok(()),
            Bandwidth::Fixed(h) if h.is_finite() && h > 0.0 => Ok(()),
            Bandwidth::Fixed(h) => Err(TrackError::invalid_parameter(
                "density_bandwidth",
                format!("must be a positive number of degrees, got {}", h),
            )),
        }
    }

    /// Resolve to `(lat, lon)` bandwidths in degrees for the given points.
    pub fn resolve(&self, points: &[GpsPoint]) -> Result<(f64, f64)> {
        self.validate()?;
        match *self {
            Bandwidth::Fixed(h) => Ok((h, h)),
            Bandwidth::Auto => silverman(points),
        }
    }
}

/// Silverman's rule for d = 2: `h = σ · n^(-1/6)` on each axis.
///
/// An axis with no spread borrows the other axis' bandwidth.
fn silverman(points: &[GpsPoint]) -> Result<(f64, f64)> {
    if points.len() < 2 {
        return Err(TrackError::invalid_parameter(
            "density_bandwidth",
            "automatic bandwidth needs at least 2 points",
        ));
    }
    let lats: Vec<f64> = points.iter().map(|p| p.latitude).collect();
    let lons: Vec<f64> = points.iter().map(|p| p.longitude).collect();
    let factor = (points.len() as f64).powf(-1.0 / 6.0);

    let h_lat = std_dev(&lats).unwrap_or(0.0) * factor;
    let h_lon = std_dev(&lons).unwrap_or(0.0) * factor;

    match (h_lat > 0.0, h_lon > 0.0) {
        (true, true) => Ok((h_lat, h_lon)),
        (true, false) => Ok((h_lat, h_lat)),
        (false, true) => Ok((h_lon, h_lon)),
        (false, false) => Err(TrackError::invalid_parameter(
            "density_bandwidth",
            "all points coincide; supply a fixed bandwidth",
        )),
    }
}

/// Configuration for density estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    /// Default: Auto
    pub bandwidth: Bandwidth,
    /// Grid nodes per axis (minimum 2).
    /// Default: 100
    pub grid_resolution: usize,
    /// Grid window. When absent, the data's bounding box grown by
    /// `margin_bandwidths` bandwidths on each side.
    /// Default: None
    pub bounds: Option<Bounds>,
    /// Default: 3.0
    pub margin_bandwidths: f64,
    /// Ignore points farther than this many bandwidths (on either axis)
    /// from a grid node.
    /// Default: None (every point contributes everywhere)
    pub cutoff_bandwidths: Option<f64>,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            bandwidth: Bandwidth::Auto,
            grid_resolution: 100,
            bounds: None,
            margin_bandwidths: 3.0,
            cutoff_bandwidths: None,
        }
    }
}

impl DensityConfig {
    pub fn validate(&self) -> Result<()> {
        self.bandwidth.validate()?;
        if self.grid_resolution < 2 {
            return Err(TrackError::invalid_parameter(
                "density_grid_resolution",
                format!("must be at least 2, got {}", self.grid_resolution),
            ));
        }
        if !self.margin_bandwidths.is_finite() || self.margin_bandwidths < 0.0 {
            return Err(TrackError::invalid_parameter(
                "margin_bandwidths",
                "must be a non-negative number",
            ));
        }
        if let Some(k) = self.cutoff_bandwidths {
            if !k.is_finite() || k <= 0.0 {
                return Err(TrackError::invalid_parameter(
                    "cutoff_bandwidths",
                    "must be a positive number",
                ));
            }
        }
        if let Some(b) = &self.bounds {
            let finite = [b.min_lat, b.max_lat, b.min_lng, b.max_lng]
                .iter()
                .all(|v| v.is_finite());
            if !finite || b.min_lat > b.max_lat || b.min_lng > b.max_lng {
                return Err(TrackError::invalid_parameter(
                    "density_bounds",
                    "minimums must not exceed maximums",
                ));
            }
        }
        Ok(())
    }
}

/// Density raster, row-major with row 0 at `bounds.min_lat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityGrid {
    pub bounds: Bounds,
    pub rows: usize,
    pub cols: usize,
    pub bandwidth_lat: f64,
    pub bandwidth_lon: f64,
    pub values: Vec<f64>,
}

impl DensityGrid {
    pub fn lat_step(&self) -> f64 {
        self.bounds.lat_span() / (self.rows - 1) as f64
    }

    pub fn lng_step(&self) -> f64 {
        self.bounds.lng_span() / (self.cols - 1) as f64
    }

    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            self.values.get(row * self.cols + col).copied()
        } else {
            None
        }
    }

    /// Coordinates of a grid node.
    pub fn node(&self, row: usize, col: usize) -> Option<GpsPoint> {
        if row < self.rows && col < self.cols {
            Some(GpsPoint::new(
                self.bounds.min_lat + row as f64 * self.lat_step(),
                self.bounds.min_lng + col as f64 * self.lng_step(),
            ))
        } else {
            None
        }
    }

    pub fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Riemann-sum integral of the grid (one node per cell).
    pub fn total_mass(&self) -> f64 {
        self.values.iter().sum::<f64>() * self.lat_step() * self.lng_step()
    }
}

/// Product-Gaussian kernel over a fixed set of points.
struct Kernel {
    h_lat: f64,
    h_lon: f64,
    norm: f64,
    cutoff: Option<f64>,
    /// Points as `[lon, lat]`
    index: RTree<[f64; 2]>,
}

impl Kernel {
    fn new(points: &[GpsPoint], h_lat: f64, h_lon: f64, cutoff: Option<f64>) -> Self {
        let coords: Vec<[f64; 2]> = points.iter().map(|p| [p.longitude, p.latitude]).collect();
        Self {
            h_lat,
            h_lon,
            norm: 1.0 / (2.0 * PI * h_lat * h_lon * points.len() as f64),
            cutoff,
            index: RTree::bulk_load(coords),
        }
    }

    fn weight(&self, lat: f64, lon: f64, p: &[f64; 2]) -> f64 {
        let zx = (lon - p[0]) / self.h_lon;
        let zy = (lat - p[1]) / self.h_lat;
        (-0.5 * (zx * zx + zy * zy)).exp()
    }

    fn density_at(&self, lat: f64, lon: f64) -> f64 {
        let sum: f64 = match self.cutoff {
            Some(k) => {
                let window = AABB::from_corners(
                    [lon - k * self.h_lon, lat - k * self.h_lat],
                    [lon + k * self.h_lon, lat + k * self.h_lat],
                );
                self.index
                    .locate_in_envelope(&window)
                    .map(|p| self.weight(lat, lon, p))
                    .sum()
            }
            None => self.index.iter().map(|p| self.weight(lat, lon, p)).sum(),
        };
        sum * self.norm
    }
}

fn validate_points(points: &[GpsPoint]) -> Result<()> {
    if points.is_empty() {
        return Err(TrackError::invalid_parameter(
            "points",
            "density estimation needs at least one point",
        ));
    }
    points.iter().try_for_each(GpsPoint::validate)
}

/// Evaluate the kernel density on a regular grid.
pub fn estimate_density(points: &[GpsPoint], config: &DensityConfig) -> Result<DensityGrid> {
    config.validate()?;
    validate_points(points)?;

    let (h_lat, h_lon) = config.bandwidth.resolve(points)?;
    let bounds = match config.bounds {
        Some(b) => b,
        None => Bounds::from_points(points)
            .map(|b| b.expand(config.margin_bandwidths * h_lat, config.margin_bandwidths * h_lon))
            .ok_or_else(|| TrackError::invalid_parameter("points", "no points"))?,
    };

    debug!(
        "[Density] {} points, bandwidth ({:.4}°, {:.4}°), {}x{} grid",
        points.len(),
        h_lat,
        h_lon,
        config.grid_resolution,
        config.grid_resolution
    );

    let kernel = Kernel::new(points, h_lat, h_lon, config.cutoff_bandwidths);
    let n = config.grid_resolution;
    let lat_step = bounds.lat_span() / (n - 1) as f64;
    let lng_step = bounds.lng_span() / (n - 1) as f64;

    let row_values = |row: usize| -> Vec<f64> {
        let lat = bounds.min_lat + row as f64 * lat_step;
        (0..n)
            .map(|col| kernel.density_at(lat, bounds.min_lng + col as f64 * lng_step))
            .collect()
    };

    #[cfg(feature = "parallel")]
    let rows: Vec<Vec<f64>> = {
        use rayon::prelude::*;
        (0..n).into_par_iter().map(row_values).collect()
    };

    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Vec<f64>> = (0..n).map(row_values).collect();

    let grid = DensityGrid {
        bounds,
        rows: n,
        cols: n,
        bandwidth_lat: h_lat,
        bandwidth_lon: h_lon,
        values: rows.concat(),
    };

    info!(
        "[Density] Grid over {} points: peak {:.3}, mass {:.3}",
        points.len(),
        grid.max_value(),
        grid.total_mass()
    );

    Ok(grid)
}

/// A fix inside a hotspot with its density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotFix {
    pub fix: Fix,
    pub density: f64,
}

/// Fixes whose density reaches a percentile of all fix densities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotReport {
    pub percentile: f64,
    pub threshold: f64,
    pub hotspot_count: usize,
    /// Share of all fixes, in percent
    pub hotspot_percent: f64,
    /// Mean position of the hotspot fixes
    pub centroid: GpsPoint,
    pub lat_range_deg: f64,
    pub lon_range_deg: f64,
    pub hotspots: Vec<HotspotFix>,
}

/// Evaluate the density at every fix and keep those at or above the given
/// percentile (linear interpolation) of those densities.
pub fn identify_hotspots(
    fixes: &[Fix],
    config: &DensityConfig,
    pct: f64,
) -> Result<HotspotReport> {
    if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
        return Err(TrackError::invalid_parameter(
            "hotspot_percentile",
            format!("must lie in [0, 100], got {}", pct),
        ));
    }
    config.validate()?;
    let points: Vec<GpsPoint> = fixes.iter().map(Fix::point).collect();
    validate_points(&points)?;

    let (h_lat, h_lon) = config.bandwidth.resolve(&points)?;
    let kernel = Kernel::new(&points, h_lat, h_lon, config.cutoff_bandwidths);
    let densities: Vec<f64> = points
        .iter()
        .map(|p| kernel.density_at(p.latitude, p.longitude))
        .collect();

    let threshold = percentile(&densities, pct)
        .ok_or_else(|| TrackError::invalid_parameter("points", "no densities"))?;

    let hotspots: Vec<HotspotFix> = fixes
        .iter()
        .zip(&densities)
        .filter(|(_, d)| **d >= threshold)
        .map(|(f, &d)| HotspotFix {
            fix: f.clone(),
            density: d,
        })
        .collect();

    let hotspot_points: Vec<GpsPoint> = hotspots.iter().map(|h| h.fix.point()).collect();
    let centroid = crate::geo_utils::compute_center(&hotspot_points)
        .ok_or_else(|| TrackError::invalid_parameter("points", "no hotspot fixes"))?;
    let extent = Bounds::from_points(&hotspot_points)
        .ok_or_else(|| TrackError::invalid_parameter("points", "no hotspot fixes"))?;

    let hotspot_count = hotspots.len();
    let hotspot_percent = hotspot_count as f64 / fixes.len() as f64 * 100.0;

    info!(
        "[Density] Hotspots at P{:.0}: {} fixes ({:.1}%), centered at ({:.4}, {:.4})",
        pct, hotspot_count, hotspot_percent, centroid.latitude, centroid.longitude
    );

    Ok(HotspotReport {
        percentile: pct,
        threshold,
        hotspot_count,
        hotspot_percent,
        centroid,
        lat_range_deg: extent.lat_span(),
        lon_range_deg: extent.lng_span(),
        hotspots,
    })
}
