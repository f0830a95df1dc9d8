//! Clean, simplify and summarize two synthetic turtle tracks.
//!
//! Run with: cargo run --example basic_pipeline
//! Add `RUST_LOG=info` to see per-stage logging.

use chrono::{Duration, TimeZone, Utc};
use turtle_track::{
    cohort_density, cohort_hotspots, process_individuals, summarize, Bounds, Fix, Geometry,
    GpsPoint, PipelineConfig, Region,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let t0 = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
    let classes = ["3", "2", "1", "A", "2", "B", "1", "3"];

    let mut fixes = Vec::new();
    for (id, lat0) in [("241136", 8.0), ("241137", 7.6)] {
        for i in 0..60 {
            let mut lat = lat0 + 0.05 * (i as f64 * 0.4).sin();
            let lng = -80.8 + 0.02 * i as f64;
            if i == 25 {
                // Argos outlier
                lat += 1.2;
            }
            fixes.push(Fix::new(
                id,
                t0 + Duration::hours(3 * i),
                lat,
                lng,
                classes[i as usize % classes.len()],
            ));
        }
    }

    // Isla Coiba as a crude land mask
    let coiba = Region::polygon(vec![
        GpsPoint::new(7.30, -81.90),
        GpsPoint::new(7.30, -81.60),
        GpsPoint::new(7.65, -81.60),
        GpsPoint::new(7.65, -81.90),
    ])?;
    let geometry = Geometry::new()
        .with_study_area(Bounds::EASTERN_TROPICAL_PACIFIC)
        .with_exclusion(coiba);

    let config = PipelineConfig {
        density_grid_resolution: 50,
        ..PipelineConfig::default()
    };

    let processed = process_individuals(fixes, &config, &geometry)?;
    for p in &processed {
        let m = &p.metrics;
        println!(
            "{}: {} raw -> {} cleaned -> {} simplified ({:.1}% retained)",
            p.individual_id,
            p.before_after.raw_count,
            p.before_after.cleaned_count,
            p.before_after.processed_count,
            p.before_after.retention_percent
        );
        println!(
            "  distance {:.1} km, straightness {}, removed by speed filter: {}",
            m.total_distance_m / 1000.0,
            m.straightness
                .map(|s| format!("{:.2}", s))
                .unwrap_or_else(|| "undefined".to_string()),
            p.speed.removed.len()
        );
    }

    let summary = summarize(&processed);
    println!("\n{}", serde_json::to_string_pretty(&summary)?);

    let grid = cohort_density(&processed, &config)?;
    println!(
        "\nDensity grid {}x{}, peak {:.2} fixes/deg²",
        grid.rows,
        grid.cols,
        grid.max_value()
    );

    let hotspots = cohort_hotspots(&processed, &config)?;
    println!(
        "Hotspots: {} fixes ({:.1}%) around ({:.3}, {:.3})",
        hotspots.hotspot_count,
        hotspots.hotspot_percent,
        hotspots.centroid.latitude,
        hotspots.centroid.longitude
    );

    Ok(())
}
