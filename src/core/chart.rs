//! Chart series extraction.
//!
//! One point per monthly composite: the spatial mean of the selected
//! index band over the narrow sampling buffer. A month with no cloud-free
//! data reports a missing value, never zero, so a fitted trend line is
//! not biased by empty time slots.

use crate::core::registry::IndexDefinition;
use crate::types::{MonthlyComposite, RegionOfInterest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chart sample: composite timestamp plus the buffer mean, or None
/// for a month without data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
}

/// Ordered series of monthly samples for one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub index_name: String,
    /// Band that was sampled; None when the index has no chart
    pub band: Option<String>,
    pub points: Vec<ChartPoint>,
}

impl ChartSeries {
    /// Series for an index without a chart band. A valid, expected
    /// configuration outcome, not an error.
    pub fn unavailable(index_name: &str) -> Self {
        Self {
            index_name: index_name.to_string(),
            band: None,
            points: Vec::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.band.is_some()
    }
}

/// Extract the chart series for an index over a composite collection.
///
/// The collection's (year, month) order carries through to the series;
/// it is the chart's x-axis order.
pub fn extract_series(
    collection: &[MonthlyComposite],
    region: &RegionOfInterest,
    definition: &IndexDefinition,
) -> ChartSeries {
    let band = match (&definition.chart_band, definition.chart_available) {
        (Some(band), true) => band.clone(),
        _ => {
            log::debug!("No chart available for index {}", definition.name);
            return ChartSeries::unavailable(&definition.name);
        }
    };

    let points = collection
        .iter()
        .map(|composite| ChartPoint {
            timestamp: composite.timestamp,
            value: buffer_mean(composite, &band, region),
        })
        .collect();

    ChartSeries {
        index_name: definition.name.clone(),
        band: Some(band),
        points,
    }
}

/// Spatial mean of a band over the pixels whose cell center lies within
/// the sampling buffer. None when the composite is empty, the band is
/// absent, or every pixel inside the buffer is masked.
pub fn buffer_mean(
    composite: &MonthlyComposite,
    band: &str,
    region: &RegionOfInterest,
) -> Option<f64> {
    if composite.is_empty() {
        return None;
    }
    let grid = composite.band(band)?;
    let transform = composite.geo_transform?;

    let radius_sq = region.sample_radius * region.sample_radius;
    let mut sum = 0.0_f64;
    let mut count = 0_usize;

    for ((row, col), &value) in grid.indexed_iter() {
        if value.is_nan() {
            continue;
        }
        let (x, y) = transform.cell_center(row, col);
        let dx = x - region.x;
        let dy = y - region.y;
        if dx * dx + dy * dy <= radius_sq {
            sum += value as f64;
            count += 1;
        }
    }

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::IndexRegistry;
    use crate::types::{BandGrid, GeoTransform, MonthlyComposite};
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use std::collections::HashMap;

    fn composite_with_ndvi(year: i32, month: u32, fill: f32) -> MonthlyComposite {
        // 10 m grid with the origin at (0, 0); cell centers at 5, 15, 25, ...
        let gt = GeoTransform::from_gdal([0.0, 10.0, 0.0, 0.0, 0.0, -10.0]);
        let mut bands: HashMap<String, BandGrid> = HashMap::new();
        bands.insert("NDVI".to_string(), Array2::from_elem((20, 20), fill));
        MonthlyComposite::new(year, month, gt, bands, 1)
    }

    fn sample_region() -> RegionOfInterest {
        RegionOfInterest::at(100.0, -100.0)
    }

    #[test]
    fn test_buffer_mean_uniform_band() {
        let composite = composite_with_ndvi(2019, 1, 0.42);
        let mean = buffer_mean(&composite, "NDVI", &sample_region()).unwrap();
        assert_relative_eq!(mean, 0.42, epsilon = 1e-6);
    }

    #[test]
    fn test_buffer_mean_missing_cases() {
        let empty = MonthlyComposite::empty(2019, 2);
        assert!(buffer_mean(&empty, "NDVI", &sample_region()).is_none());

        let composite = composite_with_ndvi(2019, 3, 0.5);
        assert!(buffer_mean(&composite, "NBR", &sample_region()).is_none());

        let masked = composite_with_ndvi(2019, 4, f32::NAN);
        assert!(buffer_mean(&masked, "NDVI", &sample_region()).is_none());
    }

    #[test]
    fn test_series_reports_missing_not_zero() {
        let collection = vec![
            composite_with_ndvi(2019, 1, 0.3),
            MonthlyComposite::empty(2019, 2),
            composite_with_ndvi(2019, 3, 0.6),
        ];
        let registry = IndexRegistry::with_defaults();
        let definition = registry.get("Plant Health Index").unwrap();

        let series = extract_series(&collection, &sample_region(), definition);
        assert!(series.is_available());
        assert_eq!(series.points.len(), 3);
        assert!(series.points[0].value.is_some());
        // The empty month is a gap, not a zero
        assert_eq!(series.points[1].value, None);
        assert!(series.points[2].value.is_some());
        // Timestamps follow collection order
        assert!(series.points[0].timestamp < series.points[1].timestamp);
        assert!(series.points[1].timestamp < series.points[2].timestamp);
    }

    #[test]
    fn test_series_unavailable_for_rgb() {
        let registry = IndexRegistry::with_defaults();
        let rgb = registry.get("RGB").unwrap();
        let series = extract_series(&[], &sample_region(), rgb);
        assert!(!series.is_available());
        assert!(series.points.is_empty());
    }
}
