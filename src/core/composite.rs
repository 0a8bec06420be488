//! Pixel-wise scene-set reduction.
//!
//! The monthly pipeline reduces by arithmetic mean over the unmasked
//! observations of each pixel; the current-conditions map view reduces by
//! median. Both ignore masked (NaN) pixels per-pixel: a pixel masked in
//! every scene stays masked in the composite, a pixel masked in only some
//! scenes is reduced over the unmasked subset.

use crate::types::{
    BandGrid, GeoTransform, MonthlyComposite, Scene,
};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use std::collections::{BTreeSet, HashMap};

/// Latest-composite map view ("current conditions"), reduced by median
/// over the scenes of the trailing date window.
#[derive(Debug, Clone)]
pub struct LatestComposite {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub geo_transform: Option<GeoTransform>,
    pub bands: HashMap<String, BandGrid>,
    pub scene_count: usize,
}

impl LatestComposite {
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }
}

/// Reduce a month's scene set to its mean composite.
///
/// An empty scene set yields the zero-band "no cloud-free data" sentinel;
/// the month is always emitted, never omitted. Scenes whose grid shape
/// differs from the month's first scene are skipped with a warning.
pub fn monthly_mean_composite(year: i32, month: u32, scenes: &[Scene]) -> MonthlyComposite {
    let accepted = compatible_scenes(scenes);
    if accepted.is_empty() {
        log::debug!("No qualifying scenes for {:04}-{:02}", year, month);
        return MonthlyComposite::empty(year, month);
    }

    let geo_transform = accepted[0].geo_transform;
    let bands = reduce_bands(&accepted, Reducer::Mean);

    log::info!(
        "Composited {:04}-{:02} from {} scene(s), {} band(s)",
        year,
        month,
        accepted.len(),
        bands.len()
    );
    MonthlyComposite::new(year, month, geo_transform, bands, accepted.len())
}

/// Reduce a trailing-window scene set to its median composite
pub fn latest_median_composite(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    scenes: &[Scene],
) -> LatestComposite {
    let accepted = compatible_scenes(scenes);
    if accepted.is_empty() {
        return LatestComposite {
            start,
            end,
            geo_transform: None,
            bands: HashMap::new(),
            scene_count: 0,
        };
    }

    let geo_transform = accepted[0].geo_transform;
    let bands = reduce_bands(&accepted, Reducer::Median);
    LatestComposite {
        start,
        end,
        geo_transform: Some(geo_transform),
        bands,
        scene_count: accepted.len(),
    }
}

enum Reducer {
    Mean,
    Median,
}

/// Keep scenes that share the first scene's grid shape
fn compatible_scenes(scenes: &[Scene]) -> Vec<&Scene> {
    let mut accepted: Vec<&Scene> = Vec::with_capacity(scenes.len());
    let mut reference: Option<(usize, usize)> = None;

    for scene in scenes {
        let shape = scene.shape();
        if shape == (0, 0) {
            log::warn!(
                "Scene {} has no bands, skipping",
                scene.metadata.product_id
            );
            continue;
        }
        match reference {
            None => {
                reference = Some(shape);
                accepted.push(scene);
            }
            Some(expected) if shape == expected => accepted.push(scene),
            Some(expected) => {
                log::warn!(
                    "Scene {} grid {:?} does not match month grid {:?}, skipping",
                    scene.metadata.product_id,
                    shape,
                    expected
                );
            }
        }
    }
    accepted
}

/// Reduce the union of band names across the accepted scenes
fn reduce_bands(scenes: &[&Scene], reducer: Reducer) -> HashMap<String, BandGrid> {
    let names: BTreeSet<&str> = scenes
        .iter()
        .flat_map(|s| s.bands().keys().map(|k| k.as_str()))
        .collect();

    let shape = scenes[0].shape();
    let mut out = HashMap::with_capacity(names.len());

    for name in names {
        let grids: Vec<&BandGrid> = scenes.iter().filter_map(|s| s.band(name)).collect();
        let reduced = match reducer {
            Reducer::Mean => mean_grid(&grids, shape),
            Reducer::Median => median_grid(&grids, shape),
        };
        out.insert(name.to_string(), reduced);
    }
    out
}

/// Per-pixel arithmetic mean over the unmasked observations
fn mean_grid(grids: &[&BandGrid], shape: (usize, usize)) -> BandGrid {
    let mut sum = Array2::<f64>::zeros(shape);
    let mut count = Array2::<u32>::zeros(shape);

    for grid in grids {
        for ((row, col), &value) in grid.indexed_iter() {
            if !value.is_nan() {
                sum[[row, col]] += value as f64;
                count[[row, col]] += 1;
            }
        }
    }

    Array2::from_shape_fn(shape, |(row, col)| {
        let n = count[[row, col]];
        if n == 0 {
            f32::NAN
        } else {
            (sum[[row, col]] / n as f64) as f32
        }
    })
}

/// Per-pixel median over the unmasked observations. Even-sized samples
/// take the mean of the two middle values.
fn median_grid(grids: &[&BandGrid], shape: (usize, usize)) -> BandGrid {
    let mut sample: Vec<f32> = Vec::with_capacity(grids.len());
    Array2::from_shape_fn(shape, |(row, col)| {
        sample.clear();
        for grid in grids {
            let value = grid[[row, col]];
            if !value.is_nan() {
                sample.push(value);
            }
        }
        if sample.is_empty() {
            return f32::NAN;
        }
        sample.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = sample.len() / 2;
        if sample.len() % 2 == 1 {
            sample[mid]
        } else {
            (sample[mid - 1] + sample[mid]) / 2.0
        }
    })
}
