use crate::types::{EngineError, EngineResult, QaGrid, Scene};
use ndarray::{Array2, Zip};

/// QA60 bit 10: opaque clouds
pub const CLOUD_BIT_MASK: u16 = 1 << 10;
/// QA60 bit 11: cirrus clouds
pub const CIRRUS_BIT_MASK: u16 = 1 << 11;

/// Divisor converting raw digital numbers to physical reflectance in [0, 1]
pub const REFLECTANCE_SCALE: f32 = 10000.0;

/// Per-pixel clear-sky test: both the cloud and the cirrus flag must be
/// zero for a pixel to be retained.
pub fn clear_mask(qa: &QaGrid) -> Array2<bool> {
    qa.mapv(|v| v & CLOUD_BIT_MASK == 0 && v & CIRRUS_BIT_MASK == 0)
}

/// Mask cloud and cirrus pixels out of every band of a scene.
///
/// Masked pixels become NaN and are excluded from all subsequent
/// computation. Masking is idempotent: a NaN pixel stays NaN and a scene
/// without a QA band passes through unchanged.
///
/// Reflectance values are left as raw digital numbers. The monthly index
/// pipeline runs on DN directly since the normalized index ratios are
/// scale-invariant; see [`apply_cloud_mask_scaled`] for the
/// current-conditions path.
pub fn apply_cloud_mask(scene: &mut Scene) -> EngineResult<()> {
    let qa = match &scene.qa {
        Some(qa) => qa.clone(),
        None => {
            log::debug!(
                "Scene {} has no QA band, skipping cloud mask",
                scene.metadata.product_id
            );
            return Ok(());
        }
    };

    if qa.dim() != scene.shape() {
        return Err(EngineError::Processing(format!(
            "QA band shape {:?} does not match scene shape {:?} for {}",
            qa.dim(),
            scene.shape(),
            scene.metadata.product_id
        )));
    }

    let clear = clear_mask(&qa);
    let cloudy = clear.iter().filter(|&&keep| !keep).count();

    scene.map_bands(|_, grid| {
        Zip::from(grid)
            .and(&clear)
            .map_collect(|&value, &keep| if keep { value } else { f32::NAN })
    });

    log::debug!(
        "Masked {} cloud/cirrus pixels in scene {}",
        cloudy,
        scene.metadata.product_id
    );
    Ok(())
}

/// Mask clouds and convert digital numbers to reflectance in [0, 1].
///
/// This is the current-conditions path only (latest-composite map view).
/// The monthly index pipeline never scales; conflating the two paths
/// changes MSAVI and the visualization ranges.
pub fn apply_cloud_mask_scaled(scene: &mut Scene) -> EngineResult<()> {
    apply_cloud_mask(scene)?;
    scene.map_bands(|_, grid| grid.mapv(|v| v / REFLECTANCE_SCALE));
    log::debug!(
        "Scaled scene {} to physical reflectance",
        scene.metadata.product_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BandGrid, BoundingBox, CoordinateSystem, GeoTransform, SceneMetadata,
    };
    use chrono::{TimeZone, Utc};
    use ndarray::array;
    use std::collections::HashMap;

    fn test_scene(qa: QaGrid) -> Scene {
        let metadata = SceneMetadata {
            product_id: "S2A_TEST".to_string(),
            mission: "Sentinel-2".to_string(),
            platform: "Sentinel-2A".to_string(),
            sensing_time: Utc.with_ymd_and_hms(2019, 6, 15, 8, 0, 0).unwrap(),
            cloud_cover_percentage: 5.0,
            bounding_box: BoundingBox::around(0.0, 0.0, 20.0),
            coordinate_system: CoordinateSystem::Projected { epsg: 32736 },
        };
        let gt = GeoTransform::from_gdal([0.0, 10.0, 0.0, 0.0, 0.0, -10.0]);
        let mut bands: HashMap<String, BandGrid> = HashMap::new();
        bands.insert("B4".to_string(), array![[1000.0, 2000.0], [3000.0, 4000.0]]);
        bands.insert("B8".to_string(), array![[5000.0, 6000.0], [7000.0, 8000.0]]);
        Scene::new(metadata, gt, bands, Some(qa))
    }

    #[test]
    fn test_clear_mask_bits() {
        let qa: QaGrid = array![[0, CLOUD_BIT_MASK], [CIRRUS_BIT_MASK, CLOUD_BIT_MASK | CIRRUS_BIT_MASK]];
        let clear = clear_mask(&qa);
        assert!(clear[[0, 0]]);
        assert!(!clear[[0, 1]]);
        assert!(!clear[[1, 0]]);
        assert!(!clear[[1, 1]]);
        // Unrelated QA bits do not mask
        let qa_other: QaGrid = array![[1 << 2, 1 << 5], [0, 0]];
        assert!(clear_mask(&qa_other).iter().all(|&keep| keep));
    }

    #[test]
    fn test_mask_sets_nan_in_all_bands() {
        let qa: QaGrid = array![[0, CLOUD_BIT_MASK], [0, 0]];
        let mut scene = test_scene(qa);
        apply_cloud_mask(&mut scene).unwrap();

        for name in ["B4", "B8"] {
            let band = scene.band(name).unwrap();
            assert!(!band[[0, 0]].is_nan());
            assert!(band[[0, 1]].is_nan());
            assert!(!band[[1, 0]].is_nan());
        }
    }

    #[test]
    fn test_mask_is_idempotent() {
        let qa: QaGrid = array![[0, CLOUD_BIT_MASK], [CIRRUS_BIT_MASK, 0]];
        let mut scene = test_scene(qa);
        apply_cloud_mask(&mut scene).unwrap();
        let first: Vec<f32> = scene.band("B4").unwrap().iter().cloned().collect();

        apply_cloud_mask(&mut scene).unwrap();
        let second: Vec<f32> = scene.band("B4").unwrap().iter().cloned().collect();

        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.is_nan(), b.is_nan());
            if !a.is_nan() {
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_scaled_path_divides_by_10000() {
        let qa: QaGrid = array![[0, 0], [0, 0]];
        let mut scene = test_scene(qa);
        apply_cloud_mask_scaled(&mut scene).unwrap();
        let band = scene.band("B4").unwrap();
        assert!((band[[0, 0]] - 0.1).abs() < 1e-6);
        assert!((band[[1, 1]] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_qa_shape_mismatch_is_error() {
        let qa: QaGrid = QaGrid::zeros((3, 3));
        let mut scene = test_scene(qa);
        assert!(apply_cloud_mask(&mut scene).is_err());
    }
}
