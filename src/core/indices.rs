//! Derived spectral index bands.
//!
//! Every index is a pure per-pixel function of the reflectance bands:
//! the same inputs always yield the same output, and a pixel is NaN
//! wherever an operand is masked or a denominator is zero. The formulas
//! run on raw digital numbers; the normalized ratios are scale-invariant.

use crate::types::{BandGrid, EngineError, EngineResult, Scene, SpectralBand};
use ndarray::Zip;
use num_traits::Float;

/// The five derived index bands appended to every masked scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectralIndex {
    Ndvi,
    Nbr,
    Ndmi,
    Msavi,
    Bsi,
}

impl SpectralIndex {
    /// All indices, in the order they are appended to a scene
    pub const ALL: [SpectralIndex; 5] = [
        SpectralIndex::Ndvi,
        SpectralIndex::Nbr,
        SpectralIndex::Ndmi,
        SpectralIndex::Msavi,
        SpectralIndex::Bsi,
    ];

    /// Band name under which the index is stored
    pub fn name(&self) -> &'static str {
        match self {
            SpectralIndex::Ndvi => "NDVI",
            SpectralIndex::Nbr => "NBR",
            SpectralIndex::Ndmi => "NDMI",
            SpectralIndex::Msavi => "MSAVI",
            SpectralIndex::Bsi => "BSI",
        }
    }

    /// Reflectance bands the formula reads
    pub fn required_bands(&self) -> &'static [SpectralBand] {
        match self {
            SpectralIndex::Ndvi => &[SpectralBand::Nir, SpectralBand::Red],
            SpectralIndex::Nbr => &[SpectralBand::Nir, SpectralBand::Swir2],
            SpectralIndex::Ndmi => &[SpectralBand::Nir, SpectralBand::Swir1],
            SpectralIndex::Msavi => &[SpectralBand::Nir, SpectralBand::Red],
            SpectralIndex::Bsi => &[
                SpectralBand::Swir1,
                SpectralBand::Red,
                SpectralBand::Nir,
                SpectralBand::Blue,
            ],
        }
    }

    /// Compute the index band for a scene
    pub fn compute(&self, scene: &Scene) -> EngineResult<BandGrid> {
        match self {
            SpectralIndex::Ndvi => {
                let nir = required_band(scene, SpectralBand::Nir)?;
                let red = required_band(scene, SpectralBand::Red)?;
                Ok(Zip::from(nir)
                    .and(red)
                    .map_collect(|&n, &r| normalized_difference(n, r)))
            }
            SpectralIndex::Nbr => {
                let nir = required_band(scene, SpectralBand::Nir)?;
                let swir2 = required_band(scene, SpectralBand::Swir2)?;
                Ok(Zip::from(nir)
                    .and(swir2)
                    .map_collect(|&n, &s| normalized_difference(n, s)))
            }
            SpectralIndex::Ndmi => {
                let nir = required_band(scene, SpectralBand::Nir)?;
                let swir1 = required_band(scene, SpectralBand::Swir1)?;
                Ok(Zip::from(nir)
                    .and(swir1)
                    .map_collect(|&n, &s| normalized_difference(n, s)))
            }
            SpectralIndex::Msavi => {
                let nir = required_band(scene, SpectralBand::Nir)?;
                let red = required_band(scene, SpectralBand::Red)?;
                Ok(Zip::from(nir).and(red).map_collect(|&n, &r| msavi(n, r)))
            }
            SpectralIndex::Bsi => {
                let swir1 = required_band(scene, SpectralBand::Swir1)?;
                let red = required_band(scene, SpectralBand::Red)?;
                let nir = required_band(scene, SpectralBand::Nir)?;
                let blue = required_band(scene, SpectralBand::Blue)?;
                Ok(Zip::from(swir1)
                    .and(red)
                    .and(nir)
                    .and(blue)
                    .map_collect(|&s, &r, &n, &b| bsi(s, r, n, b)))
            }
        }
    }
}

impl std::fmt::Display for SpectralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn required_band<'a>(scene: &'a Scene, band: SpectralBand) -> EngineResult<&'a BandGrid> {
    scene.band(band.id()).ok_or_else(|| {
        EngineError::Processing(format!(
            "Scene {} is missing band {}",
            scene.metadata.product_id, band
        ))
    })
}

/// Normalized difference (a - b) / (a + b), NaN where the denominator
/// vanishes or an operand is masked
pub fn normalized_difference<T: Float>(a: T, b: T) -> T {
    let denom = a + b;
    if denom == T::zero() {
        T::nan()
    } else {
        (a - b) / denom
    }
}

/// MSAVI = (2*NIR + 1 - sqrt((2*NIR + 1)^2 - 8*(NIR - red))) / 2
pub fn msavi(nir: f32, red: f32) -> f32 {
    let p = 2.0 * nir + 1.0;
    (p - (p * p - 8.0 * (nir - red)).sqrt()) / 2.0
}

/// BSI = ((SWIR1 + red) - (NIR + blue)) / ((SWIR1 + red) + (NIR + blue))
pub fn bsi(swir1: f32, red: f32, nir: f32, blue: f32) -> f32 {
    normalized_difference(swir1 + red, nir + blue)
}

/// Append all five derived index bands to a masked scene.
///
/// The reflectance bands are read, never modified; each index lands in
/// the scene's band map under its own name.
pub fn add_index_bands(scene: &mut Scene) -> EngineResult<()> {
    for index in SpectralIndex::ALL {
        let grid = index.compute(scene)?;
        scene.add_band(index.name(), grid)?;
    }
    log::debug!(
        "Added {} index bands to scene {}",
        SpectralIndex::ALL.len(),
        scene.metadata.product_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BoundingBox, CoordinateSystem, GeoTransform, SceneMetadata,
    };
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use ndarray::array;
    use std::collections::HashMap;

    #[test]
    fn test_normalized_difference_formula() {
        // NDVI with NIR = 0.5, red = 0.1
        assert_relative_eq!(
            normalized_difference(0.5_f32, 0.1),
            0.6667,
            epsilon = 1e-4
        );
        // Zero denominator is masked, not infinite
        assert!(normalized_difference(0.0_f32, 0.0).is_nan());
        // Masked operands propagate
        assert!(normalized_difference(f32::NAN, 0.1).is_nan());
    }

    #[test]
    fn test_msavi_formula() {
        // p = 2.0, p^2 - 8*(0.4) = 0.8, (2 - sqrt(0.8)) / 2
        assert_relative_eq!(msavi(0.5, 0.1), 0.552_786_4, epsilon = 1e-5);
        assert!(msavi(f32::NAN, 0.1).is_nan());
    }

    #[test]
    fn test_bsi_formula() {
        assert_relative_eq!(
            bsi(0.3, 0.1, 0.5, 0.05),
            -0.157_894_7,
            epsilon = 1e-5
        );
    }

    fn scene_with_all_bands() -> Scene {
        let metadata = SceneMetadata {
            product_id: "S2A_TEST".to_string(),
            mission: "Sentinel-2".to_string(),
            platform: "Sentinel-2A".to_string(),
            sensing_time: Utc.with_ymd_and_hms(2019, 6, 15, 8, 0, 0).unwrap(),
            cloud_cover_percentage: 2.0,
            bounding_box: BoundingBox::around(0.0, 0.0, 20.0),
            coordinate_system: CoordinateSystem::Projected { epsg: 32736 },
        };
        let gt = GeoTransform::from_gdal([0.0, 10.0, 0.0, 0.0, 0.0, -10.0]);
        let mut bands: HashMap<String, BandGrid> = HashMap::new();
        bands.insert("B2".to_string(), array![[500.0, 400.0]]);
        bands.insert("B3".to_string(), array![[800.0, 700.0]]);
        bands.insert("B4".to_string(), array![[1000.0, f32::NAN]]);
        bands.insert("B8".to_string(), array![[5000.0, 4000.0]]);
        bands.insert("B11".to_string(), array![[3000.0, 2500.0]]);
        bands.insert("B12".to_string(), array![[2000.0, 1500.0]]);
        Scene::new(metadata, gt, bands, None)
    }

    #[test]
    fn test_add_index_bands() {
        let mut scene = scene_with_all_bands();
        add_index_bands(&mut scene).unwrap();

        for index in SpectralIndex::ALL {
            assert!(scene.band(index.name()).is_some(), "{} missing", index);
        }

        let ndvi = scene.band("NDVI").unwrap();
        assert_relative_eq!(ndvi[[0, 0]], 4000.0 / 6000.0, epsilon = 1e-5);
        // Red is masked in the second pixel, so NDVI and MSAVI are too
        assert!(ndvi[[0, 1]].is_nan());
        assert!(scene.band("MSAVI").unwrap()[[0, 1]].is_nan());
        // NBR does not read red and stays valid there
        assert!(!scene.band("NBR").unwrap()[[0, 1]].is_nan());
    }

    #[test]
    fn test_indices_are_deterministic() {
        let scene = scene_with_all_bands();
        let a = SpectralIndex::Bsi.compute(&scene).unwrap();
        let b = SpectralIndex::Bsi.compute(&scene).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!(x == y || (x.is_nan() && y.is_nan()));
        }
    }
}
