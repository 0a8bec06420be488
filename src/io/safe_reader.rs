//! Sentinel-2 SAFE product reader.
//!
//! Accepts a product either as an unpacked `.SAFE` directory or as the
//! zipped archive it is distributed as. Band rasters inside a zip are
//! extracted to a temporary file and opened with GDAL; the 20 m SWIR
//! bands and the 60 m QA band are resampled onto the 10 m grid.

use crate::io::metadata::parse_product_metadata;
use crate::types::{
    BandGrid, CoordinateSystem, EngineError, EngineResult, GeoTransform, QaGrid, Scene,
    SceneMetadata, SpectralBand,
};
use gdal::raster::ResampleAlg;
use ndarray::Array2;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::ZipArchive;

/// Sentinel-2 SAFE product reader
pub struct SafeReader {
    product_path: PathBuf,
    archive: Option<ZipArchive<File>>,
}

impl SafeReader {
    /// Create a reader for a `.SAFE` directory or a zipped product
    pub fn new<P: AsRef<Path>>(product_path: P) -> EngineResult<Self> {
        let product_path = product_path.as_ref().to_path_buf();

        if !product_path.exists() {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Product not found: {}", product_path.display()),
            )));
        }

        Ok(Self {
            product_path,
            archive: None,
        })
    }

    /// Product identifier derived from the file name
    pub fn product_id(&self) -> String {
        self.product_path
            .file_stem()
            .map(|s| s.to_string_lossy().trim_end_matches(".SAFE").to_string())
            .unwrap_or_else(|| "UNKNOWN_PRODUCT".to_string())
    }

    fn is_zipped(&self) -> bool {
        self.product_path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("zip"))
            .unwrap_or(false)
    }

    /// Open the ZIP archive
    fn open_archive(&mut self) -> EngineResult<&mut ZipArchive<File>> {
        if self.archive.is_none() {
            let file = File::open(&self.product_path)?;
            let archive = ZipArchive::new(file)
                .map_err(|e| EngineError::InvalidFormat(format!("Failed to open ZIP: {}", e)))?;
            self.archive = Some(archive);
        }
        self.archive.as_mut().ok_or_else(|| {
            EngineError::InvalidFormat("ZIP archive unavailable".to_string())
        })
    }

    /// List all files in the product (zip entries or relative paths)
    pub fn list_files(&mut self) -> EngineResult<Vec<String>> {
        if self.is_zipped() {
            let archive = self.open_archive()?;
            let mut files = Vec::with_capacity(archive.len());
            for i in 0..archive.len() {
                let file = archive.by_index(i).map_err(|e| {
                    EngineError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("Failed to access file {}: {}", i, e),
                    ))
                })?;
                files.push(file.name().to_string());
            }
            Ok(files)
        } else {
            let mut files = Vec::new();
            collect_files(&self.product_path, &self.product_path, &mut files)?;
            Ok(files)
        }
    }

    /// Read and parse the product-level metadata document
    pub fn read_metadata(&mut self) -> EngineResult<SceneMetadata> {
        let files = self.list_files()?;
        let metadata_file = files
            .iter()
            .find(|f| {
                let name = file_name(f);
                name.starts_with("MTD_MSIL") && name.ends_with(".xml")
            })
            .cloned()
            .ok_or_else(|| {
                EngineError::InvalidFormat(format!(
                    "No product metadata document in {}",
                    self.product_path.display()
                ))
            })?;

        let xml = self.read_file_to_string(&metadata_file)?;
        parse_product_metadata(&xml, &self.product_id())
    }

    /// Locate the raster file for each pipeline band, preferring the
    /// highest available resolution. Keys are band ids plus `"QA60"`.
    pub fn find_band_files(&mut self) -> EngineResult<HashMap<String, String>> {
        let files = self.list_files()?;
        let mut selected: HashMap<String, String> = HashMap::new();

        for band in SpectralBand::ALL {
            let code = band_file_code(band);
            let candidate = files
                .iter()
                .filter(|f| is_raster_file(f) && file_name(f).contains(&format!("_{}", code)))
                .min_by_key(|f| resolution_rank(f));
            if let Some(file) = candidate {
                selected.insert(band.id().to_string(), file.clone());
            }
        }

        if let Some(qa) = files
            .iter()
            .filter(|f| is_raster_file(f) && file_name(f).contains("QA60"))
            .min_by_key(|f| resolution_rank(f))
        {
            selected.insert("QA60".to_string(), qa.clone());
        }

        if selected.is_empty() {
            return Err(EngineError::InvalidFormat(format!(
                "No band rasters found in {}",
                self.product_path.display()
            )));
        }

        Ok(selected)
    }

    /// Load the full scene: all reflectance bands on the 10 m grid plus
    /// the QA60 bitmask when the product carries one
    pub fn read_scene(&mut self) -> EngineResult<Scene> {
        let start = std::time::Instant::now();
        let mut metadata = self.read_metadata()?;
        let band_files = self.find_band_files()?;

        let mut bands: HashMap<String, BandGrid> = HashMap::new();
        let mut reference: Option<((usize, usize), GeoTransform, Option<u32>)> = None;

        for band in SpectralBand::ALL {
            let file = band_files.get(band.id()).ok_or_else(|| {
                EngineError::InvalidFormat(format!(
                    "Product {} is missing band {}",
                    metadata.product_id, band
                ))
            })?;

            let target = reference.as_ref().map(|(shape, _, _)| *shape);
            let (grid, geo_transform, epsg) = self.read_reflectance_band(file, target)?;
            if reference.is_none() {
                reference = Some((grid.dim(), geo_transform, epsg));
            }
            bands.insert(band.id().to_string(), grid);
        }

        let (shape, geo_transform, epsg) = reference.ok_or_else(|| {
            EngineError::InvalidFormat(format!(
                "Product {} contains no readable bands",
                metadata.product_id
            ))
        })?;

        if let Some(epsg) = epsg {
            metadata.coordinate_system = CoordinateSystem::Projected { epsg };
        }

        let qa = match band_files.get("QA60") {
            Some(file) => Some(self.read_qa_band(file, shape)?),
            None => {
                log::warn!(
                    "Product {} carries no QA60 band, cloud masking unavailable",
                    metadata.product_id
                );
                None
            }
        };

        log::info!(
            "Loaded scene {} ({}x{}, {} bands) in {:.2?}",
            metadata.product_id,
            shape.0,
            shape.1,
            bands.len(),
            start.elapsed()
        );
        Ok(Scene::new(metadata, geo_transform, bands, qa))
    }

    fn read_reflectance_band(
        &mut self,
        file: &str,
        target: Option<(usize, usize)>,
    ) -> EngineResult<(BandGrid, GeoTransform, Option<u32>)> {
        let (dataset, _temp) = self.open_dataset(file)?;

        let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let epsg = dataset
            .spatial_ref()
            .ok()
            .and_then(|sr| sr.auth_code().ok())
            .map(|code| code as u32);

        let (width, height) = dataset.raster_size();
        let (out_width, out_height) = match target {
            Some((rows, cols)) => (cols, rows),
            None => (width, height),
        };

        let band = dataset.rasterband(1)?;
        let buffer = band.read_as::<f32>(
            (0, 0),
            (width, height),
            (out_width, out_height),
            Some(ResampleAlg::Bilinear),
        )?;

        let grid = Array2::from_shape_vec((out_height, out_width), buffer.data)
            .map_err(|e| EngineError::Processing(format!("Band shape error: {}", e)))?;

        log::debug!(
            "Read band file {} ({}x{} -> {}x{})",
            file,
            width,
            height,
            out_width,
            out_height
        );
        Ok((grid, geo_transform, epsg))
    }

    fn read_qa_band(&mut self, file: &str, shape: (usize, usize)) -> EngineResult<QaGrid> {
        let (dataset, _temp) = self.open_dataset(file)?;
        let (width, height) = dataset.raster_size();
        let band = dataset.rasterband(1)?;

        // The bitmask must not be interpolated
        let buffer = band.read_as::<u16>(
            (0, 0),
            (width, height),
            (shape.1, shape.0),
            Some(ResampleAlg::NearestNeighbour),
        )?;

        Array2::from_shape_vec(shape, buffer.data)
            .map_err(|e| EngineError::Processing(format!("QA band shape error: {}", e)))
    }

    /// Open a raster file with GDAL. Zip entries are extracted to a
    /// temporary file first; the handle is returned so the file outlives
    /// the dataset.
    fn open_dataset(
        &mut self,
        file: &str,
    ) -> EngineResult<(gdal::Dataset, Option<NamedTempFile>)> {
        if self.is_zipped() {
            let suffix = Path::new(file)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_else(|| ".jp2".to_string());

            let archive = self.open_archive()?;
            let mut entry = archive.by_name(file).map_err(|e| {
                EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to access {}: {}", file, e),
                ))
            })?;

            let mut temp_file = tempfile::Builder::new()
                .suffix(&suffix)
                .tempfile()
                .map_err(EngineError::Io)?;
            std::io::copy(&mut entry, &mut temp_file).map_err(EngineError::Io)?;

            let dataset = gdal::Dataset::open(temp_file.path())?;
            Ok((dataset, Some(temp_file)))
        } else {
            let path = self.product_path.join(file);
            Ok((gdal::Dataset::open(&path)?, None))
        }
    }

    fn read_file_to_string(&mut self, file: &str) -> EngineResult<String> {
        if self.is_zipped() {
            let archive = self.open_archive()?;
            let mut entry = archive.by_name(file).map_err(|e| {
                EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to read {}: {}", file, e),
                ))
            })?;
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            Ok(content)
        } else {
            Ok(std::fs::read_to_string(self.product_path.join(file))?)
        }
    }
}

/// File name component of a product-relative path
fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn is_raster_file(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    (lower.ends_with(".jp2") || lower.ends_with(".tif") || lower.ends_with(".tiff"))
        && !lower.contains("tci")
        && !lower.contains("pvi")
}

/// Lower rank wins: prefer the native 10 m grid, then 20 m, then 60 m
fn resolution_rank(path: &str) -> u8 {
    if path.contains("_10m") {
        0
    } else if path.contains("_20m") {
        1
    } else if path.contains("_60m") {
        2
    } else {
        3
    }
}

fn band_file_code(band: SpectralBand) -> &'static str {
    match band {
        SpectralBand::Blue => "B02",
        SpectralBand::Green => "B03",
        SpectralBand::Red => "B04",
        SpectralBand::Nir => "B08",
        SpectralBand::Swir1 => "B11",
        SpectralBand::Swir2 => "B12",
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> EngineResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().to_string());
        }
    }
    Ok(())
}
