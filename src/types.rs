use chrono::{DateTime, TimeZone, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reflectance or index value for a single pixel
pub type BandValue = f32;

/// 2D single-band raster (rows x cols)
pub type BandGrid = Array2<BandValue>;

/// 2D quality-assurance bitmask raster (QA60)
pub type QaGrid = Array2<u16>;

/// Sentinel-2 reflectance bands used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpectralBand {
    Blue,  // B2
    Green, // B3
    Red,   // B4
    Nir,   // B8
    Swir1, // B11
    Swir2, // B12
}

impl SpectralBand {
    /// All bands loaded for every scene, in product order
    pub const ALL: [SpectralBand; 6] = [
        SpectralBand::Blue,
        SpectralBand::Green,
        SpectralBand::Red,
        SpectralBand::Nir,
        SpectralBand::Swir1,
        SpectralBand::Swir2,
    ];

    /// Band identifier as it appears in product filenames and band maps
    pub fn id(&self) -> &'static str {
        match self {
            SpectralBand::Blue => "B2",
            SpectralBand::Green => "B3",
            SpectralBand::Red => "B4",
            SpectralBand::Nir => "B8",
            SpectralBand::Swir1 => "B11",
            SpectralBand::Swir2 => "B12",
        }
    }
}

impl std::fmt::Display for SpectralBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Coordinate system enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic coordinates (latitude, longitude)
    Geographic,
    /// Projected coordinates (e.g., UTM, Web Mercator)
    Projected { epsg: u32 },
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Square box centered on a point
    pub fn around(x: f64, y: f64, radius: f64) -> Self {
        Self {
            min_x: x - radius,
            max_x: x + radius,
            min_y: y - radius,
            max_y: y + radius,
        }
    }

    /// Whether a point falls inside (edges inclusive)
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Whether two boxes overlap
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    /// Map coordinates of a cell center. Rotation terms are assumed zero,
    /// which holds for all Sentinel-2 L2A grids.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.top_left_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.top_left_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }
}

/// Region of interest: a point plus two derived circular buffers.
///
/// The narrow buffer drives chart sampling, the wide buffer frames
/// thumbnails. Radii are in the units of the scene grids (meters for
/// projected scenes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x: f64,
    pub y: f64,
    pub sample_radius: f64,
    pub frame_radius: f64,
}

impl RegionOfInterest {
    /// Default chart-sampling buffer radius
    pub const DEFAULT_SAMPLE_RADIUS: f64 = 50.0;
    /// Default thumbnail-framing buffer radius
    pub const DEFAULT_FRAME_RADIUS: f64 = 500.0;

    /// Create a region with the default buffer radii
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            sample_radius: Self::DEFAULT_SAMPLE_RADIUS,
            frame_radius: Self::DEFAULT_FRAME_RADIUS,
        }
    }

    /// Create a region with explicit buffer radii.
    /// The sampling buffer must lie strictly inside the framing buffer.
    pub fn with_radii(x: f64, y: f64, sample_radius: f64, frame_radius: f64) -> EngineResult<Self> {
        if !sample_radius.is_finite() || !frame_radius.is_finite() || sample_radius <= 0.0 {
            return Err(EngineError::InvalidQuery(format!(
                "Buffer radii must be positive and finite, got {} / {}",
                sample_radius, frame_radius
            )));
        }
        if sample_radius >= frame_radius {
            return Err(EngineError::InvalidQuery(format!(
                "Sampling buffer ({}) must be smaller than framing buffer ({})",
                sample_radius, frame_radius
            )));
        }
        Ok(Self {
            x,
            y,
            sample_radius,
            frame_radius,
        })
    }

    /// Square bounding box around the framing buffer
    pub fn frame_box(&self) -> BoundingBox {
        BoundingBox::around(self.x, self.y, self.frame_radius)
    }
}

/// Metadata for a single Sentinel-2 acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub product_id: String,
    pub mission: String,
    pub platform: String,
    pub sensing_time: DateTime<Utc>,
    /// CLOUDY_PIXEL_PERCENTAGE from the product metadata, 0-100
    pub cloud_cover_percentage: f64,
    pub bounding_box: BoundingBox,
    pub coordinate_system: CoordinateSystem,
}

/// One multi-band reflectance capture at a point in time.
///
/// The band set is append-only: derived index bands are added next to the
/// loaded reflectance bands and nothing is mutated in place. Masked pixels
/// are NaN in every band.
#[derive(Debug, Clone)]
pub struct Scene {
    pub metadata: SceneMetadata,
    pub geo_transform: GeoTransform,
    bands: HashMap<String, BandGrid>,
    /// QA60 bitmask, if the product carried one
    pub qa: Option<QaGrid>,
}

impl Scene {
    pub fn new(
        metadata: SceneMetadata,
        geo_transform: GeoTransform,
        bands: HashMap<String, BandGrid>,
        qa: Option<QaGrid>,
    ) -> Self {
        Self {
            metadata,
            geo_transform,
            bands,
            qa,
        }
    }

    /// Grid shape (rows, cols) shared by all bands
    pub fn shape(&self) -> (usize, usize) {
        self.bands
            .values()
            .next()
            .map(|g| g.dim())
            .unwrap_or((0, 0))
    }

    pub fn band(&self, name: &str) -> Option<&BandGrid> {
        self.bands.get(name)
    }

    pub fn band_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bands.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn bands(&self) -> &HashMap<String, BandGrid> {
        &self.bands
    }

    /// Append a derived band. The band set is append-only, so a duplicate
    /// name is rejected rather than overwritten.
    pub fn add_band(&mut self, name: &str, grid: BandGrid) -> EngineResult<()> {
        if self.bands.contains_key(name) {
            return Err(EngineError::Processing(format!(
                "Band {} already present in scene {}",
                name, self.metadata.product_id
            )));
        }
        if let Some(shape) = self.bands.values().next().map(|g| g.dim()) {
            if grid.dim() != shape {
                return Err(EngineError::Processing(format!(
                    "Band {} shape {:?} does not match scene shape {:?}",
                    name,
                    grid.dim(),
                    shape
                )));
            }
        }
        self.bands.insert(name.to_string(), grid);
        Ok(())
    }

    /// Replace every band with a transformed copy, keeping names.
    /// Used by the masking stage, which maps all bands uniformly.
    pub(crate) fn map_bands<F>(&mut self, mut f: F)
    where
        F: FnMut(&str, &BandGrid) -> BandGrid,
    {
        let mapped: HashMap<String, BandGrid> = self
            .bands
            .iter()
            .map(|(name, grid)| (name.clone(), f(name, grid)))
            .collect();
        self.bands = mapped;
    }
}

/// A single raster per (year, month), formed by pixel-wise mean reduction
/// across all qualifying scenes of that month.
///
/// A month with no cloud-free scenes is represented by an empty band map,
/// never omitted from the collection.
#[derive(Debug, Clone)]
pub struct MonthlyComposite {
    pub year: i32,
    pub month: u32,
    /// Human-readable label, `"YYYY MM"`
    pub label: String,
    /// First day of the month, 00:00 UTC
    pub timestamp: DateTime<Utc>,
    pub geo_transform: Option<GeoTransform>,
    bands: HashMap<String, BandGrid>,
    /// Number of scenes that entered the reduction
    pub scene_count: usize,
}

impl MonthlyComposite {
    /// Create the "no cloud-free data" sentinel for a month
    pub fn empty(year: i32, month: u32) -> Self {
        Self {
            year,
            month,
            label: month_label(year, month),
            timestamp: month_start(year, month),
            geo_transform: None,
            bands: HashMap::new(),
            scene_count: 0,
        }
    }

    pub fn new(
        year: i32,
        month: u32,
        geo_transform: GeoTransform,
        bands: HashMap<String, BandGrid>,
        scene_count: usize,
    ) -> Self {
        Self {
            year,
            month,
            label: month_label(year, month),
            timestamp: month_start(year, month),
            geo_transform: Some(geo_transform),
            bands,
            scene_count,
        }
    }

    /// Whether this is the "no cloud-free data" sentinel
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn band(&self, name: &str) -> Option<&BandGrid> {
        self.bands.get(name)
    }

    pub fn bands(&self) -> &HashMap<String, BandGrid> {
        &self.bands
    }

    pub fn band_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bands.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Gallery-style label, e.g. `"March 2019"`
    pub fn display_label(&self) -> String {
        format!("{} {}", month_name(self.month), self.year)
    }
}

/// Ordered sequence of monthly composites spanning a full year range
pub type MonthlyCollection = Vec<MonthlyComposite>;

/// `"YYYY MM"` label for a month
pub fn month_label(year: i32, month: u32) -> String {
    format!("{:04} {:02}", year, month)
}

/// First day of the month, 00:00 UTC
pub fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(|| Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap())
}

/// English month name for gallery labels
pub fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

/// Error types for the composite engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Query superseded by a newer request")]
    Superseded,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
