//! Scene catalog abstraction.
//!
//! The engine materializes scenes through [`SceneCatalog`], a plain
//! "load scenes matching filter" interface that replaces the deferred
//! evaluation model of hosted imagery platforms. A local directory of
//! SAFE products and an in-memory store are provided; transient failures
//! at this boundary are retried with bounded backoff by
//! [`RetryingCatalog`].

use crate::io::safe_reader::SafeReader;
use crate::types::{BoundingBox, EngineResult, Scene, SceneMetadata};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Scene selection predicate: footprint, acquisition window, cloud cap
#[derive(Debug, Clone, PartialEq)]
pub struct SceneFilter {
    pub bounds: BoundingBox,
    /// Inclusive start of the acquisition window
    pub start: DateTime<Utc>,
    /// Exclusive end of the acquisition window
    pub end: DateTime<Utc>,
    /// Scenes at or above this cloud percentage are rejected
    pub max_cloud_percentage: f64,
}

impl SceneFilter {
    /// Calendar-aligned filter for one (year, month)
    pub fn for_month(
        bounds: BoundingBox,
        year: i32,
        month: u32,
        max_cloud_percentage: f64,
    ) -> Self {
        let start = crate::types::month_start(year, month);
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let end = crate::types::month_start(next_year, next_month);
        Self {
            bounds,
            start,
            end,
            max_cloud_percentage,
        }
    }

    /// Trailing window of one calendar month ending at `end`
    /// (current-conditions view)
    pub fn trailing_month(bounds: BoundingBox, end: DateTime<Utc>, max_cloud_percentage: f64) -> Self {
        let start = end
            .checked_sub_months(chrono::Months::new(1))
            .unwrap_or(end - chrono::Duration::days(31));
        Self {
            bounds,
            start,
            end,
            max_cloud_percentage,
        }
    }

    /// Whether a scene's metadata passes the filter
    pub fn matches(&self, metadata: &SceneMetadata) -> bool {
        metadata.sensing_time >= self.start
            && metadata.sensing_time < self.end
            && metadata.cloud_cover_percentage < self.max_cloud_percentage
            && metadata.bounding_box.intersects(&self.bounds)
    }
}

/// Raster-data access boundary: load the scenes matching a filter.
///
/// An empty result is a normal outcome (it becomes the "no cloud-free
/// data" sentinel downstream), never an error.
pub trait SceneCatalog: Send + Sync {
    fn load_scenes(&self, filter: &SceneFilter) -> EngineResult<Vec<Scene>>;
}

/// Catalog over a directory of SAFE products (unpacked or zipped).
///
/// The directory is re-scanned per query; metadata is read first so
/// non-matching products never load their rasters.
pub struct LocalCatalog {
    root: PathBuf,
}

impl LocalCatalog {
    pub fn new<P: AsRef<Path>>(root: P) -> EngineResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(crate::types::EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Catalog directory not found: {}", root.display()),
            )));
        }
        Ok(Self { root })
    }

    fn product_paths(&self) -> EngineResult<Vec<PathBuf>> {
        let mut products = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let is_safe_dir = path.is_dir() && name.ends_with(".SAFE");
            let is_zip = path.is_file() && name.to_ascii_lowercase().ends_with(".zip");
            if is_safe_dir || is_zip {
                products.push(path);
            }
        }
        products.sort();
        Ok(products)
    }
}

impl SceneCatalog for LocalCatalog {
    fn load_scenes(&self, filter: &SceneFilter) -> EngineResult<Vec<Scene>> {
        let products = self.product_paths()?;
        log::debug!(
            "Scanning {} product(s) under {}",
            products.len(),
            self.root.display()
        );

        let mut scenes = Vec::new();
        for path in products {
            let mut reader = match SafeReader::new(&path) {
                Ok(reader) => reader,
                Err(e) => {
                    log::warn!("Skipping unreadable product {}: {}", path.display(), e);
                    continue;
                }
            };
            let metadata = match reader.read_metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    log::warn!("Skipping product without metadata {}: {}", path.display(), e);
                    continue;
                }
            };
            if !filter.matches(&metadata) {
                continue;
            }
            match reader.read_scene() {
                Ok(scene) => scenes.push(scene),
                Err(e) => {
                    log::warn!("Failed to load scene {}: {}", metadata.product_id, e);
                }
            }
        }

        log::info!(
            "Catalog query matched {} scene(s) in [{}, {})",
            scenes.len(),
            filter.start,
            filter.end
        );
        Ok(scenes)
    }
}

/// In-memory catalog, for tests and for embedders that source scenes
/// through other channels
#[derive(Default)]
pub struct MemoryCatalog {
    scenes: Vec<Scene>,
}

impl MemoryCatalog {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn push(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl SceneCatalog for MemoryCatalog {
    fn load_scenes(&self, filter: &SceneFilter) -> EngineResult<Vec<Scene>> {
        Ok(self
            .scenes
            .iter()
            .filter(|s| filter.matches(&s.metadata))
            .cloned()
            .collect())
    }
}

/// Bounded-retry wrapper for catalogs backed by fallible transports.
///
/// Each attempt failure is logged and waited out; once the attempts are
/// exhausted the error propagates so the engine can degrade the affected
/// month to "no data" without aborting the query.
pub struct RetryingCatalog<C: SceneCatalog> {
    inner: C,
    max_attempts: u32,
    backoff: Duration,
}

impl<C: SceneCatalog> RetryingCatalog<C> {
    pub fn new(inner: C, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

impl<C: SceneCatalog> SceneCatalog for RetryingCatalog<C> {
    fn load_scenes(&self, filter: &SceneFilter) -> EngineResult<Vec<Scene>> {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.inner.load_scenes(filter) {
                Ok(scenes) => return Ok(scenes),
                Err(e) => {
                    log::warn!(
                        "Scene load attempt {}/{} failed: {}",
                        attempt,
                        self.max_attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt < self.max_attempts {
                        std::thread::sleep(self.backoff);
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            crate::types::EngineError::Processing("Scene load failed without error".to_string())
        }))
    }
}
