//! Satsuma: A Fast, Modular Sentinel-2 Monthly Composite and Spectral Index Engine
//!
//! This library turns a point of interest and a year range into one
//! cloud-filtered mean composite per calendar month, augmented with derived
//! spectral index bands (NDVI, NBR, NDMI, MSAVI, BSI) and ready for chart
//! aggregation and thumbnail rendering. It replaces the deferred-evaluation
//! model of hosted imagery platforms with plain value types materialized
//! through an explicit scene-catalog boundary.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BandGrid, BoundingBox, CoordinateSystem, EngineError, EngineResult, GeoTransform,
    MonthlyCollection, MonthlyComposite, QaGrid, RegionOfInterest, Scene, SceneMetadata,
    SpectralBand,
};

pub use crate::core::chart::{ChartPoint, ChartSeries};
pub use crate::core::composite::LatestComposite;
pub use crate::core::engine::{CompositeEngine, EngineConfig, QueryOutput, QueryRequest};
pub use crate::core::indices::SpectralIndex;
pub use crate::core::registry::{IndexDefinition, IndexRegistry, VisParams};
pub use crate::core::thumbnail::ThumbnailRequest;
pub use io::{LocalCatalog, MemoryCatalog, ProductDownloader, SafeReader, SceneCatalog, SceneFilter};
