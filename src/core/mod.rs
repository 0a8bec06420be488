//! Core compositing and index modules

pub mod cloud_mask;
pub mod indices;
pub mod composite;
pub mod registry;
pub mod chart;
pub mod thumbnail;
pub mod engine;

// Re-export main types
pub use cloud_mask::{apply_cloud_mask, apply_cloud_mask_scaled};
pub use indices::{add_index_bands, SpectralIndex};
pub use composite::{latest_median_composite, monthly_mean_composite, LatestComposite};
pub use registry::{IndexDefinition, IndexRegistry, VisParams};
pub use chart::{extract_series, ChartPoint, ChartSeries};
pub use thumbnail::{thumbnail_requests, ThumbnailFormat, ThumbnailRequest};
pub use engine::{CompositeEngine, EngineConfig, QueryOutput, QueryRequest};
