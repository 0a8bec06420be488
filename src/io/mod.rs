//! Scene input/output modules

pub mod metadata;
pub mod safe_reader;
pub mod catalog;
pub mod download;

// Re-export main types
pub use catalog::{LocalCatalog, MemoryCatalog, RetryingCatalog, SceneCatalog, SceneFilter};
pub use download::ProductDownloader;
pub use safe_reader::SafeReader;
