//! Remote product download.
//!
//! Fetches Sentinel-2 product archives over HTTP into an on-disk cache.
//! Transient failures are retried a bounded number of times with a fixed
//! backoff; a cached product is never fetched twice.

use crate::types::{EngineError, EngineResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const RETRY_BACKOFF: Duration = Duration::from_secs(2);
const USER_AGENT: &str = "satsuma/0.2.0 (Sentinel-2 Composite Engine)";

/// HTTP fetcher for zipped SAFE products with an on-disk cache
pub struct ProductDownloader {
    cache_dir: PathBuf,
    client: reqwest::blocking::Client,
    max_retries: u32,
}

impl ProductDownloader {
    /// Downloader caching under the platform cache directory
    pub fn new() -> EngineResult<Self> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| {
                EngineError::Download("No platform cache directory available".to_string())
            })?
            .join("satsuma")
            .join("products");
        Self::with_cache_dir(cache_dir)
    }

    /// Downloader caching under an explicit directory
    pub fn with_cache_dir<P: AsRef<Path>>(cache_dir: P) -> EngineResult<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                EngineError::Download(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            cache_dir,
            client,
            max_retries: 3,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Fetch a product archive, returning the local path.
    ///
    /// A previously downloaded archive is returned from the cache without
    /// touching the network.
    pub fn fetch_product(&self, url: &str) -> EngineResult<PathBuf> {
        let file_name = archive_file_name(url)?;
        let output_path = self.cache_dir.join(&file_name);

        if let Ok(metadata) = std::fs::metadata(&output_path) {
            if metadata.len() > 0 {
                log::info!("Product {} already cached, skipping download", file_name);
                return Ok(output_path);
            }
        }

        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            log::debug!("Download attempt {} of {}: {}", attempt, self.max_retries, url);
            match self.try_download_once(url, &output_path) {
                Ok(()) => {
                    log::info!("Downloaded product to {}", output_path.display());
                    return Ok(output_path);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        log::warn!("Download attempt {} failed, retrying...", attempt);
                        std::thread::sleep(RETRY_BACKOFF);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            EngineError::Download("Download failed after all retries".to_string())
        }))
    }

    /// Single download attempt, written atomically via a sibling temp file
    fn try_download_once(&self, url: &str, output_path: &Path) -> EngineResult<()> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| EngineError::Download(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Download(format!(
                "HTTP {} for {}",
                response.status().as_u16(),
                url
            )));
        }

        let content = response
            .bytes()
            .map_err(|e| EngineError::Download(format!("Failed to read response body: {}", e)))?;

        // A real product archive is never this small; short bodies are
        // error pages from misconfigured mirrors
        if content.len() < 1024 {
            return Err(EngineError::Download(format!(
                "Downloaded file too small ({} bytes), likely an error page",
                content.len()
            )));
        }

        if url.to_ascii_lowercase().ends_with(".zip") && !is_zip_content(&content) {
            return Err(EngineError::Download(
                "Response is not a ZIP archive".to_string(),
            ));
        }

        let temp_path = output_path.with_extension("part");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, output_path)?;

        log::debug!("Wrote {} bytes to {}", content.len(), output_path.display());
        Ok(())
    }
}

/// Check ZIP magic bytes
fn is_zip_content(content: &[u8]) -> bool {
    content.len() >= 4 && &content[0..2] == b"PK"
}

/// File name under which a product URL is cached
fn archive_file_name(url: &str) -> EngineResult<String> {
    let name = url
        .split('/')
        .last()
        .and_then(|segment| segment.split('?').next())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| EngineError::Download(format!("Cannot derive file name from {}", url)))?;
    Ok(name.to_string())
}
