//! Query orchestration.
//!
//! One user action (map click or year-range submission) is one
//! [`QueryRequest`]; the engine recomputes the full monthly collection
//! for it, fanning the months out over the rayon pool. Each month is a
//! pure function of (region, year, month), so there is no shared state
//! between month computations and the only ordering requirement is the
//! final (year, month) sort.
//!
//! Supersession: the engine keeps a query generation counter. A newer
//! query bumps it; an in-flight older query notices and aborts with
//! [`EngineError::Superseded`] so stale results are never delivered.

use crate::core::chart::{self, ChartSeries};
use crate::core::cloud_mask;
use crate::core::composite::{self, LatestComposite};
use crate::core::indices;
use crate::core::registry::{IndexDefinition, IndexRegistry};
use crate::core::thumbnail::{self, ThumbnailRequest};
use crate::io::catalog::{SceneCatalog, SceneFilter};
use crate::types::{
    BoundingBox, EngineError, EngineResult, MonthlyCollection, MonthlyComposite,
    RegionOfInterest,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Engine tuning parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cloud-cover cap for the monthly index pipeline (exclusive)
    pub monthly_cloud_threshold: f64,
    /// Cloud-cover cap for the current-conditions view (exclusive).
    /// Deliberately looser than the monthly cap; the two must not be
    /// conflated.
    pub latest_cloud_threshold: f64,
    /// Earliest year covered by the imagery archive
    pub earliest_year: i32,
    /// Per-query deadline. Months that have not started by then degrade
    /// to the "no data" sentinel instead of aborting the query.
    pub query_timeout: Duration,
    /// Thumbnail edge length in pixels
    pub thumbnail_dimensions: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            monthly_cloud_threshold: 10.0,
            latest_cloud_threshold: 50.0,
            earliest_year: 2019,
            query_timeout: Duration::from_secs(120),
            thumbnail_dimensions: thumbnail::DEFAULT_DIMENSIONS,
        }
    }
}

/// One recomputation request: region, year range, selected index
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub region: RegionOfInterest,
    pub start_year: i32,
    pub end_year: i32,
    pub index_name: String,
}

/// Everything one query produces for its consumers
#[derive(Debug)]
pub struct QueryOutput {
    pub request: QueryRequest,
    /// Exactly (end_year - start_year + 1) * 12 composites, ascending
    pub collection: MonthlyCollection,
    pub chart: ChartSeries,
    definition: IndexDefinition,
    thumbnail_dimensions: u32,
}

impl QueryOutput {
    /// Definition of the index the query selected
    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    /// Render requests for the gallery, one per month in order
    pub fn thumbnails(&self) -> Vec<ThumbnailRequest<'_>> {
        thumbnail::thumbnail_requests(
            &self.collection,
            &self.request.region,
            &self.definition,
            self.thumbnail_dimensions,
        )
    }
}

/// Monthly composite & index engine over a scene catalog
pub struct CompositeEngine {
    catalog: Arc<dyn SceneCatalog>,
    registry: IndexRegistry,
    config: EngineConfig,
    generation: AtomicU64,
}

impl CompositeEngine {
    /// Engine with the built-in registry and default configuration
    pub fn new(catalog: Arc<dyn SceneCatalog>) -> Self {
        Self::with_config(catalog, IndexRegistry::with_defaults(), EngineConfig::default())
    }

    pub fn with_config(
        catalog: Arc<dyn SceneCatalog>,
        registry: IndexRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            registry,
            config,
            generation: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate a request before any computation starts
    fn validate(&self, request: &QueryRequest) -> EngineResult<()> {
        if !request.region.x.is_finite() || !request.region.y.is_finite() {
            return Err(EngineError::InvalidQuery(format!(
                "Region point ({}, {}) is not a valid coordinate",
                request.region.x, request.region.y
            )));
        }
        if request.start_year > request.end_year {
            return Err(EngineError::InvalidQuery(format!(
                "Start year {} is after end year {}",
                request.start_year, request.end_year
            )));
        }
        if request.start_year < self.config.earliest_year {
            return Err(EngineError::InvalidQuery(format!(
                "Start year {} precedes archive coverage ({})",
                request.start_year, self.config.earliest_year
            )));
        }
        if request.end_year - request.start_year > 200 {
            return Err(EngineError::InvalidQuery(
                "Year range is implausibly large".to_string(),
            ));
        }
        if !self.registry.contains(&request.index_name) {
            return Err(EngineError::InvalidQuery(format!(
                "Unknown index: {}",
                request.index_name
            )));
        }
        Ok(())
    }

    /// Run one full recomputation.
    ///
    /// Returns [`EngineError::Superseded`] when a newer query started
    /// while this one was in flight; the stale output is discarded, not
    /// delivered.
    pub fn run_query(&self, request: &QueryRequest) -> EngineResult<QueryOutput> {
        self.validate(request)?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let deadline = Instant::now() + self.config.query_timeout;
        log::info!(
            "Query #{}: ({:.5}, {:.5}) {}-{} index '{}'",
            generation,
            request.region.x,
            request.region.y,
            request.start_year,
            request.end_year,
            request.index_name
        );

        let months: Vec<(i32, u32)> = (request.start_year..=request.end_year)
            .flat_map(|year| (1..=12).map(move |month| (year, month)))
            .collect();

        #[cfg(feature = "parallel")]
        let composites: EngineResult<Vec<MonthlyComposite>> = {
            use rayon::prelude::*;
            months
                .par_iter()
                .map(|&(year, month)| self.compose_month(request, year, month, generation, deadline))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let composites: EngineResult<Vec<MonthlyComposite>> = months
            .iter()
            .map(|&(year, month)| self.compose_month(request, year, month, generation, deadline))
            .collect();

        let mut collection = composites?;
        // Months compute in any order; presentation order is (year, month)
        collection.sort_by_key(|c| (c.year, c.month));

        if self.generation.load(Ordering::SeqCst) != generation {
            log::info!("Query #{} superseded, dropping results", generation);
            return Err(EngineError::Superseded);
        }

        let definition = self
            .registry
            .get(&request.index_name)
            .cloned()
            .ok_or_else(|| {
                EngineError::InvalidQuery(format!("Unknown index: {}", request.index_name))
            })?;

        let chart = chart::extract_series(&collection, &request.region, &definition);

        let with_data = collection.iter().filter(|c| !c.is_empty()).count();
        log::info!(
            "Query #{} complete: {} month(s), {} with data",
            generation,
            collection.len(),
            with_data
        );

        Ok(QueryOutput {
            request: request.clone(),
            collection,
            chart,
            definition,
            thumbnail_dimensions: self.config.thumbnail_dimensions,
        })
    }

    /// Compute one month's composite: select, mask, derive, reduce
    fn compose_month(
        &self,
        request: &QueryRequest,
        year: i32,
        month: u32,
        generation: u64,
        deadline: Instant,
    ) -> EngineResult<MonthlyComposite> {
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(EngineError::Superseded);
        }
        if Instant::now() >= deadline {
            log::warn!(
                "Query deadline reached, degrading {:04}-{:02} to no data",
                year,
                month
            );
            return Ok(MonthlyComposite::empty(year, month));
        }

        // Monthly selection intersects the click point itself; the wide
        // buffer only frames thumbnails
        let point = BoundingBox::around(request.region.x, request.region.y, 0.0);
        let filter =
            SceneFilter::for_month(point, year, month, self.config.monthly_cloud_threshold);

        let scenes = match self.catalog.load_scenes(&filter) {
            Ok(scenes) => scenes,
            Err(e) => {
                // Repeated load failure degrades this month, the rest of
                // the query keeps its results
                log::warn!(
                    "Scene load failed for {:04}-{:02}, degrading to no data: {}",
                    year,
                    month,
                    e
                );
                return Ok(MonthlyComposite::empty(year, month));
            }
        };

        let mut processed = Vec::with_capacity(scenes.len());
        for mut scene in scenes {
            if let Err(e) = cloud_mask::apply_cloud_mask(&mut scene) {
                log::warn!("Skipping scene {}: {}", scene.metadata.product_id, e);
                continue;
            }
            if let Err(e) = indices::add_index_bands(&mut scene) {
                log::warn!("Skipping scene {}: {}", scene.metadata.product_id, e);
                continue;
            }
            processed.push(scene);
        }

        Ok(composite::monthly_mean_composite(year, month, &processed))
    }

    /// Current-conditions map view: median composite of the trailing
    /// month, masked and scaled to physical reflectance.
    ///
    /// Uses the loose cloud threshold and, unlike the monthly pipeline,
    /// divides by the reflectance scale factor.
    pub fn current_conditions(
        &self,
        region: &RegionOfInterest,
        now: DateTime<Utc>,
    ) -> EngineResult<LatestComposite> {
        let filter = SceneFilter::trailing_month(
            region.frame_box(),
            now,
            self.config.latest_cloud_threshold,
        );
        log::info!(
            "Current conditions for ({:.5}, {:.5}) in [{}, {})",
            region.x,
            region.y,
            filter.start,
            filter.end
        );

        let scenes = self.catalog.load_scenes(&filter)?;
        let mut processed = Vec::with_capacity(scenes.len());
        for mut scene in scenes {
            match cloud_mask::apply_cloud_mask_scaled(&mut scene) {
                Ok(()) => processed.push(scene),
                Err(e) => {
                    log::warn!("Skipping scene {}: {}", scene.metadata.product_id, e);
                }
            }
        }

        Ok(composite::latest_median_composite(
            filter.start,
            filter.end,
            &processed,
        ))
    }
}
