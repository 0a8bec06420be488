//! Thumbnail render requests.
//!
//! The engine does not encode images; it assembles one render request per
//! monthly composite (raster, visualization parameters, framing box,
//! pixel dimensions, target CRS) and hands them to an external renderer.

use crate::core::registry::{IndexDefinition, VisParams};
use crate::types::{BoundingBox, MonthlyComposite, RegionOfInterest};

/// Default thumbnail edge length in pixels
pub const DEFAULT_DIMENSIONS: u32 = 200;

/// Target CRS for gallery thumbnails (Web Mercator)
pub const WEB_MERCATOR_EPSG: u32 = 3857;

/// Placeholder shown in place of a thumbnail for an empty month
pub const NO_DATA_PLACEHOLDER: &str =
    "There is no cloud-free image data available for this month.";

/// Output encoding requested from the external renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailFormat {
    Png,
}

impl std::fmt::Display for ThumbnailFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThumbnailFormat::Png => write!(f, "PNG"),
        }
    }
}

/// Everything an external renderer needs for one gallery tile
#[derive(Debug, Clone)]
pub struct ThumbnailRequest<'a> {
    pub composite: &'a MonthlyComposite,
    /// Gallery caption, e.g. `"March 2019"`
    pub label: String,
    pub vis: VisParams,
    /// Framing box around the wide region buffer
    pub region: BoundingBox,
    /// Edge length of the rendered image in pixels
    pub dimensions: u32,
    pub crs_epsg: u32,
    pub format: ThumbnailFormat,
}

impl ThumbnailRequest<'_> {
    /// Whether the renderer should draw the composite or the
    /// [`NO_DATA_PLACEHOLDER`] card
    pub fn has_data(&self) -> bool {
        !self.composite.is_empty()
    }
}

/// Assemble one render request per composite, in collection order
pub fn thumbnail_requests<'a>(
    collection: &'a [MonthlyComposite],
    region: &RegionOfInterest,
    definition: &IndexDefinition,
    dimensions: u32,
) -> Vec<ThumbnailRequest<'a>> {
    let frame = region.frame_box();
    collection
        .iter()
        .map(|composite| ThumbnailRequest {
            composite,
            label: composite.display_label(),
            vis: definition.vis.clone(),
            region: frame,
            dimensions,
            crs_epsg: WEB_MERCATOR_EPSG,
            format: ThumbnailFormat::Png,
        })
        .collect()
}
