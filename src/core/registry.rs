//! Index Definition registry.
//!
//! Maps a user-facing index name to its visualization parameters, chart
//! availability, chart band, and description. The registry is data, not
//! code: a stock table ships built in and an edited JSON file loads
//! without touching the engine.

use crate::types::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Visualization parameters for gallery and map rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    /// One band (palette rendering) or three (RGB rendering)
    pub bands: Vec<String>,
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
}

/// One registry entry, strongly typed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub vis: VisParams,
    /// Whether a chart can be drawn for this index
    pub chart_available: bool,
    /// Band sampled for the chart series when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_band: Option<String>,
    pub description: String,
}

/// Ordered mapping from index name to definition.
///
/// Order is presentation order (dropdown, legend) and is preserved
/// through JSON round-trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexRegistry {
    entries: Vec<IndexDefinition>,
}

impl IndexRegistry {
    /// The stock index table
    pub fn with_defaults() -> Self {
        let entries = vec![
            IndexDefinition {
                name: "RGB".to_string(),
                vis: VisParams {
                    bands: vec!["B4".to_string(), "B3".to_string(), "B2".to_string()],
                    min: 0.0,
                    max: 3000.0,
                    palette: None,
                    gamma: None,
                },
                chart_available: false,
                chart_band: None,
                description: "True-color rendering of the red, green and blue bands.".to_string(),
            },
            IndexDefinition {
                name: "Plant Health Index".to_string(),
                vis: VisParams {
                    bands: vec!["NDVI".to_string()],
                    min: -0.5,
                    max: 1.0,
                    palette: Some(palette(&[
                        "C4022F", "FF7847", "F7FFAD", "8BCC68", "066634",
                    ])),
                    gamma: None,
                },
                chart_available: true,
                chart_band: Some("NDVI".to_string()),
                description:
                    "Normalized difference vegetation index; high values indicate dense, healthy vegetation."
                        .to_string(),
            },
            IndexDefinition {
                name: "Burn (NBR)".to_string(),
                vis: VisParams {
                    bands: vec!["NBR".to_string()],
                    min: -0.5,
                    max: 1.0,
                    palette: Some(palette(&["red", "F5ECBC", "green"])),
                    gamma: None,
                },
                chart_available: true,
                chart_band: Some("NBR".to_string()),
                description:
                    "Normalized burn ratio; low values highlight recently burnt areas.".to_string(),
            },
            IndexDefinition {
                name: "Moisture (NDMI)".to_string(),
                vis: VisParams {
                    bands: vec!["NDMI".to_string()],
                    min: -0.5,
                    max: 0.5,
                    palette: Some(palette(&[
                        "FFE3CF", "FFE6EB", "C9BFFF", "7581FF", "0F23FB",
                    ])),
                    gamma: None,
                },
                chart_available: true,
                chart_band: Some("NDMI".to_string()),
                description:
                    "Normalized difference moisture index; tracks vegetation water content.".to_string(),
            },
            IndexDefinition {
                name: "(MSAVI)".to_string(),
                vis: VisParams {
                    bands: vec!["MSAVI".to_string()],
                    min: -1.0,
                    max: 1.0,
                    palette: Some(palette(&[
                        "174499", "4AA0D9", "D9EDED", "44B86E", "378C31",
                    ])),
                    gamma: None,
                },
                chart_available: true,
                chart_band: Some("MSAVI".to_string()),
                description:
                    "Modified soil-adjusted vegetation index; reduces bare-soil influence in sparse canopies."
                        .to_string(),
            },
            IndexDefinition {
                name: "(BSI)".to_string(),
                vis: VisParams {
                    bands: vec!["BSI".to_string()],
                    min: -0.5,
                    max: 0.5,
                    palette: Some(palette(&[
                        "004A11", "3D8549", "F7FFAD", "FF7847", "FF0800",
                    ])),
                    gamma: None,
                },
                chart_available: true,
                chart_band: Some("BSI".to_string()),
                description: "Bare soil index; high values indicate exposed soil.".to_string(),
            },
            IndexDefinition {
                name: "Agriculture".to_string(),
                vis: VisParams {
                    bands: vec!["B11".to_string(), "B8".to_string(), "B2".to_string()],
                    min: 0.0,
                    max: 3000.0,
                    palette: None,
                    gamma: None,
                },
                chart_available: false,
                chart_band: None,
                description:
                    "SWIR/NIR/blue false-color rendering emphasizing cultivated areas.".to_string(),
            },
        ];
        Self { entries }
    }

    /// Look up a definition by its user-facing name
    pub fn get(&self, name: &str) -> Option<&IndexDefinition> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names in presentation order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a registry from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let registry: Self = serde_json::from_str(&content).map_err(|e| {
            EngineError::InvalidFormat(format!(
                "Failed to parse index registry {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        registry.validate()?;
        log::info!(
            "Loaded index registry with {} entries from {}",
            registry.len(),
            path.as_ref().display()
        );
        Ok(registry)
    }

    /// Serialize the registry to pretty JSON
    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::InvalidFormat(format!("Failed to serialize registry: {}", e)))
    }

    /// Write the registry to a JSON file
    pub fn save_json_file<P: AsRef<Path>>(&self, path: P) -> EngineResult<()> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }

    fn validate(&self) -> EngineResult<()> {
        for entry in &self.entries {
            if entry.name.is_empty() {
                return Err(EngineError::InvalidFormat(
                    "Registry entry with empty name".to_string(),
                ));
            }
            if entry.vis.bands.is_empty() {
                return Err(EngineError::InvalidFormat(format!(
                    "Registry entry {} has no visualization bands",
                    entry.name
                )));
            }
            if entry.chart_available && entry.chart_band.is_none() {
                return Err(EngineError::InvalidFormat(format!(
                    "Registry entry {} is chartable but names no chart band",
                    entry.name
                )));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(EngineError::InvalidFormat(format!(
                    "Duplicate registry entry: {}",
                    entry.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for IndexRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Visualization of the current-conditions median composite
/// (scaled reflectance, hence the [0.02, 0.3] stretch)
pub fn latest_composite_vis() -> VisParams {
    VisParams {
        bands: vec!["B4".to_string(), "B3".to_string(), "B2".to_string()],
        min: 0.02,
        max: 0.3,
        palette: None,
        gamma: Some(1.5),
    }
}

fn palette(colors: &[&str]) -> Vec<String> {
    colors.iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_entries() {
        let registry = IndexRegistry::with_defaults();
        assert_eq!(registry.len(), 7);
        assert_eq!(
            registry.names(),
            vec![
                "RGB",
                "Plant Health Index",
                "Burn (NBR)",
                "Moisture (NDMI)",
                "(MSAVI)",
                "(BSI)",
                "Agriculture"
            ]
        );

        let ndvi = registry.get("Plant Health Index").unwrap();
        assert!(ndvi.chart_available);
        assert_eq!(ndvi.chart_band.as_deref(), Some("NDVI"));
        assert_eq!(ndvi.vis.bands, vec!["NDVI"]);
        assert_eq!(ndvi.vis.min, -0.5);
        assert_eq!(ndvi.vis.max, 1.0);

        // RGB has no chart; this is a valid configuration, not an error
        let rgb = registry.get("RGB").unwrap();
        assert!(!rgb.chart_available);
        assert!(rgb.chart_band.is_none());
        assert_eq!(rgb.vis.bands, vec!["B4", "B3", "B2"]);
    }

    #[test]
    fn test_json_round_trip() {
        let registry = IndexRegistry::with_defaults();
        let json = registry.to_json().unwrap();
        let parsed: IndexRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(registry, parsed);
        // Order is preserved through the round trip
        assert_eq!(registry.names(), parsed.names());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indices.json");
        let registry = IndexRegistry::with_defaults();
        registry.save_json_file(&path).unwrap();

        let loaded = IndexRegistry::from_json_file(&path).unwrap();
        assert_eq!(registry, loaded);
    }

    #[test]
    fn test_invalid_registry_rejected() {
        let json = r#"[{
            "name": "Broken",
            "vis": {"bands": ["NDVI"], "min": 0.0, "max": 1.0},
            "chart_available": true,
            "description": "chartable without a chart band"
        }]"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, json).unwrap();
        assert!(IndexRegistry::from_json_file(&path).is_err());
    }

    #[test]
    fn test_latest_composite_vis() {
        let vis = latest_composite_vis();
        assert_eq!(vis.bands, vec!["B4", "B3", "B2"]);
        assert_eq!(vis.gamma, Some(1.5));
        assert!(vis.min < vis.max);
    }
}
