use anyhow::Result;
use satsuma::{CompositeEngine, EngineConfig, IndexRegistry, MemoryCatalog, QueryRequest, RegionOfInterest};
use std::sync::Arc;

#[test]
fn test_registry_survives_edit_cycle() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("indices.json");

    // Write the built-in table out, as an operator would before editing
    let registry = IndexRegistry::with_defaults();
    registry.save_json_file(&path)?;

    // Edit the file without touching engine code: rename one entry
    let json = std::fs::read_to_string(&path)?;
    std::fs::write(
        &path,
        json.replace("\"Plant Health Index\"", "\"Vegetation Vigor\""),
    )?;

    let edited = IndexRegistry::from_json_file(&path)?;
    assert_eq!(edited.len(), registry.len());
    assert!(edited.contains("Vegetation Vigor"));
    assert!(!edited.contains("Plant Health Index"));

    // The engine picks the edited table up as data
    let engine = CompositeEngine::with_config(
        Arc::new(MemoryCatalog::default()),
        edited,
        EngineConfig::default(),
    );
    let request = QueryRequest {
        region: RegionOfInterest::at(30.82864, -25.00466),
        start_year: 2019,
        end_year: 2019,
        index_name: "Vegetation Vigor".to_string(),
    };
    let output = engine.run_query(&request)?;
    assert_eq!(output.definition().name, "Vegetation Vigor");
    assert_eq!(output.definition().chart_band.as_deref(), Some("NDVI"));

    // The old name is gone from validation too
    let stale = QueryRequest {
        index_name: "Plant Health Index".to_string(),
        ..request
    };
    assert!(engine.run_query(&stale).is_err());
    Ok(())
}

#[test]
fn test_presentation_order_is_stable() {
    let registry = IndexRegistry::with_defaults();
    let json = registry.to_json().expect("Failed to serialize");
    let reparsed: IndexRegistry = serde_json::from_str(&json).expect("Failed to parse");
    assert_eq!(registry.names(), reparsed.names());
    assert_eq!(reparsed.names()[0], "RGB");
}
