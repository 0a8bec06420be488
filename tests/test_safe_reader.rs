use satsuma::SafeReader;

/// Integration test against a real Sentinel-2 product.
///
/// Place a zipped L2A product under `data/` (or point
/// SATSUMA_TEST_PRODUCT at one) to enable it; without a product the test
/// is skipped.
#[test]
fn test_read_real_product() {
    let _ = env_logger::builder().is_test(true).try_init();

    let test_data_path = std::env::var("SATSUMA_TEST_PRODUCT")
        .unwrap_or_else(|_| "data/S2A_MSIL2A_test_product.zip".to_string());

    if !std::path::Path::new(&test_data_path).exists() {
        println!("Test product not found, skipping SAFE reader test");
        return;
    }

    let mut reader = SafeReader::new(&test_data_path).expect("Failed to create reader");

    let files = reader.list_files().expect("Failed to list product files");
    assert!(!files.is_empty());

    let metadata = reader.read_metadata().expect("Failed to read metadata");
    println!(
        "Product: {} ({}, {:.1}% cloud)",
        metadata.product_id, metadata.platform, metadata.cloud_cover_percentage
    );
    assert!(metadata.cloud_cover_percentage >= 0.0);
    assert!(metadata.cloud_cover_percentage <= 100.0);
    assert!(metadata.bounding_box.min_x < metadata.bounding_box.max_x);

    let scene = reader.read_scene().expect("Failed to read scene");
    let (rows, cols) = scene.shape();
    println!("Scene grid: {} x {}, bands: {:?}", rows, cols, scene.band_names());
    assert!(rows > 0 && cols > 0);
    // All six reflectance bands on a common grid
    for band in ["B2", "B3", "B4", "B8", "B11", "B12"] {
        let grid = scene.band(band).expect("missing band");
        assert_eq!(grid.dim(), (rows, cols));
    }
}
