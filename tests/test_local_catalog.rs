use chrono::{TimeZone, Utc};
use satsuma::{BoundingBox, LocalCatalog, SceneCatalog, SceneFilter};

/// Minimal product metadata document, enough for catalog filtering
fn metadata_xml(start_time: &str, cloud: f64) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<n1:Level-2A_User_Product xmlns:n1="https://psd-14.sentinel2.eo.esa.int/PSD/User_Product_Level-2A.xsd">
  <n1:General_Info>
    <Product_Info>
      <PRODUCT_START_TIME>{start_time}</PRODUCT_START_TIME>
      <PRODUCT_URI>S2A_MSIL2A_TEST.SAFE</PRODUCT_URI>
      <Datatake><SPACECRAFT_NAME>Sentinel-2A</SPACECRAFT_NAME></Datatake>
    </Product_Info>
    <Product_Footprint>
      <EXT_POS_LIST>-25.1 30.7 -25.1 31.0 -24.8 31.0 -24.8 30.7 -25.1 30.7</EXT_POS_LIST>
    </Product_Footprint>
  </n1:General_Info>
  <n1:Quality_Indicators_Info>
    <Cloud_Coverage_Assessment>{cloud}</Cloud_Coverage_Assessment>
  </n1:Quality_Indicators_Info>
</n1:Level-2A_User_Product>"#
    )
}

fn write_product(root: &std::path::Path, name: &str, start_time: &str, cloud: f64) {
    let product = root.join(name);
    std::fs::create_dir_all(&product).expect("Failed to create product dir");
    std::fs::write(product.join("MTD_MSIL2A.xml"), metadata_xml(start_time, cloud))
        .expect("Failed to write metadata");
}

#[test]
fn test_catalog_filters_on_metadata_before_loading_rasters() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    write_product(dir.path(), "S2A_MARCH.SAFE", "2019-03-04T08:01:21.024Z", 4.0);
    write_product(dir.path(), "S2A_CLOUDY.SAFE", "2019-03-12T08:01:21.024Z", 55.0);
    write_product(dir.path(), "S2A_APRIL.SAFE", "2019-04-02T08:01:21.024Z", 2.0);
    // Not a product layout; must be ignored, not fatal
    std::fs::write(dir.path().join("notes.txt"), b"scratch").unwrap();

    let catalog = LocalCatalog::new(dir.path()).expect("Failed to open catalog");
    let bounds = BoundingBox::around(30.85, -25.0, 0.01);
    let filter = SceneFilter::for_month(bounds, 2019, 3, 10.0);

    // Both March candidates pass the date gate, one passes the cloud
    // gate; its rasters are absent so the load degrades to nothing
    // rather than failing the query.
    let scenes = catalog.load_scenes(&filter).expect("Catalog query failed");
    assert!(scenes.is_empty());
}

#[test]
fn test_catalog_rejects_missing_directory() {
    assert!(LocalCatalog::new("/definitely/not/a/catalog").is_err());
}

#[test]
fn test_filter_window_edges() {
    let bounds = BoundingBox::around(30.85, -25.0, 0.01);
    let filter = SceneFilter::for_month(bounds, 2019, 3, 10.0);
    assert_eq!(filter.start, Utc.with_ymd_and_hms(2019, 3, 1, 0, 0, 0).unwrap());
    assert_eq!(filter.end, Utc.with_ymd_and_hms(2019, 4, 1, 0, 0, 0).unwrap());

    // Current-conditions window reaches one calendar month back
    let now = Utc.with_ymd_and_hms(2022, 6, 15, 12, 0, 0).unwrap();
    let trailing = SceneFilter::trailing_month(bounds, now, 50.0);
    assert_eq!(trailing.start, Utc.with_ymd_and_hms(2022, 5, 15, 12, 0, 0).unwrap());
    assert_eq!(trailing.end, now);
}
